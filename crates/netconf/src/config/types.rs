//! Declarative network configuration model.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Desired network state for one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct NetworkConfig {
    /// Commands run before any link is touched.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pre_cmds: Vec<String>,

    /// Upper bound for each DHCP client run, in seconds. 0 means unbounded.
    #[serde(skip_serializing_if = "is_zero")]
    pub dhcp_timeout: u64,

    #[serde(skip_serializing_if = "DnsConfig::is_empty")]
    pub dns: DnsConfig,

    /// Interface specs keyed by logical name, exact link name or glob.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub interfaces: BTreeMap<String, InterfaceConfig>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub post_cmds: Vec<String>,

    /// Free-form provisioning script, executed before `pre_cmds`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub script: String,
}

/// Resolver settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub search: Vec<String>,
    /// Configured nameservers win over anything DHCP supplies.
    #[serde(rename = "override", skip_serializing_if = "std::ops::Not::not")]
    pub override_dhcp: bool,
}

impl DnsConfig {
    pub fn is_empty(&self) -> bool {
        self.nameservers.is_empty() && self.search.is_empty() && !self.override_dhcp
    }
}

/// One match rule and the treatment of the links it selects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct InterfaceConfig {
    /// Exact name, glob pattern, or `mac:<addr>`. Empty means "use the key".
    #[serde(rename = "match", skip_serializing_if = "String::is_empty")]
    pub match_rule: String,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dhcp: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dhcp_args: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub address: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ipv4ll: bool,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub gateway: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub gateway_ipv6: String,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub mtu: u32,

    #[serde(skip_serializing_if = "Bridge::is_none")]
    pub bridge: Bridge,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub bond: String,
    #[serde(
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "deserialize_bond_opts"
    )]
    pub bond_opts: BTreeMap<String, String>,

    /// Comma-separated `id[:name]` list.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub vlans: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pre_up: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub post_up: Vec<String>,
}

impl InterfaceConfig {
    /// The effective match rule: `match`, or the map key when it is empty.
    pub fn rule<'a>(&'a self, key: &'a str) -> &'a str {
        if self.match_rule.is_empty() {
            key
        } else {
            &self.match_rule
        }
    }

    /// `address` followed by `addresses`, empty entries dropped.
    pub fn desired_addresses(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.address.as_str())
            .chain(self.addresses.iter().map(String::as_str))
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }

    /// Links enslaved to a bond never get their own addressing or DHCP.
    pub fn is_bond_slave(&self) -> bool {
        !self.bond.is_empty()
    }
}

/// The `bridge` field: `true` makes the matched link itself a bridge
/// master, a name attaches the link as a port of that bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Bridge {
    #[default]
    None,
    Master,
    Port(String),
}

impl Bridge {
    pub fn is_none(&self) -> bool {
        matches!(self, Bridge::None)
    }

    /// Name of the bridge this link should be attached to, if any.
    pub fn port_of(&self) -> Option<&str> {
        match self {
            Bridge::Port(name) => Some(name),
            _ => None,
        }
    }
}

impl From<&str> for Bridge {
    fn from(s: &str) -> Self {
        match s.trim() {
            "" | "false" => Bridge::None,
            "true" => Bridge::Master,
            name => Bridge::Port(name.to_string()),
        }
    }
}

impl fmt::Display for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bridge::None => f.write_str("false"),
            Bridge::Master => f.write_str("true"),
            Bridge::Port(name) => f.write_str(name),
        }
    }
}

impl Serialize for Bridge {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Bridge::None => serializer.serialize_bool(false),
            Bridge::Master => serializer.serialize_bool(true),
            Bridge::Port(name) => serializer.serialize_str(name),
        }
    }
}

impl<'de> Deserialize<'de> for Bridge {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Name(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Bridge::Master,
            Raw::Flag(false) => Bridge::None,
            Raw::Name(name) => Bridge::from(name.as_str()),
        })
    }
}

/// Sysfs option values are written as text; accept YAML/JSON scalars.
fn deserialize_bond_opts<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    let raw = BTreeMap::<String, Scalar>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Scalar::Str(s) => s,
                Scalar::Int(i) => i.to_string(),
                Scalar::Float(f) => f.to_string(),
                Scalar::Bool(b) => b.to_string(),
            };
            (k, v)
        })
        .collect())
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_forms() {
        let yaml = r#"
interfaces:
  br0:
    bridge: true
  br1:
    bridge: "true"
  eth0:
    bridge: br0
  eth1:
    bridge: false
"#;
        let cfg: NetworkConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.interfaces["br0"].bridge, Bridge::Master);
        assert_eq!(cfg.interfaces["br1"].bridge, Bridge::Master);
        assert_eq!(cfg.interfaces["eth0"].bridge, Bridge::Port("br0".into()));
        assert_eq!(cfg.interfaces["eth0"].bridge.port_of(), Some("br0"));
        assert_eq!(cfg.interfaces["eth1"].bridge, Bridge::None);
    }

    #[test]
    fn test_bond_opts_accept_numbers() {
        let yaml = r#"
interfaces:
  bond0:
    bond_opts:
      mode: 802.3ad
      miimon: 100
      use_carrier: true
"#;
        let cfg: NetworkConfig = serde_yaml::from_str(yaml).unwrap();
        let opts = &cfg.interfaces["bond0"].bond_opts;
        assert_eq!(opts["mode"], "802.3ad");
        assert_eq!(opts["miimon"], "100");
        assert_eq!(opts["use_carrier"], "true");
    }

    #[test]
    fn test_full_interface_fields() {
        let yaml = r#"
dhcp_timeout: 30
dns:
  nameservers: [8.8.8.8]
  search: [example.com]
  override: true
pre_cmds: ["echo pre"]
post_cmds: ["echo post"]
interfaces:
  wan:
    match: "mac:52:54:00:12:34:56"
    dhcp: true
    dhcp_args: "dhcpcd -MA4 -t 10"
  eth1:
    address: 10.0.0.5/24
    addresses: [10.0.1.5/24]
    gateway: 10.0.0.1
    gateway_ipv6: "2001:db8::1"
    mtu: 9000
    vlans: "100,200:mgmt"
    pre_up: ["ethtool -K $iface tso off"]
    post_up: ["echo up"]
"#;
        let cfg: NetworkConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.dhcp_timeout, 30);
        assert!(cfg.dns.override_dhcp);
        assert_eq!(cfg.dns.nameservers, vec!["8.8.8.8"]);

        let wan = &cfg.interfaces["wan"];
        assert_eq!(wan.rule("wan"), "mac:52:54:00:12:34:56");
        assert!(wan.dhcp);

        let eth1 = &cfg.interfaces["eth1"];
        assert_eq!(eth1.rule("eth1"), "eth1");
        assert_eq!(
            eth1.desired_addresses().collect::<Vec<_>>(),
            vec!["10.0.0.5/24", "10.0.1.5/24"]
        );
        assert_eq!(eth1.mtu, 9000);
        assert_eq!(eth1.vlans, "100,200:mgmt");
        assert_eq!(eth1.pre_up.len(), 1);
    }

    #[test]
    fn test_serialize_skips_defaults() {
        let mut cfg = NetworkConfig::default();
        cfg.interfaces.insert(
            "eth*".into(),
            InterfaceConfig {
                dhcp: true,
                ..Default::default()
            },
        );
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        assert!(yaml.contains("dhcp: true"));
        assert!(!yaml.contains("bridge"));
        assert!(!yaml.contains("mtu"));
        assert!(!yaml.contains("dns"));
    }

    #[test]
    fn test_json_input() {
        let json = r#"{"interfaces": {"eth0": {"dhcp": true, "bridge": "br0"}}}"#;
        let cfg: NetworkConfig = serde_json::from_str(json).unwrap();
        assert!(cfg.interfaces["eth0"].dhcp);
        assert_eq!(cfg.interfaces["eth0"].bridge, Bridge::Port("br0".into()));
    }
}

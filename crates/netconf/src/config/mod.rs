//! Configuration model, loading and defaulting.
//!
//! # Example
//!
//! ```ignore
//! use netconf::config::NetworkConfig;
//!
//! let mut config = NetworkConfig::from_path("/etc/netconf.yml")?;
//! config.populate_default();
//! ```

mod types;
mod vlan;

use std::path::Path;

pub use types::{Bridge, DnsConfig, InterfaceConfig, NetworkConfig};
pub use vlan::{VlanDefinition, parse_vlan_definitions};

use crate::error::Result;

/// Bond option that must be written before any other.
pub const BOND_MODE: &str = "mode";

impl NetworkConfig {
    /// Parse a YAML document (JSON is a subset and parses too).
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load a file; `.json` is read as JSON, anything else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    /// Synthesize the catch-all `eth*` DHCP rule when no interface is
    /// declared, and make sure loopback is always configured.
    pub fn populate_default(&mut self) {
        if self.interfaces.is_empty() {
            self.interfaces.insert(
                "eth*".to_string(),
                InterfaceConfig {
                    dhcp: true,
                    ..Default::default()
                },
            );
        }

        self.interfaces
            .entry("lo".to_string())
            .or_insert_with(|| InterfaceConfig {
                addresses: vec!["127.0.0.1/8".to_string(), "::1/128".to_string()],
                ..Default::default()
            });
    }

    /// Bond options for `bond`, `mode` first, then the rest in key order.
    pub fn bond_options(&self, bond: &str) -> Vec<(&str, &str)> {
        let Some(iface) = self.interfaces.get(bond) else {
            return Vec::new();
        };

        let mode = iface
            .bond_opts
            .get_key_value(BOND_MODE)
            .map(|(k, v)| (k.as_str(), v.as_str()));
        let rest = iface
            .bond_opts
            .iter()
            .filter(|(k, _)| k.as_str() != BOND_MODE)
            .map(|(k, v)| (k.as_str(), v.as_str()));

        mode.into_iter().chain(rest).collect()
    }
}

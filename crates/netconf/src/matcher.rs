//! Resolve which interface spec governs a kernel link.

use glob::Pattern;
use tracing::warn;

use crate::config::{InterfaceConfig, NetworkConfig};
use crate::system::Link;
use crate::util::parse_mac;

const MAC_PREFIX: &str = "mac:";

/// Find the spec for `link`, returning its map key and config.
///
/// Precedence: a `mac:` rule equal to the link's hardware address wins
/// immediately, unless the link is that spec's own bond (a bond shares
/// its first slave's MAC). Otherwise an exact name match beats any glob
/// match; among globs the first in key order wins.
pub fn find_match<'a>(
    link: &Link,
    config: &'a NetworkConfig,
) -> Option<(&'a str, &'a InterfaceConfig)> {
    let mut found = None;

    for (key, spec) in &config.interfaces {
        let rule = spec.rule(key);

        if let Some(mac) = rule.strip_prefix(MAC_PREFIX) {
            match parse_mac(mac) {
                Ok(mac) => {
                    if link.mac == Some(mac) && link.name != spec.bond {
                        return Some((key.as_str(), spec));
                    }
                }
                Err(e) => warn!(spec = %key, error = %e, "ignoring bad mac match rule"),
            }
            continue;
        }

        if rule == link.name {
            found = Some((key.as_str(), spec));
            continue;
        }

        if found.is_none() && glob_matches(rule, &link.name) {
            found = Some((key.as_str(), spec));
        }
    }

    found
}

fn glob_matches(rule: &str, name: &str) -> bool {
    match Pattern::new(rule) {
        Ok(pattern) => pattern.matches(name),
        Err(e) => {
            warn!(rule, error = %e, "ignoring bad glob match rule");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::LinkKind;

    fn config(yaml: &str) -> NetworkConfig {
        NetworkConfig::from_yaml_str(yaml).unwrap()
    }

    fn eth0() -> Link {
        Link::new("eth0", 2, LinkKind::Physical).with_mac([0x52, 0x54, 0, 0x12, 0x34, 0x56])
    }

    #[test]
    fn test_exact_beats_glob() {
        let cfg = config(
            r#"
interfaces:
  "eth*": {dhcp: true}
  eth0: {address: 10.0.0.5/24}
"#,
        );
        let (key, spec) = find_match(&eth0(), &cfg).unwrap();
        assert_eq!(key, "eth0");
        assert!(!spec.dhcp);
    }

    #[test]
    fn test_exact_beats_later_glob() {
        let cfg = config(
            r#"
interfaces:
  a:
    match: eth0
  b:
    match: "eth*"
"#,
        );
        assert_eq!(find_match(&eth0(), &cfg).unwrap().0, "a");
    }

    #[test]
    fn test_first_glob_wins() {
        let cfg = config(
            r#"
interfaces:
  a: {match: "eth?"}
  b: {match: "eth*"}
"#,
        );
        assert_eq!(find_match(&eth0(), &cfg).unwrap().0, "a");
    }

    #[test]
    fn test_mac_short_circuits() {
        let cfg = config(
            r#"
interfaces:
  eth0: {address: 10.0.0.5/24}
  wan:
    match: "mac:52:54:00:12:34:56"
    dhcp: true
"#,
        );
        let (key, spec) = find_match(&eth0(), &cfg).unwrap();
        assert_eq!(key, "wan");
        assert!(spec.dhcp);
    }

    #[test]
    fn test_mac_rule_skips_own_bond() {
        let cfg = config(
            r#"
interfaces:
  bond0: {address: 10.0.0.5/24}
  slave:
    match: "mac:52:54:00:12:34:56"
    bond: bond0
"#,
        );
        let bond = Link::new("bond0", 7, LinkKind::Bond).with_mac([0x52, 0x54, 0, 0x12, 0x34, 0x56]);
        assert_eq!(find_match(&bond, &cfg).unwrap().0, "bond0");
        assert_eq!(find_match(&eth0(), &cfg).unwrap().0, "slave");
    }

    #[test]
    fn test_bad_rules_do_not_match() {
        let cfg = config(
            r#"
interfaces:
  a: {match: "mac:zz"}
  b: {match: "eth["}
"#,
        );
        assert!(find_match(&eth0(), &cfg).is_none());
    }

    #[test]
    fn test_no_match() {
        let cfg = config("interfaces:\n  wlan0: {dhcp: true}\n");
        assert!(find_match(&eth0(), &cfg).is_none());
    }
}

//! `vlans:` field parsing.

use crate::error::{Error, Result};

/// One 802.1Q sub-interface requested on a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanDefinition {
    pub id: u16,
    /// Explicit device name; defaults to `<parent>.<id>`.
    pub name: Option<String>,
}

impl VlanDefinition {
    pub fn device_name(&self, parent: &str) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}.{}", parent, self.id),
        }
    }
}

/// Parse a comma-separated `id[:name]` list. Blank entries are skipped.
pub fn parse_vlan_definitions(s: &str) -> Result<Vec<VlanDefinition>> {
    let mut defs = Vec::new();

    for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (id_str, name) = match entry.split_once(':') {
            Some((id, name)) => (id.trim(), Some(name.trim())),
            None => (entry, None),
        };

        let id: u16 = id_str
            .parse()
            .map_err(|_| Error::InvalidVlan(entry.to_string()))?;
        if !(1..=4094).contains(&id) {
            return Err(Error::InvalidVlan(entry.to_string()));
        }

        let name = match name {
            Some("") => return Err(Error::InvalidVlan(entry.to_string())),
            Some(n) => Some(n.to_string()),
            None => None,
        };

        defs.push(VlanDefinition { id, name });
    }

    Ok(defs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_and_names() {
        let defs = parse_vlan_definitions("100, 200:mgmt,,").unwrap();
        assert_eq!(
            defs,
            vec![
                VlanDefinition { id: 100, name: None },
                VlanDefinition {
                    id: 200,
                    name: Some("mgmt".into())
                },
            ]
        );
        assert_eq!(defs[0].device_name("eth0"), "eth0.100");
        assert_eq!(defs[1].device_name("eth0"), "mgmt");
    }

    #[test]
    fn test_empty() {
        assert!(parse_vlan_definitions("").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_bad_entries() {
        assert!(matches!(
            parse_vlan_definitions("0"),
            Err(Error::InvalidVlan(_))
        ));
        assert!(parse_vlan_definitions("4095").is_err());
        assert!(parse_vlan_definitions("abc").is_err());
        assert!(parse_vlan_definitions("10:").is_err());
    }
}

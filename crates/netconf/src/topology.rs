//! Virtual device creation ahead of per-link reconciliation.
//!
//! Bridges and bonds come first so slaves and ports have a master to join;
//! VLANs come last because their parents may be one of those devices.

use std::collections::HashSet;

use tracing::{error, info};

use crate::bonding::Bond;
use crate::bridge::BridgeDevice;
use crate::config::{Bridge, NetworkConfig, parse_vlan_definitions};
use crate::matcher::find_match;
use crate::system::System;
use crate::vlan::new_vlan;

/// Create declared bridges, bonds (options applied once per bond, `mode`
/// first) and the VLANs implied by live links. Errors are logged and the
/// affected device skipped.
pub async fn build<S: System + ?Sized>(sys: &S, config: &NetworkConfig) {
    let mut configured_bonds = HashSet::new();

    for (key, spec) in &config.interfaces {
        let bridge = match &spec.bridge {
            Bridge::Master => Some(key.as_str()),
            Bridge::Port(name) => Some(name.as_str()),
            Bridge::None => None,
        };
        if let Some(name) = bridge
            && let Err(e) = BridgeDevice::open(sys, name).await
        {
            error!(bridge = %name, error = %e, "cannot create bridge");
        }

        let bond = if spec.is_bond_slave() {
            Some(spec.bond.as_str())
        } else if !spec.bond_opts.is_empty() {
            Some(key.as_str())
        } else {
            None
        };
        if let Some(name) = bond
            && configured_bonds.insert(name.to_string())
        {
            configure_bond(sys, config, name).await;
        }
    }

    build_vlans(sys, config).await;
}

async fn configure_bond<S: System + ?Sized>(sys: &S, config: &NetworkConfig, name: &str) {
    let bond = match Bond::open(sys, name).await {
        Ok(bond) => bond,
        Err(e) => {
            error!(bond = %name, error = %e, "cannot create bond");
            return;
        }
    };

    for (key, value) in config.bond_options(name) {
        if let Err(e) = bond.opt(key, value).await {
            error!(bond = %name, option = %key, error = %e, "cannot set bond option");
        }
    }
}

async fn build_vlans<S: System + ?Sized>(sys: &S, config: &NetworkConfig) {
    let links = match sys.links().await {
        Ok(links) => links,
        Err(e) => {
            error!(error = %e, "cannot list links for vlan setup");
            return;
        }
    };

    for link in &links {
        let Some((key, spec)) = find_match(link, config) else {
            continue;
        };
        if spec.vlans.is_empty() {
            continue;
        }

        let defs = match parse_vlan_definitions(&spec.vlans) {
            Ok(defs) => defs,
            Err(e) => {
                error!(link = %link.name, spec = %key, error = %e, "bad vlans");
                continue;
            }
        };

        for def in defs {
            match new_vlan(sys, link, &def).await {
                Ok(vlan) => info!(link = %link.name, vlan = %vlan.name, id = def.id, "vlan ready"),
                Err(e) => error!(link = %link.name, id = def.id, error = %e, "cannot create vlan"),
            }
        }
    }
}

//! Per-link reconciliation: slave/port attachment, addresses, MTU,
//! link state and default gateways.

use std::collections::BTreeSet;
use std::net::IpAddr;

use tracing::{debug, error, info, warn};

use crate::bonding::Bond;
use crate::bridge::BridgeDevice;
use crate::config::InterfaceConfig;
use crate::error::Result;
use crate::hooks::run_commands;
use crate::ipv4ll::{assign_link_local, remove_link_local};
use crate::system::{Link, System};
use crate::util::Cidr;
use crate::util::addr::parse_addr;

/// Bring `link` to the state `spec` describes.
///
/// Bond slaves and bridge ports are only attached. Other links get their
/// addresses diffed, MTU, `pre_up` hooks, link-up, gateways, then `post_up`
/// hooks. DHCP links skip the address diff entirely. Per-address and
/// gateway failures are logged; IPv4LL, MTU and link-up failures are
/// returned.
pub async fn apply_interface_config<S: System + ?Sized>(
    sys: &S,
    link: &Link,
    spec: &InterfaceConfig,
) -> Result<()> {
    if spec.is_bond_slave() {
        info!(link = %link.name, bond = %spec.bond, "enslaving to bond");
        sys.set_down(link).await?;
        let bond = Bond::open(sys, &spec.bond).await?;
        return bond.add_slave(&link.name);
    }

    if let Some(bridge) = spec.bridge.port_of() {
        let bridge = BridgeDevice::open(sys, bridge).await?;
        bridge.add_link(link).await?;
        return sys.set_up(link).await;
    }

    if spec.ipv4ll {
        if let Err(e) = assign_link_local(sys, link).await {
            error!(link = %link.name, error = %e, "cannot assign link-local address");
            return Err(e);
        }
    } else if !spec.dhcp {
        if let Err(e) = remove_link_local(sys, link).await {
            warn!(link = %link.name, error = %e, "cannot remove link-local address");
        }
    }

    if !spec.dhcp {
        reconcile_addresses(sys, link, spec).await;
    }

    if spec.mtu > 0 && link.mtu != spec.mtu {
        info!(link = %link.name, mtu = spec.mtu, "setting mtu");
        sys.set_mtu(link, spec.mtu).await?;
    }

    run_commands(sys, &spec.pre_up, Some(&link.name)).await;

    sys.set_up(link).await?;

    for gateway in [&spec.gateway, &spec.gateway_ipv6] {
        if !gateway.is_empty() {
            add_gateway(sys, link, gateway).await;
        }
    }

    run_commands(sys, &spec.post_up, Some(&link.name)).await;

    Ok(())
}

/// Add every desired address that is missing and, unless IPv4LL owns the
/// link, remove every address that is not desired.
///
/// IPv6 link-local addresses are kernel-managed and never removed.
pub async fn reconcile_addresses<S: System + ?Sized>(sys: &S, link: &Link, spec: &InterfaceConfig) {
    let mut desired = BTreeSet::new();
    for raw in spec.desired_addresses() {
        match raw.parse::<Cidr>() {
            Ok(cidr) => {
                desired.insert(cidr);
            }
            Err(e) => error!(link = %link.name, address = %raw, error = %e, "ignoring bad address"),
        }
    }

    let current = match sys.addresses(link).await {
        Ok(addrs) => addrs,
        Err(e) => {
            error!(link = %link.name, error = %e, "cannot list addresses");
            return;
        }
    };

    if !spec.ipv4ll {
        for addr in &current {
            if desired.contains(addr) || addr.is_ipv6_link_local() {
                continue;
            }
            info!(link = %link.name, address = %addr, "removing address");
            if let Err(e) = sys.del_address(link, *addr).await {
                error!(link = %link.name, address = %addr, error = %e, "cannot remove address");
            }
        }
    }

    for addr in desired {
        if current.contains(&addr) {
            debug!(link = %link.name, address = %addr, "address present");
            continue;
        }
        info!(link = %link.name, address = %addr, "adding address");
        match sys.add_address(link, addr).await {
            Err(e) if !e.is_already_exists() => {
                error!(link = %link.name, address = %addr, error = %e, "cannot add address")
            }
            _ => {}
        }
    }
}

async fn add_gateway<S: System + ?Sized>(sys: &S, link: &Link, gateway: &str) {
    let gw: IpAddr = match parse_addr(gateway) {
        Ok(gw) => gw,
        Err(e) => {
            error!(link = %link.name, %gateway, error = %e, "ignoring bad gateway");
            return;
        }
    };

    info!(link = %link.name, gateway = %gw, "adding default route");
    match sys.add_default_route(link, gw).await {
        Ok(()) => {}
        Err(e) if e.is_already_exists() => debug!(gateway = %gw, "default route present"),
        Err(e) => error!(link = %link.name, gateway = %gw, error = %e, "cannot add default route"),
    }
}

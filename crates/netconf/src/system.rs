//! Narrow interfaces over the mutable host state the reconciler touches.
//!
//! Every controller is generic over these traits so the same matching,
//! ordering and diff logic runs against the live kernel ([`LinuxSystem`])
//! or an in-memory fake (`testing::FakeSystem`).

use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::bonding::SysfsBonding;
use crate::dhcp::{Dhcpcd, Lease};
use crate::error::{Error, Result};
use crate::netlink::{Connection, LinkMessage};
use crate::util::{Cidr, MacAddr};

/// Kind of a kernel link as far as reconciliation cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    /// Hardware (or loopback) device without an `IFLA_INFO_KIND`.
    Physical,
    Bond,
    Bridge,
    Vlan,
    Other(String),
}

impl LinkKind {
    pub fn from_info_kind(kind: Option<&str>) -> Self {
        match kind {
            None => LinkKind::Physical,
            Some("bond") => LinkKind::Bond,
            Some("bridge") => LinkKind::Bridge,
            Some("vlan") => LinkKind::Vlan,
            Some(other) => LinkKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Physical => f.write_str("physical"),
            LinkKind::Bond => f.write_str("bond"),
            LinkKind::Bridge => f.write_str("bridge"),
            LinkKind::Vlan => f.write_str("vlan"),
            LinkKind::Other(kind) => f.write_str(kind),
        }
    }
}

/// Snapshot of one kernel link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub index: u32,
    /// Ethernet address; `None` for devices without a 6-byte address.
    pub mac: Option<MacAddr>,
    /// Index of the bridge/bond this link is enslaved to.
    pub master: Option<u32>,
    pub kind: LinkKind,
    pub up: bool,
    pub mtu: u32,
}

impl Link {
    pub fn new(name: impl Into<String>, index: u32, kind: LinkKind) -> Self {
        Self {
            name: name.into(),
            index,
            mac: None,
            master: None,
            kind,
            up: false,
            mtu: 1500,
        }
    }

    pub fn with_mac(mut self, mac: MacAddr) -> Self {
        self.mac = Some(mac);
        self
    }

    fn from_message(msg: LinkMessage) -> Option<Self> {
        let up = msg.is_up();
        Some(Self {
            mac: msg
                .address
                .as_deref()
                .and_then(|a| <MacAddr>::try_from(a).ok()),
            kind: LinkKind::from_info_kind(msg.kind.as_deref()),
            name: msg.name?,
            index: msg.index,
            master: msg.master,
            up,
            mtu: msg.mtu.unwrap_or(0),
        })
    }
}

/// Kernel link table and per-link addresses.
pub trait LinkProvider: Send + Sync {
    fn links(&self) -> impl Future<Output = Result<Vec<Link>>> + Send;

    fn add_bridge(&self, name: &str) -> impl Future<Output = Result<()>> + Send;

    fn add_vlan(&self, parent: &Link, name: &str, id: u16)
    -> impl Future<Output = Result<()>> + Send;

    fn set_master(&self, link: &Link, master: &Link) -> impl Future<Output = Result<()>> + Send;

    fn set_up(&self, link: &Link) -> impl Future<Output = Result<()>> + Send;

    fn set_down(&self, link: &Link) -> impl Future<Output = Result<()>> + Send;

    fn set_mtu(&self, link: &Link, mtu: u32) -> impl Future<Output = Result<()>> + Send;

    fn addresses(&self, link: &Link) -> impl Future<Output = Result<Vec<Cidr>>> + Send;

    /// Fails with EEXIST when the address is already assigned.
    fn add_address(&self, link: &Link, addr: Cidr) -> impl Future<Output = Result<()>> + Send;

    fn del_address(&self, link: &Link, addr: Cidr) -> impl Future<Output = Result<()>> + Send;

    fn link_by_name(&self, name: &str) -> impl Future<Output = Result<Option<Link>>> + Send {
        async move { Ok(self.links().await?.into_iter().find(|l| l.name == name)) }
    }
}

/// Routing table.
pub trait RouteTable: Send + Sync {
    /// Default route via `gateway` out of `link`. Fails with EEXIST when
    /// the same default route is present.
    fn add_default_route(
        &self,
        link: &Link,
        gateway: IpAddr,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// The bonding driver's sysfs control surface.
pub trait BondDriver: Send + Sync {
    /// Make sure the driver is loaded and `bonding_masters` is present.
    fn load_module(&self) -> impl Future<Output = Result<()>> + Send;

    fn masters(&self) -> Result<Vec<String>>;

    fn add_master(&self, name: &str) -> Result<()>;

    fn slaves(&self, bond: &str) -> Result<Vec<String>>;

    fn add_slave(&self, bond: &str, slave: &str) -> Result<()>;

    fn remove_slave(&self, bond: &str, slave: &str) -> Result<()>;

    fn set_option(&self, bond: &str, key: &str, value: &str) -> Result<()>;
}

/// External DHCP client.
pub trait DhcpClient: Send + Sync {
    /// Run a full client argument vector to completion.
    fn run_client(&self, argv: &[String]) -> impl Future<Output = Result<()>> + Send;

    /// Current lease for `iface`, `None` when the client holds none.
    fn lease(&self, iface: &str) -> impl Future<Output = Result<Option<Lease>>> + Send;
}

/// Runs hook commands and provisioning scripts.
pub trait CommandRunner: Send + Sync {
    fn run_command(&self, argv: &[String]) -> impl Future<Output = Result<()>> + Send;
}

/// Everything a reconciliation pass needs from the host.
pub trait System: LinkProvider + RouteTable + BondDriver + DhcpClient + CommandRunner {}

impl<T> System for T where T: LinkProvider + RouteTable + BondDriver + DhcpClient + CommandRunner {}

/// Run `argv` with inherited stdout/stderr; non-zero exit is an error.
///
/// The child is killed if the returned future is dropped, which is how
/// DHCP timeouts terminate the client.
pub(crate) async fn run_inherited(argv: &[String]) -> Result<()> {
    let (program, args) = argv.split_first().ok_or_else(|| Error::Command {
        command: String::new(),
        reason: "empty command".into(),
    })?;

    debug!(command = %argv.join(" "), "spawning");
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| Error::Command {
            command: argv.join(" "),
            reason: e.to_string(),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::Command {
            command: argv.join(" "),
            reason: status.to_string(),
        })
    }
}

/// The live host: rtnetlink, sysfs bonding and `dhcpcd`.
pub struct LinuxSystem {
    conn: Mutex<Connection>,
    bonding: SysfsBonding,
    dhcp: Dhcpcd,
}

impl LinuxSystem {
    pub fn new() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::new()?),
            bonding: SysfsBonding::default(),
            dhcp: Dhcpcd::default(),
        })
    }
}

impl LinkProvider for LinuxSystem {
    async fn links(&self) -> Result<Vec<Link>> {
        let msgs = self.conn.lock().await.get_links().await?;
        Ok(msgs.into_iter().filter_map(Link::from_message).collect())
    }

    async fn add_bridge(&self, name: &str) -> Result<()> {
        Ok(self.conn.lock().await.add_bridge(name).await?)
    }

    async fn add_vlan(&self, parent: &Link, name: &str, id: u16) -> Result<()> {
        Ok(self.conn.lock().await.add_vlan(name, parent.index, id).await?)
    }

    async fn set_master(&self, link: &Link, master: &Link) -> Result<()> {
        self.conn
            .lock()
            .await
            .set_link_master(link.index, master.index)
            .await
            .map_err(|e| e.with_context(format!("enslaving {} to {}", link.name, master.name)).into())
    }

    async fn set_up(&self, link: &Link) -> Result<()> {
        self.conn
            .lock()
            .await
            .set_link_state(link.index, true)
            .await
            .map_err(|e| e.with_context(format!("setting {} up", link.name)).into())
    }

    async fn set_down(&self, link: &Link) -> Result<()> {
        self.conn
            .lock()
            .await
            .set_link_state(link.index, false)
            .await
            .map_err(|e| e.with_context(format!("setting {} down", link.name)).into())
    }

    async fn set_mtu(&self, link: &Link, mtu: u32) -> Result<()> {
        self.conn
            .lock()
            .await
            .set_link_mtu(link.index, mtu)
            .await
            .map_err(|e| e.with_context(format!("setting mtu {} on {}", mtu, link.name)).into())
    }

    async fn addresses(&self, link: &Link) -> Result<Vec<Cidr>> {
        let msgs = self.conn.lock().await.get_addresses(link.index).await?;
        Ok(msgs
            .into_iter()
            .map(|m| Cidr {
                addr: m.address,
                prefix_len: m.prefix_len,
            })
            .collect())
    }

    async fn add_address(&self, link: &Link, addr: Cidr) -> Result<()> {
        let conn = self.conn.lock().await;
        Ok(conn.add_address(link.index, addr.addr, addr.prefix_len).await?)
    }

    async fn del_address(&self, link: &Link, addr: Cidr) -> Result<()> {
        let conn = self.conn.lock().await;
        Ok(conn.del_address(link.index, addr.addr, addr.prefix_len).await?)
    }
}

impl RouteTable for LinuxSystem {
    async fn add_default_route(&self, link: &Link, gateway: IpAddr) -> Result<()> {
        Ok(self
            .conn
            .lock()
            .await
            .add_default_route(gateway, link.index)
            .await?)
    }
}

impl BondDriver for LinuxSystem {
    async fn load_module(&self) -> Result<()> {
        self.bonding.load_module().await
    }

    fn masters(&self) -> Result<Vec<String>> {
        self.bonding.masters()
    }

    fn add_master(&self, name: &str) -> Result<()> {
        self.bonding.add_master(name)
    }

    fn slaves(&self, bond: &str) -> Result<Vec<String>> {
        self.bonding.slaves(bond)
    }

    fn add_slave(&self, bond: &str, slave: &str) -> Result<()> {
        self.bonding.add_slave(bond, slave)
    }

    fn remove_slave(&self, bond: &str, slave: &str) -> Result<()> {
        self.bonding.remove_slave(bond, slave)
    }

    fn set_option(&self, bond: &str, key: &str, value: &str) -> Result<()> {
        self.bonding.set_option(bond, key, value)
    }
}

impl DhcpClient for LinuxSystem {
    async fn run_client(&self, argv: &[String]) -> Result<()> {
        self.dhcp.run_client(argv).await
    }

    async fn lease(&self, iface: &str) -> Result<Option<Lease>> {
        self.dhcp.lease(iface).await
    }
}

impl CommandRunner for LinuxSystem {
    async fn run_command(&self, argv: &[String]) -> Result<()> {
        run_inherited(argv).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_kind_from_info_kind() {
        assert_eq!(LinkKind::from_info_kind(None), LinkKind::Physical);
        assert_eq!(LinkKind::from_info_kind(Some("bond")), LinkKind::Bond);
        assert_eq!(LinkKind::from_info_kind(Some("bridge")), LinkKind::Bridge);
        assert_eq!(LinkKind::from_info_kind(Some("vlan")), LinkKind::Vlan);
        assert_eq!(
            LinkKind::from_info_kind(Some("veth")).to_string(),
            "veth"
        );
    }

    #[test]
    fn test_link_from_message() {
        let msg = LinkMessage {
            index: 3,
            flags: 0x1,
            name: Some("eth0".into()),
            mtu: Some(9000),
            address: Some(vec![0x52, 0x54, 0, 1, 2, 3]),
            master: Some(5),
            kind: None,
        };
        let link = Link::from_message(msg).unwrap();
        assert_eq!(link.name, "eth0");
        assert_eq!(link.mac, Some([0x52, 0x54, 0, 1, 2, 3]));
        assert_eq!(link.master, Some(5));
        assert_eq!(link.kind, LinkKind::Physical);
        assert!(link.up);
        assert_eq!(link.mtu, 9000);
    }

    #[test]
    fn test_link_without_ethernet_address() {
        let msg = LinkMessage {
            index: 9,
            name: Some("ib0".into()),
            address: Some(vec![0; 20]),
            kind: Some("ipoib".into()),
            ..Default::default()
        };
        let link = Link::from_message(msg).unwrap();
        assert_eq!(link.mac, None);
        assert_eq!(link.kind, LinkKind::Other("ipoib".into()));

        assert!(Link::from_message(LinkMessage::default()).is_none());
    }

    #[tokio::test]
    async fn test_run_inherited_rejects_empty_argv() {
        let err = run_inherited(&[]).await.unwrap_err();
        assert!(matches!(err, Error::Command { .. }));
    }
}

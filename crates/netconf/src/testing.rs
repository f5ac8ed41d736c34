//! In-memory host for exercising reconciliation without root.
//!
//! [`FakeSystem`] implements every seam in [`crate::system`] over plain
//! collections and records each successful mutation in a journal so tests
//! can assert on ordering.
//!
//! ```ignore
//! let sys = FakeSystem::new().with_link(Link::new("eth0", 2, LinkKind::Physical));
//! apply_interface_config(&sys, &eth0, &spec).await?;
//! assert_eq!(sys.journal()[0], Op::AddAddress("eth0".into(), "10.0.0.5/24".parse()?));
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::dhcp::Lease;
use crate::error::{Error, Result};
use crate::netlink;
use crate::system::{BondDriver, CommandRunner, DhcpClient, Link, LinkKind, LinkProvider, RouteTable};
use crate::util::Cidr;

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    AddBridge(String),
    AddVlan { parent: String, name: String, id: u16 },
    SetMaster(String, String),
    SetUp(String),
    SetDown(String),
    SetMtu(String, u32),
    AddAddress(String, Cidr),
    DelAddress(String, Cidr),
    AddRoute(String, IpAddr),
    LoadBondModule,
    AddBondMaster(String),
    AddSlave(String, String),
    RemoveSlave(String, String),
    BondOption(String, String, String),
    Dhcp(Vec<String>),
    Exec(Vec<String>),
}

#[derive(Debug, Default)]
struct State {
    links: Vec<Link>,
    addresses: HashMap<String, Vec<Cidr>>,
    routes: Vec<IpAddr>,
    bonding_loaded: bool,
    bonds: BTreeMap<String, Vec<String>>,
    bond_options: BTreeMap<(String, String), String>,
    leases: HashMap<String, Lease>,
    failing_programs: HashSet<String>,
    fail_links: bool,
    dhcp_delay: Option<Duration>,
    journal: Vec<Op>,
}

impl State {
    fn next_index(&self) -> u32 {
        self.links.iter().map(|l| l.index).max().unwrap_or(0).max(99) + 1
    }

    fn link_mut(&mut self, name: &str) -> Result<&mut Link> {
        self.links
            .iter_mut()
            .find(|l| l.name == name)
            .ok_or_else(|| errno(libc::ENODEV))
    }

    fn create(&mut self, name: &str, kind: LinkKind) -> Result<Link> {
        if self.links.iter().any(|l| l.name == name) {
            return Err(errno(libc::EEXIST));
        }
        let link = Link::new(name, self.next_index(), kind);
        self.links.push(link.clone());
        Ok(link)
    }
}

fn errno(code: i32) -> Error {
    netlink::Error::from_errno(-code).into()
}

fn sysfs_missing(bond: &str, file: &str) -> Error {
    Error::sysfs(
        PathBuf::from("/sys/class/net").join(bond).join("bonding").join(file),
        io::Error::from(io::ErrorKind::NotFound),
    )
}

/// Recording in-memory [`System`](crate::system::System).
#[derive(Debug, Default)]
pub struct FakeSystem {
    state: Mutex<State>,
}

impl FakeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_link(self, link: Link) -> Self {
        self.add_link(link);
        self
    }

    pub fn add_link(&self, link: Link) {
        self.state().links.push(link);
    }

    /// Pre-assign an address without journaling it.
    pub fn assign(&self, link: &str, addr: Cidr) {
        self.state()
            .addresses
            .entry(link.to_string())
            .or_default()
            .push(addr);
    }

    /// Addresses on `link`, sorted.
    pub fn addresses_of(&self, link: &str) -> Vec<Cidr> {
        let mut addrs = self
            .state()
            .addresses
            .get(link)
            .cloned()
            .unwrap_or_default();
        addrs.sort();
        addrs
    }

    pub fn routes(&self) -> Vec<IpAddr> {
        self.state().routes.clone()
    }

    pub fn bond_slaves(&self, bond: &str) -> Vec<String> {
        self.state().bonds.get(bond).cloned().unwrap_or_default()
    }

    pub fn bond_option(&self, bond: &str, key: &str) -> Option<String> {
        self.state()
            .bond_options
            .get(&(bond.to_string(), key.to_string()))
            .cloned()
    }

    /// Make `lease` the cached lease for `iface`.
    pub fn set_lease(&self, iface: &str, lease: Lease) {
        self.state().leases.insert(iface.to_string(), lease);
    }

    /// Every command whose program is `program` exits non-zero.
    pub fn fail_program(&self, program: &str) {
        self.state().failing_programs.insert(program.to_string());
    }

    /// Make link enumeration fail with EPERM.
    pub fn fail_link_listing(&self) {
        self.state().fail_links = true;
    }

    /// Make each DHCP client run take `delay`.
    pub fn set_dhcp_delay(&self, delay: Duration) {
        self.state().dhcp_delay = Some(delay);
    }

    pub fn journal(&self) -> Vec<Op> {
        self.state().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.state().journal.clear();
    }

    /// DHCP argument vectors run so far.
    pub fn dhcp_runs(&self) -> Vec<Vec<String>> {
        self.state()
            .journal
            .iter()
            .filter_map(|op| match op {
                Op::Dhcp(argv) => Some(argv.clone()),
                _ => None,
            })
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LinkProvider for FakeSystem {
    async fn links(&self) -> Result<Vec<Link>> {
        let state = self.state();
        if state.fail_links {
            return Err(errno(libc::EPERM));
        }
        Ok(state.links.clone())
    }

    async fn add_bridge(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.create(name, LinkKind::Bridge)?;
        state.journal.push(Op::AddBridge(name.to_string()));
        Ok(())
    }

    async fn add_vlan(&self, parent: &Link, name: &str, id: u16) -> Result<()> {
        let mut state = self.state();
        let mtu = state.link_mut(&parent.name)?.mtu;
        state.create(name, LinkKind::Vlan)?;
        state.link_mut(name)?.mtu = mtu;
        state.journal.push(Op::AddVlan {
            parent: parent.name.clone(),
            name: name.to_string(),
            id,
        });
        Ok(())
    }

    async fn set_master(&self, link: &Link, master: &Link) -> Result<()> {
        let mut state = self.state();
        let index = state.link_mut(&master.name)?.index;
        state.link_mut(&link.name)?.master = Some(index);
        state
            .journal
            .push(Op::SetMaster(link.name.clone(), master.name.clone()));
        Ok(())
    }

    async fn set_up(&self, link: &Link) -> Result<()> {
        let mut state = self.state();
        state.link_mut(&link.name)?.up = true;
        state.journal.push(Op::SetUp(link.name.clone()));
        Ok(())
    }

    async fn set_down(&self, link: &Link) -> Result<()> {
        let mut state = self.state();
        state.link_mut(&link.name)?.up = false;
        state.journal.push(Op::SetDown(link.name.clone()));
        Ok(())
    }

    async fn set_mtu(&self, link: &Link, mtu: u32) -> Result<()> {
        let mut state = self.state();
        state.link_mut(&link.name)?.mtu = mtu;
        state.journal.push(Op::SetMtu(link.name.clone(), mtu));
        Ok(())
    }

    async fn addresses(&self, link: &Link) -> Result<Vec<Cidr>> {
        let mut state = self.state();
        state.link_mut(&link.name)?;
        Ok(state.addresses.get(&link.name).cloned().unwrap_or_default())
    }

    async fn add_address(&self, link: &Link, addr: Cidr) -> Result<()> {
        let mut state = self.state();
        state.link_mut(&link.name)?;
        let addrs = state.addresses.entry(link.name.clone()).or_default();
        if addrs.contains(&addr) {
            return Err(errno(libc::EEXIST));
        }
        addrs.push(addr);
        state.journal.push(Op::AddAddress(link.name.clone(), addr));
        Ok(())
    }

    async fn del_address(&self, link: &Link, addr: Cidr) -> Result<()> {
        let mut state = self.state();
        let addrs = state.addresses.entry(link.name.clone()).or_default();
        let Some(pos) = addrs.iter().position(|a| *a == addr) else {
            return Err(errno(libc::EADDRNOTAVAIL));
        };
        addrs.remove(pos);
        state.journal.push(Op::DelAddress(link.name.clone(), addr));
        Ok(())
    }
}

impl RouteTable for FakeSystem {
    async fn add_default_route(&self, link: &Link, gateway: IpAddr) -> Result<()> {
        let mut state = self.state();
        state.link_mut(&link.name)?;
        if state.routes.contains(&gateway) {
            return Err(errno(libc::EEXIST));
        }
        state.routes.push(gateway);
        state.journal.push(Op::AddRoute(link.name.clone(), gateway));
        Ok(())
    }
}

impl BondDriver for FakeSystem {
    async fn load_module(&self) -> Result<()> {
        let mut state = self.state();
        if !state.bonding_loaded {
            state.bonding_loaded = true;
            state.journal.push(Op::LoadBondModule);
        }
        Ok(())
    }

    fn masters(&self) -> Result<Vec<String>> {
        Ok(self.state().bonds.keys().cloned().collect())
    }

    fn add_master(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        if state.bonds.contains_key(name) {
            return Err(errno(libc::EEXIST));
        }
        if !state.links.iter().any(|l| l.name == name) {
            state.create(name, LinkKind::Bond)?;
        }
        state.bonds.insert(name.to_string(), Vec::new());
        state.journal.push(Op::AddBondMaster(name.to_string()));
        Ok(())
    }

    fn slaves(&self, bond: &str) -> Result<Vec<String>> {
        self.state()
            .bonds
            .get(bond)
            .cloned()
            .ok_or_else(|| sysfs_missing(bond, "slaves"))
    }

    fn add_slave(&self, bond: &str, slave: &str) -> Result<()> {
        let mut state = self.state();
        let index = state.link_mut(bond)?.index;
        state.link_mut(slave)?.master = Some(index);
        state
            .bonds
            .get_mut(bond)
            .ok_or_else(|| sysfs_missing(bond, "slaves"))?
            .push(slave.to_string());
        state
            .journal
            .push(Op::AddSlave(bond.to_string(), slave.to_string()));
        Ok(())
    }

    fn remove_slave(&self, bond: &str, slave: &str) -> Result<()> {
        let mut state = self.state();
        state
            .bonds
            .get_mut(bond)
            .ok_or_else(|| sysfs_missing(bond, "slaves"))?
            .retain(|s| s != slave);
        if let Ok(link) = state.link_mut(slave) {
            link.master = None;
        }
        state
            .journal
            .push(Op::RemoveSlave(bond.to_string(), slave.to_string()));
        Ok(())
    }

    fn set_option(&self, bond: &str, key: &str, value: &str) -> Result<()> {
        let mut state = self.state();
        if !state.bonds.contains_key(bond) {
            return Err(sysfs_missing(bond, key));
        }
        state
            .bond_options
            .insert((bond.to_string(), key.to_string()), value.to_string());
        state.journal.push(Op::BondOption(
            bond.to_string(),
            key.to_string(),
            value.to_string(),
        ));
        Ok(())
    }
}

impl DhcpClient for FakeSystem {
    async fn run_client(&self, argv: &[String]) -> Result<()> {
        let delay = {
            let mut state = self.state();
            state.journal.push(Op::Dhcp(argv.to_vec()));
            state.dhcp_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn lease(&self, iface: &str) -> Result<Option<Lease>> {
        Ok(self.state().leases.get(iface).cloned())
    }
}

impl CommandRunner for FakeSystem {
    async fn run_command(&self, argv: &[String]) -> Result<()> {
        let mut state = self.state();
        state.journal.push(Op::Exec(argv.to_vec()));
        match argv.first() {
            Some(program) if state.failing_programs.contains(program) => Err(Error::Command {
                command: argv.join(" "),
                reason: "exit status: 1".into(),
            }),
            _ => Ok(()),
        }
    }
}

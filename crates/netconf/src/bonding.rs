//! Linux bonding driver control.
//!
//! Bonds are driven through sysfs rather than netlink:
//!
//! - `/sys/class/net/bonding_masters` lists and creates masters (`+name`)
//! - `/sys/class/net/<bond>/bonding/slaves` attaches slaves (`+eth0`)
//! - `/sys/class/net/<bond>/bonding/<opt>` holds each driver option
//!
//! The driver rejects a `mode` change while slaves are attached, so
//! [`Bond::opt`] detaches everything before writing it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::BOND_MODE;
use crate::error::{Error, Result};
use crate::system::{BondDriver, LinkProvider};

/// Default sysfs root for network devices.
pub const SYSFS_NET: &str = "/sys/class/net";

const BONDING_MASTERS: &str = "bonding_masters";
const MODULE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const MODULE_POLL_ATTEMPTS: u32 = 30;

/// `BondDriver` over a sysfs tree.
#[derive(Debug, Clone)]
pub struct SysfsBonding {
    root: PathBuf,
}

impl Default for SysfsBonding {
    fn default() -> Self {
        Self::new(SYSFS_NET)
    }
}

impl SysfsBonding {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn masters_path(&self) -> PathBuf {
        self.root.join(BONDING_MASTERS)
    }

    fn bonding_path(&self, bond: &str, file: &str) -> PathBuf {
        self.root.join(bond).join("bonding").join(file)
    }

    fn read_list(path: &Path) -> Result<Vec<String>> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::sysfs(path, e))?;
        Ok(content.split_whitespace().map(str::to_string).collect())
    }

    fn write(path: &Path, value: &str) -> Result<()> {
        debug!(path = %path.display(), value, "sysfs write");
        std::fs::write(path, value).map_err(|e| Error::sysfs(path, e))
    }
}

impl BondDriver for SysfsBonding {
    async fn load_module(&self) -> Result<()> {
        let masters = self.masters_path();
        if masters.exists() {
            return Ok(());
        }

        info!("loading bonding module");
        match Command::new("modprobe")
            .arg("bonding")
            .kill_on_drop(true)
            .status()
            .await
        {
            Ok(status) if !status.success() => warn!(%status, "modprobe bonding failed"),
            Err(e) => warn!(error = %e, "cannot run modprobe"),
            Ok(_) => {}
        }

        for _ in 0..MODULE_POLL_ATTEMPTS {
            if masters.exists() {
                return Ok(());
            }
            tokio::time::sleep(MODULE_POLL_INTERVAL).await;
        }

        Err(Error::BondingUnavailable(masters.display().to_string()))
    }

    fn masters(&self) -> Result<Vec<String>> {
        Self::read_list(&self.masters_path())
    }

    fn add_master(&self, name: &str) -> Result<()> {
        Self::write(&self.masters_path(), &format!("+{}", name))
    }

    fn slaves(&self, bond: &str) -> Result<Vec<String>> {
        Self::read_list(&self.bonding_path(bond, "slaves"))
    }

    fn add_slave(&self, bond: &str, slave: &str) -> Result<()> {
        Self::write(&self.bonding_path(bond, "slaves"), &format!("+{}", slave))
    }

    fn remove_slave(&self, bond: &str, slave: &str) -> Result<()> {
        Self::write(&self.bonding_path(bond, "slaves"), &format!("-{}", slave))
    }

    fn set_option(&self, bond: &str, key: &str, value: &str) -> Result<()> {
        Self::write(&self.bonding_path(bond, key), value)
    }
}

/// Handle on one bonding master.
///
/// Opening is idempotent: the module is loaded and the master registered
/// only when missing.
#[derive(Debug)]
pub struct Bond<'a, S: ?Sized> {
    sys: &'a S,
    name: String,
}

impl<'a, S> Bond<'a, S>
where
    S: LinkProvider + BondDriver + ?Sized,
{
    pub async fn open(sys: &'a S, name: &str) -> Result<Self> {
        sys.load_module().await?;

        if !sys.masters()?.iter().any(|m| m == name) {
            info!(bond = %name, "creating bond");
            sys.add_master(name)?;
        }

        Ok(Self {
            sys,
            name: name.to_string(),
        })
    }

    /// Attach `slave`; no-op when it is already a member.
    pub fn add_slave(&self, slave: &str) -> Result<()> {
        if self.sys.slaves(&self.name)?.iter().any(|s| s == slave) {
            debug!(bond = %self.name, %slave, "already enslaved");
            return Ok(());
        }

        info!(bond = %self.name, %slave, "adding slave");
        self.sys.add_slave(&self.name, slave)
    }

    /// Write one driver option.
    ///
    /// `mode` first takes the bond down and detaches every slave.
    pub async fn opt(&self, key: &str, value: &str) -> Result<()> {
        if key == BOND_MODE {
            self.detach_all().await;
        }

        info!(bond = %self.name, option = %key, %value, "setting bond option");
        self.sys.set_option(&self.name, key, value)
    }

    async fn detach_all(&self) {
        match self.sys.link_by_name(&self.name).await {
            Ok(Some(link)) => {
                if let Err(e) = self.sys.set_down(&link).await {
                    debug!(bond = %self.name, error = %e, "cannot set bond down");
                }
            }
            Ok(None) => debug!(bond = %self.name, "bond link not visible yet"),
            Err(e) => debug!(bond = %self.name, error = %e, "cannot look up bond link"),
        }

        let slaves = match self.sys.slaves(&self.name) {
            Ok(slaves) => slaves,
            Err(e) => {
                debug!(bond = %self.name, error = %e, "cannot list slaves");
                return;
            }
        };
        for slave in slaves {
            if let Err(e) = self.sys.remove_slave(&self.name, &slave) {
                debug!(bond = %self.name, %slave, error = %e, "cannot remove slave");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sysfs_tree(bonds: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(BONDING_MASTERS), bonds.join(" ")).unwrap();
        for bond in bonds {
            let bonding = dir.path().join(bond).join("bonding");
            fs::create_dir_all(&bonding).unwrap();
            fs::write(bonding.join("slaves"), "").unwrap();
        }
        dir
    }

    #[test]
    fn test_masters_and_slaves() {
        let dir = sysfs_tree(&["bond0", "bond1"]);
        fs::write(dir.path().join("bond0/bonding/slaves"), "eth0 eth1\n").unwrap();

        let sysfs = SysfsBonding::new(dir.path());
        assert_eq!(sysfs.masters().unwrap(), vec!["bond0", "bond1"]);
        assert_eq!(sysfs.slaves("bond0").unwrap(), vec!["eth0", "eth1"]);
        assert!(sysfs.slaves("bond1").unwrap().is_empty());
    }

    #[test]
    fn test_control_writes() {
        let dir = sysfs_tree(&["bond0"]);
        let sysfs = SysfsBonding::new(dir.path());

        sysfs.add_master("bond1").unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join(BONDING_MASTERS)).unwrap(),
            "+bond1"
        );

        sysfs.add_slave("bond0", "eth2").unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("bond0/bonding/slaves")).unwrap(),
            "+eth2"
        );

        sysfs.remove_slave("bond0", "eth2").unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("bond0/bonding/slaves")).unwrap(),
            "-eth2"
        );

        sysfs.set_option("bond0", "miimon", "100").unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("bond0/bonding/miimon")).unwrap(),
            "100"
        );
    }

    #[test]
    fn test_missing_bond_reports_path() {
        let dir = sysfs_tree(&[]);
        let sysfs = SysfsBonding::new(dir.path());

        let err = sysfs.slaves("bond9").unwrap_err();
        assert!(matches!(err, Error::Sysfs { .. }));
        assert!(err.to_string().contains("bond9/bonding/slaves"));
    }

    #[tokio::test]
    async fn test_load_module_present() {
        let dir = sysfs_tree(&["bond0"]);
        SysfsBonding::new(dir.path()).load_module().await.unwrap();
    }
}

//! DHCP client coordination.
//!
//! The DHCP protocol itself is delegated to an external client (`dhcpcd`).
//! This module builds its argument vector, runs one client per eligible
//! link and reads back cached leases to learn whether DNS came from DHCP.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::system::{DhcpClient, run_inherited};

/// Client invocation used when an interface gives no `dhcp_args`.
pub const DEFAULT_DHCP_ARGS: &[&str] = &["dhcpcd", "-MA4"];

/// Block until an address is obtained (or the client gives up).
pub const WAIT_FOR_LEASE: &str = "-w";

/// Lease attribute carrying DHCP-supplied resolvers.
pub const DNS_LEASE_KEY: &str = "domain_name_servers";

/// Parameters a DHCP client negotiated for one link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lease(BTreeMap<String, String>);

impl Lease {
    /// Parse `dhcpcd -U` output: one `key=value` per line, values
    /// optionally single- or double-quoted.
    pub fn parse(dump: &str) -> Self {
        let mut map = BTreeMap::new();
        for line in dump.lines() {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            map.insert(key.to_string(), unquote(value.trim()).to_string());
        }
        Lease(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the lease carries DHCP-supplied nameservers.
    pub fn has_dns(&self) -> bool {
        self.get(DNS_LEASE_KEY).is_some_and(|v| !v.is_empty())
    }
}

impl FromIterator<(String, String)> for Lease {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Lease(iter.into_iter().collect())
    }
}

fn unquote(v: &str) -> &str {
    for q in ['\'', '"'] {
        if let Some(inner) = v.strip_prefix(q).and_then(|s| s.strip_suffix(q)) {
            return inner;
        }
    }
    v
}

/// What a DHCP unit does for its link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhcpAction {
    /// Acquire a lease, with the interface's `dhcp_args` (may be empty).
    Request { args: String },
    /// Give back a lease held by a link that no longer asks for DHCP.
    Release,
}

/// Run-time switches for DHCP units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DhcpOptions {
    pub set_hostname: bool,
    pub set_dns: bool,
    pub timeout: Option<Duration>,
}

/// Build the full client argument vector for `iface`.
pub fn dhcp_argv(iface: &str, action: &DhcpAction, opts: &DhcpOptions) -> Vec<String> {
    match action {
        DhcpAction::Release => vec![
            DEFAULT_DHCP_ARGS[0].to_string(),
            "--release".to_string(),
            iface.to_string(),
        ],
        DhcpAction::Request { args } => {
            let mut argv = match shell_words::split(args) {
                Ok(argv) => argv,
                Err(e) => {
                    error!(link = %iface, dhcp_args = %args, error = %e, "cannot parse dhcp_args, using defaults");
                    Vec::new()
                }
            };
            if argv.is_empty() {
                argv = DEFAULT_DHCP_ARGS.iter().map(|s| s.to_string()).collect();
            }

            if opts.set_hostname {
                argv.extend(["-e".to_string(), "force_hostname=true".to_string()]);
            }
            if !opts.set_dns {
                argv.extend(["--nohook".to_string(), "resolv.conf".to_string()]);
            }
            argv.push(WAIT_FOR_LEASE.to_string());
            argv.push(iface.to_string());
            argv
        }
    }
}

/// One DHCP unit: run the client for `iface` and log the outcome.
///
/// Never fails; DHCP trouble on one link must not affect the others.
pub async fn run_dhcp<D: DhcpClient + ?Sized>(
    client: &D,
    iface: &str,
    action: &DhcpAction,
    opts: &DhcpOptions,
) {
    let argv = dhcp_argv(iface, action, opts);
    info!(link = %iface, command = %argv.join(" "), "running DHCP");

    let result = match opts.timeout {
        Some(limit) => match tokio::time::timeout(limit, client.run_client(&argv)).await {
            Ok(res) => res,
            Err(_) => Err(Error::DhcpTimeout {
                iface: iface.to_string(),
                secs: limit.as_secs(),
            }),
        },
        None => client.run_client(&argv).await,
    };

    match result {
        Ok(()) => debug!(link = %iface, "DHCP client finished"),
        Err(e) => error!(link = %iface, error = %e, "DHCP failed"),
    }
}

/// `dhcpcd` driven through `tokio::process`.
#[derive(Debug, Clone)]
pub struct Dhcpcd {
    program: String,
}

impl Default for Dhcpcd {
    fn default() -> Self {
        Self {
            program: DEFAULT_DHCP_ARGS[0].to_string(),
        }
    }
}

impl DhcpClient for Dhcpcd {
    async fn run_client(&self, argv: &[String]) -> Result<()> {
        run_inherited(argv).await
    }

    async fn lease(&self, iface: &str) -> Result<Option<Lease>> {
        let output = match Command::new(&self.program)
            .args(["-U", iface])
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(link = %iface, error = %e, "cannot query DHCP lease");
                return Ok(None);
            }
        };

        if !output.status.success() {
            return Ok(None);
        }

        let lease = Lease::parse(&String::from_utf8_lossy(&output.stdout));
        Ok((!lease.is_empty()).then_some(lease))
    }
}

//! One full reconciliation pass.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{InterfaceConfig, NetworkConfig};
use crate::dhcp::{DhcpAction, DhcpOptions, run_dhcp};
use crate::error::{Error, Result};
use crate::hooks::{DEFAULT_SCRIPT_PATH, run_commands, run_script};
use crate::matcher::find_match;
use crate::reconcile::apply_interface_config;
use crate::system::{Link, System};
use crate::topology;

/// Run-time switches for a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Let the DHCP client set the hostname.
    pub set_hostname: bool,
    /// Let the DHCP client rewrite resolv.conf.
    pub set_dns: bool,
    /// Where the provisioning script is written before it runs.
    pub script_path: PathBuf,
    /// Bound on each DHCP client run.
    pub dhcp_timeout: Option<Duration>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            set_hostname: false,
            set_dns: true,
            script_path: PathBuf::from(DEFAULT_SCRIPT_PATH),
            dhcp_timeout: None,
        }
    }
}

impl ApplyOptions {
    /// Defaults derived from `config`: DNS is left to DHCP unless the
    /// config overrides it, and `dhcp_timeout` becomes the DHCP bound.
    pub fn for_config(config: &NetworkConfig) -> Self {
        Self {
            set_dns: !config.dns.override_dhcp,
            dhcp_timeout: (config.dhcp_timeout > 0)
                .then(|| Duration::from_secs(config.dhcp_timeout)),
            ..Default::default()
        }
    }

    fn dhcp(&self) -> DhcpOptions {
        DhcpOptions {
            set_hostname: self.set_hostname,
            set_dns: self.set_dns,
            timeout: self.dhcp_timeout,
        }
    }
}

/// A link whose reconciliation failed. The pass carried on without it.
#[derive(Debug)]
pub struct LinkFailure {
    pub link: String,
    pub error: Error,
}

/// Result of a pass that got as far as the link snapshot.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Some DHCP lease supplied nameservers.
    pub dns_from_dhcp: bool,
    pub failures: Vec<LinkFailure>,
}

/// Reconcile the host against `config`.
///
/// Only failing to list links is fatal. Every other failure is logged;
/// per-link ones are also reported in [`ApplyOutcome::failures`].
pub async fn apply_network_configs<S: System + 'static>(
    sys: Arc<S>,
    config: &mut NetworkConfig,
    opts: &ApplyOptions,
) -> Result<ApplyOutcome> {
    config.populate_default();

    if !config.script.trim().is_empty()
        && let Err(e) = run_script(sys.as_ref(), &config.script, &opts.script_path).await
    {
        error!(path = %opts.script_path.display(), error = %e, "network script failed");
    }

    run_commands(sys.as_ref(), &config.pre_cmds, None).await;

    topology::build(sys.as_ref(), config).await;

    let links = sys.links().await.inspect_err(|e| {
        error!(error = %e, "cannot list links");
    })?;

    let mut outcome = ApplyOutcome::default();
    let mut units = JoinSet::new();
    let dhcp_opts = Arc::new(opts.dhcp());

    for link in &links {
        let spec = find_match(link, config);

        if let Some((key, spec)) = spec {
            debug!(link = %link.name, spec = %key, "matched");
            if let Err(e) = apply_interface_config(sys.as_ref(), link, spec).await {
                error!(link = %link.name, error = %e, "cannot configure link");
                outcome.failures.push(LinkFailure {
                    link: link.name.clone(),
                    error: e,
                });
            }
        }

        let Some(action) = dhcp_action(sys.as_ref(), link, spec.map(|(_, s)| s)).await else {
            continue;
        };

        let sys = Arc::clone(&sys);
        let opts = Arc::clone(&dhcp_opts);
        let iface = link.name.clone();
        units.spawn(async move {
            run_dhcp(sys.as_ref(), &iface, &action, &opts).await;
        });
    }

    while let Some(res) = units.join_next().await {
        if let Err(e) = res {
            warn!(error = %e, "DHCP unit panicked");
        }
    }

    outcome.dns_from_dhcp = dns_from_dhcp(sys.as_ref(), &links).await;

    run_commands(sys.as_ref(), &config.post_cmds, None).await;

    info!(
        links = links.len(),
        failures = outcome.failures.len(),
        dns_from_dhcp = outcome.dns_from_dhcp,
        "network configuration applied"
    );
    Ok(outcome)
}

/// What, if anything, the DHCP client should do for `link`.
///
/// Bond slaves, bridge ports and loopback never get one. A link that is
/// not asked to run DHCP but still holds a lease gets it released.
async fn dhcp_action<S: System + ?Sized>(
    sys: &S,
    link: &Link,
    spec: Option<&InterfaceConfig>,
) -> Option<DhcpAction> {
    if link.name == "lo" {
        return None;
    }

    if let Some(spec) = spec {
        if spec.is_bond_slave() || spec.bridge.port_of().is_some() {
            return None;
        }
        if spec.dhcp {
            return Some(DhcpAction::Request {
                args: spec.dhcp_args.clone(),
            });
        }
    }

    match sys.lease(&link.name).await {
        Ok(Some(_)) => {
            info!(link = %link.name, "releasing lease held by unmanaged link");
            Some(DhcpAction::Release)
        }
        Ok(None) => None,
        Err(e) => {
            debug!(link = %link.name, error = %e, "cannot query lease");
            None
        }
    }
}

async fn dns_from_dhcp<S: System + ?Sized>(sys: &S, links: &[Link]) -> bool {
    for link in links {
        match sys.lease(&link.name).await {
            Ok(Some(lease)) if lease.has_dns() => {
                debug!(link = %link.name, "DNS supplied by DHCP");
                return true;
            }
            Ok(_) => {}
            Err(e) => debug!(link = %link.name, error = %e, "cannot query lease"),
        }
    }
    false
}

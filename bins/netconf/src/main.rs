//! netconf command - apply declarative network configuration.

mod resolv;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use netconf::config::NetworkConfig;
use netconf::matcher::find_match;
use netconf::system::{LinkProvider, LinuxSystem};
use netconf::{ApplyOptions, apply_network_configs};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "netconf", version, about = "Declarative network configuration")]
struct Cli {
    /// Log filter directive (e.g. `debug`, `netconf=trace`). Defaults to
    /// `RUST_LOG`, then `info`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ConfigArgs {
    /// Configuration file (YAML, or JSON with a `.json` extension).
    #[arg(short, long)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile links, addresses and routes with the configuration.
    Apply {
        #[command(flatten)]
        config: ConfigArgs,

        /// Let the DHCP client set the hostname.
        #[arg(long)]
        set_hostname: bool,

        /// Keep the DHCP client away from resolv.conf.
        #[arg(long)]
        no_dns: bool,

        /// Upper bound for each DHCP client run, in seconds.
        #[arg(long, value_name = "SECS")]
        dhcp_timeout: Option<u64>,

        /// Where configured nameservers are written.
        #[arg(long, default_value = resolv::DEFAULT_PATH)]
        resolv_conf: PathBuf,
    },

    /// Print the configuration after defaults are filled in.
    ShowConfig {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Show which interface spec each live link resolves to.
    #[command(name = "match")]
    Match {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

fn load(args: &ConfigArgs) -> anyhow::Result<NetworkConfig> {
    NetworkConfig::from_path(&args.config)
        .with_context(|| format!("cannot load {}", args.config.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level).context("bad log level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Apply {
            config,
            set_hostname,
            no_dns,
            dhcp_timeout,
            resolv_conf,
        } => {
            let mut cfg = load(&config)?;

            let mut opts = ApplyOptions::for_config(&cfg);
            opts.set_hostname = set_hostname;
            if no_dns {
                opts.set_dns = false;
            }
            if let Some(secs) = dhcp_timeout {
                opts.dhcp_timeout = (secs > 0).then(|| Duration::from_secs(secs));
            }

            let sys = Arc::new(LinuxSystem::new().context("cannot open netlink socket")?);
            let outcome = apply_network_configs(sys, &mut cfg, &opts).await?;

            for failure in &outcome.failures {
                eprintln!("{}: {}", failure.link, failure.error);
            }

            if resolv::should_write(&cfg.dns, outcome.dns_from_dhcp) {
                resolv::write(&resolv_conf, &cfg.dns)
                    .with_context(|| format!("cannot write {}", resolv_conf.display()))?;
                tracing::info!(path = %resolv_conf.display(), "resolv.conf written");
            }
        }

        Command::ShowConfig { config } => {
            let mut cfg = load(&config)?;
            cfg.populate_default();
            print!("{}", serde_yaml::to_string(&cfg)?);
        }

        Command::Match { config } => {
            let mut cfg = load(&config)?;
            cfg.populate_default();

            let sys = LinuxSystem::new().context("cannot open netlink socket")?;
            for link in sys.links().await? {
                let key = find_match(&link, &cfg).map(|(key, _)| key).unwrap_or("-");
                println!("{:<16} {:<8} {}", link.name, link.kind.to_string(), key);
            }
        }
    }

    Ok(())
}

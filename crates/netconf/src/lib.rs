//! Declarative network interface reconciliation for Linux.
//!
//! One pass turns a [`NetworkConfig`](config::NetworkConfig) into kernel
//! state: interface specs are resolved against the links the host exposes
//! (by MAC, exact name or glob), bonds, bridges and VLANs are created in
//! dependency order, addresses, MTU, link state and default routes are
//! reconciled per link, and DHCP clients run concurrently for the links
//! that ask for them.
//!
//! # Features
//!
//! - `testing` - In-memory [`System`](system::System) for integration tests
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use netconf::{ApplyOptions, apply_network_configs};
//! use netconf::config::NetworkConfig;
//! use netconf::system::LinuxSystem;
//!
//! #[tokio::main]
//! async fn main() -> netconf::Result<()> {
//!     let mut config = NetworkConfig::from_path("/etc/netconf.yml")?;
//!     let opts = ApplyOptions::for_config(&config);
//!     let outcome = apply_network_configs(Arc::new(LinuxSystem::new()?), &mut config, &opts).await?;
//!     println!("dns from dhcp: {}", outcome.dns_from_dhcp);
//!     Ok(())
//! }
//! ```

pub mod apply;
pub mod bonding;
pub mod bridge;
pub mod config;
pub mod dhcp;
pub mod error;
pub mod hooks;
pub mod ipv4ll;
pub mod matcher;
pub mod netlink;
pub mod reconcile;
pub mod system;
pub mod topology;
pub mod util;
pub mod vlan;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use apply::{ApplyOptions, ApplyOutcome, LinkFailure, apply_network_configs};
pub use error::{Error, Result};

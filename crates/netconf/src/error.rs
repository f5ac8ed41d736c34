//! Crate-level error type.

use std::io;
use std::path::PathBuf;

use crate::netlink;
use crate::util::AddrError;

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while loading configuration or reconciling links.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Netlink(#[from] netlink::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A sysfs read or write failed.
    #[error("{}: {source}", path.display())]
    Sysfs {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Address(#[from] AddrError),

    #[error("invalid VLAN definition '{0}'")]
    InvalidVlan(String),

    #[error("invalid command line '{command}': {source}")]
    CommandParse {
        command: String,
        #[source]
        source: shell_words::ParseError,
    },

    /// The bonding driver did not expose `bonding_masters`.
    #[error("bonding driver not available: {0}")]
    BondingUnavailable(String),

    /// A link with this name exists but is of a different kind.
    #[error("link {name} already exists with kind {kind}")]
    LinkExists { name: String, kind: String },

    #[error("link not found: {0}")]
    LinkNotFound(String),

    /// A subprocess could not be started or exited unsuccessfully.
    #[error("command '{command}' failed: {reason}")]
    Command { command: String, reason: String },

    #[error("DHCP on {iface} timed out after {secs}s")]
    DhcpTimeout { iface: String, secs: u64 },

    #[error("no usable IPv4 link-local address found for {0}")]
    Ipv4llExhausted(String),
}

impl Error {
    /// EEXIST from the kernel; repeated reconciliation treats it as success.
    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::Netlink(e) => e.is_already_exists(),
            Error::Io(e) => e.kind() == io::ErrorKind::AlreadyExists,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Netlink(e) => e.is_not_found(),
            Error::LinkNotFound(_) => true,
            _ => false,
        }
    }

    pub(crate) fn sysfs(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Sysfs {
            path: path.into(),
            source,
        }
    }
}

//! rtnetlink error type.

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// rtnetlink failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `nlmsgerr` with a non-zero code.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel { errno: i32, message: String },

    /// As `Kernel`, tagged with what was being attempted.
    #[error("{operation}: {message} (errno {errno})")]
    KernelWithContext {
        operation: String,
        errno: i32,
        message: String,
    },

    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    #[error("interface not found: {name}")]
    InterfaceNotFound { name: String },
}

impl Error {
    /// Build from the negative errno carried in `nlmsgerr`.
    pub fn from_errno(errno: i32) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::Kernel {
            errno: -errno,
            message,
        }
    }

    /// Tag a kernel error with the operation; other variants pass through.
    pub fn with_context(self, operation: impl Into<String>) -> Self {
        match self {
            Self::Kernel { errno, message } => Self::KernelWithContext {
                operation: operation.into(),
                errno,
                message,
            },
            other => other,
        }
    }

    /// ENOENT, ENODEV or EADDRNOTAVAIL.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => {
                matches!(*errno, libc::ENOENT | libc::ENODEV | libc::EADDRNOTAVAIL)
            }
            Self::InterfaceNotFound { .. } => true,
            _ => false,
        }
    }

    /// EEXIST: the link, address or route is already there.
    pub fn is_already_exists(&self) -> bool {
        self.errno() == Some(libc::EEXIST)
    }

    pub fn is_busy(&self) -> bool {
        self.errno() == Some(libc::EBUSY)
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self.errno(), Some(libc::EPERM | libc::EACCES))
    }

    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

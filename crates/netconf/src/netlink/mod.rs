//! Minimal async rtnetlink client.
//!
//! Covers exactly what interface reconciliation needs: dumping links and
//! addresses, creating bridges and VLANs, setting link state/MTU/master,
//! adding and removing addresses, and installing default routes.
//!
//! # Example
//!
//! ```ignore
//! use netconf::netlink::Connection;
//!
//! let conn = Connection::new()?;
//! for link in conn.get_links().await? {
//!     println!("{}: {:?} kind={:?}", link.index, link.name, link.kind);
//! }
//! conn.add_bridge("br0").await?;
//! ```

pub mod addr;
pub mod attr;
pub mod builder;
pub mod connection;
pub mod error;
pub mod link;
pub mod message;
pub mod route;
pub mod socket;
pub mod types;

pub use addr::AddressMessage;
pub use builder::MessageBuilder;
pub use connection::Connection;
pub use error::{Error, Result};
pub use link::LinkMessage;
pub use socket::NetlinkSocket;

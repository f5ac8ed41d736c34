//! Shared helpers.

pub mod addr;

pub use addr::{AddrError, Cidr, MacAddr, parse_mac};

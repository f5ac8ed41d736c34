//! Address parsing and formatting utilities.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Error type for address parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddrError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid prefix length: {0}")]
    InvalidPrefix(String),

    #[error("invalid MAC address: {0}")]
    InvalidMac(String),
}

pub type Result<T> = std::result::Result<T, AddrError>;

/// A hardware (Ethernet) address.
pub type MacAddr = [u8; 6];

/// An interface address with its prefix length, e.g. `10.0.0.5/24`.
///
/// The host part is kept: `10.0.0.5/24` and `10.0.0.9/24` are distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cidr {
    pub addr: IpAddr,
    pub prefix_len: u8,
}

impl Cidr {
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self> {
        let max = max_prefix(&addr);
        if prefix_len > max {
            return Err(AddrError::InvalidPrefix(format!(
                "{} exceeds maximum {} for address family",
                prefix_len, max
            )));
        }
        Ok(Self { addr, prefix_len })
    }

    /// True for addresses inside 169.254.0.0/16.
    pub fn is_ipv4_link_local(&self) -> bool {
        matches!(self.addr, IpAddr::V4(v4) if v4.is_link_local())
    }

    /// True for addresses inside fe80::/10.
    pub fn is_ipv6_link_local(&self) -> bool {
        matches!(self.addr, IpAddr::V6(v6) if v6.segments()[0] & 0xffc0 == 0xfe80)
    }
}

fn max_prefix(addr: &IpAddr) -> u8 {
    if addr.is_ipv4() { 32 } else { 128 }
}

impl FromStr for Cidr {
    type Err = AddrError;

    /// Parse CIDR notation; a bare address gets a host prefix.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once('/') {
            Some((addr_str, prefix_str)) => {
                let addr = parse_addr(addr_str)?;
                let prefix: u8 = prefix_str
                    .parse()
                    .map_err(|_| AddrError::InvalidPrefix(prefix_str.to_string()))?;
                Cidr::new(addr, prefix)
            }
            None => {
                let addr = parse_addr(s)?;
                Ok(Cidr {
                    addr,
                    prefix_len: max_prefix(&addr),
                })
            }
        }
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

/// Parse an IP address from string.
pub fn parse_addr(s: &str) -> Result<IpAddr> {
    s.parse()
        .map_err(|_| AddrError::InvalidAddress(s.to_string()))
}

/// Parse a MAC address (`aa:bb:cc:dd:ee:ff`, `-` separators accepted).
pub fn parse_mac(s: &str) -> Result<MacAddr> {
    let parts: Vec<&str> = s.trim().split([':', '-']).collect();
    if parts.len() != 6 {
        return Err(AddrError::InvalidMac(s.to_string()));
    }

    let mut mac = [0u8; 6];
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() || part.len() > 2 {
            return Err(AddrError::InvalidMac(s.to_string()));
        }
        mac[i] = u8::from_str_radix(part, 16).map_err(|_| AddrError::InvalidMac(s.to_string()))?;
    }

    Ok(mac)
}

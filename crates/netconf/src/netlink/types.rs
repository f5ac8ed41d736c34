//! rtnetlink family headers and attribute numbers.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::error::{Error, Result};

macro_rules! header_from_bytes {
    ($ty:ty) => {
        impl $ty {
            /// Size of this structure.
            pub const SIZE: usize = std::mem::size_of::<Self>();

            /// Copy out of the start of a message payload; `data` may sit at
            /// any alignment.
            pub fn from_bytes(data: &[u8]) -> Result<Self> {
                Self::read_from_prefix(data)
                    .map(|(r, _)| r)
                    .map_err(|_| Error::Truncated {
                        expected: Self::SIZE,
                        actual: data.len(),
                    })
            }
        }
    };
}

/// Interface info message (struct ifinfomsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IfInfoMsg {
    pub ifi_family: u8,
    pub __ifi_pad: u8,
    /// Device type (ARPHRD_*).
    pub ifi_type: u16,
    pub ifi_index: i32,
    /// Device flags (IFF_*).
    pub ifi_flags: u32,
    /// Change mask for `ifi_flags`.
    pub ifi_change: u32,
}

impl IfInfoMsg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(mut self, index: i32) -> Self {
        self.ifi_index = index;
        self
    }
}

header_from_bytes!(IfInfoMsg);

/// Address message (struct ifaddrmsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IfAddrMsg {
    pub ifa_family: u8,
    pub ifa_prefixlen: u8,
    pub ifa_flags: u8,
    pub ifa_scope: u8,
    pub ifa_index: u32,
}

header_from_bytes!(IfAddrMsg);

/// Route message (struct rtmsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RtMsg {
    pub rtm_family: u8,
    pub rtm_dst_len: u8,
    pub rtm_src_len: u8,
    pub rtm_tos: u8,
    pub rtm_table: u8,
    pub rtm_protocol: u8,
    pub rtm_scope: u8,
    pub rtm_type: u8,
    pub rtm_flags: u32,
}

/// Link attributes (IFLA_*).
pub mod ifla {
    pub const ADDRESS: u16 = 1;
    pub const IFNAME: u16 = 3;
    pub const MTU: u16 = 4;
    pub const LINK: u16 = 5;
    pub const MASTER: u16 = 10;
    pub const LINKINFO: u16 = 18;

    /// Nested inside IFLA_LINKINFO.
    pub const INFO_KIND: u16 = 1;
    pub const INFO_DATA: u16 = 2;

    /// Nested inside IFLA_INFO_DATA for kind "vlan".
    pub const VLAN_ID: u16 = 1;
}

/// Address attributes (IFA_*).
pub mod ifa {
    pub const ADDRESS: u16 = 1;
    pub const LOCAL: u16 = 2;
}

/// Route attributes (RTA_*).
pub mod rta {
    pub const DST: u16 = 1;
    pub const OIF: u16 = 4;
    pub const GATEWAY: u16 = 5;
}

/// Interface flags (IFF_*).
pub mod iff {
    pub const UP: u32 = 0x1;
}

/// Route table, protocol, scope and type constants.
pub mod rt {
    pub const TABLE_MAIN: u8 = 254;
    pub const PROT_BOOT: u8 = 3;
    pub const SCOPE_UNIVERSE: u8 = 0;
    pub const SCOPE_LINK: u8 = 253;
    pub const SCOPE_HOST: u8 = 254;
    pub const TYPE_UNICAST: u8 = 1;
}

pub const AF_UNSPEC: u8 = 0;
pub const AF_INET: u8 = 2;
pub const AF_INET6: u8 = 10;

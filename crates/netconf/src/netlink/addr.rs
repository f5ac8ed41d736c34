//! Address dump parsing and RTM_NEWADDR/RTM_DELADDR requests.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::attr::AttrIter;
use super::builder::MessageBuilder;
use super::connection::{Connection, ack_request, create_request, dump_request};
use super::error::Result;
use super::message::NlMsgType;
use super::types::{AF_INET, AF_INET6, AF_UNSPEC, IfAddrMsg, ifa, rt};

/// IFA_BROADCAST
const IFA_BROADCAST: u16 = 8;

/// An address as reported by an RTM_GETADDR dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMessage {
    pub index: u32,
    pub prefix_len: u8,
    pub scope: u8,
    /// IFA_LOCAL for IPv4, IFA_ADDRESS otherwise.
    pub address: IpAddr,
}

impl AddressMessage {
    /// Parse an RTM_NEWADDR payload. Returns `None` for families other
    /// than inet/inet6.
    pub fn from_bytes(payload: &[u8]) -> Result<Option<Self>> {
        let hdr = IfAddrMsg::from_bytes(payload)?;
        let mut address = None;
        let mut local = None;

        for (kind, data) in AttrIter::new(&payload[IfAddrMsg::SIZE..]) {
            match kind {
                ifa::ADDRESS => address = ip_from_bytes(hdr.ifa_family, data),
                ifa::LOCAL => local = ip_from_bytes(hdr.ifa_family, data),
                _ => {}
            }
        }

        // On point-to-point links IFA_ADDRESS is the peer; IFA_LOCAL is ours.
        let Some(address) = local.or(address) else {
            return Ok(None);
        };

        Ok(Some(AddressMessage {
            index: hdr.ifa_index,
            prefix_len: hdr.ifa_prefixlen,
            scope: hdr.ifa_scope,
            address,
        }))
    }
}

fn ip_from_bytes(family: u8, data: &[u8]) -> Option<IpAddr> {
    match family {
        AF_INET => {
            let octets: [u8; 4] = data.get(..4)?.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        AF_INET6 => {
            let octets: [u8; 16] = data.get(..16)?.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

fn ip_octets(addr: &IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

fn family_of(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => AF_INET,
        IpAddr::V6(_) => AF_INET6,
    }
}

/// Scope the kernel would pick for `ip addr add` of this address.
fn scope_of(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(v4) if v4.is_loopback() => rt::SCOPE_HOST,
        IpAddr::V4(v4) if v4.is_link_local() => rt::SCOPE_LINK,
        IpAddr::V6(v6) if v6.is_loopback() => rt::SCOPE_HOST,
        _ => rt::SCOPE_UNIVERSE,
    }
}

fn write_address(builder: &mut MessageBuilder, index: u32, addr: &IpAddr, prefix_len: u8) {
    let hdr = IfAddrMsg {
        ifa_family: family_of(addr),
        ifa_prefixlen: prefix_len,
        ifa_flags: 0,
        ifa_scope: scope_of(addr),
        ifa_index: index,
    };
    builder.append(&hdr);

    let octets = ip_octets(addr);
    if let IpAddr::V4(v4) = addr {
        builder.append_attr(ifa::LOCAL, &octets);
        builder.append_attr(ifa::ADDRESS, &octets);
        if prefix_len < 31 {
            let host_mask = u32::MAX >> prefix_len;
            let brd = Ipv4Addr::from(u32::from(*v4) | host_mask);
            builder.append_attr(IFA_BROADCAST, &brd.octets());
        }
    } else {
        builder.append_attr(ifa::ADDRESS, &octets);
    }
}

/// Build an exclusive RTM_NEWADDR request.
pub fn add_address_request(index: u32, addr: &IpAddr, prefix_len: u8) -> MessageBuilder {
    let mut builder = create_request(NlMsgType::RTM_NEWADDR);
    write_address(&mut builder, index, addr, prefix_len);
    builder
}

/// Build an RTM_DELADDR request.
pub fn del_address_request(index: u32, addr: &IpAddr, prefix_len: u8) -> MessageBuilder {
    let mut builder = ack_request(NlMsgType::RTM_DELADDR);
    write_address(&mut builder, index, addr, prefix_len);
    builder
}

impl Connection {
    /// Get all IPv4/IPv6 addresses assigned to link `index`.
    pub async fn get_addresses(&self, index: u32) -> Result<Vec<AddressMessage>> {
        let mut builder = dump_request(NlMsgType::RTM_GETADDR);
        builder.append(&IfAddrMsg {
            ifa_family: AF_UNSPEC,
            ..Default::default()
        });

        let mut addrs = Vec::new();
        for payload in self.dump(builder).await? {
            if let Some(addr) = AddressMessage::from_bytes(&payload)?
                && addr.index == index
            {
                addrs.push(addr);
            }
        }
        Ok(addrs)
    }

    /// Add an address. Fails with EEXIST when it is already assigned.
    pub async fn add_address(&self, index: u32, addr: IpAddr, prefix_len: u8) -> Result<()> {
        self.request_ack(add_address_request(index, &addr, prefix_len))
            .await
            .map_err(|e| e.with_context(format!("adding {addr}/{prefix_len}")))
    }

    pub async fn del_address(&self, index: u32, addr: IpAddr, prefix_len: u8) -> Result<()> {
        self.request_ack(del_address_request(index, &addr, prefix_len))
            .await
            .map_err(|e| e.with_context(format!("removing {addr}/{prefix_len}")))
    }
}

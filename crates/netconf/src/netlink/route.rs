//! Default route installation.

use std::net::IpAddr;

use super::builder::MessageBuilder;
use super::connection::{Connection, create_request};
use super::error::Result;
use super::message::NlMsgType;
use super::types::{AF_INET, AF_INET6, RtMsg, rt, rta};

/// Build an exclusive RTM_NEWROUTE request for
/// `default via <gateway> dev <ifindex>`.
///
/// The output device is always set; IPv6 link-local gateways are
/// rejected without one.
pub fn default_route_request(gateway: &IpAddr, ifindex: u32) -> MessageBuilder {
    let (family, octets) = match gateway {
        IpAddr::V4(v4) => (AF_INET, v4.octets().to_vec()),
        IpAddr::V6(v6) => (AF_INET6, v6.octets().to_vec()),
    };

    let mut builder = create_request(NlMsgType::RTM_NEWROUTE);
    builder.append(&RtMsg {
        rtm_family: family,
        rtm_dst_len: 0,
        rtm_table: rt::TABLE_MAIN,
        rtm_protocol: rt::PROT_BOOT,
        rtm_scope: rt::SCOPE_UNIVERSE,
        rtm_type: rt::TYPE_UNICAST,
        ..Default::default()
    });
    builder.append_attr(rta::GATEWAY, &octets);
    builder.append_attr_u32(rta::OIF, ifindex);
    builder
}

impl Connection {
    /// Add a default route via `gateway` out of `ifindex`. Fails with
    /// EEXIST when an identical route is already installed.
    pub async fn add_default_route(&self, gateway: IpAddr, ifindex: u32) -> Result<()> {
        self.request_ack(default_route_request(&gateway, ifindex))
            .await
            .map_err(|e| e.with_context(format!("adding default route via {gateway}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::attr::AttrIter;
    use crate::netlink::message::NLMSG_HDRLEN;

    #[test]
    fn test_ipv6_default_route() {
        let gw: IpAddr = "fe80::1".parse().unwrap();
        let msg = default_route_request(&gw, 3).finish();
        let payload = &msg[NLMSG_HDRLEN..];
        assert_eq!(payload[0], AF_INET6);
        assert_eq!(payload[1], 0, "default route has no destination prefix");

        let rtmsg_len = std::mem::size_of::<RtMsg>();
        let attrs: Vec<_> = AttrIter::new(&payload[rtmsg_len..]).collect();
        assert_eq!(attrs[0].0, rta::GATEWAY);
        assert_eq!(attrs[0].1.len(), 16);
        assert_eq!(attrs[1], (rta::OIF, &3u32.to_ne_bytes()[..]));
        assert!(attrs.iter().all(|(k, _)| *k != rta::DST));
    }

    #[test]
    fn test_ipv4_default_route() {
        let gw: IpAddr = "10.0.0.1".parse().unwrap();
        let msg = default_route_request(&gw, 2).finish();
        let payload = &msg[NLMSG_HDRLEN..];
        assert_eq!(payload[0], AF_INET);
        assert_eq!(payload[4], rt::TABLE_MAIN);

        let (_, data) = AttrIter::new(&payload[std::mem::size_of::<RtMsg>()..])
            .next()
            .unwrap();
        assert_eq!(data, &[10, 0, 0, 1]);
    }
}

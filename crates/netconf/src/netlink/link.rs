//! Link dump parsing and link create/set requests.
//!
//! Only the link kinds the reconciler materializes are supported: bridges
//! and 802.1Q VLANs. Bonds are driven through sysfs instead.

use super::attr::{AttrIter, get};
use super::builder::MessageBuilder;
use super::connection::{Connection, ack_request, create_request, dump_request};
use super::error::Result;
use super::message::NlMsgType;
use super::types::{IfInfoMsg, iff, ifla};

/// A link as reported by an RTM_GETLINK dump.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkMessage {
    pub index: u32,
    /// Device flags (IFF_*).
    pub flags: u32,
    pub name: Option<String>,
    pub mtu: Option<u32>,
    /// Hardware address, any length.
    pub address: Option<Vec<u8>>,
    /// Index of the master (bridge/bond) device.
    pub master: Option<u32>,
    /// IFLA_INFO_KIND; absent for physical and loopback devices.
    pub kind: Option<String>,
}

impl LinkMessage {
    /// Parse an RTM_NEWLINK payload (ifinfomsg + attributes).
    pub fn from_bytes(payload: &[u8]) -> Result<Self> {
        let info = IfInfoMsg::from_bytes(payload)?;
        let mut msg = LinkMessage {
            index: info.ifi_index as u32,
            flags: info.ifi_flags,
            ..Default::default()
        };

        for (kind, data) in AttrIter::new(&payload[IfInfoMsg::SIZE..]) {
            match kind {
                ifla::IFNAME => msg.name = Some(get::string(data)?.to_string()),
                ifla::MTU => msg.mtu = Some(get::u32_ne(data)?),
                ifla::ADDRESS => msg.address = Some(data.to_vec()),
                ifla::MASTER => msg.master = Some(get::u32_ne(data)?).filter(|&m| m != 0),
                ifla::LINKINFO => msg.kind = parse_link_kind(data)?,
                _ => {}
            }
        }

        Ok(msg)
    }

    pub fn is_up(&self) -> bool {
        self.flags & iff::UP != 0
    }
}

fn parse_link_kind(data: &[u8]) -> Result<Option<String>> {
    for (kind, value) in AttrIter::new(data) {
        if kind == ifla::INFO_KIND {
            return Ok(Some(get::string(value)?.to_string()));
        }
    }
    Ok(None)
}

/// Create the base RTM_NEWLINK message with ifinfomsg header and name.
fn create_link_message(name: &str) -> MessageBuilder {
    let mut builder = create_request(NlMsgType::RTM_NEWLINK);
    builder.append(&IfInfoMsg::new());
    builder.append_attr_str(ifla::IFNAME, name);
    builder
}

/// Build the request creating bridge `name`.
pub fn bridge_request(name: &str) -> MessageBuilder {
    let mut builder = create_link_message(name);
    let linkinfo = builder.nest_start(ifla::LINKINFO);
    builder.append_attr_str(ifla::INFO_KIND, "bridge");
    builder.nest_end(linkinfo);
    builder
}

/// Build the request creating VLAN `name` with tag `id` on top of `parent_index`.
pub fn vlan_request(name: &str, parent_index: u32, id: u16) -> MessageBuilder {
    let mut builder = create_link_message(name);
    builder.append_attr_u32(ifla::LINK, parent_index);

    let linkinfo = builder.nest_start(ifla::LINKINFO);
    builder.append_attr_str(ifla::INFO_KIND, "vlan");
    let data = builder.nest_start(ifla::INFO_DATA);
    builder.append_attr_u16(ifla::VLAN_ID, id);
    builder.nest_end(data);
    builder.nest_end(linkinfo);

    builder
}

fn setlink_request(index: u32) -> MessageBuilder {
    let mut builder = ack_request(NlMsgType::RTM_SETLINK);
    builder.append(&IfInfoMsg::new().with_index(index as i32));
    builder
}

impl Connection {
    /// Get all network interfaces.
    pub async fn get_links(&self) -> Result<Vec<LinkMessage>> {
        let mut builder = dump_request(NlMsgType::RTM_GETLINK);
        builder.append(&IfInfoMsg::new());

        self.dump(builder)
            .await?
            .iter()
            .map(|payload| LinkMessage::from_bytes(payload))
            .collect()
    }

    /// Create a bridge device.
    pub async fn add_bridge(&self, name: &str) -> Result<()> {
        self.request_ack(bridge_request(name))
            .await
            .map_err(|e| e.with_context(format!("creating bridge {name}")))
    }

    /// Create a VLAN device on top of `parent_index`.
    pub async fn add_vlan(&self, name: &str, parent_index: u32, id: u16) -> Result<()> {
        self.request_ack(vlan_request(name, parent_index, id))
            .await
            .map_err(|e| e.with_context(format!("creating vlan {name} (id {id})")))
    }

    /// Enslave `index` to the bridge/bond at `master_index`.
    pub async fn set_link_master(&self, index: u32, master_index: u32) -> Result<()> {
        let mut builder = setlink_request(index);
        builder.append_attr_u32(ifla::MASTER, master_index);
        self.request_ack(builder).await
    }

    /// Set the administrative state of a link.
    pub async fn set_link_state(&self, index: u32, up: bool) -> Result<()> {
        let mut ifinfo = IfInfoMsg::new().with_index(index as i32);
        ifinfo.ifi_flags = if up { iff::UP } else { 0 };
        ifinfo.ifi_change = iff::UP;

        let mut builder = ack_request(NlMsgType::RTM_SETLINK);
        builder.append(&ifinfo);
        self.request_ack(builder).await
    }

    pub async fn set_link_mtu(&self, index: u32, mtu: u32) -> Result<()> {
        let mut builder = setlink_request(index);
        builder.append_attr_u32(ifla::MTU, mtu);
        self.request_ack(builder).await
    }
}

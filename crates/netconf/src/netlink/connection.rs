//! Request/response handling over a [`NetlinkSocket`].

use super::builder::MessageBuilder;
use super::error::{Error, Result};
use super::message::{
    MessageIter, NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_EXCL, NLM_F_REQUEST, NlMsgError,
};
use super::socket::NetlinkSocket;

/// High-level rtnetlink connection.
///
/// One request is in flight at a time. Replies carrying a different
/// sequence number are dropped, so callers sharing a connection must
/// serialize their requests (see `LinuxSystem`).
pub struct Connection {
    socket: NetlinkSocket,
}

impl Connection {
    /// Open a NETLINK_ROUTE connection.
    pub fn new() -> Result<Self> {
        Ok(Self {
            socket: NetlinkSocket::new()?,
        })
    }

    /// Send a request that expects an ACK only (no data response).
    pub async fn request_ack(&self, mut builder: MessageBuilder) -> Result<()> {
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());

        let msg = builder.finish();
        self.socket.send(&msg).await?;

        loop {
            let response = self.socket.recv_msg().await?;
            if let Some(result) = process_ack(&response, seq)? {
                return result;
            }
        }
    }

    /// Send a dump request and collect the payload of every reply message.
    ///
    /// Each returned buffer starts at the family header (ifinfomsg,
    /// ifaddrmsg, ...), the netlink header is already stripped.
    pub async fn dump(&self, mut builder: MessageBuilder) -> Result<Vec<Vec<u8>>> {
        let seq = self.socket.next_seq();
        builder.set_seq(seq);
        builder.set_pid(self.socket.pid());

        let msg = builder.finish();
        self.socket.send(&msg).await?;

        let mut payloads = Vec::new();

        loop {
            let data = self.socket.recv_msg().await?;
            if collect_dump(&data, seq, &mut payloads)? {
                break;
            }
        }

        Ok(payloads)
    }
}

/// Scan a datagram for the ACK matching `seq`.
///
/// Returns `Ok(None)` when the datagram carried nothing for this request.
fn process_ack(data: &[u8], seq: u32) -> Result<Option<Result<()>>> {
    for result in MessageIter::new(data) {
        let (header, payload) = result?;

        if header.nlmsg_seq != seq {
            continue;
        }

        if header.is_error() {
            let err = NlMsgError::from_bytes(payload)?;
            if !err.is_ack() {
                return Ok(Some(Err(Error::from_errno(err.error))));
            }
            return Ok(Some(Ok(())));
        }
    }

    Ok(None)
}

/// Append dump replies for `seq` to `out`; returns true once NLMSG_DONE is seen.
fn collect_dump(data: &[u8], seq: u32, out: &mut Vec<Vec<u8>>) -> Result<bool> {
    for result in MessageIter::new(data) {
        let (header, payload) = result?;

        if header.nlmsg_seq != seq {
            continue;
        }

        if header.is_error() {
            let err = NlMsgError::from_bytes(payload)?;
            if !err.is_ack() {
                return Err(Error::from_errno(err.error));
            }
            continue;
        }

        if header.is_done() {
            return Ok(true);
        }

        out.push(payload.to_vec());
    }

    Ok(false)
}

/// Helper to build a dump request.
pub fn dump_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_DUMP)
}

/// Helper to build a request expecting ACK.
pub fn ack_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(msg_type, NLM_F_REQUEST | NLM_F_ACK)
}

/// Helper to build an exclusive create request; the kernel answers EEXIST
/// when the object is already present.
pub fn create_request(msg_type: u16) -> MessageBuilder {
    MessageBuilder::new(
        msg_type,
        NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
    )
}

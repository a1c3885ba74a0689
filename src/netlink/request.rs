//! Request/response engine (C5): sequence allocation, send, streamed
//! dump replies, and the idempotent `ensure` verb.

use crate::netlink::error::{Error, Result};
use crate::netlink::marshal::{Marshal, MessageClass, NlMsg};
use crate::netlink::messages::{NlMsgHeader, NLMSG_DONE, NLM_F_MULTI};
use crate::netlink::socket::NetlinkSocket;
use crate::netlink::wire::Header;
use std::cell::RefCell;
use std::rc::Rc;

/// 16-bit wrapping sequence-number pool. `0xFF` is reserved (matches the
/// source's habit of keeping low sequence numbers free for bootstrap
/// traffic); callers otherwise see an even spread across the 16-bit space.
pub struct SequencePool {
    next: u16,
}

impl Default for SequencePool {
    fn default() -> Self {
        SequencePool { next: 1 }
    }
}

impl SequencePool {
    const RESERVED: u16 = 0xFF;

    pub fn allocate(&mut self) -> u32 {
        loop {
            let seq = self.next;
            self.next = self.next.wrapping_add(1);
            if seq != Self::RESERVED && seq != 0 {
                return seq as u32;
            }
        }
    }
}

/// A single outbound netlink message under construction.
pub struct Request {
    msg_type: u16,
    flags: u16,
    body: Vec<u8>,
}

impl Request {
    pub fn new(msg_type: u16, flags: u16) -> Self {
        Request { msg_type, flags, body: Vec::new() }
    }

    pub fn header<H: Header>(mut self, header: &H) -> Self {
        header.encode(&mut self.body);
        self
    }

    pub fn attrs(mut self, attrs: &[u8]) -> Self {
        self.body.extend_from_slice(attrs);
        self
    }

    fn encode(&self, seq: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        let header = NlMsgHeader {
            len: (16 + self.body.len()) as u32,
            kind: self.msg_type,
            flags: self.flags,
            seq,
            pid: 0,
        };
        header.encode(&mut buf);
        buf.extend_from_slice(&self.body);
        buf
    }
}

/// Sends `request`, awaits exactly one reply, raises on a non-zero error
/// header unless `noraise`.
pub async fn call(
    socket: &Rc<RefCell<NetlinkSocket>>,
    request: Request,
    noraise: bool,
) -> Result<NlMsg> {
    let seq = socket.borrow_mut().allocate_seq();
    let encoded = request.encode(seq);
    let marshal = socket.borrow().marshal.clone();

    let result = async {
        socket.borrow_mut().send(seq, &encoded).await?;
        let raw = socket.borrow_mut().get_one(seq).await?;
        let raw = raw.ok_or_else(|| Error::Timeout(format!("no reply for seq {seq}")))?;
        let msg = decode_reply(&raw, &marshal)?;
        if let Some(err) = &msg.error {
            if !noraise && err.errno() != Some(0) {
                return Err(clone_err(err));
            }
        }
        Ok(msg)
    }
    .await;

    socket.borrow_mut().free_tag(seq);
    result
}

/// Streams a dump: sends `request` (which must carry `NLM_F_DUMP`),
/// accumulates replies until a bare `NLMSG_DONE`, raising
/// [`Error::DumpInterrupted`] if `NLM_F_DUMP_INTR` was set on it.
pub async fn dump(socket: &Rc<RefCell<NetlinkSocket>>, request: Request) -> Result<Vec<NlMsg>> {
    let seq = socket.borrow_mut().allocate_seq();
    let encoded = request.encode(seq);
    let marshal = socket.borrow().marshal.clone();

    let result = async {
        socket.borrow_mut().send(seq, &encoded).await?;
        let mut items = Vec::new();
        loop {
            let raw = socket.borrow_mut().get_one(seq).await?;
            let Some(raw) = raw else { break };
            let msg = decode_reply(&raw, &marshal)?;
            if msg.done {
                if let Some(err) = &msg.error {
                    return Err(clone_err(err));
                }
                break;
            }
            if let Some(err) = &msg.error {
                return Err(clone_err(err));
            }
            let is_multi = msg.header.flags & NLM_F_MULTI != 0;
            items.push(msg);
            if !is_multi {
                break;
            }
        }
        Ok(items)
    }
    .await;

    socket.borrow_mut().free_tag(seq);
    result
}

/// Decodes a single already-dequeued reply frame. Duplicates
/// `Marshal::decode_one`'s three-way split (error/done/plain) rather than
/// calling it directly because this path never sees concatenated buffers —
/// `NetlinkSocket::route_frame` already split and re-queued by sequence — but
/// it still resolves a [`MessageClass`] from the same policy map so the
/// request/response path and the broadcast-dispatch path agree on it.
fn decode_reply(raw: &[u8], marshal: &Marshal) -> Result<NlMsg> {
    let header = NlMsgHeader::decode(raw)?;
    let body = raw[16..].to_vec();
    let class = marshal.class_for(header.kind).unwrap_or(MessageClass::DEFAULT);
    if header.kind == crate::netlink::messages::NLMSG_ERROR {
        let code = if body.len() >= 4 { i32::from_ne_bytes(body[0..4].try_into().unwrap()) } else { -1 };
        let error = if code == 0 {
            Some(Error::from_errno(0, "ACK"))
        } else {
            Some(Error::from_errno(-code, "netlink error"))
        };
        return Ok(NlMsg { header, body, error, done: false, class });
    }
    if header.kind == NLMSG_DONE {
        let intr = header.flags & crate::netlink::messages::NLM_F_DUMP_INTR != 0;
        let error = if intr { Some(Error::DumpInterrupted) } else { None };
        return Ok(NlMsg { header, body, error, done: true, class });
    }
    Ok(NlMsg { header, body, error: None, done: false, class })
}

fn clone_err(err: &Error) -> Error {
    match err {
        Error::Netlink { code, msg } => Error::Netlink { code: *code, msg: msg.clone() },
        Error::DumpInterrupted => Error::DumpInterrupted,
        Error::Timeout(s) => Error::Timeout(s.clone()),
        Error::Resource(s) => Error::Resource(s.clone()),
        Error::Decode(d) => Error::Decode(d.clone()),
        Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
    }
}

/// Idempotent `ensure(op, present, spec)`: queries current state via `get`,
/// calls `add` if `present` and missing, `del` if not `present` and found.
pub async fn ensure<T, F, G, H>(present: bool, get: F, add: G, del: H) -> Result<()>
where
    T: Send,
    F: std::future::Future<Output = Result<Option<T>>>,
    G: std::future::Future<Output = Result<()>>,
    H: std::future::Future<Output = Result<()>>,
{
    let found = get.await?;
    match (present, found.is_some()) {
        (true, false) => add.await,
        (false, true) => del.await,
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_pool_skips_reserved_and_zero() {
        let mut pool = SequencePool::default();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            let seq = pool.allocate();
            assert_ne!(seq, 0);
            assert_ne!(seq, 0xFF);
            seen.insert(seq);
        }
        assert!(seen.len() > 400);
    }
}

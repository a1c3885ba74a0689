//! Frame-level parser (C2): splits a byte buffer into messages and attaches
//! decode/netlink errors without aborting the rest of the buffer.

use crate::netlink::error::Error;
use crate::netlink::messages::{NlMsgHeader, NLMSG_DONE, NLMSG_ERROR, NLM_F_DUMP_INTR};
use crate::netlink::wire::Header;
use std::collections::HashMap;
use std::sync::Mutex;

/// A decoded message: header, raw body, and an attached error if this frame
/// was (or encapsulated) an `NLMSG_ERROR`.
#[derive(Debug, Clone)]
pub struct NlMsg {
    pub header: NlMsgHeader,
    pub body: Vec<u8>,
    pub error: Option<Error>,
    pub done: bool,
    pub class: MessageClass,
}

impl NlMsg {
    pub fn is_multi(&self) -> bool {
        self.header.flags & crate::netlink::messages::NLM_F_MULTI != 0
    }
}

/// What a callback may do with a yielded message.
pub enum CallbackAction {
    Keep,
    Suppress,
}

pub type Callback<'a> = dyn FnMut(&NlMsg) -> CallbackAction + 'a;

/// Per-type message classes the marshal dispatches a decoded body to. Only a
/// tag is kept here; `netlink::request`/`rtnl::*` own the actual typed
/// decode, the marshal's job stops at framing + error attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageClass(pub u16);

impl MessageClass {
    /// The class attached to a message whose type has no registered policy.
    pub const DEFAULT: MessageClass = MessageClass(0);
}

/// Stateless across calls except for the mutable type->class policy
/// registry, protected by a single lock per spec.md §5's shared-resource
/// policy.
#[derive(Default)]
pub struct Marshal {
    policy: Mutex<HashMap<u16, MessageClass>>,
}

impl Marshal {
    pub fn new() -> Self {
        Marshal { policy: Mutex::new(HashMap::new()) }
    }

    pub fn register_policy(&self, msg_type: u16, class: MessageClass) {
        self.policy.lock().unwrap().insert(msg_type, class);
    }

    pub fn unregister_policy(&self, msg_type: u16) {
        self.policy.lock().unwrap().remove(&msg_type);
    }

    pub fn class_for(&self, msg_type: u16) -> Option<MessageClass> {
        self.policy.lock().unwrap().get(&msg_type).copied()
    }

    /// Parses `buf` into messages, optionally filtering by `seq` and letting
    /// `callback` suppress individual messages. A panic inside `callback`
    /// is not caught here (callbacks in this crate are plain closures, not
    /// foreign code); the source's "exceptions are swallowed" policy is
    /// realized one layer up, in `netlink::socket`, where callbacks run
    /// against `catch_unwind`-wrapped user code.
    pub fn parse(
        &self,
        buf: &[u8],
        seq_filter: Option<u32>,
        mut callback: Option<&mut Callback<'_>>,
    ) -> Vec<NlMsg> {
        let mut out = Vec::new();
        let mut offset = 0usize;

        while offset + 16 <= buf.len() {
            let header = match NlMsgHeader::decode(&buf[offset..]) {
                Ok(h) => h,
                Err(_) => break,
            };
            let length = header.len as usize;
            if length == 0 || length > buf.len() - offset {
                break;
            }

            if let Some(seq) = seq_filter {
                if header.seq != seq {
                    offset += length;
                    continue;
                }
            }

            let body = buf[offset + 16..offset + length].to_vec();
            let mut msg = self.decode_one(header, body);

            if let Some(cb) = callback.as_deref_mut() {
                if let CallbackAction::Suppress = cb(&msg) {
                    offset += length;
                    continue;
                }
            }

            if msg.done {
                out.push(msg);
                offset += length;
                continue;
            }
            msg.done = false;
            out.push(msg);
            offset += length;
        }

        out
    }

    fn decode_one(&self, header: NlMsgHeader, body: Vec<u8>) -> NlMsg {
        let class = self.class_for(header.kind).unwrap_or(MessageClass::DEFAULT);
        if header.kind == NLMSG_ERROR {
            let (error, leftover) = decode_nlmsgerr(&body);
            return NlMsg { header, body: leftover, error: Some(error), done: false, class };
        }
        if header.kind == NLMSG_DONE {
            let intr = header.flags & NLM_F_DUMP_INTR != 0;
            let error = if intr { Some(Error::DumpInterrupted) } else { None };
            return NlMsg { header, body, error, done: true, class };
        }
        NlMsg { header, body, error: None, done: false, class }
    }
}

/// `nlmsgerr` body: `{error: i32, msg: nlmsghdr}` plus, for extended ACKs,
/// TLV children including `NLMSGERR_ATTR_MSG` (a human string).
fn decode_nlmsgerr(body: &[u8]) -> (Error, Vec<u8>) {
    if body.len() < 4 {
        return (Error::from_errno(libc::EINVAL, "truncated nlmsgerr"), Vec::new());
    }
    let code = i32::from_ne_bytes(body[0..4].try_into().unwrap());
    if code == 0 {
        return (Error::from_errno(0, "ACK"), body[4..].to_vec());
    }
    // Skip the echoed request header (16 bytes) if present, then look for
    // NLMSGERR_ATTR_MSG (type 1) among any extended-ack attributes.
    let mut msg = errno_name(-code).to_string();
    if body.len() > 4 + 16 {
        let attrs_start = 4 + 16;
        for nla in crate::netlink::wire::NlaIter::new(&body[attrs_start..]) {
            const NLMSGERR_ATTR_MSG: u16 = 1;
            if nla.kind == NLMSGERR_ATTR_MSG {
                if let Ok(text) = std::str::from_utf8(nla.payload) {
                    msg = text.trim_end_matches('\0').to_string();
                }
            }
        }
    }
    (Error::from_errno(-code, msg), body[4..].to_vec())
}

fn errno_name(code: i32) -> &'static str {
    match code {
        libc::EEXIST => "File exists",
        libc::ENOENT => "No such file or directory",
        libc::EINVAL => "Invalid argument",
        libc::EPERM => "Operation not permitted",
        libc::EBUSY => "Device or resource busy",
        _ => "Unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::messages::{NLM_F_MULTI, NLM_F_REQUEST};

    fn encode_msg(kind: u16, flags: u16, seq: u32, body: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        let header = NlMsgHeader { len: (16 + body.len()) as u32, kind, flags, seq, pid: 0 };
        header.encode(&mut buf);
        buf.extend_from_slice(body);
        buf
    }

    #[test]
    fn parses_two_concatenated_messages_in_order() {
        let marshal = Marshal::new();
        let mut buf = encode_msg(100, NLM_F_REQUEST, 1, b"aaaa");
        buf.extend(encode_msg(100, NLM_F_REQUEST, 2, b"bb"));
        let msgs = marshal.parse(&buf, None, None);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].header.seq, 1);
        assert_eq!(msgs[1].header.seq, 2);
    }

    #[test]
    fn stops_on_truncated_length() {
        let marshal = Marshal::new();
        let mut header_bytes = Vec::new();
        let header = NlMsgHeader { len: 9999, kind: 1, flags: 0, seq: 0, pid: 0 };
        header.encode(&mut header_bytes);
        let msgs = marshal.parse(&header_bytes, None, None);
        assert!(msgs.is_empty());
    }

    #[test]
    fn nlmsg_error_zero_is_ack() {
        let marshal = Marshal::new();
        let buf = encode_msg(NLMSG_ERROR, 0, 5, &0i32.to_ne_bytes());
        let msgs = marshal.parse(&buf, None, None);
        assert_eq!(msgs[0].error.as_ref().unwrap().errno(), Some(0));
    }

    #[test]
    fn nlmsg_error_nonzero_is_failure() {
        let marshal = Marshal::new();
        let errno = -(libc::ENOENT);
        let buf = encode_msg(NLMSG_ERROR, 0, 5, &errno.to_ne_bytes());
        let msgs = marshal.parse(&buf, None, None);
        assert_eq!(msgs[0].error.as_ref().unwrap().errno(), Some(libc::ENOENT));
    }

    #[test]
    fn dump_intr_flagged() {
        let marshal = Marshal::new();
        let buf = encode_msg(NLMSG_DONE, NLM_F_MULTI | NLM_F_DUMP_INTR, 5, &[]);
        let msgs = marshal.parse(&buf, None, None);
        assert!(matches!(msgs[0].error, Some(Error::DumpInterrupted)));
    }

    #[test]
    fn seq_filter_skips_mismatched() {
        let marshal = Marshal::new();
        let mut buf = encode_msg(100, 0, 1, b"a");
        buf.extend(encode_msg(100, 0, 2, b"b"));
        let msgs = marshal.parse(&buf, Some(2), None);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].header.seq, 2);
    }
}

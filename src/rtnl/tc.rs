//! Typed `tc` (qdisc) verbs.

use crate::netlink::error::Result;
use crate::netlink::messages::tc::{TcAttrs, TcMsg, TC_H_ROOT};
use crate::netlink::messages::{NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_REQUEST, RTM_DELQDISC, RTM_GETQDISC, RTM_NEWQDISC};
use crate::netlink::request::{self, Request};
use crate::netlink::socket::NetlinkSocket;
use crate::netlink::wire::{Header, NlaSet};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Qdisc {
    pub index: i32,
    pub handle: u32,
    pub kind: Option<String>,
}

pub async fn dump(socket: &Rc<RefCell<NetlinkSocket>>) -> Result<Vec<Qdisc>> {
    let req = Request::new(RTM_GETQDISC, NLM_F_REQUEST | NLM_F_DUMP).header(&TcMsg::default());
    let msgs = request::dump(socket, req).await?;
    let mut out = Vec::new();
    for msg in msgs {
        let header = TcMsg::decode(&msg.body)?;
        let attrs = TcAttrs::decode_attrs(&msg.body[TcMsg::LEN..]);
        out.push(Qdisc { index: header.index, handle: header.handle, kind: attrs.kind });
    }
    Ok(out)
}

pub async fn add(socket: &Rc<RefCell<NetlinkSocket>>, index: i32, kind: &str) -> Result<()> {
    let header = TcMsg { family: 0, index, handle: 0, parent: TC_H_ROOT, info: 0 };
    let attrs = TcAttrs { kind: Some(kind.to_string()), ..Default::default() };
    let mut attr_buf = Vec::new();
    attrs.encode_attrs(&mut attr_buf);
    let req = Request::new(RTM_NEWQDISC, NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE)
        .header(&header)
        .attrs(&attr_buf);
    let msg = request::call(socket, req, false).await?;
    if let Some(err) = msg.error {
        if err.errno() != Some(0) {
            return Err(err);
        }
    }
    Ok(())
}

pub async fn del(socket: &Rc<RefCell<NetlinkSocket>>, index: i32, handle: u32) -> Result<()> {
    let header = TcMsg { family: 0, index, handle, parent: TC_H_ROOT, info: 0 };
    let req = Request::new(RTM_DELQDISC, NLM_F_REQUEST | NLM_F_ACK).header(&header);
    let msg = request::call(socket, req, false).await?;
    if let Some(err) = msg.error {
        if err.errno() != Some(0) {
            return Err(err);
        }
    }
    Ok(())
}

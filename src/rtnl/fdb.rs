//! Bridge forwarding-database verbs. Rides `RTM_{NEW,DEL,GET}NEIGH` with
//! `family = AF_BRIDGE`, per `netlink::messages::fdb`.

use crate::netlink::error::Result;
use crate::netlink::messages::fdb::{FdbAttrs, NdMsg, NTF_SELF};
use crate::netlink::messages::{NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_REQUEST, RTM_DELNEIGH, RTM_GETNEIGH, RTM_NEWNEIGH};
use crate::netlink::request::{self, Request};
use crate::netlink::socket::NetlinkSocket;
use crate::netlink::wire::{Header, NlaSet};
use std::cell::RefCell;
use std::rc::Rc;

pub const AF_BRIDGE: u8 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FdbEntry {
    pub index: i32,
    pub lladdr: Option<[u8; 6]>,
}

pub async fn dump(socket: &Rc<RefCell<NetlinkSocket>>) -> Result<Vec<FdbEntry>> {
    let header = NdMsg { family: AF_BRIDGE, ..Default::default() };
    let req = Request::new(RTM_GETNEIGH, NLM_F_REQUEST | NLM_F_DUMP).header(&header);
    let msgs = request::dump(socket, req).await?;
    let mut out = Vec::new();
    for msg in msgs {
        let header = NdMsg::decode(&msg.body)?;
        let attrs = FdbAttrs::decode_attrs(&msg.body[NdMsg::LEN..]);
        out.push(FdbEntry { index: header.index, lladdr: attrs.lladdr });
    }
    Ok(out)
}

pub async fn add(socket: &Rc<RefCell<NetlinkSocket>>, index: i32, lladdr: [u8; 6]) -> Result<()> {
    let header = NdMsg { family: AF_BRIDGE, index, state: 0, flags: NTF_SELF, kind: 0 };
    let attrs = FdbAttrs { lladdr: Some(lladdr), dst: None, ..Default::default() };
    let mut attr_buf = Vec::new();
    attrs.encode_attrs(&mut attr_buf);
    let req = Request::new(RTM_NEWNEIGH, NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE)
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

pub async fn del(socket: &Rc<RefCell<NetlinkSocket>>, index: i32, lladdr: [u8; 6]) -> Result<()> {
    let header = NdMsg { family: AF_BRIDGE, index, state: 0, flags: NTF_SELF, kind: 0 };
    let attrs = FdbAttrs { lladdr: Some(lladdr), dst: None, ..Default::default() };
    let mut attr_buf = Vec::new();
    attrs.encode_attrs(&mut attr_buf);
    let req = Request::new(RTM_DELNEIGH, NLM_F_REQUEST | NLM_F_ACK).header(&header).attrs(&attr_buf);
    let msg = request::call(socket, req, false).await?;
    if let Some(err) = msg.error {
        if err.errno() != Some(0) {
            return Err(err);
        }
    }
    Ok(())
}

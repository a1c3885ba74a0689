//! Typed `neigh` verbs (ARP/neighbour table entries).

use crate::netlink::error::Result;
use crate::netlink::messages::neigh::{NdMsg, NeighAttrs, NUD_PERMANENT};
use crate::netlink::messages::{NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_REQUEST, RTM_DELNEIGH, RTM_GETNEIGH, RTM_NEWNEIGH};
use crate::netlink::request::{self, Request};
use crate::netlink::socket::NetlinkSocket;
use crate::netlink::wire::{Header, NlaSet};
use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neigh {
    pub index: i32,
    pub dst: Option<Ipv4Addr>,
    pub lladdr: Option<[u8; 6]>,
    pub state: u16,
}

pub async fn dump(socket: &Rc<RefCell<NetlinkSocket>>) -> Result<Vec<Neigh>> {
    let req = Request::new(RTM_GETNEIGH, NLM_F_REQUEST | NLM_F_DUMP).header(&NdMsg::default());
    let msgs = request::dump(socket, req).await?;
    let mut out = Vec::new();
    for msg in msgs {
        let header = NdMsg::decode(&msg.body)?;
        let attrs = NeighAttrs::decode_attrs(&msg.body[NdMsg::LEN..]);
        out.push(Neigh { index: header.index, dst: attrs.dst, lladdr: attrs.lladdr, state: header.state });
    }
    Ok(out)
}

pub async fn add(socket: &Rc<RefCell<NetlinkSocket>>, index: i32, dst: Ipv4Addr, lladdr: [u8; 6]) -> Result<()> {
    let header = NdMsg { family: libc::AF_INET as u8, index, state: NUD_PERMANENT, flags: 0, kind: 0 };
    let attrs = NeighAttrs { dst: Some(dst), lladdr: Some(lladdr), ..Default::default() };
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

pub async fn del(socket: &Rc<RefCell<NetlinkSocket>>, index: i32, dst: Ipv4Addr) -> Result<()> {
    let header = NdMsg { family: libc::AF_INET as u8, index, state: 0, flags: 0, kind: 0 };
    let attrs = NeighAttrs { dst: Some(dst), lladdr: None, ..Default::default() };
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

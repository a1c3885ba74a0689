//! Typed `addr` verbs (`ip addr ...` equivalent).

use crate::netlink::error::Result;
use crate::netlink::messages::addr::{AddrAttrs, IfaddrMsg};
use crate::netlink::messages::{NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_REQUEST, RTM_DELADDR, RTM_GETADDR, RTM_NEWADDR};
use crate::netlink::request::{self, Request};
use crate::netlink::socket::NetlinkSocket;
use crate::netlink::wire::{Header, NlaSet};
use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addr {
    pub index: u32,
    pub address: Ipv4Addr,
    pub prefixlen: u8,
}

pub async fn dump(socket: &Rc<RefCell<NetlinkSocket>>) -> Result<Vec<Addr>> {
    let req = Request::new(RTM_GETADDR, NLM_F_REQUEST | NLM_F_DUMP).header(&IfaddrMsg::default());
    let msgs = request::dump(socket, req).await?;
    let mut out = Vec::new();
    for msg in msgs {
        let header = IfaddrMsg::decode(&msg.body)?;
        let attrs = AddrAttrs::decode_attrs(&msg.body[IfaddrMsg::LEN..]);
        let address = attrs.address.or(attrs.local).unwrap_or(Ipv4Addr::UNSPECIFIED);
        out.push(Addr { index: header.index, address, prefixlen: header.prefixlen });
    }
    Ok(out)
}

pub async fn dump_on(socket: &Rc<RefCell<NetlinkSocket>>, index: u32) -> Result<Vec<Addr>> {
    Ok(dump(socket).await?.into_iter().filter(|a| a.index == index).collect())
}

pub async fn add(socket: &Rc<RefCell<NetlinkSocket>>, index: u32, address: Ipv4Addr, prefixlen: u8) -> Result<()> {
    let header = IfaddrMsg { family: libc::AF_INET as u8, prefixlen, flags: 0, scope: 0, index };
    let attrs = AddrAttrs { address: Some(address), local: Some(address), ..Default::default() };
    let mut attr_buf = Vec::new();
    attrs.encode_attrs(&mut attr_buf);
    let req = Request::new(RTM_NEWADDR, NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE)
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

pub async fn del(socket: &Rc<RefCell<NetlinkSocket>>, index: u32, address: Ipv4Addr, prefixlen: u8) -> Result<()> {
    let header = IfaddrMsg { family: libc::AF_INET as u8, prefixlen, flags: 0, scope: 0, index };
    let attrs = AddrAttrs { address: Some(address), ..Default::default() };
    let mut attr_buf = Vec::new();
    attrs.encode_attrs(&mut attr_buf);
    let req = Request::new(RTM_DELADDR, NLM_F_REQUEST | NLM_F_ACK).header(&header).attrs(&attr_buf);
    let msg = request::call(socket, req, false).await?;
    if let Some(err) = msg.error {
        if err.errno() != Some(0) {
            return Err(err);
        }
    }
    Ok(())
}

//! Typed `route` verbs (`ip route ...` equivalent).

use crate::netlink::error::Result;
use crate::netlink::messages::route::{RouteAttrs, RtMsg, RTN_UNICAST, RTPROT_BOOT, RT_SCOPE_UNIVERSE, RT_TABLE_MAIN};
use crate::netlink::messages::{NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_REPLACE, NLM_F_REQUEST, RTM_DELROUTE, RTM_GETROUTE, RTM_NEWROUTE};
use crate::netlink::request::{self, Request};
use crate::netlink::socket::NetlinkSocket;
use crate::netlink::wire::{Header, NlaSet};
use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub dst: Option<Ipv4Addr>,
    pub dst_len: u8,
    pub gateway: Option<Ipv4Addr>,
    pub oif: Option<u32>,
}

pub async fn dump(socket: &Rc<RefCell<NetlinkSocket>>) -> Result<Vec<Route>> {
    let req = Request::new(RTM_GETROUTE, NLM_F_REQUEST | NLM_F_DUMP).header(&RtMsg::default());
    let msgs = request::dump(socket, req).await?;
    let mut out = Vec::new();
    for msg in msgs {
        let header = RtMsg::decode(&msg.body)?;
        let attrs = RouteAttrs::decode_attrs(&msg.body[RtMsg::LEN..]);
        out.push(Route { dst: attrs.dst, dst_len: header.dst_len, gateway: attrs.gateway, oif: attrs.oif });
    }
    Ok(out)
}

fn build_header() -> RtMsg {
    RtMsg {
        family: libc::AF_INET as u8,
        dst_len: 0,
        src_len: 0,
        tos: 0,
        table: RT_TABLE_MAIN,
        protocol: RTPROT_BOOT,
        scope: RT_SCOPE_UNIVERSE,
        kind: RTN_UNICAST,
        flags: 0,
    }
}

pub async fn add(socket: &Rc<RefCell<NetlinkSocket>>, dst: Option<(Ipv4Addr, u8)>, gateway: Option<Ipv4Addr>, oif: u32) -> Result<()> {
    send(socket, dst, gateway, oif, NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE, RTM_NEWROUTE).await
}

pub async fn replace(socket: &Rc<RefCell<NetlinkSocket>>, dst: Option<(Ipv4Addr, u8)>, gateway: Option<Ipv4Addr>, oif: u32) -> Result<()> {
    send(socket, dst, gateway, oif, NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_REPLACE, RTM_NEWROUTE).await
}

pub async fn del(socket: &Rc<RefCell<NetlinkSocket>>, dst: Option<(Ipv4Addr, u8)>, oif: u32) -> Result<()> {
    send(socket, dst, None, oif, NLM_F_REQUEST | NLM_F_ACK, RTM_DELROUTE).await
}

async fn send(
    socket: &Rc<RefCell<NetlinkSocket>>,
    dst: Option<(Ipv4Addr, u8)>,
    gateway: Option<Ipv4Addr>,
    oif: u32,
    flags: u16,
    msg_type: u16,
) -> Result<()> {
    let mut header = build_header();
    if let Some((_, len)) = dst {
        header.dst_len = len;
    }
    let attrs = RouteAttrs { dst: dst.map(|(a, _)| a), gateway, oif: Some(oif), ..Default::default() };
    let mut attr_buf = Vec::new();
    attrs.encode_attrs(&mut attr_buf);
    let req = Request::new(msg_type, flags).header(&header).attrs(&attr_buf);
    let msg = request::call(socket, req, false).await?;
    if let Some(err) = msg.error {
        if err.errno() != Some(0) {
            return Err(err);
        }
    }
    Ok(())
}

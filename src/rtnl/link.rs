//! Typed `link` verbs (`ip link ...` equivalent).

use crate::netlink::error::Result;
use crate::netlink::messages::link::{IfinfoMsg, LinkAttrs, IFLA_INFO_KIND, IFLA_LINKINFO};
use crate::netlink::messages::{
    NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_EXCL, NLM_F_REQUEST, RTM_DELLINK, RTM_GETLINK,
    RTM_NEWLINK,
};
use crate::netlink::request::{self, Request};
use crate::netlink::socket::NetlinkSocket;
use crate::netlink::wire::{NlaSet, Header};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub index: i32,
    pub ifname: String,
    pub kind: Option<String>,
    pub flags: u32,
}

fn decode(header: IfinfoMsg, body: &[u8]) -> Link {
    let attrs = LinkAttrs::decode_attrs(body);
    let kind = crate::netlink::wire::NlaIter::new(body)
        .find(|n| n.kind == IFLA_LINKINFO)
        .and_then(|li| crate::netlink::wire::NlaIter::new(li.payload).find(|n| n.kind == IFLA_INFO_KIND))
        .map(|n| String::from_utf8_lossy(n.payload).trim_end_matches('\0').to_string());
    Link { index: header.index, ifname: attrs.ifname.unwrap_or_default(), kind, flags: header.flags }
}

pub async fn dump(socket: &Rc<RefCell<NetlinkSocket>>) -> Result<Vec<Link>> {
    let req = Request::new(RTM_GETLINK, NLM_F_REQUEST | NLM_F_DUMP).header(&IfinfoMsg::default());
    let msgs = request::dump(socket, req).await?;
    let mut out = Vec::new();
    for msg in msgs {
        let header = IfinfoMsg::decode(&msg.body)?;
        out.push(decode(header, &msg.body[IfinfoMsg::LEN..]));
    }
    Ok(out)
}

pub async fn get(socket: &Rc<RefCell<NetlinkSocket>>, ifname: &str) -> Result<Option<Link>> {
    Ok(dump(socket).await?.into_iter().find(|l| l.ifname == ifname))
}

fn encode_linkinfo(kind: &str) -> Vec<u8> {
    let mut nested = Vec::new();
    crate::netlink::wire::encode_nla(IFLA_INFO_KIND, kind.as_bytes(), &mut nested);
    let mut buf = Vec::new();
    crate::netlink::wire::encode_nla(IFLA_LINKINFO, &nested, &mut buf);
    buf
}

pub async fn add(socket: &Rc<RefCell<NetlinkSocket>>, ifname: &str, kind: &str) -> Result<()> {
    let attrs = LinkAttrs { ifname: Some(ifname.to_string()), ..Default::default() };
    let mut attr_buf = Vec::new();
    attrs.encode_attrs(&mut attr_buf);
    if !kind.is_empty() {
        attr_buf.extend_from_slice(&encode_linkinfo(kind));
    }
    let req = Request::new(RTM_NEWLINK, NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL)
        .header(&IfinfoMsg::default())
        .attrs(&attr_buf);
    let msg = request::call(socket, req, false).await?;
    if let Some(err) = msg.error {
        if err.errno() != Some(0) {
            return Err(err);
        }
    }
    Ok(())
}

pub async fn del(socket: &Rc<RefCell<NetlinkSocket>>, ifname: &str) -> Result<()> {
    let attrs = LinkAttrs { ifname: Some(ifname.to_string()), ..Default::default() };
    let mut attr_buf = Vec::new();
    attrs.encode_attrs(&mut attr_buf);
    let req = Request::new(RTM_DELLINK, NLM_F_REQUEST | NLM_F_ACK)
        .header(&IfinfoMsg::default())
        .attrs(&attr_buf);
    let msg = request::call(socket, req, false).await?;
    if let Some(err) = msg.error {
        if err.errno() != Some(0) {
            return Err(err);
        }
    }
    Ok(())
}

/// `add` if not present, `del` if present and not wanted.
pub async fn ensure(socket: &Rc<RefCell<NetlinkSocket>>, ifname: &str, kind: &str, present: bool) -> Result<()> {
    let found = get(socket, ifname).await?;
    match (present, found.is_some()) {
        (true, false) => add(socket, ifname, kind).await,
        (false, true) => del(socket, ifname).await,
        _ => Ok(()),
    }
}


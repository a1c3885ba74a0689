//! IPSet management over `NETLINK_NETFILTER`.

use crate::netlink::error::Result;
use crate::netlink::messages::ipset::{
    self, IpsetAttrs, IpsetDataAttrs, NfGenMsg, IPSET_ATTR_DATA, IPSET_CMD_ADD, IPSET_CMD_CREATE,
    IPSET_CMD_DEL, IPSET_CMD_DESTROY, IPSET_CMD_LIST,
};
use crate::netlink::request::{self, Request};
use crate::netlink::socket::NetlinkSocket;
use crate::netlink::wire::{encode_nla, Header, NlaSet};
use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

/// Surfaces `IPSetError.error_map` through the generic netlink error —
/// `errno()` carries the raw ipset code, `error_text` the human message.
#[derive(Debug, thiserror::Error)]
#[error("ipset error {code}: {}", ipset::error_text(*.0).unwrap_or("unknown"))]
pub struct Error(pub i32);

/// `NFNL_SUBSYS_IPSET` (6); ipset's nlmsg type is `(subsys << 8) | cmd`,
/// there is no separate `genlmsghdr` the way true generic-netlink families
/// use — ipset predates the genl convention.
const NFNL_SUBSYS_IPSET: u16 = 6;

fn request_for(cmd: u8, setname: &str, typename: Option<&str>) -> Request {
    let msg_type = (NFNL_SUBSYS_IPSET << 8) | cmd as u16;
    let header = NfGenMsg { family: libc::AF_INET as u8, version: 0, res_id: 0 };
    let attrs = IpsetAttrs { setname: Some(setname.to_string()), typename: typename.map(|s| s.to_string()), ..Default::default() };
    let mut attr_buf = Vec::new();
    attrs.encode_attrs(&mut attr_buf);
    Request::new(msg_type, crate::netlink::messages::NLM_F_REQUEST | crate::netlink::messages::NLM_F_ACK)
        .header(&header)
        .attrs(&attr_buf)
}

pub async fn create(socket: &Rc<RefCell<NetlinkSocket>>, setname: &str, typename: &str) -> Result<()> {
    let req = request_for(IPSET_CMD_CREATE, setname, Some(typename));
    let msg = request::call(socket, req, false).await?;
    if let Some(err) = msg.error {
        if err.errno() != Some(0) {
            return Err(err);
        }
    }
    Ok(())
}

pub async fn destroy(socket: &Rc<RefCell<NetlinkSocket>>, setname: &str) -> Result<()> {
    let req = request_for(IPSET_CMD_DESTROY, setname, None);
    let msg = request::call(socket, req, false).await?;
    if let Some(err) = msg.error {
        if err.errno() != Some(0) {
            return Err(err);
        }
    }
    Ok(())
}

pub async fn add(socket: &Rc<RefCell<NetlinkSocket>>, setname: &str, ip: Ipv4Addr) -> Result<()> {
    send_member(socket, IPSET_CMD_ADD, setname, ip).await
}

pub async fn del(socket: &Rc<RefCell<NetlinkSocket>>, setname: &str, ip: Ipv4Addr) -> Result<()> {
    send_member(socket, IPSET_CMD_DEL, setname, ip).await
}

async fn send_member(socket: &Rc<RefCell<NetlinkSocket>>, cmd: u8, setname: &str, ip: Ipv4Addr) -> Result<()> {
    let mut req = request_for(cmd, setname, None);
    let data = IpsetDataAttrs { ip: Some(ip), ..Default::default() };
    let mut nested = Vec::new();
    data.encode_attrs(&mut nested);
    let mut data_attr = Vec::new();
    encode_nla(IPSET_ATTR_DATA, &nested, &mut data_attr);
    req = req.attrs(&data_attr);
    let msg = request::call(socket, req, false).await?;
    if let Some(err) = msg.error {
        if err.errno() != Some(0) {
            return Err(err);
        }
    }
    Ok(())
}

pub async fn list(socket: &Rc<RefCell<NetlinkSocket>>, setname: &str) -> Result<Vec<Ipv4Addr>> {
    let req = request_for(IPSET_CMD_LIST, setname, None);
    let msgs = request::dump(socket, req).await?;
    let mut out = Vec::new();
    for msg in msgs {
        if msg.body.len() <= NfGenMsg::LEN {
            continue;
        }
        for nla in crate::netlink::wire::NlaIter::new(&msg.body[NfGenMsg::LEN..]) {
            if nla.kind == IPSET_ATTR_DATA {
                let data = IpsetDataAttrs::decode_attrs(nla.payload);
                if let Some(ip) = data.ip {
                    out.push(ip);
                }
            }
        }
    }
    Ok(out)
}

//! `vlan_filter`: bridge VLAN membership, set via `RTM_SETLINK` with
//! `family = AF_BRIDGE` and a nested `IFLA_AF_SPEC` carrying one
//! `BRIDGE_VLAN_INFO` per VLAN id.

use crate::netlink::error::Result;
use crate::netlink::messages::link::IfinfoMsg;
use crate::netlink::messages::{NLM_F_ACK, NLM_F_REQUEST, RTM_NEWLINK};
use crate::netlink::request::{self, Request};
use crate::netlink::socket::NetlinkSocket;
use crate::netlink::wire::encode_nla;
use crate::rtnl::fdb::AF_BRIDGE;
use std::cell::RefCell;
use std::rc::Rc;

const IFLA_AF_SPEC: u16 = 26;
const IFLA_BRIDGE_VLAN_INFO: u16 = 2;
const BRIDGE_VLAN_INFO_PVID: u16 = 0x0002;
const BRIDGE_VLAN_INFO_UNTAGGED: u16 = 0x0004;

/// `bridge_vlan_info { flags: u16, vid: u16 }`.
fn vlan_info(vid: u16, pvid: bool, untagged: bool) -> Vec<u8> {
    let mut flags = 0u16;
    if pvid {
        flags |= BRIDGE_VLAN_INFO_PVID;
    }
    if untagged {
        flags |= BRIDGE_VLAN_INFO_UNTAGGED;
    }
    let mut buf = Vec::new();
    buf.extend_from_slice(&flags.to_ne_bytes());
    buf.extend_from_slice(&vid.to_ne_bytes());
    buf
}

pub async fn add_vlan(
    socket: &Rc<RefCell<NetlinkSocket>>,
    index: i32,
    vid: u16,
    pvid: bool,
    untagged: bool,
) -> Result<()> {
    let header = IfinfoMsg { family: AF_BRIDGE, iftype: 0, index, flags: 0, change: 0 };

    let mut inner = Vec::new();
    encode_nla(IFLA_BRIDGE_VLAN_INFO, &vlan_info(vid, pvid, untagged), &mut inner);
    let mut attrs = Vec::new();
    encode_nla(IFLA_AF_SPEC, &inner, &mut attrs);

    let req = Request::new(RTM_NEWLINK, NLM_F_REQUEST | NLM_F_ACK).header(&header).attrs(&attrs);
    let msg = request::call(socket, req, false).await?;
    if let Some(err) = msg.error {
        if err.errno() != Some(0) {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vlan_info_encodes_flags_and_vid() {
        let buf = vlan_info(100, true, false);
        let flags = u16::from_ne_bytes([buf[0], buf[1]]);
        let vid = u16::from_ne_bytes([buf[2], buf[3]]);
        assert_eq!(flags, BRIDGE_VLAN_INFO_PVID);
        assert_eq!(vid, 100);
    }
}

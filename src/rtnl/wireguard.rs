//! Wireguard device configuration, over generic netlink (family `"wireguard"`).

use crate::netlink::error::Result;
use crate::netlink::messages::wireguard::{WgDeviceAttrs, WG_CMD_GET_DEVICE, WG_CMD_SET_DEVICE};
use crate::netlink::socket::NetlinkSocket;
use crate::netlink::wire::{Header, NlaSet};
use crate::rtnl::genl;
use std::cell::RefCell;
use std::rc::Rc;

pub struct Device {
    pub ifname: String,
    pub listen_port: Option<u16>,
}

pub async fn get(socket: &Rc<RefCell<NetlinkSocket>>, ifname: &str) -> Result<Device> {
    let family_id = genl::resolve_family(socket, "wireguard").await?;
    let attrs = WgDeviceAttrs { ifname: Some(ifname.to_string()), listen_port: None, ..Default::default() };
    let mut attr_buf = Vec::new();
    attrs.encode_attrs(&mut attr_buf);
    let msg = genl::call(socket, family_id, WG_CMD_GET_DEVICE, &attr_buf).await?;
    let decoded = WgDeviceAttrs::decode_attrs(&msg.body[crate::netlink::messages::genl::GenlMsgHdr::LEN..]);
    Ok(Device { ifname: decoded.ifname.unwrap_or_else(|| ifname.to_string()), listen_port: decoded.listen_port })
}

pub async fn set_listen_port(socket: &Rc<RefCell<NetlinkSocket>>, ifname: &str, port: u16) -> Result<()> {
    let family_id = genl::resolve_family(socket, "wireguard").await?;
    let attrs = WgDeviceAttrs { ifname: Some(ifname.to_string()), listen_port: Some(port), ..Default::default() };
    let mut attr_buf = Vec::new();
    attrs.encode_attrs(&mut attr_buf);
    let msg = genl::call(socket, family_id, WG_CMD_SET_DEVICE, &attr_buf).await?;
    if let Some(err) = msg.error {
        if err.errno() != Some(0) {
            return Err(err);
        }
    }
    Ok(())
}

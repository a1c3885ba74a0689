//! Wireguard configuration rides generic netlink, family name `"wireguard"`.
//! There is no fixed header beyond [`super::genl::GenlMsgHdr`]; everything is
//! attributes.

use rtnl_macros::NlaSet;

pub const WG_CMD_GET_DEVICE: u8 = 0;
pub const WG_CMD_SET_DEVICE: u8 = 1;

pub const WGDEVICE_A_IFNAME: u16 = 1;
pub const WGDEVICE_A_PRIVATE_KEY: u16 = 3;
pub const WGDEVICE_A_LISTEN_PORT: u16 = 5;
pub const WGDEVICE_A_PEERS: u16 = 8;

pub const WGPEER_A_PUBLIC_KEY: u16 = 1;
pub const WGPEER_A_ENDPOINT: u16 = 3;
pub const WGPEER_A_PERSISTENT_KEEPALIVE_INTERVAL: u16 = 5;
pub const WGPEER_A_ALLOWEDIPS: u16 = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq, NlaSet)]
pub struct WgDeviceAttrs {
    #[nla(1)]
    pub ifname: Option<String>,
    #[nla(5)]
    pub listen_port: Option<u16>,
    pub extra: Vec<(u16, Vec<u8>)>,
}

use crate::netlink::error::DecodeError;
use crate::netlink::wire::Header;
use rtnl_macros::NlaSet;

/// `struct ifinfomsg`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IfinfoMsg {
    pub family: u8,
    pub iftype: u16,
    pub index: i32,
    pub flags: u32,
    pub change: u32,
}

impl Header for IfinfoMsg {
    const LEN: usize = 16;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.family);
        buf.push(0); // pad
        buf.extend_from_slice(&self.iftype.to_ne_bytes());
        buf.extend_from_slice(&self.index.to_ne_bytes());
        buf.extend_from_slice(&self.flags.to_ne_bytes());
        buf.extend_from_slice(&self.change.to_ne_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < Self::LEN {
            return Err(DecodeError::header("ifinfomsg", Self::LEN, buf.len()));
        }
        Ok(IfinfoMsg {
            family: buf[0],
            iftype: u16::from_ne_bytes(buf[2..4].try_into().unwrap()),
            index: i32::from_ne_bytes(buf[4..8].try_into().unwrap()),
            flags: u32::from_ne_bytes(buf[8..12].try_into().unwrap()),
            change: u32::from_ne_bytes(buf[12..16].try_into().unwrap()),
        })
    }
}

pub const IFLA_ADDRESS: u16 = 1;
pub const IFLA_BROADCAST: u16 = 2;
pub const IFLA_IFNAME: u16 = 3;
pub const IFLA_MTU: u16 = 4;
pub const IFLA_LINKINFO: u16 = 18;
pub const IFLA_INFO_KIND: u16 = 1;
pub const IFLA_INFO_DATA: u16 = 2;

/// Flat (non-nested) `IFLA_*` attributes. `IFLA_LINKINFO` is built separately
/// by `rtnl::link` since it nests `IFLA_INFO_KIND`/`IFLA_INFO_DATA`.
#[derive(Debug, Clone, Default, PartialEq, Eq, NlaSet)]
pub struct LinkAttrs {
    #[nla(3)]
    pub ifname: Option<String>,
    #[nla(1)]
    pub address: Option<[u8; 6]>,
    #[nla(2)]
    pub broadcast: Option<[u8; 6]>,
    #[nla(4)]
    pub mtu: Option<u32>,
    /// Every other `IFLA_*` attribute the kernel sent, e.g. `IFLA_OPERSTATE`,
    /// `IFLA_STATS64`, or a future `IFLA_LINKINFO` carried back undecoded.
    pub extra: Vec<(u16, Vec<u8>)>,
}

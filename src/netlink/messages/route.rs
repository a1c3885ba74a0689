use crate::netlink::error::DecodeError;
use crate::netlink::wire::Header;
use rtnl_macros::NlaSet;
use std::net::Ipv4Addr;

/// `struct rtmsg`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RtMsg {
    pub family: u8,
    pub dst_len: u8,
    pub src_len: u8,
    pub tos: u8,
    pub table: u8,
    pub protocol: u8,
    pub scope: u8,
    pub kind: u8,
    pub flags: u32,
}

impl Header for RtMsg {
    const LEN: usize = 12;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&[
            self.family, self.dst_len, self.src_len, self.tos, self.table, self.protocol,
            self.scope, self.kind,
        ]);
        buf.extend_from_slice(&self.flags.to_ne_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < Self::LEN {
            return Err(DecodeError::header("rtmsg", Self::LEN, buf.len()));
        }
        Ok(RtMsg {
            family: buf[0],
            dst_len: buf[1],
            src_len: buf[2],
            tos: buf[3],
            table: buf[4],
            protocol: buf[5],
            scope: buf[6],
            kind: buf[7],
            flags: u32::from_ne_bytes(buf[8..12].try_into().unwrap()),
        })
    }
}

pub const RTA_DST: u16 = 1;
pub const RTA_OIF: u16 = 4;
pub const RTA_GATEWAY: u16 = 5;
pub const RTA_PRIORITY: u16 = 6;
pub const RTA_PREFSRC: u16 = 7;
pub const RTA_TABLE: u16 = 15;

pub const RT_TABLE_MAIN: u8 = 254;
pub const RT_SCOPE_UNIVERSE: u8 = 0;
pub const RTPROT_BOOT: u8 = 3;
pub const RTN_UNICAST: u8 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, NlaSet)]
pub struct RouteAttrs {
    #[nla(1)]
    pub dst: Option<Ipv4Addr>,
    #[nla(4)]
    pub oif: Option<u32>,
    #[nla(5)]
    pub gateway: Option<Ipv4Addr>,
    #[nla(7)]
    pub prefsrc: Option<Ipv4Addr>,
    #[nla(15)]
    pub table: Option<u32>,
    pub extra: Vec<(u16, Vec<u8>)>,
}

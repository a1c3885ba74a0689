use crate::netlink::error::DecodeError;
use crate::netlink::wire::Header;
use rtnl_macros::NlaSet;
use std::net::Ipv4Addr;

/// `struct ifaddrmsg`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IfaddrMsg {
    pub family: u8,
    pub prefixlen: u8,
    pub flags: u8,
    pub scope: u8,
    pub index: u32,
}

impl Header for IfaddrMsg {
    const LEN: usize = 8;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.family);
        buf.push(self.prefixlen);
        buf.push(self.flags);
        buf.push(self.scope);
        buf.extend_from_slice(&self.index.to_ne_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < Self::LEN {
            return Err(DecodeError::header("ifaddrmsg", Self::LEN, buf.len()));
        }
        Ok(IfaddrMsg {
            family: buf[0],
            prefixlen: buf[1],
            flags: buf[2],
            scope: buf[3],
            index: u32::from_ne_bytes(buf[4..8].try_into().unwrap()),
        })
    }
}

pub const IFA_ADDRESS: u16 = 1;
pub const IFA_LOCAL: u16 = 2;
pub const IFA_LABEL: u16 = 3;
pub const IFA_BROADCAST: u16 = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq, NlaSet)]
pub struct AddrAttrs {
    #[nla(1)]
    pub address: Option<Ipv4Addr>,
    #[nla(2)]
    pub local: Option<Ipv4Addr>,
    #[nla(3)]
    pub label: Option<String>,
    #[nla(4)]
    pub broadcast: Option<Ipv4Addr>,
    pub extra: Vec<(u16, Vec<u8>)>,
}

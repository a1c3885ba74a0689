use crate::netlink::error::DecodeError;
use crate::netlink::wire::Header;
use rtnl_macros::NlaSet;
use std::net::Ipv4Addr;

/// `struct ndmsg`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NdMsg {
    pub family: u8,
    pub index: i32,
    pub state: u16,
    pub flags: u8,
    pub kind: u8,
}

impl Header for NdMsg {
    const LEN: usize = 12;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.family);
        buf.extend_from_slice(&[0, 0, 0]); // pad1, pad2 (2 bytes) + 1
        buf.extend_from_slice(&self.index.to_ne_bytes());
        buf.extend_from_slice(&self.state.to_ne_bytes());
        buf.push(self.flags);
        buf.push(self.kind);
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < Self::LEN {
            return Err(DecodeError::header("ndmsg", Self::LEN, buf.len()));
        }
        Ok(NdMsg {
            family: buf[0],
            index: i32::from_ne_bytes(buf[4..8].try_into().unwrap()),
            state: u16::from_ne_bytes(buf[8..10].try_into().unwrap()),
            flags: buf[10],
            kind: buf[11],
        })
    }
}

pub const NDA_DST: u16 = 1;
pub const NDA_LLADDR: u16 = 2;

pub const NUD_PERMANENT: u16 = 0x80;
pub const NUD_REACHABLE: u16 = 0x02;

#[derive(Debug, Clone, Default, PartialEq, Eq, NlaSet)]
pub struct NeighAttrs {
    #[nla(1)]
    pub dst: Option<Ipv4Addr>,
    #[nla(2)]
    pub lladdr: Option<[u8; 6]>,
    pub extra: Vec<(u16, Vec<u8>)>,
}

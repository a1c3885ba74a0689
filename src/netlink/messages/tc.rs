use crate::netlink::error::DecodeError;
use crate::netlink::wire::Header;
use rtnl_macros::NlaSet;

/// `struct tcmsg`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcMsg {
    pub family: u8,
    pub index: i32,
    pub handle: u32,
    pub parent: u32,
    pub info: u32,
}

impl Header for TcMsg {
    const LEN: usize = 20;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.family);
        buf.extend_from_slice(&[0, 0, 0]);
        buf.extend_from_slice(&self.index.to_ne_bytes());
        buf.extend_from_slice(&self.handle.to_ne_bytes());
        buf.extend_from_slice(&self.parent.to_ne_bytes());
        buf.extend_from_slice(&self.info.to_ne_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < Self::LEN {
            return Err(DecodeError::header("tcmsg", Self::LEN, buf.len()));
        }
        Ok(TcMsg {
            family: buf[0],
            index: i32::from_ne_bytes(buf[4..8].try_into().unwrap()),
            handle: u32::from_ne_bytes(buf[8..12].try_into().unwrap()),
            parent: u32::from_ne_bytes(buf[12..16].try_into().unwrap()),
            info: u32::from_ne_bytes(buf[16..20].try_into().unwrap()),
        })
    }
}

pub const TCA_KIND: u16 = 1;
pub const TC_H_ROOT: u32 = 0xFFFFFFFF;
pub const TC_H_INGRESS: u32 = 0xFFFFFFF1;

#[derive(Debug, Clone, Default, PartialEq, Eq, NlaSet)]
pub struct TcAttrs {
    #[nla(1)]
    pub kind: Option<String>,
    pub extra: Vec<(u16, Vec<u8>)>,
}

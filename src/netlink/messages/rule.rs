use crate::netlink::error::DecodeError;
use crate::netlink::wire::Header;
use rtnl_macros::NlaSet;
use std::net::Ipv4Addr;

/// `struct fib_rule_hdr`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FibRuleHdr {
    pub family: u8,
    pub dst_len: u8,
    pub src_len: u8,
    pub tos: u8,
    pub table: u8,
    pub action: u8,
    pub flags: u32,
}

impl Header for FibRuleHdr {
    // struct fib_rule_hdr: family, dst_len, src_len, tos, table, res1, res2,
    // action, flags(u32) = 12 bytes.
    const LEN: usize = 12;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&[self.family, self.dst_len, self.src_len, self.tos, self.table, 0, 0, self.action]);
        buf.extend_from_slice(&self.flags.to_ne_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < Self::LEN {
            return Err(DecodeError::header("fib_rule_hdr", Self::LEN, buf.len()));
        }
        Ok(FibRuleHdr {
            family: buf[0],
            dst_len: buf[1],
            src_len: buf[2],
            tos: buf[3],
            table: buf[4],
            action: buf[7],
            flags: u32::from_ne_bytes(buf[8..12].try_into().unwrap()),
        })
    }
}

pub const FRA_DST: u16 = 1;
pub const FRA_SRC: u16 = 2;
pub const FRA_PRIORITY: u16 = 6;
pub const FRA_TABLE: u16 = 15;

#[derive(Debug, Clone, Default, PartialEq, Eq, NlaSet)]
pub struct RuleAttrs {
    #[nla(1)]
    pub dst: Option<Ipv4Addr>,
    #[nla(2)]
    pub src: Option<Ipv4Addr>,
    #[nla(6)]
    pub priority: Option<u32>,
    #[nla(15)]
    pub table: Option<u32>,
    pub extra: Vec<(u16, Vec<u8>)>,
}

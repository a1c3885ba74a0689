use crate::netlink::error::DecodeError;
use crate::netlink::wire::Header;
use rtnl_macros::NlaSet;
use std::net::Ipv4Addr;

/// `struct nfgenmsg`, the header for `NETLINK_NETFILTER` messages (ipset
/// rides on this family).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NfGenMsg {
    pub family: u8,
    pub version: u8,
    pub res_id: u16,
}

impl Header for NfGenMsg {
    const LEN: usize = 4;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.family);
        buf.push(self.version);
        buf.extend_from_slice(&self.res_id.to_be_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < Self::LEN {
            return Err(DecodeError::header("nfgenmsg", Self::LEN, buf.len()));
        }
        Ok(NfGenMsg {
            family: buf[0],
            version: buf[1],
            res_id: u16::from_be_bytes(buf[2..4].try_into().unwrap()),
        })
    }
}

pub const IPSET_CMD_CREATE: u8 = 2;
pub const IPSET_CMD_DESTROY: u8 = 3;
pub const IPSET_CMD_ADD: u8 = 5;
pub const IPSET_CMD_DEL: u8 = 6;
pub const IPSET_CMD_LIST: u8 = 9;

pub const IPSET_ATTR_SETNAME: u16 = 2;
pub const IPSET_ATTR_TYPENAME: u16 = 3;
pub const IPSET_ATTR_DATA: u16 = 7;
pub const IPSET_ATTR_IP: u16 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, NlaSet)]
pub struct IpsetAttrs {
    #[nla(2)]
    pub setname: Option<String>,
    #[nla(3)]
    pub typename: Option<String>,
    pub extra: Vec<(u16, Vec<u8>)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, NlaSet)]
pub struct IpsetDataAttrs {
    #[nla(1)]
    pub ip: Option<Ipv4Addr>,
    pub extra: Vec<(u16, Vec<u8>)>,
}

/// `exceptions.py`'s `IPSetError.error_map` (ipset-specific errno text,
/// codes 4097-4114 — outside the POSIX errno range so the kernel can tell
/// them apart from generic netlink errors).
pub fn error_text(code: i32) -> Option<&'static str> {
    let text = match code {
        4097 => "ipset type doesn't support the operation",
        4098 => "max number of elements exceeded",
        4099 => "set not compatible with class",
        4100 => "element already in the set",
        4101 => "element not in the set",
        4102 => "invalid comment",
        4103 => "invalid markmask",
        4104 => "reference by name does not exist",
        4105 => "reference by index does not exist",
        4106 => "same name and type already exists",
        4107 => "set is full",
        4108 => "timeout not supported",
        4109 => "counters not supported",
        4110 => "comment not supported",
        4111 => "invalid family",
        4112 => "invalid protocol",
        4113 => "skbinfo not supported",
        4114 => "invalid markmask value",
        _ => return None,
    };
    Some(text)
}

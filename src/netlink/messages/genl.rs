use crate::netlink::error::DecodeError;
use crate::netlink::wire::Header;

/// `struct genlmsghdr`, the 4-byte header every generic-netlink message
/// carries between the `nlmsghdr` and its attribute stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenlMsgHdr {
    pub cmd: u8,
    pub version: u8,
}

impl Header for GenlMsgHdr {
    const LEN: usize = 4;

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.cmd);
        buf.push(self.version);
        buf.extend_from_slice(&[0, 0]); // reserved
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < Self::LEN {
            return Err(DecodeError::header("genlmsghdr", Self::LEN, buf.len()));
        }
        Ok(GenlMsgHdr { cmd: buf[0], version: buf[1] })
    }
}

// genetlink control family (`nlctrl`), used to resolve a family name to id.
pub const GENL_ID_CTRL: u16 = 0x10;
pub const CTRL_CMD_GETFAMILY: u8 = 3;
pub const CTRL_ATTR_FAMILY_ID: u16 = 1;
pub const CTRL_ATTR_FAMILY_NAME: u16 = 2;

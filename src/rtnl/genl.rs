//! Generic-netlink plumbing: resolving a family name to its numeric id via
//! the `nlctrl` family, and sending commands to a resolved family.

use crate::netlink::error::{Error, Result};
use crate::netlink::messages::genl::{
    GenlMsgHdr, CTRL_ATTR_FAMILY_ID, CTRL_ATTR_FAMILY_NAME, CTRL_CMD_GETFAMILY, GENL_ID_CTRL,
};
use crate::netlink::messages::{NLM_F_ACK, NLM_F_REQUEST};
use crate::netlink::request::{self, Request};
use crate::netlink::socket::NetlinkSocket;
use crate::netlink::wire::{encode_nla, Header, NlaIter, NlaValue};
use std::cell::RefCell;
use std::rc::Rc;

pub async fn resolve_family(socket: &Rc<RefCell<NetlinkSocket>>, name: &str) -> Result<u16> {
    let genl = GenlMsgHdr { cmd: CTRL_CMD_GETFAMILY, version: 1 };
    let mut attrs = Vec::new();
    encode_nla(CTRL_ATTR_FAMILY_NAME, name.as_bytes(), &mut attrs);
    let req = Request::new(GENL_ID_CTRL, NLM_F_REQUEST | NLM_F_ACK).header(&genl).attrs(&attrs);
    let msg = request::call(socket, req, false).await?;
    if let Some(err) = &msg.error {
        if err.errno() != Some(0) {
            return Err(Error::Resource(format!("genl family `{name}` not found: {err}")));
        }
    }
    let body = &msg.body[GenlMsgHdr::LEN..];
    NlaIter::new(body)
        .find(|n| n.kind == CTRL_ATTR_FAMILY_ID)
        .and_then(|n| u16::decode_nla_value(n.payload).ok())
        .ok_or_else(|| Error::Resource(format!("genl family `{name}` has no id attribute")))
}


pub async fn call(
    socket: &Rc<RefCell<NetlinkSocket>>,
    family_id: u16,
    cmd: u8,
    attrs: &[u8],
) -> Result<crate::netlink::marshal::NlMsg> {
    let genl = GenlMsgHdr { cmd, version: 1 };
    let req = Request::new(family_id, NLM_F_REQUEST | NLM_F_ACK).header(&genl).attrs(attrs);
    request::call(socket, req, false).await
}

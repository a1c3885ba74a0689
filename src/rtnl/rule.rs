//! Typed `rule` verbs (`ip rule ...` equivalent, fib rules).

use crate::netlink::error::Result;
use crate::netlink::messages::rule::{FibRuleHdr, RuleAttrs};
use crate::netlink::messages::{NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_REQUEST, RTM_DELRULE, RTM_GETRULE, RTM_NEWRULE};
use crate::netlink::request::{self, Request};
use crate::netlink::socket::NetlinkSocket;
use crate::netlink::wire::{Header, NlaSet};
use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub priority: Option<u32>,
    pub table: Option<u32>,
    pub src: Option<Ipv4Addr>,
}

pub async fn dump(socket: &Rc<RefCell<NetlinkSocket>>) -> Result<Vec<Rule>> {
    let req = Request::new(RTM_GETRULE, NLM_F_REQUEST | NLM_F_DUMP).header(&FibRuleHdr::default());
    let msgs = request::dump(socket, req).await?;
    let mut out = Vec::new();
    for msg in msgs {
        let attrs = RuleAttrs::decode_attrs(&msg.body[FibRuleHdr::LEN..]);
        out.push(Rule { priority: attrs.priority, table: attrs.table, src: attrs.src });
    }
    Ok(out)
}

pub async fn add(socket: &Rc<RefCell<NetlinkSocket>>, priority: u32, table: u32) -> Result<()> {
    let header = FibRuleHdr { family: libc::AF_INET as u8, table: table as u8, ..Default::default() };
    let attrs = RuleAttrs { priority: Some(priority), table: Some(table), ..Default::default() };
    let mut attr_buf = Vec::new();
    attrs.encode_attrs(&mut attr_buf);
    let req = Request::new(RTM_NEWRULE, NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE)
        .header(&header)
        .attrs(&attr_buf);
    let msg = request::call(socket, req, false).await?;
    if let Some(err) = msg.error {
        if err.errno() != Some(0) {
            return Err(err);
        }
    }
    Ok(())
}

pub async fn del(socket: &Rc<RefCell<NetlinkSocket>>, priority: u32) -> Result<()> {
    let header = FibRuleHdr::default();
    let attrs = RuleAttrs { priority: Some(priority), ..Default::default() };
    let mut attr_buf = Vec::new();
    attrs.encode_attrs(&mut attr_buf);
    let req = Request::new(RTM_DELRULE, NLM_F_REQUEST | NLM_F_ACK).header(&header).attrs(&attr_buf);
    let msg = request::call(socket, req, false).await?;
    if let Some(err) = msg.error {
        if err.errno() != Some(0) {
            return Err(err);
        }
    }
    Ok(())
}

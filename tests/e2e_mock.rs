//! Crate-boundary RTNL scenarios (S1-S4 from the mock database), exercising
//! the service layer against `rtnl::mock::MockEngine` instead of a real
//! kernel socket.

use rtnl_core::netlink::socket::NetlinkSocket;
use rtnl_core::netlink::Error;
use rtnl_core::rtnl::mock::MockEngine;
use rtnl_core::rtnl::{addr, link};
use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

fn socket(engine: MockEngine) -> Rc<RefCell<NetlinkSocket>> {
    Rc::new(RefCell::new(NetlinkSocket::open_with_mock(engine)))
}

#[tokio::test]
async fn s1_link_dump_returns_lo_then_eth0() {
    let sock = socket(MockEngine::with_default_preset());
    let links = link::dump(&sock).await.unwrap();
    assert_eq!(links.len(), 2);
    assert_eq!(links[0].ifname, "lo");
    assert_eq!(links[0].index, 1);
    assert_eq!(links[1].ifname, "eth0");
    assert_eq!(links[1].index, 2);
}

#[tokio::test]
async fn s2_adding_the_same_link_twice_fails_with_eexist() {
    let sock = socket(MockEngine::new());
    link::add(&sock, "dummy0", "dummy").await.unwrap();
    let result = link::add(&sock, "dummy0", "dummy").await;
    assert!(matches!(result, Err(Error::Netlink { code, .. }) if code == libc::EEXIST));
}

#[tokio::test]
async fn s3_deleting_an_unknown_link_fails_with_enoent() {
    let sock = socket(MockEngine::new());
    let result = link::del(&sock, "nope").await;
    assert!(matches!(result, Err(Error::Netlink { code, .. }) if code == libc::ENOENT));
}

#[tokio::test]
async fn s4_addr_dump_reports_the_preset_address() {
    let mut engine = MockEngine::new();
    engine.push_addr(2, Ipv4Addr::new(192, 168, 122, 28), 24);
    let sock = socket(engine);
    let addrs = addr::dump(&sock).await.unwrap();
    assert_eq!(addrs.len(), 1);
    assert_eq!(addrs[0].address, Ipv4Addr::new(192, 168, 122, 28));
    assert_eq!(addrs[0].prefixlen, 24);
    assert_eq!(addrs[0].index, 2);
}

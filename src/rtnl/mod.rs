//! RTNL service layer (C6): typed `add/del/set/get/dump/replace` verbs over
//! the request/response engine, plus the domain services that ride other
//! netlink families (ipset over netfilter, wireguard/genl over generic
//! netlink).

pub mod addr;
pub mod fdb;
pub mod genl;
pub mod ipset;
pub mod link;
pub mod mock;
pub mod neigh;
pub mod route;
pub mod rule;
pub mod tc;
pub mod vlan;
pub mod wireguard;

/// Consumer-side dump filter. The kernel ignores most filter attributes on
/// a dump request, so filtering always happens here, after decode.
pub enum Selector<T> {
    Exact(std::collections::HashMap<&'static str, String>),
    Predicate(Box<dyn Fn(&T) -> bool>),
}

impl<T> Selector<T> {
    pub fn all() -> Self {
        Selector::Predicate(Box::new(|_| true))
    }

    pub fn matches(&self, item: &T, project: impl Fn(&T) -> std::collections::HashMap<&'static str, String>) -> bool {
        match self {
            Selector::Exact(want) => {
                let got = project(item);
                want.iter().all(|(k, v)| got.get(k).map(|g| g == v).unwrap_or(false))
            }
            Selector::Predicate(f) => f(item),
        }
    }
}

/// The verb parameter every RTNL operation takes, per spec.md §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Add,
    Del,
    Set,
    Get,
    Dump,
    Replace,
}

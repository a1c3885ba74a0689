//! Lease lifecycle hooks: small callbacks run when a lease is bound or
//! released, configuring the interface's address and default route.
//!
//! Deliberately simpler than an ordered dependency-graph hook runner (no
//! dependency DAG, no fatal/non-fatal flag distinction): a lease-bound event
//! has exactly two
//! outcomes worth distinguishing — "ran" and "failed, logged, move on" — so
//! the ordered-exec-graph machinery doesn't pull its weight here. Grounded
//! on `hooks.py`'s `ConfigureIP`/`ConfigureDefaultRoute`.

use crate::dhcp::lease::Lease;
use crate::dhcp::Error;
use crate::netlink::socket::NetlinkSocket;
use crate::rtnl;
use async_trait::async_trait;
use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

#[async_trait(?Send)]
pub trait Hook {
    async fn bound(&self, socket: &Rc<RefCell<NetlinkSocket>>, lease: &Lease) -> Result<(), Error> {
        let _ = (socket, lease);
        Ok(())
    }

    async fn unbound(&self, socket: &Rc<RefCell<NetlinkSocket>>, lease: &Lease) -> Result<(), Error> {
        let _ = (socket, lease);
        Ok(())
    }
}

/// Runs every registered hook in registration order, logging and swallowing
/// individual failures rather than aborting the chain.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Box<dyn Hook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        HookRegistry::default()
    }

    pub fn register(&mut self, hook: Box<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub async fn run_bound(&self, socket: &Rc<RefCell<NetlinkSocket>>, lease: &Lease) {
        for hook in &self.hooks {
            if let Err(err) = hook.bound(socket, lease).await {
                log::warn!("bound hook failed: {err}");
            }
        }
    }

    pub async fn run_unbound(&self, socket: &Rc<RefCell<NetlinkSocket>>, lease: &Lease) {
        for hook in &self.hooks {
            if let Err(err) = hook.unbound(socket, lease).await {
                log::warn!("unbound hook failed: {err}");
            }
        }
    }
}

fn prefixlen_of(mask: Ipv4Addr) -> u8 {
    u32::from(mask).count_ones() as u8
}

async fn link_index(socket: &Rc<RefCell<NetlinkSocket>>, ifname: &str) -> Result<u32, Error> {
    let link = rtnl::link::get(socket, ifname).await?.ok_or_else(|| Error::Resource(format!("no such interface: {ifname}")))?;
    Ok(link.index as u32)
}

/// Adds/removes the leased address on the interface.
pub struct ConfigureIp;

#[async_trait(?Send)]
impl Hook for ConfigureIp {
    async fn bound(&self, socket: &Rc<RefCell<NetlinkSocket>>, lease: &Lease) -> Result<(), Error> {
        let Some(mask) = lease.subnet_mask else {
            return Err(Error::OptionMissing("subnet_mask"));
        };
        let index = link_index(socket, &lease.interface).await?;
        log::info!("adding {}/{} to {}", lease.ip, prefixlen_of(mask), lease.interface);
        rtnl::addr::add(socket, index, lease.ip, prefixlen_of(mask)).await?;
        Ok(())
    }

    async fn unbound(&self, socket: &Rc<RefCell<NetlinkSocket>>, lease: &Lease) -> Result<(), Error> {
        let Some(mask) = lease.subnet_mask else {
            return Err(Error::OptionMissing("subnet_mask"));
        };
        let index = link_index(socket, &lease.interface).await?;
        log::info!("removing {}/{} from {}", lease.ip, prefixlen_of(mask), lease.interface);
        rtnl::addr::del(socket, index, lease.ip, prefixlen_of(mask)).await?;
        Ok(())
    }
}

/// Adds/removes a default route through the lease's first router.
pub struct ConfigureDefaultRoute;

#[async_trait(?Send)]
impl Hook for ConfigureDefaultRoute {
    async fn bound(&self, socket: &Rc<RefCell<NetlinkSocket>>, lease: &Lease) -> Result<(), Error> {
        let Some(gateway) = lease.default_gateway() else {
            log::error!("lease does not set the router option");
            return Ok(());
        };
        let index = link_index(socket, &lease.interface).await?;
        log::info!("adding {gateway} as default route through {}", lease.interface);
        rtnl::route::replace(socket, None, Some(gateway), index).await?;
        Ok(())
    }

    async fn unbound(&self, socket: &Rc<RefCell<NetlinkSocket>>, lease: &Lease) -> Result<(), Error> {
        let Some(gateway) = lease.default_gateway() else {
            log::error!("lease does not set the router option");
            return Ok(());
        };
        let index = link_index(socket, &lease.interface).await?;
        log::info!("removing {gateway} as default route");
        match rtnl::route::del(socket, None, index).await {
            Ok(()) => Ok(()),
            Err(err) if err.errno() == Some(libc::ESRCH) => {
                log::warn!("default route was already removed by another process");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixlen_of_slash_24_is_24() {
        assert_eq!(prefixlen_of(Ipv4Addr::new(255, 255, 255, 0)), 24);
    }
}

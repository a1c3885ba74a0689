//! Top-level error type, composing each subsystem's own error taxonomy.
//!
//! Each subsystem (`netlink`, `dhcp`, `netns`) defines its own `thiserror`
//! enum close to the code that raises it; this type exists so callers that
//! cross subsystem boundaries (e.g. a DHCP hook calling into the RTNL layer)
//! have one `Result` alias to propagate with `?`.

use crate::dhcp;
use crate::netlink;
use crate::netns;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Netlink(#[from] netlink::Error),

    #[error(transparent)]
    Dhcp(#[from] dhcp::Error),

    #[error(transparent)]
    Netns(#[from] netns::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

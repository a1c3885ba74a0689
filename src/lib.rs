//! `rtnl_core`: a netlink wire codec and async core socket (C1-C5), the
//! RTNL service layer (C6), a DHCPv4 client (C7-C10), and the process
//! supervisor netns helpers lean on (C11).
//!
//! See `DESIGN.md` for how each module is grounded.

pub mod config;
pub mod dhcp;
pub mod error;
pub mod logging;
pub mod netlink;
pub mod netns;
pub mod rtnl;

pub use error::{Error, Result};

//! DHCPv4 client: raw L2 socket + BPF (C7), message codec (C8), FSM (C9),
//! client tasks (C10).

pub mod bpf;
pub mod client;
pub mod codec;
pub mod fsm;
pub mod hooks;
pub mod lease;
pub mod raw;
pub mod timers;
pub mod transport;
pub mod xid;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("lease is missing option {0}")]
    OptionMissing(&'static str),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("illegal FSM transition {from:?} -> {to:?}")]
    Transition { from: fsm::State, to: fsm::State },

    #[error("resource error: {0}")]
    Resource(String),

    #[error(transparent)]
    Netlink(#[from] crate::netlink::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

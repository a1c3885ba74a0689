//! Error taxonomy for the netlink subsystem (C1-C5). Each variant is
//! independent rather than part of an inheritance hierarchy, matching the
//! source's plain per-concern exception classes.

use thiserror::Error;

/// Which layer of a message a decode failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeLayer {
    Header,
    Data,
    Nla,
}

impl std::fmt::Display for DecodeLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DecodeLayer::Header => "header",
            DecodeLayer::Data => "data",
            DecodeLayer::Nla => "nla",
        };
        f.write_str(s)
    }
}

/// A structured decode failure: names the failing field and the byte counts
/// needed vs. available, so it can be logged without re-parsing.
#[derive(Debug, Clone, Error)]
#[error("{layer} decode error: field `{field}` needs {needed} bytes, {available} available")]
pub struct DecodeError {
    pub layer: DecodeLayer,
    pub field: String,
    pub needed: usize,
    pub available: usize,
}

impl DecodeError {
    pub fn header(field: impl Into<String>, needed: usize, available: usize) -> Self {
        DecodeError { layer: DecodeLayer::Header, field: field.into(), needed, available }
    }

    pub fn data(field: impl Into<String>, needed: usize, available: usize) -> Self {
        DecodeError { layer: DecodeLayer::Data, field: field.into(), needed, available }
    }

    pub fn nla(field: impl Into<String>, needed: usize, available: usize) -> Self {
        DecodeError { layer: DecodeLayer::Nla, field: field.into(), needed, available }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// An `NLMSG_ERROR` with a non-zero errno, optionally carrying the
    /// extended-ACK message text (`NLMSGERR_ATTR_MSG`).
    #[error("netlink error: {msg} (errno {code})")]
    Netlink { code: i32, msg: String },

    /// `NLM_F_DUMP_INTR` was observed on the terminating `NLMSG_DONE`.
    #[error("dump interrupted")]
    DumpInterrupted,

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn from_errno(code: i32, msg: impl Into<String>) -> Self {
        Error::Netlink { code, msg: msg.into() }
    }

    /// The POSIX errno carried by a [`Error::Netlink`], if any.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Error::Netlink { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

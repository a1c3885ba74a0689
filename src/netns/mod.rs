//! Network namespace entry and the process supervisor (C11) that creates
//! kernel sockets inside a foreign namespace and hands the resulting fd back
//! to the parent.
//!
//! Grounded on `pyroute2/netns/process.py` (the `setns` entry point and the
//! `NSPopen` subprocess proxy) and `pyroute2/process.py` (`ChildProcess`, the
//! generic fork+control-socket+`SCM_RIGHTS` wrapper `netns::supervisor`
//! specializes).

pub mod supervisor;

use crate::config;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("namespace `{0}` not found in netns_path")]
    NotFound(String),

    #[error("child process error: {0}")]
    Child(String),

    #[error("child process timed out: {0}")]
    Timeout(String),

    #[error("child process raised {exception}: {message}")]
    ChildException { exception: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Resolves `name` against `config::get().netns_path`, returning the first
/// existing `<dir>/<name>` bind-mount file.
pub fn netns_path(name: &str) -> Result<PathBuf> {
    for dir in &config::get().netns_path {
        let candidate = Path::new(dir).join(name);
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(Error::NotFound(name.to_string()))
}

/// Enters the network namespace bind-mounted at `netns_path(name)` by
/// opening it and calling `setns(2)` with `CLONE_NEWNET`. A no-op under
/// `config::ProcessConfig::mock_netns`.
///
/// This affects only the calling thread/process's namespace membership, so
/// callers that need to return to the original namespace must do so from a
/// forked child (see [`supervisor::ChildProcess`]) rather than calling this
/// directly in a long-lived process.
pub fn setns(name: &str) -> Result<()> {
    if config::get().mock_netns {
        return Ok(());
    }
    let path = netns_path(name)?;
    let cpath = std::ffi::CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|_| Error::Child("namespace path contains a NUL byte".into()))?;
    let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDONLY) };
    if fd < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    let ret = unsafe { libc::setns(fd, libc::CLONE_NEWNET) };
    let errno = std::io::Error::last_os_error();
    unsafe { libc::close(fd) };
    if ret < 0 {
        return Err(errno.into());
    }
    Ok(())
}

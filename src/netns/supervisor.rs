//! The fork + control-socket + `SCM_RIGHTS` process supervisor (C11).
//!
//! Grounded on `pyroute2/process.py`'s `ChildProcess`/`wrapper`: a target
//! closure runs in a forked child, its result (or exception) is serialized
//! onto a `SOCK_DGRAM` Unix socket pair as a one-byte result kind followed by
//! a payload, with any returned file descriptors riding along as an
//! `SCM_RIGHTS` ancillary message. The parent's `communicate` blocks on the
//! control socket with a timeout, killing the child on expiry.
//!
//! Only `child_process_mode = Fork` is implemented; `Mp` (a worker-process
//! pool) is a config toggle carried for parity with `ProcessConfig` but has
//! no supervisor backing it here, since the source's `multiprocessing.Process`
//! route has no equivalent primitive worth reimplementing for one-shot netns
//! helpers.

use crate::netns::{Error, Result};
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

const RESULT_EXCEPTION: u8 = 1;
const RESULT_DATA: u8 = 2;

/// What a child target function hands back to the parent on success: raw
/// bytes plus zero or more file descriptors (e.g. a socket created inside a
/// namespace the parent cannot enter directly).
pub struct ChildResult {
    pub payload: Vec<u8>,
    pub fds: Vec<OwnedFd>,
}

impl ChildResult {
    pub fn bytes(payload: Vec<u8>) -> Self {
        ChildResult { payload, fds: Vec::new() }
    }

    pub fn fd(fd: OwnedFd) -> Self {
        ChildResult { payload: Vec::new(), fds: vec![fd] }
    }
}

/// What a child target function raises on failure. The parent reconstructs
/// this as [`Error::ChildException`] rather than a matching concrete type —
/// there is no exception-class registry to walk on this side, unlike the
/// source's `getattr(builtins, ...)` fallback chain.
#[derive(Debug, Clone)]
pub struct ChildError {
    pub exception: String,
    pub options: Vec<String>,
}

impl ChildError {
    pub fn new(exception: impl Into<String>, options: Vec<String>) -> Self {
        ChildError { exception: exception.into(), options }
    }

    pub fn from_io(err: std::io::Error) -> Self {
        ChildError::new("OSError", vec![err.to_string()])
    }
}

type ChildFn = Box<dyn FnOnce() -> std::result::Result<ChildResult, ChildError>>;

/// A running (or stopped) forked child plus its control socket.
pub struct ChildProcess {
    ctrl: OwnedFd,
    pid: libc::pid_t,
    running: bool,
}

impl ChildProcess {
    /// Forks and runs `target` in the child. `target` must restrict itself
    /// to simple, locally-owned state: the child is a raw `fork()`, sharing
    /// no locks or runtime state with the parent's tokio reactor.
    pub fn spawn(target: ChildFn) -> Result<Self> {
        let (parent_end, child_end) = socketpair()?;
        match unsafe { libc::fork() } {
            -1 => Err(std::io::Error::last_os_error().into()),
            0 => {
                drop(parent_end);
                child_main(child_end, target);
                unsafe { libc::_exit(0) };
            }
            pid => {
                drop(child_end);
                Ok(ChildProcess { ctrl: parent_end, pid, running: true })
            }
        }
    }

    /// Waits up to `timeout` for the child's single control message,
    /// returning its payload and any passed descriptors. Kills the child and
    /// returns `Error::Timeout` if nothing arrives in time.
    pub fn communicate(&mut self, timeout: Duration) -> Result<(Vec<u8>, Vec<OwnedFd>)> {
        if !self.running {
            return Err(Error::Child("process already stopped".into()));
        }
        if !poll_readable(self.ctrl.as_raw_fd(), timeout)? {
            self.stop(true, Some("no response from the child"));
            return Err(Error::Timeout("no response from the child".into()));
        }
        let (raw, fds) = recv_with_fds(self.ctrl.as_raw_fd(), 64 * 1024, 16)?;
        self.reap();
        decode_reply(raw, fds)
    }

    /// Convenience over [`communicate`] for targets that only return bytes.
    pub fn get_data(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        Ok(self.communicate(timeout)?.0)
    }

    /// Convenience over [`communicate`] for targets that return exactly one
    /// descriptor (the common case: "create this socket in namespace X").
    pub fn get_fd(&mut self, timeout: Duration) -> Result<OwnedFd> {
        let (_, mut fds) = self.communicate(timeout)?;
        fds.pop().ok_or_else(|| Error::Child("child returned no file descriptor".into()))
    }

    fn reap(&mut self) {
        if !self.running {
            return;
        }
        let mut status = 0;
        unsafe { libc::waitpid(self.pid, &mut status, 0) };
        self.running = false;
    }

    /// Kills (or terminates) the child and reaps it, logging `reason`.
    pub fn stop(&mut self, kill: bool, reason: Option<&str>) {
        if !self.running {
            return;
        }
        let signal = if kill { libc::SIGKILL } else { libc::SIGTERM };
        unsafe { libc::kill(self.pid, signal) };
        self.reap();
        if let Some(reason) = reason {
            log::warn!("{reason}");
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        self.stop(false, None);
    }
}

/// Forks a child that enters `nsname` via [`crate::netns::setns`] and opens
/// a socket there, returning its fd to the parent. The primary entry point
/// real netns utilities use — a kernel socket can only be created with
/// `AF_NETLINK`/`AF_INET` scoped to the namespace it's opened in.
pub fn create_socket_in_netns(
    nsname: &str,
    domain: libc::c_int,
    sock_type: libc::c_int,
    protocol: libc::c_int,
) -> Result<OwnedFd> {
    let nsname = nsname.to_string();
    let mut child = ChildProcess::spawn(Box::new(move || {
        crate::netns::setns(&nsname).map_err(|e| ChildError::new("RuntimeError", vec![e.to_string()]))?;
        let fd = unsafe { libc::socket(domain, sock_type, protocol) };
        if fd < 0 {
            return Err(ChildError::from_io(std::io::Error::last_os_error()));
        }
        Ok(ChildResult::fd(unsafe { OwnedFd::from_raw_fd(fd) }))
    }))?;
    child.get_fd(Duration::from_secs(1))
}

fn child_main(ctrl: OwnedFd, target: ChildFn) {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(target));
    let (mut payload, fds): (Vec<u8>, Vec<RawFd>) = match outcome {
        Ok(Ok(ChildResult { payload, fds })) => {
            let mut buf = vec![RESULT_DATA];
            buf.extend(payload);
            let fds = fds
                .into_iter()
                .map(|owned| {
                    let raw = owned.as_raw_fd();
                    mem::forget(owned);
                    raw
                })
                .collect();
            (buf, fds)
        }
        Ok(Err(err)) => (encode_exception(&err.exception, &err.options), Vec::new()),
        Err(_) => (encode_exception("PanicError", &["child process panicked".to_string()]), Vec::new()),
    };
    if payload.is_empty() {
        payload.push(RESULT_DATA);
    }
    let _ = send_with_fds(ctrl.as_raw_fd(), &payload, &fds);
}

fn encode_exception(exception: &str, options: &[String]) -> Vec<u8> {
    let json = serde_json::json!({ "exception": exception, "options": options });
    let mut buf = vec![RESULT_EXCEPTION];
    buf.extend(json.to_string().into_bytes());
    buf
}

fn decode_reply(raw: Vec<u8>, fds: Vec<OwnedFd>) -> Result<(Vec<u8>, Vec<OwnedFd>)> {
    let (kind, body) = raw.split_first().ok_or_else(|| Error::Child("empty control message".into()))?;
    match *kind {
        RESULT_EXCEPTION => {
            let value: serde_json::Value =
                serde_json::from_slice(body).map_err(|e| Error::Child(format!("malformed exception payload: {e}")))?;
            let exception = value.get("exception").and_then(|v| v.as_str()).unwrap_or("Exception").to_string();
            let options: Vec<String> = value
                .get("options")
                .and_then(|v| v.as_array())
                .map(|items| items.iter().map(|v| v.as_str().unwrap_or_default().to_string()).collect())
                .unwrap_or_default();
            Err(Error::ChildException { exception, message: options.join(", ") })
        }
        RESULT_DATA => Ok((body.to_vec(), fds)),
        other => Err(Error::Child(format!("unsupported reply kind {other}"))),
    }
}

fn socketpair() -> Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0i32; 2];
    let ret = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_DGRAM, 0, fds.as_mut_ptr()) };
    if ret < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok((unsafe { OwnedFd::from_raw_fd(fds[0]) }, unsafe { OwnedFd::from_raw_fd(fds[1]) }))
}

fn poll_readable(fd: RawFd, timeout: Duration) -> Result<bool> {
    let mut pfd = libc::pollfd { fd, events: libc::POLLIN, revents: 0 };
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    let ret = unsafe { libc::poll(&mut pfd as *mut _, 1, millis) };
    if ret < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(ret > 0 && (pfd.revents & libc::POLLIN) != 0)
}

fn send_with_fds(fd: RawFd, data: &[u8], fds: &[RawFd]) -> Result<()> {
    let mut iov = libc::iovec { iov_base: data.as_ptr() as *mut libc::c_void, iov_len: data.len() };
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;

    let mut cmsg_buf;
    if !fds.is_empty() {
        let space = unsafe { libc::CMSG_SPACE((fds.len() * mem::size_of::<RawFd>()) as u32) } as usize;
        cmsg_buf = vec![0u8; space];
        msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
        msg.msg_controllen = space as _;
        unsafe {
            let cmsg = libc::CMSG_FIRSTHDR(&msg as *const _);
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = libc::SCM_RIGHTS;
            (*cmsg).cmsg_len = libc::CMSG_LEN((fds.len() * mem::size_of::<RawFd>()) as u32) as _;
            std::ptr::copy_nonoverlapping(fds.as_ptr(), libc::CMSG_DATA(cmsg) as *mut RawFd, fds.len());
        }
    }

    let ret = unsafe { libc::sendmsg(fd, &msg, 0) };
    if ret < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

fn recv_with_fds(fd: RawFd, max_len: usize, max_fds: usize) -> Result<(Vec<u8>, Vec<OwnedFd>)> {
    let mut buf = vec![0u8; max_len];
    let mut iov = libc::iovec { iov_base: buf.as_mut_ptr() as *mut libc::c_void, iov_len: buf.len() };
    let cmsg_space = unsafe { libc::CMSG_SPACE((max_fds * mem::size_of::<RawFd>()) as u32) } as usize;
    let mut cmsg_buf = vec![0u8; cmsg_space];
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg_buf.as_mut_ptr() as *mut libc::c_void;
    msg.msg_controllen = cmsg_space as _;

    let n = unsafe { libc::recvmsg(fd, &mut msg, 0) };
    if n < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    buf.truncate(n as usize);

    let mut fds = Vec::new();
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg as *const _);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                let header_len = libc::CMSG_LEN(0) as usize;
                let data_len = (*cmsg).cmsg_len as usize - header_len;
                let count = data_len / mem::size_of::<RawFd>();
                let data_ptr = libc::CMSG_DATA(cmsg) as *const RawFd;
                for i in 0..count {
                    fds.push(OwnedFd::from_raw_fd(*data_ptr.add(i)));
                }
            }
            cmsg = libc::CMSG_NXTHDR(&msg as *const _, cmsg as *const _);
        }
    }
    Ok((buf, fds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_reply_round_trips_through_fork() {
        let mut child = ChildProcess::spawn(Box::new(|| Ok(ChildResult::bytes(b"hello".to_vec())))).unwrap();
        let (data, fds) = child.communicate(Duration::from_secs(2)).unwrap();
        assert_eq!(data, b"hello");
        assert!(fds.is_empty());
    }

    #[test]
    fn exception_reply_becomes_child_exception_error() {
        let mut child = ChildProcess::spawn(Box::new(|| {
            Err(ChildError::new("ValueError", vec!["bad namespace".to_string()]))
        }))
        .unwrap();
        let result = child.communicate(Duration::from_secs(2));
        assert!(matches!(result, Err(Error::ChildException { ref exception, .. }) if exception == "ValueError"));
    }

    #[test]
    fn unresponsive_child_times_out() {
        let mut child = ChildProcess::spawn(Box::new(|| {
            std::thread::sleep(Duration::from_secs(5));
            Ok(ChildResult::bytes(Vec::new()))
        }))
        .unwrap();
        let result = child.communicate(Duration::from_millis(50));
        assert!(matches!(result, Err(Error::Timeout(_))));
    }
}

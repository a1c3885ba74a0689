//! Async core socket (C4): owns one kernel netlink socket, its message
//! queue, callbacks, and policy. Resources live thread-locally — each
//! thread that touches a shared `NetlinkSocket` handle transparently opens
//! its own kernel fd via [`ensure_socket`], so there is never cross-thread
//! sharing of mutable socket state.

use crate::netlink::error::{Error, Result};
use crate::netlink::marshal::{Marshal, NlMsg};
use crate::netlink::mux::MessageQueue;
use crate::rtnl::mock::MockEngine;
use async_io::Async;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::rc::Rc;
use std::sync::Arc;

/// What actually moves bytes: a real `AF_NETLINK` socket, or the in-process
/// mock engine used by the test suite (`config::ProcessConfig::mock_netlink`).
enum Transport {
    Real(Async<OwnedFdWrapper>),
    Mock(MockEngine),
}

struct OwnedFdWrapper(OwnedFd);

impl AsRawFd for OwnedFdWrapper {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl io::Read for &OwnedFdWrapper {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let ret = unsafe { libc::recv(self.0.as_raw_fd(), buf.as_mut_ptr() as *mut _, buf.len(), 0) };
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret as usize)
        }
    }
}

impl io::Write for &OwnedFdWrapper {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let ret = unsafe { libc::send(self.0.as_raw_fd(), buf.as_ptr() as *const _, buf.len(), 0) };
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret as usize)
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Netlink protocol families this crate speaks over `AF_NETLINK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Route,
    Netfilter,
    Generic,
}

impl Family {
    fn protocol(self) -> libc::c_int {
        match self {
            Family::Route => libc::NETLINK_ROUTE,
            Family::Netfilter => libc::NETLINK_NETFILTER,
            Family::Generic => libc::NETLINK_GENERIC,
        }
    }
}

type BroadcastCallback = Box<dyn FnMut(&NlMsg) + 'static>;

/// Callback registered via `register_callback`: runs synchronously on frame
/// arrival, before queue insertion, and must not block.
struct Subscriber {
    predicate: Box<dyn Fn(&NlMsg) -> bool>,
    callback: BroadcastCallback,
}

pub struct NetlinkSocket {
    transport: Transport,
    pub marshal: Arc<Marshal>,
    mux: MessageQueue,
    subscribers: Vec<Subscriber>,
    pid: u32,
    seq_pool: crate::netlink::request::SequencePool,
}

impl NetlinkSocket {
    pub fn open(family: Family) -> Result<Self> {
        if crate::config::get().mock_netlink {
            return Ok(NetlinkSocket {
                transport: Transport::Mock(MockEngine::new()),
                marshal: Arc::new(Marshal::new()),
                mux: MessageQueue::new(),
                subscribers: Vec::new(),
                pid: 0,
                seq_pool: crate::netlink::request::SequencePool::default(),
            });
        }

        let fd = unsafe {
            libc::socket(libc::AF_NETLINK, libc::SOCK_RAW | libc::SOCK_CLOEXEC, family.protocol())
        };
        if fd < 0 {
            return Err(Error::Resource(io::Error::last_os_error().to_string()));
        }
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };
        let async_fd = Async::new(OwnedFdWrapper(owned))
            .map_err(|e| Error::Resource(e.to_string()))?;

        Ok(NetlinkSocket {
            transport: Transport::Real(async_fd),
            marshal: Arc::new(Marshal::new()),
            mux: MessageQueue::new(),
            subscribers: Vec::new(),
            pid: std::process::id(),
            seq_pool: crate::netlink::request::SequencePool::default(),
        })
    }

    /// Builds a socket directly over a caller-seeded mock engine, bypassing
    /// the `mock_netlink` config check. Used by the crate-boundary test
    /// suite to preset a link/addr/route database before exercising the
    /// RTNL service layer.
    pub fn open_with_mock(engine: MockEngine) -> Self {
        NetlinkSocket {
            transport: Transport::Mock(engine),
            marshal: Arc::new(Marshal::new()),
            mux: MessageQueue::new(),
            subscribers: Vec::new(),
            pid: 0,
            seq_pool: crate::netlink::request::SequencePool::default(),
        }
    }

    pub fn allocate_seq(&mut self) -> u32 {
        self.seq_pool.allocate()
    }

    /// Bind to a netlink multicast groups mask (0 for none).
    pub fn bind(&mut self, groups: u32) -> Result<()> {
        match &self.transport {
            Transport::Mock(_) => Ok(()),
            Transport::Real(async_fd) => {
                let fd = async_fd.as_raw_fd();
                let mut addr: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
                addr.nl_family = libc::AF_NETLINK as u16;
                addr.nl_pid = self.pid;
                addr.nl_groups = groups;
                let ret = unsafe {
                    libc::bind(
                        fd,
                        &addr as *const _ as *const libc::sockaddr,
                        std::mem::size_of::<libc::sockaddr_nl>() as u32,
                    )
                };
                if ret < 0 {
                    return Err(Error::Resource(io::Error::last_os_error().to_string()));
                }
                Ok(())
            }
        }
    }

    pub fn register_policy(&self, msg_type: u16, class: crate::netlink::marshal::MessageClass) {
        self.marshal.register_policy(msg_type, class);
    }

    pub fn register_callback(
        &mut self,
        predicate: impl Fn(&NlMsg) -> bool + 'static,
        callback: impl FnMut(&NlMsg) + 'static,
    ) {
        self.subscribers.push(Subscriber { predicate: Box::new(predicate), callback: Box::new(callback) });
    }

    pub async fn send(&mut self, seq: u32, buf: &[u8]) -> Result<()> {
        self.mux.ensure_tag(seq);
        match &mut self.transport {
            Transport::Mock(engine) => {
                let replies = engine.handle(buf);
                for reply in replies {
                    self.route_frame(reply);
                }
                Ok(())
            }
            Transport::Real(async_fd) => {
                async_fd.write_with(|fd| io::Write::write_all(&mut &*fd, buf)).await.map_err(Error::Io)
            }
        }
    }

    /// Pump exactly one datagram off the kernel socket into the mux. The
    /// request engine's `get(seq)` drives this in a loop; there is no
    /// separate background reader task, matching the single-threaded
    /// cooperative model (the only suspension points are queue waits and
    /// socket reads).
    async fn pump_one(&mut self) -> Result<()> {
        match &mut self.transport {
            Transport::Mock(_) => Ok(()),
            Transport::Real(async_fd) => {
                let mut buf = vec![0u8; 64 * 1024];
                let n = async_fd
                    .read_with(|fd| io::Read::read(&mut &*fd, &mut buf))
                    .await
                    .map_err(Error::Io)?;
                buf.truncate(n);
                self.route_frame(buf);
                Ok(())
            }
        }
    }

    fn route_frame(&mut self, buf: Vec<u8>) {
        let msgs = self.marshal.parse(&buf, None, None);
        for msg in msgs {
            for sub in self.subscribers.iter_mut() {
                if (sub.predicate)(&msg) {
                    (sub.callback)(&msg);
                }
            }
            let mut raw = Vec::new();
            crate::netlink::wire::Header::encode(&msg.header, &mut raw);
            raw.extend_from_slice(&msg.body);
            self.mux.put_nowait(msg.header.seq, raw);
        }
    }

    /// Await the next buffer queued for `seq`, pumping the transport until
    /// one arrives (no-op pump for the mock transport, which enqueues
    /// synchronously from `send`).
    pub async fn get_one(&mut self, seq: u32) -> Result<Option<Vec<u8>>> {
        self.mux.ensure_tag(seq);
        loop {
            if let Some(item) = self.mux.try_get(seq) {
                return Ok(Some(item));
            }
            if matches!(self.transport, Transport::Mock(_)) {
                return Ok(None);
            }
            self.pump_one().await?;
        }
    }

    pub fn free_tag(&mut self, seq: u32) {
        self.mux.free_tag(seq);
    }

    pub fn close(&mut self) {
        self.mux.close();
    }
}

thread_local! {
    static SOCKETS: RefCell<HashMap<Family, Rc<RefCell<NetlinkSocket>>>> = RefCell::new(HashMap::new());
}

/// Lazily open (and cache) this thread's copy of the socket for `family`.
pub fn ensure_socket(family: Family) -> Result<Rc<RefCell<NetlinkSocket>>> {
    SOCKETS.with(|cell| {
        let mut map = cell.borrow_mut();
        if let Some(existing) = map.get(&family) {
            return Ok(existing.clone());
        }
        let socket = NetlinkSocket::open(family)?;
        let rc = Rc::new(RefCell::new(socket));
        map.insert(family, rc.clone());
        Ok(rc)
    })
}

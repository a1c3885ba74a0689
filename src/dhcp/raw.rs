//! The raw L2 socket (C7) the DHCP client sends and receives on: an
//! `AF_PACKET`/`SOCK_DGRAM` socket bound to one interface, with a classic
//! BPF filter installed so only DHCP-relevant frames ever reach userspace.
//!
//! Transport plumbing (`OwnedFdWrapper`, the `Async<...>` wrapper) mirrors
//! `netlink::socket`'s pattern for the same reason: a raw fd doesn't
//! implement `Read`/`Write` itself, so a thin wrapper bridges it to
//! `async-io`.

use crate::dhcp::bpf::{self, SockFilter, SockFprog};
use crate::dhcp::codec::DHCP_CLIENT_PORT;
use crate::dhcp::Error;
use async_io::Async;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

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

/// An `AF_PACKET` socket bound to one interface, filtered down to DHCP
/// client traffic. Not used when the process is running against the mock
/// transport (see `config::ProcessConfig::mock_netlink`, which also gates
/// this socket in the client).
pub struct RawSocket {
    fd: Async<OwnedFdWrapper>,
    ifindex: i32,
}

impl RawSocket {
    /// Opens the socket, installs a total-reject filter immediately (before
    /// `bind`, so nothing is queued while we set up), binds to the
    /// interface, drains whatever slipped in between `socket()` and the
    /// reject filter landing, then installs the real DHCP filter. This
    /// ordering exists so a burst of unrelated traffic on a busy interface
    /// never reaches userspace as a spurious wakeup.
    ///
    /// `vlan`, when given, restricts the filter to 802.1Q-tagged frames
    /// carrying that VID; without it only untagged frames match.
    pub fn open(ifname: &str, vlan: Option<u16>) -> Result<RawSocket, Error> {
        let ifindex = interface_index(ifname)?;

        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_DGRAM, (libc::ETH_P_IP as u16).to_be() as i32) };
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };

        attach_filter(owned.as_raw_fd(), &bpf::reject_all())?;

        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = (libc::ETH_P_IP as u16).to_be();
        addr.sll_ifindex = ifindex;
        let ret = unsafe {
            libc::bind(owned.as_raw_fd(), &addr as *const _ as *const libc::sockaddr, mem::size_of::<libc::sockaddr_ll>() as u32)
        };
        if ret < 0 {
            return Err(io::Error::last_os_error().into());
        }

        drain_until_would_block(owned.as_raw_fd());

        let filter = match vlan {
            Some(vid) => bpf::accept_udp_port_on_vlan(DHCP_CLIENT_PORT, vid),
            None => bpf::accept_udp_port(DHCP_CLIENT_PORT),
        };
        attach_filter(owned.as_raw_fd(), &filter)?;

        let async_fd = Async::new(OwnedFdWrapper(owned))?;
        Ok(RawSocket { fd: async_fd, ifindex })
    }

    pub fn ifindex(&self) -> i32 {
        self.ifindex
    }

    pub async fn send(&self, frame: &[u8]) -> Result<(), Error> {
        self.fd.write_with(|fd| io::Write::write_all(&mut &*fd, frame)).await?;
        Ok(())
    }

    pub async fn recv(&self) -> Result<Vec<u8>, Error> {
        let mut buf = vec![0u8; 2048];
        let n = self.fd.read_with(|fd| io::Read::read(&mut &*fd, &mut buf)).await?;
        buf.truncate(n);
        Ok(buf)
    }
}

fn attach_filter(fd: RawFd, program: &[SockFilter]) -> Result<(), Error> {
    let fprog = SockFprog { len: program.len() as u16, filter: program.as_ptr() };
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ATTACH_FILTER,
            &fprog as *const _ as *const libc::c_void,
            mem::size_of::<SockFprog>() as u32,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(())
}

fn drain_until_would_block(fd: RawFd) {
    let mut buf = [0u8; 2048];
    loop {
        let ret = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut _, buf.len(), libc::MSG_DONTWAIT) };
        if ret < 0 {
            break; // EAGAIN/EWOULDBLOCK: nothing left queued
        }
    }
}

fn interface_index(ifname: &str) -> Result<i32, Error> {
    let cname = std::ffi::CString::new(ifname).map_err(|_| Error::Resource("interface name contains a NUL byte".into()))?;
    let index = unsafe { libc::if_nametoindex(cname.as_ptr()) };
    if index == 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(index as i32)
}

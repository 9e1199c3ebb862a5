use std::ffi::CStr;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use tracing::{debug, warn};

use super::decode::{RTNLGRP_LINK, stats_dump_request};
use super::{Batch, NameResolver, StatsTransport, decode_datagram};
use crate::error::TransportError;

/// Large enough for a full rtnetlink dump datagram; the kernel caps those at
/// 32 KiB unless the reader asks for more.
const RECV_BUF_SIZE: usize = 64 * 1024;

/// Live rtnetlink transport: one socket for stats dumps, one subscribed to
/// the link multicast group. Both are non-blocking and close on drop.
pub struct NetlinkTransport {
    request: Option<OwnedFd>,
    events: Option<OwnedFd>,
    seq: u32,
    buf: Vec<u8>,
}

impl NetlinkTransport {
    /// Open both channels. Any failure here is fatal for the collector.
    pub fn open() -> Result<Self, TransportError> {
        let request = open_socket("request")?;
        let events = open_socket("event")?;
        add_membership(&events, RTNLGRP_LINK)?;

        debug!(
            request_fd = request.as_raw_fd(),
            event_fd = events.as_raw_fd(),
            "netlink channels open"
        );

        Ok(Self {
            request: Some(request),
            events: Some(events),
            seq: 0,
            buf: vec![0; RECV_BUF_SIZE],
        })
    }
}

// ── socket helpers ──────────────────────────────────────────────────────

fn kernel_addr() -> libc::sockaddr_nl {
    // SAFETY: sockaddr_nl is plain old data; all-zero is a valid value.
    let mut addr: libc::sockaddr_nl = unsafe { mem::zeroed() };
    addr.nl_family = libc::AF_NETLINK as libc::sa_family_t;
    addr
}

fn open_socket(channel: &'static str) -> Result<OwnedFd, TransportError> {
    // SAFETY: plain socket(2) call; the result is checked before use.
    let raw = unsafe {
        libc::socket(
            libc::AF_NETLINK,
            libc::SOCK_RAW | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
            libc::NETLINK_ROUTE,
        )
    };
    if raw < 0 {
        return Err(TransportError::Socket { channel, source: io::Error::last_os_error() });
    }
    // SAFETY: `raw` was just returned by socket(2) and is owned by nobody else.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    // nl_pid 0 lets the kernel assign the port id.
    let addr = kernel_addr();
    // SAFETY: addr is a valid sockaddr_nl and the length matches its size.
    let rc = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(TransportError::Bind { channel, source: io::Error::last_os_error() });
    }
    Ok(fd)
}

fn add_membership(fd: &OwnedFd, group: u32) -> Result<(), TransportError> {
    let group = group as libc::c_int;
    // SAFETY: option value points at a live c_int of the declared size.
    let rc = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_NETLINK,
            libc::NETLINK_ADD_MEMBERSHIP,
            &group as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(TransportError::Subscribe(io::Error::last_os_error()));
    }
    Ok(())
}

/// Read datagrams until the socket would block.
fn drain(fd: Option<&OwnedFd>, buf: &mut [u8], channel: &'static str) -> Batch {
    let mut batch = Batch::default();
    let Some(fd) = fd else {
        return batch;
    };

    loop {
        // SAFETY: buf is a live, writable slice of buf.len() bytes.
        let n = unsafe {
            libc::recv(fd.as_raw_fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => break,
                io::ErrorKind::Interrupted => continue,
                _ if err.raw_os_error() == Some(libc::ENOBUFS) => {
                    // Socket stays usable; queued notifications were lost.
                    warn!(channel, "netlink receive queue overrun, messages lost");
                    continue;
                }
                _ => {
                    let err = TransportError::Recv { channel, source: err };
                    warn!(error = %err, "ending drain");
                    break;
                }
            }
        }
        if n == 0 {
            break;
        }
        let len = (n as usize).min(buf.len());
        decode_datagram(&buf[..len], channel, &mut batch);
    }
    batch
}

// ── trait implementation ────────────────────────────────────────────────

impl StatsTransport for NetlinkTransport {
    fn request_stats_dump(&mut self) -> Result<(), TransportError> {
        let Some(fd) = self.request.as_ref() else {
            return Err(TransportError::Send(io::Error::from(io::ErrorKind::NotConnected)));
        };

        self.seq = self.seq.wrapping_add(1);
        let msg = stats_dump_request(self.seq);
        let addr = kernel_addr();
        // SAFETY: msg and addr outlive the call; lengths match the buffers.
        let sent = unsafe {
            libc::sendto(
                fd.as_raw_fd(),
                msg.as_ptr() as *const libc::c_void,
                msg.len(),
                0,
                &addr as *const libc::sockaddr_nl as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_nl>() as libc::socklen_t,
            )
        };
        if sent < 0 {
            return Err(TransportError::Send(io::Error::last_os_error()));
        }
        if sent as usize != msg.len() {
            return Err(TransportError::ShortSend { sent: sent as usize, expected: msg.len() });
        }
        Ok(())
    }

    fn drain_request_channel(&mut self) -> Batch {
        drain(self.request.as_ref(), &mut self.buf, "request")
    }

    fn drain_event_channel(&mut self) -> Batch {
        drain(self.events.as_ref(), &mut self.buf, "event")
    }

    fn event_fd(&self) -> Option<RawFd> {
        self.events.as_ref().map(|fd| fd.as_raw_fd())
    }

    fn close(&mut self) {
        if self.request.take().is_some() | self.events.take().is_some() {
            debug!("netlink channels closed");
        }
    }
}

// ── name resolution ─────────────────────────────────────────────────────

/// Resolves names through if_indextoname(3).
#[derive(Clone, Copy, Debug, Default)]
pub struct IfNameResolver;

impl NameResolver for IfNameResolver {
    fn resolve(&self, index: u32) -> Option<String> {
        let mut buf = [0 as libc::c_char; libc::IF_NAMESIZE];
        // SAFETY: buf holds IF_NAMESIZE bytes as if_indextoname requires.
        let ptr = unsafe { libc::if_indextoname(index, buf.as_mut_ptr()) };
        if ptr.is_null() {
            return None;
        }
        // SAFETY: on success the kernel wrote a NUL-terminated name into buf.
        let name = unsafe { CStr::from_ptr(ptr) };
        Some(name.to_string_lossy().into_owned())
    }
}

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};
use std::{io, mem};

use crate::Result;
use crate::error::errno;
use crate::protocol::headers::EthernetHeader;

/// Largest frame read from the socket: a maximum-length IPv4 datagram plus
/// the Ethernet header. Offloaded receives can coalesce segments into frames
/// well beyond the MTU.
pub const FRAME_SIZE: usize = EthernetHeader::HEADER_LEN + u16::MAX as usize;

/// A Linux `AF_PACKET` socket bound to one interface, exchanging whole
/// Ethernet frames with the kernel.
///
/// Opening one requires the `CAP_NET_RAW` privilege.
#[derive(Debug)]
pub struct RawSocket {
    fd: OwnedFd,
    ifindex: i32,
}

impl RawSocket {
    /// Opens a packet socket receiving every protocol on the interface with
    /// index `ifindex`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be created or bound, typically
    /// because the process lacks `CAP_NET_RAW`.
    pub fn bind(ifindex: i32) -> Result<Self> {
        let protocol = (libc::ETH_P_ALL as u16).to_be();

        let raw = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, protocol as i32) };
        if raw == -1 {
            return Err(errno!("failed to open packet socket"));
        }

        // SAFETY: `raw` is a freshly opened descriptor owned by nothing else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = protocol;
        addr.sll_ifindex = ifindex;

        let res = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if res == -1 {
            return Err(errno!("failed to bind packet socket to interface {ifindex}"));
        }

        Ok(Self { fd, ifindex })
    }

    /// Returns the index of the bound interface.
    pub fn ifindex(&self) -> i32 {
        self.ifindex
    }

    /// Sends one complete Ethernet frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel rejects the frame.
    pub fn send(&self, frame: &[u8]) -> Result<usize> {
        let n = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
            )
        };
        if n == -1 {
            return Err(errno!("failed to send frame"));
        }

        Ok(n as usize)
    }

    /// Waits up to `timeout` for one frame and copies it into `buf`.
    ///
    /// Returns `Ok(None)` if nothing arrived in time. Frames longer than
    /// `buf` are truncated.
    ///
    /// # Errors
    ///
    /// Returns an error if polling or reading the socket fails.
    pub fn recv(&self, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if !self.poll_readable(remaining)? {
                return Ok(None);
            }

            let n = unsafe {
                libc::recv(
                    self.fd.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    libc::MSG_DONTWAIT,
                )
            };

            if n >= 0 {
                return Ok(Some(n as usize));
            }

            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => continue,
                _ => return Err(errno!("failed to receive frame")),
            }
        }
    }

    fn poll_readable(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            // Round up so a sub-millisecond wait does not become a busy spin.
            let millis = remaining.as_micros().div_ceil(1000).min(i32::MAX as u128) as i32;

            let mut pfd = libc::pollfd {
                fd: self.fd.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };

            match unsafe { libc::poll(&mut pfd, 1, millis) } {
                -1 => {
                    if io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
                        continue;
                    }
                    return Err(errno!("failed to poll packet socket"));
                }
                0 => return Ok(false),
                _ => return Ok(true),
            }
        }
    }
}

impl AsRawFd for RawSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

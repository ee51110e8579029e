//! Unreliable datagram delivery between a fixed pair of IPv4 hosts, built from
//! a raw packet socket, Ethernet framing with ARP, and IPv4.

use std::time::Duration;

use crate::Result;

mod ethernet;
mod iface;
mod ip;
mod raw_socket;

pub use ethernet::{EthernetLink, FrameDevice};
pub use iface::{Interface, Route, default_route, parse_route_table};
pub use ip::IpLink;
pub use raw_socket::{FRAME_SIZE, RawSocket};

/// Best-effort delivery of datagram payloads to and from one remote host.
///
/// No ordering, delivery, or duplicate guarantees are given. Payloads handed
/// out by [DatagramLink::accept] have passed the network layer's own checks.
#[cfg_attr(test, mockall::automock)]
pub trait DatagramLink {
    /// Sends one datagram carrying `payload` to the remote host.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying link is unusable.
    fn deliver(&mut self, payload: &[u8]) -> Result<()>;

    /// Waits up to `timeout` for the next datagram from the remote host.
    ///
    /// Returns `Ok(None)` if the wait elapsed without one arriving.
    fn accept(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

impl<L: DatagramLink + ?Sized> DatagramLink for &mut L {
    fn deliver(&mut self, payload: &[u8]) -> Result<()> {
        (**self).deliver(payload)
    }

    fn accept(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        (**self).accept(timeout)
    }
}

//! Segment-level view of the datagram link for one connection.

use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::{Segment, Socket, Tcb};
use crate::error::Abort;
use crate::link::DatagramLink;
use crate::{Error, Result};

/// Sends and receives the segments of one connection over a datagram link.
#[derive(Debug)]
pub struct Channel<L> {
    link: L,
    sock: Socket,
}

impl<L: DatagramLink> Channel<L> {
    /// Wraps `link` for the connection identified by `sock`.
    pub fn new(link: L, sock: Socket) -> Self {
        Self { link, sock }
    }

    /// Returns the underlying link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Returns the underlying link mutably.
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Consumes the channel, returning the underlying link.
    pub fn into_inner(self) -> L {
        self.link
    }

    /// Encodes and delivers one segment.
    pub fn transmit(&mut self, segment: &Segment) -> Result<()> {
        debug!(
            "[{}] sent {} with {} bytes of payload",
            self.sock,
            segment.tcp,
            segment.payload_len()
        );

        self.link.deliver(&segment.encode())
    }

    /// Waits until `deadline` for the next segment of this connection.
    ///
    /// Segments failing their checksum are dropped as if never received, and
    /// segments for another port pair are ignored. Every accepted segment
    /// refreshes the peer's advertised window.
    ///
    /// Returns `Ok(None)` once the deadline passes.
    ///
    /// # Errors
    ///
    /// Returns [Abort::Reset] if the peer resets the connection, or an I/O
    /// error from the link.
    pub fn recv_segment(&mut self, tcb: &mut Tcb, deadline: Instant) -> Result<Option<Segment>> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());

            if remaining.is_zero() {
                return Ok(None);
            }

            let Some(datagram) = self.link.accept(remaining)? else {
                return Ok(None);
            };

            let segment = match Segment::decode(&datagram, self.sock.dst.addr, self.sock.src.addr)
            {
                Ok(segment) => segment,
                Err(Error::Parse(err)) => {
                    warn!("[{}] dropped segment: {}", self.sock, err);
                    continue;
                }
                Err(err) => return Err(err),
            };

            if segment.tcp.src_port() != self.sock.dst.port
                || segment.tcp.dst_port() != self.sock.src.port
            {
                trace!(
                    "[{}] ignored segment for ports {} -> {}",
                    self.sock,
                    segment.tcp.src_port(),
                    segment.tcp.dst_port()
                );
                continue;
            }

            debug!(
                "[{}] received {} with {} bytes of payload",
                self.sock,
                segment.tcp,
                segment.payload_len()
            );

            if segment.tcp.rst() {
                tcb.transition(super::ConnectionState::CLOSED, "received RST");
                return Err(Error::Aborted(Abort::Reset));
            }

            tcb.awnd = segment.tcp.window();

            return Ok(Some(segment));
        }
    }

    /// Waits up to `timeout` for a segment satisfying `accept`, discarding
    /// any other segment that arrives meanwhile.
    pub fn await_segment<F>(
        &mut self,
        tcb: &mut Tcb,
        timeout: Duration,
        mut accept: F,
    ) -> Result<Option<Segment>>
    where
        F: FnMut(&Segment) -> bool,
    {
        let deadline = Instant::now() + timeout;

        while let Some(segment) = self.recv_segment(tcb, deadline)? {
            if accept(&segment) {
                return Ok(Some(segment));
            }

            trace!("[{}] ({}) skipped {}", self.sock, tcb.state, segment.tcp);
        }

        Ok(None)
    }
}

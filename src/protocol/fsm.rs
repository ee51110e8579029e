//! Connection record and lifecycle states of the single client connection.

use std::collections::VecDeque;
use std::fmt;

use super::{Segment, Socket};
use crate::config::TcpConfig;

/// Lifecycle phases of the client connection.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[allow(non_camel_case_types)]
#[allow(clippy::upper_case_acronyms)]
pub enum ConnectionState {
    /// Nothing has been sent yet.
    INIT,
    /// Represents waiting for a matching `SYN_ACK` after having sent a `SYN`.
    SYN_SENT,
    /// Represents an open connection. The normal state for the data transfer
    /// phase of the connection.
    ESTABLISHED,
    /// Represents waiting for the peer's `FIN_ACK` after having sent a `FIN`.
    FIN_SENT,
    /// The peer's `FIN` was acknowledged but its final `ACK` has not arrived.
    CLOSE_WAIT,
    /// Represents no connection state at all.
    CLOSED,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A transmitted segment awaiting acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    /// The acknowledgment number that covers the segment.
    pub ack: u32,
    /// The transmitted segment.
    pub segment: Segment,
}

/// Outstanding segments in transmission order, keyed by the acknowledgment
/// number that covers each of them.
#[derive(Debug, Default, Clone)]
pub struct UnackedSet {
    entries: VecDeque<InFlight>,
}

impl UnackedSet {
    /// Records a transmitted segment. A segment with the same expected
    /// acknowledgment replaces the previous entry in place.
    pub fn insert(&mut self, segment: Segment) {
        let ack = segment.expected_ack();

        match self.entries.iter_mut().find(|entry| entry.ack == ack) {
            Some(entry) => entry.segment = segment,
            None => self.entries.push_back(InFlight { ack, segment }),
        }
    }

    /// Returns `true` if some outstanding segment is covered by exactly `ack`.
    pub fn contains(&self, ack: u32) -> bool {
        self.entries.iter().any(|entry| entry.ack == ack)
    }

    /// Removes every entry covered by the cumulative acknowledgment `ack`,
    /// returning them in transmission order.
    pub fn retire(&mut self, ack: u32) -> Vec<InFlight> {
        let (retired, kept): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|entry| wrapping_le(entry.ack, ack));

        self.entries = kept.into();
        retired
    }

    /// Removes and returns all outstanding segments in transmission order.
    pub fn drain(&mut self) -> Vec<Segment> {
        self.entries.drain(..).map(|entry| entry.segment).collect()
    }

    /// Returns the number of outstanding segments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no segment is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over outstanding segments in transmission order.
    pub fn iter(&self) -> impl Iterator<Item = &InFlight> {
        self.entries.iter()
    }
}

/// Transmission Control Block (TCB).
///
/// The whole mutable session record of the connection. It is owned by one
/// socket and threaded explicitly through the handshake and the send and
/// receive engines.
#[derive(Debug)]
pub struct Tcb {
    /// Current state of the TCP connection.
    pub state: ConnectionState,
    /// Socket addresses of the local and remote TCPs.
    pub sock: Socket,
    /// Initial send sequence number.
    pub iss: u32,
    /// Sequence number of the next unacknowledged byte we send.
    pub seq: u32,
    /// Initial receive sequence number, taken from the peer's `SYN`.
    pub irs: u32,
    /// Next sequence number expected from the peer.
    pub ack: u32,
    /// Congestion window, in segments.
    pub cwnd: usize,
    /// Window most recently advertised by the peer, in bytes.
    pub awnd: u16,
    /// Largest payload we put into one segment.
    pub mss: u16,
    /// Segments waiting for window admission, in transmission order.
    pub send_queue: VecDeque<Segment>,
    /// Segments transmitted but not yet acknowledged.
    pub unacked: UnackedSet,
    /// Contiguous bytes received from the peer, not yet read by the
    /// application.
    pub rcv_buf: VecDeque<u8>,
    /// Payload-bearing segments from the peer that arrived while our own data
    /// was still being acknowledged.
    pub early: Vec<Segment>,
    max_cwnd: usize,
}

impl Tcb {
    /// Creates the record of a connection that has not been opened yet.
    pub fn new(sock: Socket, iss: u32, config: &TcpConfig) -> Self {
        Self {
            state: ConnectionState::INIT,
            sock,
            iss,
            seq: iss,
            irs: 0,
            ack: 0,
            cwnd: 1,
            awnd: 0,
            mss: config.mss,
            send_queue: VecDeque::new(),
            unacked: UnackedSet::default(),
            rcv_buf: VecDeque::new(),
            early: Vec::new(),
            max_cwnd: config.max_cwnd,
        }
    }

    /// Returns `true` once the connection has been torn down.
    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::CLOSED
    }

    /// Returns the number of bytes that may currently be put in flight:
    /// `min(cwnd * MSS, awnd)`.
    pub fn admissible_window(&self) -> usize {
        (self.cwnd * self.mss as usize).min(self.awnd as usize)
    }

    /// Grows the congestion window by one segment, up to its cap.
    pub fn grow_cwnd(&mut self) {
        self.cwnd = (self.cwnd + 1).min(self.max_cwnd);
    }

    /// Collapses the congestion window to one segment.
    pub fn reset_cwnd(&mut self) {
        self.cwnd = 1;
    }

    /// Moves the connection to `to`, logging the transition.
    pub fn transition(&mut self, to: ConnectionState, event: &str) {
        tracing::debug!(
            "[{}] ({}) {}: {} -> {}",
            self.sock,
            self.state,
            event,
            self.state,
            to
        );

        self.state = to;
    }
}

/// Returns `true` if `lhs` precedes `rhs` in sequence space.
#[inline]
pub fn wrapping_lt(lhs: u32, rhs: u32) -> bool {
    // RFC 1323 (2.3)
    //
    // A sequence number is "old" if it lies within 2**31 bytes behind the
    // other, and "new" otherwise.
    lhs.wrapping_sub(rhs) > (1 << 31)
}

/// Returns `true` if `lhs` precedes or equals `rhs` in sequence space.
#[inline]
pub fn wrapping_le(lhs: u32, rhs: u32) -> bool {
    lhs == rhs || wrapping_lt(lhs, rhs)
}

/// Returns the signed distance from `base` to `seq` in sequence space.
#[inline]
pub fn seq_offset(seq: u32, base: u32) -> i64 {
    seq.wrapping_sub(base) as i32 as i64
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::protocol::SocketAddr;

    fn sock() -> Socket {
        Socket::new(
            SocketAddr::new(Ipv4Addr::new(10, 0, 0, 2), 40000),
            SocketAddr::new(Ipv4Addr::new(10, 0, 0, 1), 80),
        )
    }

    fn data(seq: u32, len: usize) -> Segment {
        Segment::psh_ack(&sock(), seq, 0, 29200, &vec![b'x'; len])
    }

    #[test]
    fn unacked_set_keeps_transmission_order() {
        let mut unacked = UnackedSet::default();
        unacked.insert(data(100, 10));
        unacked.insert(data(110, 10));
        unacked.insert(data(120, 5));

        assert_eq!(unacked.len(), 3);
        assert!(unacked.contains(120));
        assert!(unacked.contains(125));
        assert!(!unacked.contains(100));

        let seqs: Vec<_> = unacked.drain().iter().map(Segment::seq_number).collect();
        assert_eq!(seqs, vec![100, 110, 120]);
        assert!(unacked.is_empty());
    }

    #[test]
    fn unacked_set_retire_is_cumulative() {
        let mut unacked = UnackedSet::default();
        unacked.insert(data(100, 10));
        unacked.insert(data(110, 10));
        unacked.insert(data(120, 10));

        let retired = unacked.retire(120);

        assert_eq!(retired.iter().map(|e| e.ack).collect::<Vec<_>>(), vec![110, 120]);
        assert_eq!(unacked.len(), 1);
        assert!(unacked.contains(130));

        // An ack below every key retires nothing.
        assert!(unacked.retire(90).is_empty());
    }

    #[test]
    fn unacked_set_retire_across_wraparound() {
        let mut unacked = UnackedSet::default();
        unacked.insert(data(u32::MAX - 4, 10));
        unacked.insert(data(5, 10));

        let retired = unacked.retire(5);

        assert_eq!(retired.len(), 1);
        assert!(unacked.contains(15));
    }

    #[test]
    fn unacked_set_replaces_same_key() {
        let mut unacked = UnackedSet::default();
        unacked.insert(data(100, 10));
        unacked.insert(data(100, 10));

        assert_eq!(unacked.len(), 1);
    }

    #[test]
    fn tcb_window_and_congestion() {
        let config = TcpConfig {
            max_cwnd: 3,
            ..Default::default()
        };
        let mut tcb = Tcb::new(sock(), 0, &config);
        tcb.awnd = 29200;

        assert_eq!(tcb.admissible_window(), 1460);

        tcb.grow_cwnd();
        tcb.grow_cwnd();
        tcb.grow_cwnd();
        assert_eq!(tcb.cwnd, 3);
        assert_eq!(tcb.admissible_window(), 3 * 1460);

        tcb.awnd = 2000;
        assert_eq!(tcb.admissible_window(), 2000);

        tcb.reset_cwnd();
        assert_eq!(tcb.cwnd, 1);
        assert_eq!(tcb.admissible_window(), 1460);
    }

    #[test]
    fn wrapping_comparisons() {
        assert!(wrapping_lt(1, 2));
        assert!(!wrapping_lt(2, 1));
        assert!(!wrapping_lt(5, 5));
        assert!(wrapping_le(5, 5));
        assert!(wrapping_lt(u32::MAX, 0));
        assert_eq!(seq_offset(5, u32::MAX - 4), 10);
        assert_eq!(seq_offset(100, 110), -10);
    }
}

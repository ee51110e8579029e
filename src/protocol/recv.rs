//! Reassembly of the peer's byte stream and the passive close that ends it.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::fsm::{ConnectionState, Tcb, seq_offset};
use super::{Channel, Segment};
use crate::config::TcpConfig;
use crate::error::Abort;
use crate::link::DatagramLink;
use crate::{Error, Result};

/// Number of waits for the peer's final `ACK` after our `FIN_ACK`.
const MAX_FINAL_ACK_WAITS: usize = 2;

/// Where a received segment falls relative to the next expected byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Starts before the next expected byte; already applied.
    Duplicate,
    /// Starts exactly at the next expected byte.
    Ordered,
    /// Starts past the next expected byte; a gap precedes it.
    OutOfOrder,
}

/// An out-of-order segment held until the gap before it closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    /// Payload of the segment.
    pub payload: Vec<u8>,
    /// Whether the segment also carried the peer's `FIN`.
    pub fin: bool,
}

/// Drains the peer's response into the receive buffer until the peer closes.
///
/// Offsets are relative to the acknowledgment number at the time the engine is
/// created, so the first response byte sits at offset zero.
#[derive(Debug)]
pub struct ReceiveEngine<'a, L> {
    tcb: &'a mut Tcb,
    chan: &'a mut Channel<L>,
    config: &'a TcpConfig,
    init: u32,
    pending: BTreeMap<u32, Pending>,
}

impl<'a, L: DatagramLink> ReceiveEngine<'a, L> {
    /// Creates an engine expecting the peer's next byte at `tcb.ack`.
    pub fn new(tcb: &'a mut Tcb, chan: &'a mut Channel<L>, config: &'a TcpConfig) -> Self {
        let init = tcb.ack;

        Self {
            tcb,
            chan,
            config,
            init,
            pending: BTreeMap::new(),
        }
    }

    /// Receives segments until the peer's `FIN` has been handled.
    ///
    /// Segments kept by the send path are processed first.
    ///
    /// # Errors
    ///
    /// Returns [Abort::LinkSilent] if no segment arrives for the whole
    /// datagram timeout.
    pub fn run(&mut self) -> Result<()> {
        let early = std::mem::take(&mut self.tcb.early);

        for segment in early {
            if self.tcb.is_closed() {
                return Ok(());
            }

            self.on_segment(segment)?;
        }

        while !self.tcb.is_closed() {
            let deadline = Instant::now() + self.config.datagram_timeout;

            let Some(segment) = self.chan.recv_segment(self.tcb, deadline)? else {
                error!(
                    "[{}] ({}) nothing received for {:?}, giving up",
                    self.tcb.sock, self.tcb.state, self.config.datagram_timeout
                );

                self.tcb
                    .transition(ConnectionState::CLOSED, "peer went silent");

                return Err(Error::Aborted(Abort::LinkSilent));
            };

            self.on_segment(segment)?;
        }

        info!(
            "[{}] response complete: {} bytes received",
            self.tcb.sock,
            self.tcb.rcv_buf.len()
        );

        Ok(())
    }

    /// Classifies a segment by its sequence number against the next expected
    /// byte.
    pub fn classify(&self, seq: u32) -> Delivery {
        let offset = self.offset(seq);
        let expected = self.offset(self.tcb.ack);

        match offset.cmp(&expected) {
            std::cmp::Ordering::Less => Delivery::Duplicate,
            std::cmp::Ordering::Equal => Delivery::Ordered,
            std::cmp::Ordering::Greater => Delivery::OutOfOrder,
        }
    }

    /// Handles one received segment.
    pub fn on_segment(&mut self, segment: Segment) -> Result<()> {
        match self.classify(segment.seq_number()) {
            Delivery::Duplicate => {
                debug!(
                    "[{}] ({}) duplicate segment seq={} len={}",
                    self.tcb.sock,
                    self.tcb.state,
                    segment.seq_number(),
                    segment.payload_len()
                );
            }
            Delivery::OutOfOrder => {
                let offset = self.offset(segment.seq_number()) as u32;

                debug!(
                    "[{}] ({}) out-of-order segment at offset {} (expected {})",
                    self.tcb.sock,
                    self.tcb.state,
                    offset,
                    self.offset(self.tcb.ack)
                );

                self.pending.insert(
                    offset,
                    Pending {
                        fin: segment.tcp.fin(),
                        payload: segment.payload,
                    },
                );
            }
            Delivery::Ordered => {
                let fin = segment.tcp.fin();
                self.apply(&segment.payload);

                if fin || self.drain_pending() {
                    return self.on_fin();
                }
            }
        }

        self.send_ack()
    }

    /// Returns the number of out-of-order segments held.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Appends in-order payload to the receive buffer.
    fn apply(&mut self, payload: &[u8]) {
        self.tcb.rcv_buf.extend(payload);
        self.tcb.ack = self.tcb.ack.wrapping_add(payload.len() as u32);
    }

    /// Applies held segments that have become contiguous, in offset order,
    /// dropping those that are now stale. Returns `true` if an applied
    /// segment carried the peer's `FIN`.
    fn drain_pending(&mut self) -> bool {
        while let Some((&key, _)) = self.pending.first_key_value() {
            let offset = key as i64;
            let expected = self.offset(self.tcb.ack);

            if offset > expected {
                break;
            }

            let Some((_, pending)) = self.pending.pop_first() else {
                break;
            };

            if offset < expected {
                debug!(
                    "[{}] ({}) dropped stale segment at offset {}",
                    self.tcb.sock, self.tcb.state, offset
                );
                continue;
            }

            self.apply(&pending.payload);

            if pending.fin {
                return true;
            }
        }

        false
    }

    /// Acknowledges the peer's `FIN` and waits for the `ACK` of ours.
    ///
    /// A retransmitted peer `FIN` means our `FIN_ACK` was lost and is answered
    /// by resending it. The connection is closed even if no final `ACK`
    /// arrives, since the whole response is already in hand.
    fn on_fin(&mut self) -> Result<()> {
        // The FIN occupies one sequence number.
        self.tcb.ack = self.tcb.ack.wrapping_add(1);

        // <SEQ=SND.NXT><ACK=RCV.NXT><CTL=FIN,ACK>
        let fin_ack = Segment::fin_ack(
            &self.tcb.sock,
            self.tcb.seq,
            self.tcb.ack,
            self.config.rcv_wnd,
        );
        let final_ack = self.tcb.seq.wrapping_add(1);

        self.tcb.transition(
            ConnectionState::CLOSE_WAIT,
            "received FIN, sending FIN_ACK",
        );

        for attempt in 0..MAX_FINAL_ACK_WAITS {
            if attempt > 0 {
                warn!(
                    "[{}] (CLOSE_WAIT) retransmitting FIN_ACK",
                    self.tcb.sock
                );
            }

            self.chan.transmit(&fin_ack)?;

            let reply = self
                .chan
                .await_segment(self.tcb, self.config.ack_timeout, |seg| {
                    seg.tcp.fin() || (seg.tcp.ack() && seg.ack_number() == final_ack)
                })?;

            match reply {
                Some(seg) if seg.tcp.ack() && seg.ack_number() == final_ack => {
                    self.tcb.seq = final_ack;
                    self.tcb
                        .transition(ConnectionState::CLOSED, "received final ACK");
                    return Ok(());
                }
                Some(_) => debug!("[{}] (CLOSE_WAIT) peer resent FIN", self.tcb.sock),
                None => debug!("[{}] (CLOSE_WAIT) no final ACK", self.tcb.sock),
            }
        }

        warn!(
            "[{}] (CLOSE_WAIT) final ACK never arrived, closing anyway",
            self.tcb.sock
        );

        self.tcb.seq = final_ack;
        self.tcb
            .transition(ConnectionState::CLOSED, "final ACK timed out");

        Ok(())
    }

    /// Sends a cumulative `ACK` for everything received so far.
    fn send_ack(&mut self) -> Result<()> {
        // <SEQ=SND.NXT><ACK=RCV.NXT><CTL=ACK>
        let ack = Segment::ack(
            &self.tcb.sock,
            self.tcb.seq,
            self.tcb.ack,
            self.config.rcv_wnd,
        );

        self.chan.transmit(&ack)
    }

    fn offset(&self, seq: u32) -> i64 {
        seq_offset(seq, self.init)
    }
}

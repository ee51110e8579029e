//! Windowed transmission of application data with retransmission on loss.

use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::fsm::Tcb;
use super::{Channel, Segment};
use crate::config::TcpConfig;
use crate::error::Abort;
use crate::link::DatagramLink;
use crate::{Error, Result};

/// Consecutive passes that may admit nothing, with nothing in flight, before
/// the transfer is given up.
const MAX_STALLED_PASSES: usize = 2;

/// Reliable delivery of one application buffer over an established
/// connection.
///
/// Each pass admits queued segments under `min(cwnd * MSS, awnd)`, collects
/// acknowledgments, and requeues whatever is still outstanding. A fully
/// acknowledged pass grows the congestion window by one segment; any loss
/// collapses it to one.
#[derive(Debug)]
pub struct SendEngine<'a, L> {
    tcb: &'a mut Tcb,
    chan: &'a mut Channel<L>,
    config: &'a TcpConfig,
}

impl<'a, L: DatagramLink> SendEngine<'a, L> {
    /// Creates an engine driving `tcb` over `chan`.
    pub fn new(tcb: &'a mut Tcb, chan: &'a mut Channel<L>, config: &'a TcpConfig) -> Self {
        Self { tcb, chan, config }
    }

    /// Sends `data`, blocking until every byte has been acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [Abort::SendStalled] if the peer's window never admits the next
    /// segment, or any error raised while receiving.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        let count = self.partition(data);

        info!(
            "[{}] ({}) sending {} bytes in {} segments",
            self.tcb.sock,
            self.tcb.state,
            data.len(),
            count
        );

        let mut stalled = 0;

        while !self.tcb.send_queue.is_empty() {
            let admitted = self.transmit_admissible()?;

            if admitted == 0 && self.tcb.unacked.is_empty() {
                stalled += 1;

                if stalled >= MAX_STALLED_PASSES {
                    error!(
                        "[{}] ({}) peer window of {} bytes never admitted {} queued segments",
                        self.tcb.sock,
                        self.tcb.state,
                        self.tcb.awnd,
                        self.tcb.send_queue.len()
                    );
                    return Err(Error::Aborted(Abort::SendStalled));
                }

                self.await_window_update()?;
                continue;
            }

            stalled = 0;

            if self.collect_acks()? {
                self.tcb.grow_cwnd();
            } else {
                self.requeue_unacked();
            }
        }

        Ok(())
    }

    /// Splits `data` into segments of at most MSS bytes and appends them to
    /// the send queue. Returns the number of segments queued.
    ///
    /// Sequence numbers start at the connection's current sequence number and
    /// advance by each prior segment's payload length.
    pub fn partition(&mut self, data: &[u8]) -> usize {
        let mut seq = self.tcb.seq;
        let mss = self.tcb.mss.max(1) as usize;

        for chunk in data.chunks(mss) {
            let segment =
                Segment::psh_ack(&self.tcb.sock, seq, self.tcb.ack, self.config.rcv_wnd, chunk);

            debug!(
                "[{}] ({}) queued segment seq={} len={}",
                self.tcb.sock,
                self.tcb.state,
                seq,
                chunk.len()
            );

            seq = seq.wrapping_add(chunk.len() as u32);
            self.tcb.send_queue.push_back(segment);
        }

        data.chunks(mss).len()
    }

    /// Transmits queued segments from the front while each fits into what is
    /// left of the admissible window. A segment that does not fit stays at the
    /// front of the queue. Returns the number of segments transmitted.
    pub fn transmit_admissible(&mut self) -> Result<usize> {
        let mut window = self.tcb.admissible_window();
        let mut admitted = 0;

        while let Some(next) = self.tcb.send_queue.front() {
            if next.payload_len() > window {
                break;
            }

            let Some(segment) = self.tcb.send_queue.pop_front() else {
                break;
            };

            self.chan.transmit(&segment)?;

            window -= segment.payload_len();
            admitted += 1;

            self.tcb.unacked.insert(segment);
        }

        debug!(
            "[{}] ({}) admitted {} segments (cwnd: {}, awnd: {}, in flight: {})",
            self.tcb.sock,
            self.tcb.state,
            admitted,
            self.tcb.cwnd,
            self.tcb.awnd,
            self.tcb.unacked.len()
        );

        Ok(admitted)
    }

    /// Waits for one acknowledgment per outstanding segment, each bounded by
    /// the ACK timeout. An elapsed wait ends the pass early.
    ///
    /// Returns `true` if nothing is outstanding afterwards.
    pub fn collect_acks(&mut self) -> Result<bool> {
        let attempts = self.tcb.unacked.len();

        for _ in 0..attempts {
            if self.tcb.unacked.is_empty() {
                break;
            }

            let deadline = Instant::now() + self.config.ack_timeout;

            let Some(segment) = self.chan.recv_segment(self.tcb, deadline)? else {
                warn!(
                    "[{}] ({}) no ACK within {:?}, {} segments outstanding",
                    self.tcb.sock,
                    self.tcb.state,
                    self.config.ack_timeout,
                    self.tcb.unacked.len()
                );
                break;
            };

            if segment.tcp.ack() {
                self.on_ack(segment.ack_number());
            }

            self.stash_response(segment);
        }

        Ok(self.tcb.unacked.is_empty())
    }

    /// Retires every outstanding segment covered by `ack`, advancing the
    /// sequence number over each in transmission order.
    fn on_ack(&mut self, ack: u32) {
        for entry in self.tcb.unacked.retire(ack) {
            let len = entry.segment.payload_len() as u32;

            if entry.ack.wrapping_sub(self.tcb.seq) == len {
                self.tcb.seq = entry.ack;
            }

            debug!(
                "[{}] ({}) segment seq={} acknowledged by {}",
                self.tcb.sock,
                self.tcb.state,
                entry.segment.seq_number(),
                ack
            );
        }
    }

    /// Moves every outstanding segment back to the front of the send queue,
    /// keeping their original order, and collapses the congestion window.
    fn requeue_unacked(&mut self) {
        let lost = self.tcb.unacked.drain();

        warn!(
            "[{}] ({}) {} segments unacknowledged, retransmitting with cwnd 1",
            self.tcb.sock,
            self.tcb.state,
            lost.len()
        );

        self.tcb.reset_cwnd();

        for segment in lost.into_iter().rev() {
            self.tcb.send_queue.push_front(segment);
        }
    }

    /// Waits for any segment from the peer so its advertised window is
    /// refreshed.
    fn await_window_update(&mut self) -> Result<()> {
        debug!(
            "[{}] ({}) window of {} bytes admits nothing, waiting for an update",
            self.tcb.sock, self.tcb.state, self.tcb.awnd
        );

        let deadline = Instant::now() + self.config.ack_timeout;

        if let Some(segment) = self.chan.recv_segment(self.tcb, deadline)? {
            self.stash_response(segment);
        }

        Ok(())
    }

    /// Keeps response data that arrives before our own data is acknowledged.
    fn stash_response(&mut self, segment: Segment) {
        if !segment.payload.is_empty() || segment.tcp.fin() {
            debug!(
                "[{}] ({}) kept early response segment seq={} len={}",
                self.tcb.sock,
                self.tcb.state,
                segment.seq_number(),
                segment.payload_len()
            );

            self.tcb.early.push(segment);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::net::Ipv4Addr;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use rstest::rstest;

    use super::*;
    use crate::link::MockDatagramLink;
    use crate::protocol::{ConnectionState, Socket, SocketAddr};

    const PEER_SEQ: u32 = 9000;

    fn sock() -> Socket {
        Socket::new(
            SocketAddr::new(Ipv4Addr::new(10, 0, 0, 2), 40000),
            SocketAddr::new(Ipv4Addr::new(10, 0, 0, 1), 80),
        )
    }

    fn config() -> TcpConfig {
        TcpConfig {
            ack_timeout: Duration::from_millis(20),
            ..Default::default()
        }
    }

    fn established(awnd: u16) -> Tcb {
        let mut tcb = Tcb::new(sock(), 100, &config());
        tcb.state = ConnectionState::ESTABLISHED;
        tcb.seq = 101;
        tcb.ack = PEER_SEQ;
        tcb.awnd = awnd;
        tcb
    }

    #[derive(Default)]
    struct Peer {
        /// Next sequence number the peer expects.
        next: u32,
        /// Sequence numbers of every transmission, lost ones included.
        transmissions: Vec<u32>,
        /// Data segments accepted in order.
        received: Vec<Segment>,
        /// Encoded replies waiting to be accepted.
        replies: VecDeque<Vec<u8>>,
        /// Sequence numbers whose first transmission is lost.
        drop_once: Vec<u32>,
        /// Extra payload piggybacked on the first ACK.
        early: Option<Vec<u8>>,
    }

    impl Peer {
        fn expecting(next: u32) -> Self {
            Self {
                next,
                ..Default::default()
            }
        }
    }

    /// A mock link whose peer accepts data in order only and answers every
    /// arriving segment with a cumulative ACK.
    fn acking_link(peer: Arc<Mutex<Peer>>) -> MockDatagramLink {
        let mut link = MockDatagramLink::new();
        let out = Arc::clone(&peer);

        link.expect_deliver().returning(move |raw| {
            let sock = sock();
            let segment = Segment::decode(raw, sock.src.addr, sock.dst.addr).unwrap();
            let mut peer = out.lock().unwrap();

            peer.transmissions.push(segment.seq_number());

            if let Some(pos) = peer.drop_once.iter().position(|&s| s == segment.seq_number()) {
                peer.drop_once.remove(pos);
                return Ok(());
            }

            if segment.seq_number() == peer.next {
                peer.next = segment.expected_ack();
                peer.received.push(segment);
            }

            let payload = peer.early.take().unwrap_or_default();
            let ack = Segment::psh_ack(&sock.reversed(), PEER_SEQ, peer.next, 29200, &payload);

            peer.replies.push_back(ack.encode());
            Ok(())
        });

        link.expect_accept()
            .returning(move |_| Ok(peer.lock().unwrap().replies.pop_front()));

        link
    }

    #[rstest]
    #[case(3000, 1460, vec![1460, 1460, 80])]
    #[case(2920, 1460, vec![1460, 1460])]
    #[case(1, 1460, vec![1])]
    #[case(0, 1460, vec![])]
    #[case(10, 4, vec![4, 4, 2])]
    fn partition_spaces_sequence_numbers(
        #[case] len: usize,
        #[case] mss: u16,
        #[case] expected: Vec<usize>,
    ) {
        let config = TcpConfig {
            mss,
            ..config()
        };
        let mut tcb = Tcb::new(sock(), 100, &config);
        tcb.seq = 101;
        let mut chan = Channel::new(MockDatagramLink::new(), sock());

        let count = SendEngine::new(&mut tcb, &mut chan, &config).partition(&vec![7u8; len]);

        assert_eq!(count, expected.len());

        let lens: Vec<_> = tcb.send_queue.iter().map(Segment::payload_len).collect();
        assert_eq!(lens, expected);

        let mut seq = 101;
        for segment in &tcb.send_queue {
            assert_eq!(segment.seq_number(), seq);
            assert_eq!(segment.ack_number(), tcb.ack);
            seq += segment.payload_len() as u32;
        }
    }

    #[test]
    fn admission_limited_to_one_segment_by_window() {
        let mut link = MockDatagramLink::new();
        link.expect_deliver().times(1).returning(|_| Ok(()));

        let config = config();
        let mut tcb = established(1460);
        let mut chan = Channel::new(link, sock());
        let mut engine = SendEngine::new(&mut tcb, &mut chan, &config);

        engine.partition(&[0u8; 1460 * 4]);

        assert_eq!(engine.transmit_admissible().unwrap(), 1);
        assert_eq!(tcb.send_queue.len(), 3);
        assert_eq!(tcb.unacked.len(), 1);
    }

    #[test]
    fn admission_never_splits_a_segment() {
        let mut link = MockDatagramLink::new();
        link.expect_deliver().never();

        let config = config();
        let mut tcb = established(1000);
        let mut chan = Channel::new(link, sock());
        let mut engine = SendEngine::new(&mut tcb, &mut chan, &config);

        engine.partition(&[0u8; 1460]);

        assert_eq!(engine.transmit_admissible().unwrap(), 0);
        assert_eq!(tcb.send_queue.len(), 1);
    }

    #[test]
    fn acked_passes_grow_congestion_window() {
        let peer = Arc::new(Mutex::new(Peer::expecting(101)));
        let config = config();
        let mut tcb = established(29200);
        let mut chan = Channel::new(acking_link(Arc::clone(&peer)), sock());

        let data: Vec<u8> = (0..3000u32).map(|i| i as u8).collect();
        assert!(SendEngine::new(&mut tcb, &mut chan, &config).send(&data).is_ok());

        // Pass one sends 1 segment, pass two the remaining 2.
        assert_eq!(tcb.cwnd, 3);
        assert_eq!(tcb.seq, 101 + 3000);
        assert!(tcb.unacked.is_empty());

        let peer = peer.lock().unwrap();
        assert_eq!(peer.received.len(), 3);

        let delivered: Vec<u8> = peer.received.iter().flat_map(|s| s.payload.clone()).collect();
        assert_eq!(delivered, data);
    }

    #[test]
    fn loss_resets_window_and_retransmits_in_order() {
        let peer = Arc::new(Mutex::new(Peer {
            drop_once: vec![101 + 1460],
            ..Peer::expecting(101)
        }));
        let config = config();
        let mut tcb = established(29200);
        tcb.cwnd = 3;
        let mut chan = Channel::new(acking_link(Arc::clone(&peer)), sock());

        let data = vec![1u8; 1460 * 3];
        assert!(SendEngine::new(&mut tcb, &mut chan, &config).send(&data).is_ok());

        assert_eq!(tcb.seq, 101 + 1460 * 3);

        let peer = peer.lock().unwrap();

        // Outstanding segments come back in their original order under a
        // collapsed window, one per pass until ACKs grow it again.
        assert_eq!(
            peer.transmissions,
            vec![101, 101 + 1460, 101 + 2920, 101 + 1460, 101 + 2920]
        );
        assert_eq!(peer.received.len(), 3);
        assert_eq!(tcb.cwnd, 3);
    }

    #[test]
    fn closed_window_stalls_send() {
        let mut link = MockDatagramLink::new();
        link.expect_deliver().never();
        link.expect_accept().returning(|_| Ok(None));

        let config = config();
        let mut tcb = established(0);
        let mut chan = Channel::new(link, sock());

        let res = SendEngine::new(&mut tcb, &mut chan, &config).send(b"GET / HTTP/1.0\r\n\r\n");

        assert!(matches!(res, Err(Error::Aborted(Abort::SendStalled))));
    }

    #[test]
    fn empty_send_transmits_nothing() {
        let mut link = MockDatagramLink::new();
        link.expect_deliver().never();

        let config = config();
        let mut tcb = established(29200);
        let mut chan = Channel::new(link, sock());

        assert!(SendEngine::new(&mut tcb, &mut chan, &config).send(&[]).is_ok());
        assert_eq!(tcb.seq, 101);
    }

    #[test]
    fn response_data_during_acks_is_kept() {
        let peer = Arc::new(Mutex::new(Peer {
            early: Some(b"HTTP/1.0 200 OK\r\n".to_vec()),
            ..Peer::expecting(101)
        }));
        let config = config();
        let mut tcb = established(29200);
        let mut chan = Channel::new(acking_link(peer), sock());

        assert!(SendEngine::new(&mut tcb, &mut chan, &config).send(b"GET /").is_ok());

        assert_eq!(tcb.early.len(), 1);
        assert_eq!(tcb.early[0].seq_number(), PEER_SEQ);
        assert_eq!(tcb.early[0].payload, b"HTTP/1.0 200 OK\r\n");
    }
}

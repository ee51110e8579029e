#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::time::Duration;

use rawtcp::config::TcpConfig;
use rawtcp::link::DatagramLink;
use rawtcp::protocol::headers::TcpHeader;
use rawtcp::protocol::{Segment, Socket, SocketAddr};

pub const PEER_WINDOW: u16 = 64240;

/// The client's view of the connection under test.
pub fn sock() -> Socket {
    Socket::new(
        SocketAddr::new(Ipv4Addr::new(10, 0, 0, 2), 40000),
        SocketAddr::new(Ipv4Addr::new(93, 184, 216, 34), 80),
    )
}

pub fn config() -> TcpConfig {
    TcpConfig {
        ack_timeout: Duration::from_millis(20),
        datagram_timeout: Duration::from_millis(50),
        ..Default::default()
    }
}

/// An in-memory server speaking the wire format.
///
/// It answers the handshake, accepts request data in order only with
/// cumulative ACKs, and once `request_len` bytes have arrived sends
/// `response` in `response_mss`-sized segments (in `order`) followed by a FIN.
/// Replies are queued synchronously, so an empty inbox means silence.
#[derive(Debug)]
pub struct ScriptedPeer {
    pub sock: Socket,
    pub isn: u32,
    pub mss: Option<u16>,
    pub answer_syn: bool,
    pub request_len: usize,
    pub response: Vec<u8>,
    pub response_mss: usize,
    /// Chunk indices of the response, in transmission order. Repeats send
    /// duplicates. Empty means in order.
    pub order: Vec<usize>,
    /// Client sequence numbers whose first transmission is lost.
    pub drop_once: Vec<u32>,
    /// Every segment the client transmitted, lost ones included.
    pub sent: Vec<Segment>,
    /// Request bytes accepted in order.
    pub received: Vec<u8>,
    inbox: VecDeque<Vec<u8>>,
    next: u32,
    responded: bool,
    fin_seq: u32,
}

impl ScriptedPeer {
    pub fn new(isn: u32) -> Self {
        Self {
            sock: sock().reversed(),
            isn,
            mss: Some(1460),
            answer_syn: true,
            request_len: 0,
            response: Vec::new(),
            response_mss: 1460,
            order: Vec::new(),
            drop_once: Vec::new(),
            sent: Vec::new(),
            received: Vec::new(),
            inbox: VecDeque::new(),
            next: 0,
            responded: false,
            fin_seq: 0,
        }
    }

    /// Segments from the client carrying data.
    pub fn data_segments(&self) -> Vec<&Segment> {
        self.sent.iter().filter(|seg| !seg.payload.is_empty()).collect()
    }

    /// Number of client segments matching `pred`.
    pub fn count(&self, pred: impl Fn(&Segment) -> bool) -> usize {
        self.sent.iter().filter(|seg| pred(*seg)).count()
    }

    fn push(&mut self, segment: Segment) {
        self.inbox.push_back(segment.encode());
    }

    fn on_syn(&mut self, syn: &Segment) {
        if !self.answer_syn {
            return;
        }

        self.next = syn.seq_number().wrapping_add(1);

        let mut tcp = TcpHeader::new(self.sock.src.port, self.sock.dst.port, self.isn, PEER_WINDOW);
        tcp.set_syn();
        tcp.set_ack();
        tcp.set_ack_number(self.next);

        if let Some(mss) = self.mss {
            tcp.set_option_mss(mss);
        }

        let mut syn_ack = Segment::new(tcp, &[]);
        syn_ack.seal(self.sock.src.addr, self.sock.dst.addr);
        self.push(syn_ack);
    }

    fn on_data(&mut self, seg: &Segment) {
        if let Some(idx) = self.drop_once.iter().position(|&seq| seq == seg.seq_number()) {
            self.drop_once.remove(idx);
            return;
        }

        if seg.seq_number() == self.next {
            self.received.extend_from_slice(&seg.payload);
            self.next = self.next.wrapping_add(seg.payload_len() as u32);
        }

        let seq = self.isn.wrapping_add(1);
        self.push(Segment::ack(&self.sock, seq, self.next, PEER_WINDOW));

        if !self.responded && self.received.len() >= self.request_len {
            self.respond();
        }
    }

    fn respond(&mut self) {
        self.responded = true;

        let base = self.isn.wrapping_add(1);
        let chunks: Vec<&[u8]> = self.response.chunks(self.response_mss).collect();

        let order: Vec<usize> = if self.order.is_empty() {
            (0..chunks.len()).collect()
        } else {
            self.order.clone()
        };

        let mut segments = Vec::new();
        for idx in order {
            let offset = (idx * self.response_mss) as u32;
            segments.push(Segment::psh_ack(
                &self.sock,
                base.wrapping_add(offset),
                self.next,
                PEER_WINDOW,
                chunks[idx],
            ));
        }

        self.fin_seq = base.wrapping_add(self.response.len() as u32);
        segments.push(Segment::fin_ack(&self.sock, self.fin_seq, self.next, PEER_WINDOW));

        for segment in segments {
            self.push(segment);
        }
    }

    fn on_fin(&mut self, fin: &Segment) {
        let ack = fin.seq_number().wrapping_add(1);

        if self.responded {
            // Final ACK of our FIN_ACK exchange.
            self.push(Segment::ack(&self.sock, self.fin_seq.wrapping_add(1), ack, PEER_WINDOW));
        } else {
            // Client closed first.
            let seq = self.isn.wrapping_add(1);
            self.push(Segment::fin_ack(&self.sock, seq, ack, PEER_WINDOW));
        }
    }
}

impl DatagramLink for ScriptedPeer {
    fn deliver(&mut self, payload: &[u8]) -> rawtcp::Result<()> {
        let seg = Segment::decode(payload, self.sock.dst.addr, self.sock.src.addr)?;
        self.sent.push(seg.clone());

        if seg.tcp.syn() {
            self.on_syn(&seg);
        } else if seg.tcp.fin() {
            self.on_fin(&seg);
        } else if !seg.payload.is_empty() {
            self.on_data(&seg);
        } else if !self.responded && self.request_len == 0 && self.next != 0 {
            // Handshake ACK with nothing to wait for.
            self.respond();
        }

        Ok(())
    }

    fn accept(&mut self, _timeout: Duration) -> rawtcp::Result<Option<Vec<u8>>> {
        Ok(self.inbox.pop_front())
    }
}

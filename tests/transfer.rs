mod common;

use common::{ScriptedPeer, config, sock};
use rawtcp::protocol::{ConnectionState, TcpSocket};
use rstest::rstest;

fn response(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn payload_of_3000_bytes_leaves_in_three_segments() {
    let request = vec![0x41; 3000];

    let mut peer = ScriptedPeer::new(1000);
    peer.request_len = request.len();

    let mut socket = TcpSocket::with_iss(&mut peer, sock(), config(), 500);
    socket.send(&request).unwrap();
    drop(socket);

    let data = peer.data_segments();
    assert_eq!(data.len(), 3);

    let seqs: Vec<u32> = data.iter().map(|seg| seg.seq_number()).collect();
    let lens: Vec<usize> = data.iter().map(|seg| seg.payload_len()).collect();
    assert_eq!(seqs, [501, 1961, 3421]);
    assert_eq!(lens, [1460, 1460, 80]);
    assert_eq!(peer.received, request);
}

#[rstest]
#[case::in_order(vec![0, 1, 2])]
#[case::last_first(vec![2, 0, 1])]
#[case::reversed(vec![2, 1, 0])]
#[case::duplicates(vec![0, 0, 2, 1, 2])]
fn response_is_reassembled(#[case] order: Vec<usize>) {
    let body = response(4000);

    let mut peer = ScriptedPeer::new(70000);
    peer.request_len = 5;
    peer.response = body.clone();
    peer.order = order;

    let mut socket = TcpSocket::with_iss(&mut peer, sock(), config(), 1);
    socket.send(b"hello").unwrap();

    assert_eq!(socket.receive(usize::MAX), body);
    assert_eq!(socket.tcb().ack, 70000 + 1 + 4000 + 1);
}

#[test]
fn full_exchange_closes_cleanly() {
    let mut peer = ScriptedPeer::new(3_000_000);
    peer.request_len = 18;
    peer.response = b"HTTP/1.0 200 OK\r\n\r\nbody".to_vec();

    let mut socket = TcpSocket::with_iss(&mut peer, sock(), config(), 100);
    socket.send(b"GET / HTTP/1.0\r\n\r\n").unwrap();

    assert_eq!(socket.state(), ConnectionState::CLOSED);
    assert_eq!(socket.receive(9), b"HTTP/1.0 ");
    assert_eq!(socket.receive(usize::MAX), b"200 OK\r\n\r\nbody");
    assert!(socket.close().unwrap());
    drop(socket);

    assert_eq!(peer.count(|seg| seg.tcp.syn()), 1);

    // Our only FIN answers the peer's.
    let fins: Vec<_> = peer.sent.iter().filter(|seg| seg.tcp.fin()).collect();
    assert_eq!(fins.len(), 1);
    let fin = fins[0];
    assert!(fin.tcp.ack());
    assert_eq!(fin.seq_number(), 101 + 18);
    assert_eq!(fin.ack_number(), 3_000_000 + 1 + 23 + 1);
}

#[test]
fn lost_segment_is_retransmitted_in_order() {
    let request = response(3000);

    let mut peer = ScriptedPeer::new(1000);
    peer.request_len = request.len();
    peer.drop_once = vec![501];

    let mut socket = TcpSocket::with_iss(&mut peer, sock(), config(), 500);
    socket.send(&request).unwrap();
    drop(socket);

    let seqs: Vec<u32> = peer.data_segments().iter().map(|seg| seg.seq_number()).collect();
    assert_eq!(seqs, [501, 501, 1961, 3421]);
    assert_eq!(peer.received, request);
}

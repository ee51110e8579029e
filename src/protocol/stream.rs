//! The application-facing client socket.

use std::io;

use tracing::debug;

use super::fsm::{ConnectionState, Tcb};
use super::{Channel, ReceiveEngine, SendEngine, Socket, handshake};
use crate::config::TcpConfig;
use crate::link::DatagramLink;
use crate::{Error, Result};

/// A client TCP connection carried over a [DatagramLink].
///
/// The socket follows a request/response pattern: [TcpSocket::send] opens the
/// connection if needed, delivers the request reliably, and drains the
/// peer's whole response before returning. [TcpSocket::receive] then reads
/// from what was drained.
#[derive(Debug)]
pub struct TcpSocket<L> {
    tcb: Tcb,
    chan: Channel<L>,
    config: TcpConfig,
}

impl<L: DatagramLink> TcpSocket<L> {
    /// Creates an unopened socket for `sock` with a random initial sequence
    /// number.
    pub fn new(link: L, sock: Socket, config: TcpConfig) -> Self {
        Self::with_iss(link, sock, config, rand::random())
    }

    /// Creates an unopened socket with the given initial sequence number.
    pub fn with_iss(link: L, sock: Socket, config: TcpConfig, iss: u32) -> Self {
        debug!("[{}] (INIT) created socket with ISS {}", sock, iss);

        Self {
            tcb: Tcb::new(sock, iss, &config),
            chan: Channel::new(link, sock),
            config,
        }
    }

    /// Sends `data` and drains the peer's response.
    ///
    /// Performs the handshake first if the connection is not open yet, then
    /// blocks until all of `data` is acknowledged and the peer has closed its
    /// side.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake or transfer is aborted, or if the
    /// connection is already closing or closed.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.tcb.state == ConnectionState::INIT {
            handshake::open(&mut self.tcb, &mut self.chan, &self.config)?;
        }

        if self.tcb.state != ConnectionState::ESTABLISHED {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("cannot send in state {}", self.tcb.state),
            )));
        }

        SendEngine::new(&mut self.tcb, &mut self.chan, &self.config).send(data)?;
        ReceiveEngine::new(&mut self.tcb, &mut self.chan, &self.config).run()
    }

    /// Removes and returns up to `max` bytes of the received stream.
    pub fn receive(&mut self, max: usize) -> Vec<u8> {
        let n = max.min(self.tcb.rcv_buf.len());
        self.tcb.rcv_buf.drain(..n).collect()
    }

    /// Closes the connection, returning whether teardown completed within the
    /// retry budget.
    pub fn close(&mut self) -> Result<bool> {
        handshake::close(&mut self.tcb, &mut self.chan, &self.config)
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.tcb.state
    }

    /// Returns the connection record.
    pub fn tcb(&self) -> &Tcb {
        &self.tcb
    }

    /// Returns the underlying link.
    pub fn link(&self) -> &L {
        self.chan.link()
    }

    /// Consumes the socket, returning the underlying link.
    pub fn into_link(self) -> L {
        self.chan.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::link::MockDatagramLink;
    use crate::protocol::SocketAddr;

    fn sock() -> Socket {
        Socket::new(
            SocketAddr::new(Ipv4Addr::new(10, 0, 0, 2), 40000),
            SocketAddr::new(Ipv4Addr::new(10, 0, 0, 1), 80),
        )
    }

    #[test]
    fn receive_drains_from_the_front() {
        let mut socket = TcpSocket::with_iss(MockDatagramLink::new(), sock(), TcpConfig::default(), 1);
        socket.tcb.rcv_buf.extend(b"hello world");

        assert_eq!(socket.receive(5), b"hello");
        assert_eq!(socket.receive(100), b" world");
        assert!(socket.receive(100).is_empty());
    }

    #[test]
    fn send_after_close_is_rejected() {
        let mut link = MockDatagramLink::new();
        link.expect_deliver().never();

        let mut socket = TcpSocket::with_iss(link, sock(), TcpConfig::default(), 1);
        socket.tcb.state = ConnectionState::CLOSED;

        assert!(matches!(
            socket.send(b"x"),
            Err(Error::Io(err)) if err.kind() == io::ErrorKind::NotConnected
        ));
    }

    #[test]
    fn close_unopened_socket_sends_nothing() {
        let mut link = MockDatagramLink::new();
        link.expect_deliver().never();

        let mut socket = TcpSocket::with_iss(link, sock(), TcpConfig::default(), 1);

        assert!(socket.close().unwrap());
        assert_eq!(socket.state(), ConnectionState::CLOSED);
    }
}

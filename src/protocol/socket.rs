//! Identifying the single TCP connection through its socket addresses.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

/// An IPv4 address and a port number.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct SocketAddr {
    /// IPv4 address.
    pub addr: [u8; 4],
    /// Port number.
    pub port: u16,
}

impl SocketAddr {
    /// Creates a socket address from an IPv4 address and port.
    pub fn new(addr: Ipv4Addr, port: u16) -> Self {
        Self {
            addr: addr.octets(),
            port,
        }
    }

    /// Returns the address as a std [Ipv4Addr].
    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.addr)
    }
}

impl From<SocketAddrV4> for SocketAddr {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl fmt::Display for SocketAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip(), self.port)
    }
}

/// The connection, identified by both the local and remote socket addresses.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct Socket {
    /// The source socket address (local IP and port).
    pub src: SocketAddr,
    /// The destination socket address (remote IP and port).
    pub dst: SocketAddr,
}

impl Socket {
    /// Creates a socket from local and remote addresses.
    pub fn new(src: SocketAddr, dst: SocketAddr) -> Self {
        Self { src, dst }
    }

    /// Returns the socket as seen from the remote end.
    pub fn reversed(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
        }
    }
}

impl fmt::Display for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_display_and_reverse() {
        let sock = Socket::new(
            SocketAddr::new(Ipv4Addr::new(10, 0, 0, 2), 40000),
            SocketAddrV4::new(Ipv4Addr::new(93, 184, 216, 34), 80).into(),
        );

        assert_eq!(sock.to_string(), "10.0.0.2:40000 -> 93.184.216.34:80");
        assert_eq!(sock.reversed().src, sock.dst);
        assert_eq!(sock.reversed().reversed(), sock);
        assert_eq!(sock.dst.ip(), Ipv4Addr::new(93, 184, 216, 34));
    }
}

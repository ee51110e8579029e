//! Tunables for the TCP engines and the raw link.

use std::time::Duration;

/// Maximum Segment Size (`MSS`) in bytes used when partitioning application
/// data.
pub const MSS: u16 = 1460;

/// Upper bound on the congestion window, in segments.
pub const MAX_CWND: usize = 1000;

/// Bounded wait for a single `SYN_ACK`, `ACK`, or `FIN_ACK`.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Longest period the peer may stay silent while its response is drained
/// before the connection is considered dead.
pub const DATAGRAM_TIMEOUT: Duration = Duration::from_secs(180);

/// Window size advertised to the peer.
pub const RCV_WND_SIZE: u16 = 29200;

/// Port the HTTP client connects to.
pub const HTTP_PORT: u16 = 80;

/// Bounded wait for the gateway's ARP reply.
pub const ARP_TIMEOUT: Duration = Duration::from_secs(5);

/// Time to live set on outgoing IPv4 datagrams.
pub const DEFAULT_TTL: u8 = 64;

/// Settings consumed by the TCP engines.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Largest payload carried by one segment.
    pub mss: u16,
    /// Congestion window cap, in segments.
    pub max_cwnd: usize,
    /// Wait applied to every handshake, teardown, and `ACK` receive.
    pub ack_timeout: Duration,
    /// Wait applied to every segment of the peer's response stream.
    pub datagram_timeout: Duration,
    /// Window advertised on every outgoing segment.
    pub rcv_wnd: u16,
    /// Remote port.
    pub dst_port: u16,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            mss: MSS,
            max_cwnd: MAX_CWND,
            ack_timeout: ACK_TIMEOUT,
            datagram_timeout: DATAGRAM_TIMEOUT,
            rcv_wnd: RCV_WND_SIZE,
            dst_port: HTTP_PORT,
        }
    }
}

/// Settings consumed when opening the raw link.
#[derive(Debug, Clone, Default)]
pub struct LinkConfig {
    /// Interface to bind, or the interface of the default route when `None`.
    pub interface: Option<String>,
    /// Wait for the gateway's ARP reply, [ARP_TIMEOUT] when `None`.
    pub arp_timeout: Option<Duration>,
}

impl LinkConfig {
    /// Returns the ARP reply timeout to use.
    pub fn arp_timeout(&self) -> Duration {
        self.arp_timeout.unwrap_or(ARP_TIMEOUT)
    }
}

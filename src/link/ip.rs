use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::ethernet::{EthernetLink, FrameDevice};
use super::{DatagramLink, Interface, RawSocket, default_route};
use crate::config::{DEFAULT_TTL, LinkConfig};
use crate::protocol::headers::{EtherType, Ipv4Header, Protocol};
use crate::Result;

/// IPv4 datagram delivery of TCP payloads between one local and one remote
/// address, framed over Ethernet through the default gateway.
#[derive(Debug)]
pub struct IpLink<D = RawSocket> {
    eth: EthernetLink<D>,
    local: [u8; 4],
    remote: [u8; 4],
}

impl IpLink<RawSocket> {
    /// Opens a raw link to `remote` through the default gateway.
    ///
    /// The interface is taken from `config`, or from the default route when
    /// none is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the route or interface cannot be discovered, the
    /// packet socket cannot be opened, or the gateway does not answer ARP.
    pub fn open(remote: Ipv4Addr, config: &LinkConfig) -> Result<Self> {
        let route = default_route()?;
        let name = config.interface.as_deref().unwrap_or(&route.interface);

        let iface = Interface::query(name)?;
        let socket = RawSocket::bind(iface.index)?;
        let eth = EthernetLink::resolve(socket, &iface, route.gateway, config.arp_timeout())?;

        Ok(Self::new(eth, iface.addr, remote))
    }
}

impl<D: FrameDevice> IpLink<D> {
    /// Creates a link carrying datagrams between `local` and `remote` over
    /// `eth`.
    pub fn new(eth: EthernetLink<D>, local: Ipv4Addr, remote: Ipv4Addr) -> Self {
        Self {
            eth,
            local: local.octets(),
            remote: remote.octets(),
        }
    }

    /// Returns the local address.
    pub fn local_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.local)
    }

    /// Returns the remote address.
    pub fn remote_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.remote)
    }

    fn accepts(&self, header: &Ipv4Header) -> bool {
        header.protocol() == Protocol::TCP
            && header.src() == self.remote
            && header.dst() == self.local
            && !header.is_fragment()
    }
}

impl<D: FrameDevice> DatagramLink for IpLink<D> {
    fn deliver(&mut self, payload: &[u8]) -> Result<()> {
        let mut header = Ipv4Header::new(
            self.local,
            self.remote,
            payload.len(),
            DEFAULT_TTL,
            Protocol::TCP,
        )?;
        header.set_id(rand::random());
        header.set_header_checksum();

        let mut datagram = Vec::with_capacity(header.total_len() as usize);
        datagram.extend_from_slice(&header.to_be_bytes());
        datagram.extend_from_slice(payload);

        trace!("sending datagram (id: {}, {} bytes)", header.id(), datagram.len());

        self.eth.send(EtherType::Ipv4, &datagram)
    }

    fn accept(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let Some(raw) = self.eth.recv(EtherType::Ipv4, remaining)? else {
                return Ok(None);
            };

            let header = match Ipv4Header::try_from(raw.as_slice()) {
                Ok(header) => header,
                Err(err) => {
                    debug!("dropping datagram: {err}");
                    continue;
                }
            };

            if !self.accepts(&header) {
                continue;
            }

            // Total length drops the Ethernet padding; IHL skips any options.
            let end = header.total_len() as usize;
            return Ok(Some(raw[header.header_len()..end].to_vec()));
        }
    }
}

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use super::{FRAME_SIZE, Interface, RawSocket};
use crate::error::Abort;
use crate::protocol::headers::{ArpPacket, EtherType, EthernetHeader, MacAddr};
use crate::{Error, Result};

/// Shortest frame put on the wire, excluding the frame check sequence.
const MIN_FRAME_LEN: usize = 60;

/// Number of ARP requests broadcast before giving up on the gateway.
const ARP_ATTEMPTS: usize = 2;

/// Transport of whole Ethernet frames.
#[cfg_attr(test, mockall::automock)]
pub trait FrameDevice {
    /// Puts one frame on the wire.
    fn send_frame(&mut self, frame: &[u8]) -> Result<()>;

    /// Waits up to `timeout` for the next frame seen on the wire.
    fn recv_frame(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

impl FrameDevice for RawSocket {
    fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.send(frame).map(|_| ())
    }

    fn recv_frame(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; FRAME_SIZE];

        Ok(self.recv(&mut buf, timeout)?.map(|n| {
            buf.truncate(n);
            buf
        }))
    }
}

/// Ethernet II framing between the local host and its gateway.
#[derive(Debug)]
pub struct EthernetLink<D = RawSocket> {
    device: D,
    local_mac: MacAddr,
    gateway_mac: MacAddr,
}

impl<D: FrameDevice> EthernetLink<D> {
    /// Resolves the hardware address of `gateway` over `device` and returns a
    /// link addressing every frame to it.
    ///
    /// The ARP request is broadcast once more if the first wait of `timeout`
    /// elapses.
    ///
    /// # Errors
    ///
    /// Returns [Abort::ArpUnresolved] if neither request is answered, or an
    /// error if the device fails.
    pub fn resolve(
        mut device: D,
        iface: &Interface,
        gateway: Ipv4Addr,
        timeout: Duration,
    ) -> Result<Self> {
        let local_ip = iface.addr.octets();
        let request = ArpPacket::request(iface.mac, local_ip, gateway.octets());
        let header = EthernetHeader::new(MacAddr::BROADCAST, iface.mac, EtherType::Arp);

        for attempt in 0..ARP_ATTEMPTS {
            if attempt > 0 {
                warn!("no ARP reply from {gateway} within {timeout:?}, retrying");
            }

            debug!("who-has {gateway} tell {}", iface.addr);
            device.send_frame(&frame(&header, &request.to_be_bytes()))?;

            let deadline = Instant::now() + timeout;

            while let Some(payload) =
                recv_until(&mut device, iface.mac, EtherType::Arp, deadline)?
            {
                let Ok(reply) = ArpPacket::try_from(payload.as_slice()) else {
                    continue;
                };

                if reply.is_reply(gateway.octets(), local_ip) {
                    info!("gateway {gateway} is-at {}", reply.sender_hw());

                    return Ok(Self {
                        device,
                        local_mac: iface.mac,
                        gateway_mac: reply.sender_hw(),
                    });
                }
            }
        }

        Err(Error::Aborted(Abort::ArpUnresolved))
    }

    /// Creates a link sending every frame to a gateway whose hardware
    /// address is already known.
    pub fn with_gateway(device: D, local_mac: MacAddr, gateway_mac: MacAddr) -> Self {
        Self {
            device,
            local_mac,
            gateway_mac,
        }
    }

    /// Returns the local hardware address.
    pub fn local_mac(&self) -> MacAddr {
        self.local_mac
    }

    /// Returns the gateway hardware address frames are sent to.
    pub fn gateway_mac(&self) -> MacAddr {
        self.gateway_mac
    }

    /// Sends `payload` to the gateway in a frame of type `ether_type`.
    pub fn send(&mut self, ether_type: EtherType, payload: &[u8]) -> Result<()> {
        let header = EthernetHeader::new(self.gateway_mac, self.local_mac, ether_type);
        self.device.send_frame(&frame(&header, payload))
    }

    /// Waits up to `timeout` for a frame of type `ether_type` addressed to the
    /// local host, returning its payload.
    ///
    /// Frames of other types or for other hosts are skipped. The payload may
    /// carry trailing padding.
    pub fn recv(&mut self, ether_type: EtherType, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        recv_until(&mut self.device, self.local_mac, ether_type, deadline)
    }
}

fn frame(header: &EthernetHeader, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MIN_FRAME_LEN.max(EthernetHeader::HEADER_LEN + payload.len()));
    buf.extend_from_slice(&header.to_be_bytes());
    buf.extend_from_slice(payload);

    if buf.len() < MIN_FRAME_LEN {
        buf.resize(MIN_FRAME_LEN, 0);
    }

    buf
}

fn recv_until<D: FrameDevice>(
    device: &mut D,
    local_mac: MacAddr,
    ether_type: EtherType,
    deadline: Instant,
) -> Result<Option<Vec<u8>>> {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }

        let Some(raw) = device.recv_frame(remaining)? else {
            return Ok(None);
        };

        let header = match EthernetHeader::try_from(raw.as_slice()) {
            Ok(header) => header,
            Err(err) => {
                trace!("dropping frame: {err}");
                continue;
            }
        };

        if header.ether_type() != ether_type {
            continue;
        }

        if header.dst() != local_mac && header.dst() != MacAddr::BROADCAST {
            continue;
        }

        return Ok(Some(raw[EthernetHeader::HEADER_LEN..].to_vec()));
    }
}

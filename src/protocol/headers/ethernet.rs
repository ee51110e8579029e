use std::{fmt, io};

use crate::{Error, ParseError};

/// A 48-bit IEEE 802 hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// The broadcast address `ff:ff:ff:ff:ff:ff`.
    pub const BROADCAST: MacAddr = MacAddr([0xFF; 6]);

    /// The all-zero address, used as the unknown target of ARP requests.
    pub const UNSPECIFIED: MacAddr = MacAddr([0x00; 6]);

    /// Returns the address octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Ethernet II frame header.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                  Destination Hardware Address                 |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    (continued)                |    Source Hardware Address    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         (continued)                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           EtherType           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    dst: MacAddr,
    src: MacAddr,
    ether_type: EtherType,
}

impl EthernetHeader {
    /// Length of an Ethernet II header in bytes.
    pub const HEADER_LEN: usize = 14;

    /// Creates a new Ethernet II header.
    pub fn new(dst: MacAddr, src: MacAddr, ether_type: EtherType) -> Self {
        Self {
            dst,
            src,
            ether_type,
        }
    }

    /// Returns the destination hardware address.
    pub fn dst(&self) -> MacAddr {
        self.dst
    }

    /// Returns the source hardware address.
    pub fn src(&self) -> MacAddr {
        self.src
    }

    /// Returns the type of the frame payload.
    pub fn ether_type(&self) -> EtherType {
        self.ether_type
    }

    /// Returns the memory representation of the header as a byte array in
    /// big-endian (network) byte order.
    #[allow(clippy::wrong_self_convention)]
    pub fn to_be_bytes(&self) -> [u8; Self::HEADER_LEN] {
        let mut raw_header = [0u8; Self::HEADER_LEN];

        raw_header[0..6].copy_from_slice(&self.dst.0);
        raw_header[6..12].copy_from_slice(&self.src.0);
        raw_header[12..14].copy_from_slice(&u16::from(self.ether_type).to_be_bytes());

        raw_header
    }

    /// Writes the header to the given output stream.
    pub fn write<T: io::Write>(&self, output: &mut T) -> crate::Result<()> {
        Ok(output.write_all(&self.to_be_bytes())?)
    }
}

impl TryFrom<&[u8]> for EthernetHeader {
    type Error = Error;

    fn try_from(header_raw: &[u8]) -> Result<Self, Self::Error> {
        if header_raw.len() < Self::HEADER_LEN {
            return Err(Error::Parse(ParseError::InvalidBufferLength {
                provided: header_raw.len(),
                min: Self::HEADER_LEN,
            }));
        }

        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&header_raw[0..6]);
        src.copy_from_slice(&header_raw[6..12]);

        Ok(Self {
            dst: MacAddr(dst),
            src: MacAddr(src),
            ether_type: EtherType::from(u16::from_be_bytes([header_raw[12], header_raw[13]])),
        })
    }
}

/// Frame payload types the link distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherType {
    /// Internet Protocol version 4 (`0x0800`).
    Ipv4,
    /// Address Resolution Protocol (`0x0806`).
    Arp,
    /// Anything else, carried through unchanged.
    Other(u16),
}

impl From<EtherType> for u16 {
    fn from(ether_type: EtherType) -> u16 {
        match ether_type {
            EtherType::Ipv4 => 0x0800,
            EtherType::Arp => 0x0806,
            EtherType::Other(val) => val,
        }
    }
}

impl From<u16> for EtherType {
    fn from(val: u16) -> Self {
        match val {
            0x0800 => EtherType::Ipv4,
            0x0806 => EtherType::Arp,
            _ => EtherType::Other(val),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ethernet_header_basic_valid() {
        let frame: [u8; 16] = [
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x52, 0x54, 0x00, 0x12, 0x34, 0x56, 0x08, 0x06,
            0x00, 0x01,
        ];

        let header = EthernetHeader::try_from(&frame[..]);
        assert!(header.is_ok());
        let header = header.unwrap();

        assert_eq!(header.dst(), MacAddr::BROADCAST);
        assert_eq!(header.src(), MacAddr([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]));
        assert_eq!(header.ether_type(), EtherType::Arp);
        assert_eq!(&header.to_be_bytes()[..], &frame[..14]);
    }

    #[test]
    fn ethernet_header_truncated_invalid() {
        assert!(matches!(
            EthernetHeader::try_from(&[0u8; 13][..]),
            Err(Error::Parse(ParseError::InvalidBufferLength { provided: 13, min: 14 }))
        ));
    }

    #[test]
    fn mac_addr_display() {
        let mac = MacAddr([0x52, 0x54, 0x00, 0xab, 0xcd, 0x0f]);

        assert_eq!(mac.to_string(), "52:54:00:ab:cd:0f");
    }
}

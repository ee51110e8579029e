use std::io;

use super::MacAddr;
use crate::{Error, ParseError};

/// ARP packet for Ethernet/IPv4 address resolution.
///
/// RFC 826
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |         Hardware Type         |         Protocol Type         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  HLEN (6)     |   PLEN (4)    |           Operation           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                 Sender Hardware Address (6)                   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   Sender Protocol Address (4) |   Target Hardware Address (6) |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                 Target Protocol Address (4)                   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    operation: ArpOperation,
    sender_hw: MacAddr,
    sender_proto: [u8; 4],
    target_hw: MacAddr,
    target_proto: [u8; 4],
}

impl ArpPacket {
    /// Length of an Ethernet/IPv4 ARP packet in bytes.
    pub const PACKET_LEN: usize = 28;

    /// Hardware type for Ethernet.
    const HTYPE_ETHERNET: u16 = 1;

    /// Protocol type for IPv4.
    const PTYPE_IPV4: u16 = 0x0800;

    /// Builds a request asking who owns `target_proto`.
    pub fn request(sender_hw: MacAddr, sender_proto: [u8; 4], target_proto: [u8; 4]) -> Self {
        Self {
            operation: ArpOperation::Request,
            sender_hw,
            sender_proto,
            target_hw: MacAddr::UNSPECIFIED,
            target_proto,
        }
    }

    /// Returns the operation of the packet.
    pub fn operation(&self) -> ArpOperation {
        self.operation
    }

    /// Returns the sender hardware address.
    pub fn sender_hw(&self) -> MacAddr {
        self.sender_hw
    }

    /// Returns the sender protocol address.
    pub fn sender_proto(&self) -> [u8; 4] {
        self.sender_proto
    }

    /// Returns the target hardware address.
    pub fn target_hw(&self) -> MacAddr {
        self.target_hw
    }

    /// Returns the target protocol address.
    pub fn target_proto(&self) -> [u8; 4] {
        self.target_proto
    }

    /// Returns `true` if this packet is a reply from `owner` addressed to
    /// `requester`.
    pub fn is_reply(&self, owner: [u8; 4], requester: [u8; 4]) -> bool {
        self.operation == ArpOperation::Reply
            && self.sender_proto == owner
            && self.target_proto == requester
    }

    /// Returns the memory representation of the packet as a byte array in
    /// big-endian (network) byte order.
    #[allow(clippy::wrong_self_convention)]
    pub fn to_be_bytes(&self) -> [u8; Self::PACKET_LEN] {
        let mut raw = [0u8; Self::PACKET_LEN];

        raw[0..2].copy_from_slice(&Self::HTYPE_ETHERNET.to_be_bytes());
        raw[2..4].copy_from_slice(&Self::PTYPE_IPV4.to_be_bytes());
        raw[4] = 6;
        raw[5] = 4;
        raw[6..8].copy_from_slice(&u16::from(self.operation).to_be_bytes());
        raw[8..14].copy_from_slice(&self.sender_hw.0);
        raw[14..18].copy_from_slice(&self.sender_proto);
        raw[18..24].copy_from_slice(&self.target_hw.0);
        raw[24..28].copy_from_slice(&self.target_proto);

        raw
    }

    /// Writes the packet to the given output stream.
    pub fn write<T: io::Write>(&self, output: &mut T) -> crate::Result<()> {
        Ok(output.write_all(&self.to_be_bytes())?)
    }
}

impl TryFrom<&[u8]> for ArpPacket {
    type Error = Error;

    fn try_from(raw: &[u8]) -> Result<Self, Self::Error> {
        if raw.len() < Self::PACKET_LEN {
            return Err(Error::Parse(ParseError::InvalidBufferLength {
                provided: raw.len(),
                min: Self::PACKET_LEN,
            }));
        }

        let htype = u16::from_be_bytes([raw[0], raw[1]]);
        let ptype = u16::from_be_bytes([raw[2], raw[3]]);

        if htype != Self::HTYPE_ETHERNET || ptype != Self::PTYPE_IPV4 || raw[4] != 6 || raw[5] != 4
        {
            return Err(Error::Parse(ParseError::UnsupportedArp { htype, ptype }));
        }

        let mut sender_hw = [0u8; 6];
        let mut sender_proto = [0u8; 4];
        let mut target_hw = [0u8; 6];
        let mut target_proto = [0u8; 4];

        sender_hw.copy_from_slice(&raw[8..14]);
        sender_proto.copy_from_slice(&raw[14..18]);
        target_hw.copy_from_slice(&raw[18..24]);
        target_proto.copy_from_slice(&raw[24..28]);

        Ok(Self {
            operation: ArpOperation::from(u16::from_be_bytes([raw[6], raw[7]])),
            sender_hw: MacAddr(sender_hw),
            sender_proto,
            target_hw: MacAddr(target_hw),
            target_proto,
        })
    }
}

/// ARP operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOperation {
    /// Who has the target protocol address (`1`).
    Request,
    /// The sender owns the sender protocol address (`2`).
    Reply,
    /// Any other operation code.
    Other(u16),
}

impl From<ArpOperation> for u16 {
    fn from(op: ArpOperation) -> u16 {
        match op {
            ArpOperation::Request => 1,
            ArpOperation::Reply => 2,
            ArpOperation::Other(val) => val,
        }
    }
}

impl From<u16> for ArpOperation {
    fn from(val: u16) -> Self {
        match val {
            1 => ArpOperation::Request,
            2 => ArpOperation::Reply,
            _ => ArpOperation::Other(val),
        }
    }
}

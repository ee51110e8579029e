//! Header definitions and wire (de)serialization for Ethernet II, ARP, IPv4,
//! and TCP.

mod arp;
mod ethernet;
mod ipv4;
mod tcp;

pub use arp::{ArpOperation, ArpPacket};
pub use ethernet::{EtherType, EthernetHeader, MacAddr};
pub use ipv4::{Ipv4Header, Protocol};
pub use tcp::TcpHeader;

/// Computes the 16 bit one's complement of the one's complement sum of all 16
/// bit words in the given byte slices, processed as one contiguous buffer.
///
/// If the buffer contains an odd number of octets, the last octet is padded
/// on the right with zeros to form a 16 bit word for checksum purposes. The
/// padding is never transmitted.
pub fn internet_checksum(chunks: &[&[u8]]) -> u16 {
    // Chain together byte slices so each can be processed together.
    let mut checksum_iter = chunks.iter().flat_map(|chunk| chunk.iter());

    let mut sum = 0u32;

    loop {
        let word = match (checksum_iter.next(), checksum_iter.next()) {
            (Some(h), Some(l)) => u16::from_be_bytes([*h, *l]),
            (Some(h), None) => u16::from_be_bytes([*h, 0x00]),
            _ => break,
        };

        sum += word as u32;

        // Handle potential overflow with carry folding.
        if sum > 0xFFFF {
            // Adds the higher 16-bits to the lower 16-bits.
            sum = (sum & 0xFFFF) + (sum >> 16);
        }
    }

    // Handle potential remaining overflow with carry folding.
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !(sum as u16)
}

//! Construction, serialization, and verification of TCP segments.

use std::io::Write;

use super::Socket;
use super::headers::TcpHeader;
use crate::{Error, ParseError, Result};

/// A TCP header together with its payload.
///
/// Segments produced by the constructors below are sealed: their checksum is
/// already computed for the connection's address pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// TCP header of the segment.
    pub tcp: TcpHeader,
    /// Payload of the segment.
    pub payload: Vec<u8>,
}

impl Segment {
    /// Creates an unsealed segment from a header and payload.
    pub fn new(tcp: TcpHeader, payload: &[u8]) -> Self {
        Self {
            tcp,
            payload: payload.into(),
        }
    }

    /// Computes the checksum for a segment travelling from `src` to `dst`.
    pub fn seal(&mut self, src: [u8; 4], dst: [u8; 4]) {
        self.tcp.set_checksum(src, dst, &self.payload);
    }

    /// `<SEQ=seq><CTL=SYN>` announcing our MSS in the options word.
    pub fn syn(sock: &Socket, seq: u32, window: u16, mss: u16) -> Self {
        let mut tcp = TcpHeader::new(sock.src.port, sock.dst.port, seq, window);
        tcp.set_syn();
        tcp.set_option_mss(mss);

        Self::sealed(sock, tcp, &[])
    }

    /// `<SEQ=seq><ACK=ack><CTL=ACK>`
    pub fn ack(sock: &Socket, seq: u32, ack: u32, window: u16) -> Self {
        let mut tcp = TcpHeader::new(sock.src.port, sock.dst.port, seq, window);
        tcp.set_ack();
        tcp.set_ack_number(ack);

        Self::sealed(sock, tcp, &[])
    }

    /// `<SEQ=seq><ACK=ack><CTL=PSH,ACK><DATA>`
    pub fn psh_ack(sock: &Socket, seq: u32, ack: u32, window: u16, payload: &[u8]) -> Self {
        let mut tcp = TcpHeader::new(sock.src.port, sock.dst.port, seq, window);
        tcp.set_ack();
        tcp.set_psh();
        tcp.set_ack_number(ack);

        Self::sealed(sock, tcp, payload)
    }

    /// `<SEQ=seq><ACK=ack><CTL=FIN,ACK>`
    pub fn fin_ack(sock: &Socket, seq: u32, ack: u32, window: u16) -> Self {
        let mut tcp = TcpHeader::new(sock.src.port, sock.dst.port, seq, window);
        tcp.set_fin();
        tcp.set_ack();
        tcp.set_ack_number(ack);

        Self::sealed(sock, tcp, &[])
    }

    fn sealed(sock: &Socket, tcp: TcpHeader, payload: &[u8]) -> Self {
        let mut segment = Self::new(tcp, payload);
        segment.seal(sock.src.addr, sock.dst.addr);
        segment
    }

    /// Returns the sequence number of the segment.
    pub fn seq_number(&self) -> u32 {
        self.tcp.seq_number()
    }

    /// Returns the acknowledgment number of the segment.
    pub fn ack_number(&self) -> u32 {
        self.tcp.ack_number()
    }

    /// Returns the number of payload octets carried.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Returns the acknowledgment value that covers this segment's payload.
    pub fn expected_ack(&self) -> u32 {
        self.seq_number().wrapping_add(self.payload.len() as u32)
    }

    /// Returns the memory representation of the segment as a vector of bytes
    /// in big-endian (network) byte order.
    pub fn encode(&self) -> Vec<u8> {
        let (raw_header, nbytes) = self.tcp.to_be_bytes();

        let mut buf = Vec::with_capacity(nbytes + self.payload.len());
        buf.extend_from_slice(&raw_header[..nbytes]);
        buf.extend_from_slice(&self.payload);

        buf
    }

    /// Writes the encoded segment to the given output stream.
    pub fn write<T: Write>(&self, output: &mut T) -> Result<()> {
        self.tcp.write(output)?;
        output.write_all(&self.payload)?;

        Ok(())
    }

    /// Parses a segment travelling from `src` to `dst`.
    ///
    /// # Errors
    ///
    /// Returns [ParseError::InvalidChecksum] if the carried checksum does not
    /// match the one computed over the pseudo header, header, and payload.
    pub fn decode(buf: &[u8], src: [u8; 4], dst: [u8; 4]) -> Result<Self> {
        let tcp = TcpHeader::try_from(buf)?;
        let payload = &buf[tcp.header_len()..];

        let expected = tcp.compute_checksum(src, dst, payload);

        if tcp.checksum() != expected {
            return Err(Error::Parse(ParseError::InvalidChecksum {
                provided: tcp.checksum(),
                expected,
            }));
        }

        Ok(Self::new(tcp, payload))
    }
}

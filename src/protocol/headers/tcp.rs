use std::{fmt, io};

use super::internet_checksum;
use super::ipv4::Protocol;
use crate::{Error, ParseError};

/// TCP Segment Header.
///
/// RFC 793 (3.1)
///
/// ```text
///   0                   1                   2                   3
///     0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |          Source Port          |       Destination Port        |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |                        Sequence Number                        |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |                    Acknowledgment Number                      |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |  Data |           |U|A|P|R|S|F|                               |
///    | Offset| Reserved  |R|C|S|S|Y|I|            Window             |
///    |       |           |G|K|H|T|N|N|                               |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |           Checksum            |         Urgent Pointer        |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |                    Options                    |    Padding    |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///    |                             data                              |
///    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// # Note
///
/// At most one 32-bit options word is representable. Headers announcing a
/// longer options area fail to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    /// The source port number.
    src_port: u16,
    /// The destination port number.
    dst_port: u16,
    /// The sequence number of the first data octet in this segment
    /// (except when SYN is present). If SYN is present the sequence number is
    /// the initial sequence number (ISN) and the first data octet is ISN+1.
    seq_number: u32,
    /// If the ACK control bit is set this field contains the value of the next
    /// sequence number the sender of the segment is expecting to receive.
    ack_number: u32,
    /// The data offset (4-bits) indicates the number of 32 bit words in the
    /// TCP Header.
    ///
    /// The reserved 6-bits are carried through unchanged.
    ///
    /// The control bits (6-bits) from left to right:
    ///
    /// ```text
    ///    URG:  Urgent Pointer field significant
    ///    ACK:  Acknowledgment field significant
    ///    PSH:  Push Function
    ///    RST:  Reset the connection
    ///    SYN:  Synchronize sequence numbers
    ///    FIN:  No more data from sender
    /// ```
    offset_and_control_bits: u16,
    /// The number of data octets beginning with the one indicated in the
    /// acknowledgment field which the sender of this segment is willing to
    /// accept.
    window: u16,
    /// The checksum field is the 16 bit one's complement of the one's
    /// complement sum of all 16 bit words in the header and text.
    ///
    /// The checksum also covers a 96 bit pseudo header conceptually prefixed
    /// to the TCP header.
    ///
    /// ```text
    ///        +--------+--------+--------+--------+
    ///        |           Source Address          |
    ///        +--------+--------+--------+--------+
    ///        |         Destination Address       |
    ///        +--------+--------+--------+--------+
    ///        |  zero  |  PTCL  |    TCP Length   |
    ///        +--------+--------+--------+--------+
    /// ```
    checksum: u16,
    /// This field communicates the current value of the urgent pointer as a
    /// positive offset from the sequence number in this segment.
    urgent_pointer: u16,
    /// The single options word, if the data offset announces one.
    options: Option<u32>,
}

impl TcpHeader {
    /// Length of a TCP header without options in bytes.
    pub const MIN_HEADER_LEN: usize = 20;

    /// Length of a TCP header carrying the single options word in bytes.
    pub const MAX_HEADER_LEN: usize = 24;

    /// Minimum data offset of a TCP header.
    pub const MIN_DATA_OFFSET: u8 = 5;

    /// Length of the options word in bytes.
    pub const OPTIONS_LEN: usize = 4;

    /// Option kind of the Maximum Segment Size option.
    const MSS_KIND: u8 = 2;

    /// Creates a new TCP header with the specified source and destination
    /// ports, sequence number, and window size, while setting default values
    /// for other fields.
    pub fn new(src_port: u16, dst_port: u16, seq_number: u32, window: u16) -> Self {
        Self {
            src_port,
            dst_port,
            seq_number,
            window,
            ..Default::default()
        }
    }

    /// Returns the `source port` field of the TCP header.
    pub fn src_port(&self) -> u16 {
        self.src_port
    }

    /// Returns the `destination port` field of the TCP header.
    pub fn dst_port(&self) -> u16 {
        self.dst_port
    }

    /// Returns the `sequence number` field of the TCP header.
    pub fn seq_number(&self) -> u32 {
        self.seq_number
    }

    /// Returns the `acknowledgment number` field of the TCP header.
    pub fn ack_number(&self) -> u32 {
        self.ack_number
    }

    /// Sets the `acknowledgment number` field of the TCP header with the
    /// provided value.
    pub fn set_ack_number(&mut self, ack: u32) {
        self.ack_number = ack;
    }

    /// Returns the `data offset` field of the TCP header.
    ///
    /// To get the header length (including options) in bytes, use
    /// [TcpHeader::header_len].
    pub fn data_offset(&self) -> u8 {
        // Stored in the higher 4 bits.
        (self.offset_and_control_bits >> 12) as u8
    }

    /// Returns the control bits as a byte, FIN in the least significant bit.
    pub fn flags(&self) -> u8 {
        (self.offset_and_control_bits & 0b11_1111) as u8
    }

    /// Returns `true` if the URG (Urgent) control bit is set in the TCP header.
    pub fn urg(&self) -> bool {
        // Stored at the 5th bit.
        (self.offset_and_control_bits >> 5) & 1 == 1
    }

    /// Sets the URG (Urgent) control bit in the TCP header, if not already set.
    pub fn set_urg(&mut self) {
        self.offset_and_control_bits |= 1 << 5;
    }

    /// Returns `true` if the ACK (Acknowledgment) control bit is set in the TCP
    /// header.
    pub fn ack(&self) -> bool {
        // Stored at the 4th bit.
        (self.offset_and_control_bits >> 4) & 1 == 1
    }

    /// Sets the ACK (Acknowledgment) control bit in the TCP header, if not
    /// already set.
    pub fn set_ack(&mut self) {
        self.offset_and_control_bits |= 1 << 4;
    }

    /// Returns `true` if the PSH (Push) control bit is set in the TCP header.
    pub fn psh(&self) -> bool {
        // Stored at the 3rd bit.
        (self.offset_and_control_bits >> 3) & 1 == 1
    }

    /// Sets the PSH (Push) control bit in the TCP header, if not already set.
    pub fn set_psh(&mut self) {
        self.offset_and_control_bits |= 1 << 3;
    }

    /// Returns `true` if the RST (Reset) control bit is set in the TCP header.
    pub fn rst(&self) -> bool {
        // Stored at the 2nd bit.
        (self.offset_and_control_bits >> 2) & 1 == 1
    }

    /// Sets the RST (Reset) control bit in the TCP header, if not already set.
    pub fn set_rst(&mut self) {
        self.offset_and_control_bits |= 1 << 2;
    }

    /// Returns `true` if the SYN (Synchronize) control bit is set in the TCP
    /// header.
    pub fn syn(&self) -> bool {
        // Stored at the 1st bit.
        (self.offset_and_control_bits >> 1) & 1 == 1
    }

    /// Sets the SYN (Synchronize) control bit in the TCP header, if not already
    /// set.
    pub fn set_syn(&mut self) {
        self.offset_and_control_bits |= 1 << 1;
    }

    /// Returns `true` if the FIN (Finish) control bit is set in the TCP header.
    pub fn fin(&self) -> bool {
        // Stored at the LSB.
        self.offset_and_control_bits & 1 == 1
    }

    /// Sets the FIN (Finish) control bit in the TCP header, if not already set.
    pub fn set_fin(&mut self) {
        self.offset_and_control_bits |= 1;
    }

    /// Returns the `window` field of the TCP header.
    pub fn window(&self) -> u16 {
        self.window
    }

    /// Returns the `checksum` field of the TCP header.
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    /// Computes and updates the `checksum` field for the TCP header.
    pub fn set_checksum(&mut self, src: [u8; 4], dst: [u8; 4], payload: &[u8]) {
        self.checksum = self.compute_checksum(src, dst, payload);
    }

    /// Returns `true` if the TCP header checksum is valid.
    pub fn is_valid_checksum(&self, src: [u8; 4], dst: [u8; 4], payload: &[u8]) -> bool {
        self.checksum == self.compute_checksum(src, dst, payload)
    }

    /// Returns the `urgent pointer` field of the TCP header.
    pub fn urgent_pointer(&self) -> u16 {
        self.urgent_pointer
    }

    /// Sets the `urgent pointer` field of the TCP header.
    pub fn set_urgent_pointer(&mut self, urgent_pointer: u16) {
        self.urgent_pointer = urgent_pointer;
    }

    /// Returns the options word of the TCP header, if present.
    pub fn options(&self) -> Option<u32> {
        self.options
    }

    /// Sets the options word and grows the data offset to cover it.
    pub fn set_options(&mut self, word: u32) {
        self.options = Some(word);

        // Clear previous data offset value, keeping the values of the reserved
        // and control bits.
        self.offset_and_control_bits &= 0x0FFF;
        self.offset_and_control_bits |= ((Self::MIN_DATA_OFFSET as u16) + 1) << 12;
    }

    /// Sets the `Maximum Segment Size` (MSS) option as the options word.
    ///
    /// ```text
    ///        +--------+--------+---------+--------+
    ///        |00000010|00000100|   max seg size   |
    ///        +--------+--------+---------+--------+
    ///         Kind=2   Length=4
    /// ```
    pub fn set_option_mss(&mut self, mss: u16) {
        let word = u32::from_be_bytes([
            Self::MSS_KIND,
            Self::OPTIONS_LEN as u8,
            (mss >> 8) as u8,
            mss as u8,
        ]);

        self.set_options(word);
    }

    /// Returns the Maximum Segment Size (MSS) carried in the options word, if
    /// the word holds that option.
    pub fn mss(&self) -> Option<u16> {
        let [kind, len, hi, lo] = self.options?.to_be_bytes();

        if kind == Self::MSS_KIND && len == Self::OPTIONS_LEN as u8 {
            Some(u16::from_be_bytes([hi, lo]))
        } else {
            None
        }
    }

    /// Returns the length of the TCP header in bytes, including options.
    pub fn header_len(&self) -> usize {
        match self.options {
            Some(_) => Self::MAX_HEADER_LEN,
            None => Self::MIN_HEADER_LEN,
        }
    }

    /// Returns the computed checksum of the TCP header.
    ///
    /// The checksum field is the 16 bit one's complement of the one's
    /// complement sum of all 16 bit words in the pseudo header, TCP header,
    /// and payload. For purposes of computing the checksum, the value of the
    /// checksum field is zero.
    pub fn compute_checksum(&self, src: [u8; 4], dst: [u8; 4], payload: &[u8]) -> u16 {
        let mut pseudo_header = [0u8; 12];

        pseudo_header[0..4].copy_from_slice(&src);
        pseudo_header[4..8].copy_from_slice(&dst);
        pseudo_header[8] = 0;
        pseudo_header[9] = Protocol::TCP.into();

        let tcp_len = (self.header_len() + payload.len()) as u16;
        pseudo_header[10..12].copy_from_slice(&tcp_len.to_be_bytes());

        let (mut raw_header, nbytes) = self.to_be_bytes();

        // Checksum field must be 0 for computation.
        raw_header[16] = 0x00;
        raw_header[17] = 0x00;

        internet_checksum(&[&pseudo_header, &raw_header[..nbytes], payload])
    }

    /// Returns the memory representation of the TCP header as a byte array in
    /// big-endian (network) byte order.
    ///
    /// A buffer of size `TcpHeader::MAX_HEADER_LEN` is used as the byte array,
    /// so the number of bytes written is also returned.
    #[allow(clippy::wrong_self_convention)]
    pub fn to_be_bytes(&self) -> ([u8; Self::MAX_HEADER_LEN], usize) {
        let mut raw_header = [0u8; Self::MAX_HEADER_LEN];

        raw_header[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        raw_header[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        raw_header[4..8].copy_from_slice(&self.seq_number.to_be_bytes());
        raw_header[8..12].copy_from_slice(&self.ack_number.to_be_bytes());
        raw_header[12..14].copy_from_slice(&self.offset_and_control_bits.to_be_bytes());
        raw_header[14..16].copy_from_slice(&self.window.to_be_bytes());
        raw_header[16..18].copy_from_slice(&self.checksum.to_be_bytes());
        raw_header[18..20].copy_from_slice(&self.urgent_pointer.to_be_bytes());

        if let Some(word) = self.options {
            raw_header[20..24].copy_from_slice(&word.to_be_bytes());
        }

        (raw_header, self.header_len())
    }

    /// Writes the TCP header to the given output stream.
    ///
    /// # Note
    ///
    /// The caller must ensure the checksum is computed and updated before
    /// writing the header.
    pub fn write<T: io::Write>(&self, output: &mut T) -> crate::Result<()> {
        let (raw_header, nbytes) = self.to_be_bytes();
        output.write_all(&raw_header[..nbytes])?;

        Ok(())
    }
}

impl TryFrom<&[u8]> for TcpHeader {
    type Error = Error;

    fn try_from(header_raw: &[u8]) -> Result<Self, Self::Error> {
        if header_raw.len() < Self::MIN_HEADER_LEN {
            return Err(Error::Parse(ParseError::InvalidBufferLength {
                provided: header_raw.len(),
                min: Self::MIN_HEADER_LEN,
            }));
        }

        let offset_and_control_bits = u16::from_be_bytes([header_raw[12], header_raw[13]]);
        let data_offset = (offset_and_control_bits >> 12) as u8;

        if data_offset < Self::MIN_DATA_OFFSET {
            return Err(Error::Parse(ParseError::InvalidDataOffset {
                provided: data_offset,
                min: Self::MIN_DATA_OFFSET,
            }));
        }

        let header_len = (data_offset as usize) << 2;

        if header_len > Self::MAX_HEADER_LEN {
            return Err(Error::Parse(ParseError::UnsupportedOptions {
                provided: header_len - Self::MIN_HEADER_LEN,
                max: Self::OPTIONS_LEN,
            }));
        }

        // There are less bytes in the buffer than advertised by data offset.
        if header_len > header_raw.len() {
            return Err(Error::Parse(ParseError::HeaderLengthMismatch {
                provided: header_raw.len(),
                expected: header_len,
            }));
        }

        let options = (header_len == Self::MAX_HEADER_LEN).then(|| {
            u32::from_be_bytes([header_raw[20], header_raw[21], header_raw[22], header_raw[23]])
        });

        Ok(Self {
            src_port: u16::from_be_bytes([header_raw[0], header_raw[1]]),
            dst_port: u16::from_be_bytes([header_raw[2], header_raw[3]]),
            seq_number: u32::from_be_bytes([
                header_raw[4],
                header_raw[5],
                header_raw[6],
                header_raw[7],
            ]),
            ack_number: u32::from_be_bytes([
                header_raw[8],
                header_raw[9],
                header_raw[10],
                header_raw[11],
            ]),
            offset_and_control_bits,
            window: u16::from_be_bytes([header_raw[14], header_raw[15]]),
            checksum: u16::from_be_bytes([header_raw[16], header_raw[17]]),
            urgent_pointer: u16::from_be_bytes([header_raw[18], header_raw[19]]),
            options,
        })
    }
}

impl Default for TcpHeader {
    fn default() -> Self {
        Self {
            // Bits 0..4 (Data Offset) = 5
            //
            // Bits 4..10 (Reserved) = 0
            //
            // Bits 10..16 (URG, ACK, PSH, RST, SYN, FIN) = 0
            offset_and_control_bits: 0b0101_000000_000000,
            ack_number: 0,
            checksum: 0,
            urgent_pointer: 0,
            options: None,

            src_port: 0,
            dst_port: 0,
            seq_number: 0,
            window: 0,
        }
    }
}

impl fmt::Display for TcpHeader {
    /// Formats the header in RFC 793 segment notation, e.g.
    /// `<SEQ=100><ACK=300><CTL=SYN,ACK><WND=29200>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 6] = ["FIN", "SYN", "RST", "PSH", "ACK", "URG"];

        let ctl = (0..NAMES.len())
            .rev()
            .filter(|bit| self.flags() & (1 << bit) != 0)
            .map(|bit| NAMES[bit])
            .collect::<Vec<_>>()
            .join(",");

        write!(
            f,
            "<SEQ={}><ACK={}><CTL={}><WND={}>",
            self.seq_number, self.ack_number, ctl, self.window
        )
    }
}

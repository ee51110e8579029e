use std::io;

use super::internet_checksum;
use crate::{Error, HeaderError, ParseError};

/// IPv4 Datagram Header.
///
/// RFC 791 (3.1)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |Version|  IHL  |Type of Service|          Total Length         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |         Identification        |Flags|      Fragment Offset    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Time to Live |    Protocol   |         Header Checksum       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       Source Address                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                    Destination Address                        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                    Options                    |    Padding    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// # Note
///
/// Options on received datagrams are validated by the checksum and then
/// skipped. Outgoing datagrams never carry options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// The version field indicates the format of the internet header.
    ///
    /// Internet Header Length (IHL) is the length of the internet header in
    /// 32-bit words.
    version_ihl: u8,
    /// Type of service.
    tos: u8,
    /// Total length is the length of the datagram, measured in octets,
    /// including internet header and payload.
    total_len: u16,
    /// An identifying value assigned by the sender to aid in assembling the
    /// fragments of a datagram.
    id: u16,
    /// Control flags:
    ///
    /// ```text
    ///      Bit 0: reserved, must be zero
    ///      Bit 1: (DF) 0 = May Fragment,  1 = Don't Fragment.
    ///      Bit 2: (MF) 0 = Last Fragment, 1 = More Fragments.
    /// ```
    ///
    /// Fragment offset indicates where in the datagram this fragment belongs,
    /// measured in units of 8 octets (64-bits).
    flags_and_offset: u16,
    /// Indicates the maximum time the datagram is allowed to remain in the
    /// internet system.
    ttl: u8,
    /// Indicates the next level protocol used in the data portion of the
    /// internet datagram.
    protocol: Protocol,
    /// A checksum on the header only.
    header_checksum: u16,
    /// The source address.
    src_addr: [u8; 4],
    /// The destination address.
    dst_addr: [u8; 4],
}

impl Ipv4Header {
    /// Minimum length of an IPv4 header in bytes.
    pub const MIN_HEADER_LEN: u16 = 20;

    /// Maximum length of an IPv4 header in bytes (IHL of 15).
    pub const MAX_HEADER_LEN: u16 = 60;

    /// Minimum value of the IHL field.
    pub const MIN_IHL: u8 = 5;

    /// Maximum payload length in bytes, accounting for the header length.
    pub const MAX_PAYLOAD_LEN: u16 = u16::MAX - Self::MIN_HEADER_LEN;

    /// Creates a new IPv4 header with the specified source and destination
    /// addresses, payload length, TTL, and protocol. The `DF` bit is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the `payload_len` exceeds the maximum allowed
    /// payload length.
    pub fn new(
        src: [u8; 4],
        dst: [u8; 4],
        payload_len: usize,
        ttl: u8,
        protocol: Protocol,
    ) -> crate::Result<Self> {
        let mut header = Self {
            ttl,
            protocol,
            src_addr: src,
            dst_addr: dst,
            ..Default::default()
        };

        header.set_payload_len(payload_len)?;

        Ok(header)
    }

    /// Returns the `version` field of the IPv4 header.
    pub fn version(&self) -> u8 {
        // Stored in the higher 4 bits.
        self.version_ihl >> 4
    }

    /// Returns the `IHL` field of the IPv4 header, specified in 32-bit words.
    ///
    /// To get the header length in bytes, use [Ipv4Header::header_len].
    pub fn ihl(&self) -> u8 {
        // Stored in the lower 4 bits.
        self.version_ihl & 0xF
    }

    /// Returns the `type of service` field of the IPv4 header.
    pub fn tos(&self) -> u8 {
        self.tos
    }

    /// Returns the `total length` field of the IPv4 header.
    pub fn total_len(&self) -> u16 {
        self.total_len
    }

    /// Sets the `total length` field of the IPv4 header given a payload length.
    ///
    /// # Errors
    ///
    /// Returns an error if the `payload_len` exceeds the maximum allowed
    /// payload length.
    pub fn set_payload_len(&mut self, payload_len: usize) -> crate::Result<()> {
        if payload_len > Self::MAX_PAYLOAD_LEN as usize {
            return Err(Error::Header(HeaderError::PayloadTooLarge {
                provided: payload_len,
                max: Self::MAX_PAYLOAD_LEN,
            }));
        }

        self.total_len = Self::MIN_HEADER_LEN + payload_len as u16;

        Ok(())
    }

    /// Returns the `identification` field of the IPv4 header.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Sets the `identification` field of the IPv4 header.
    pub fn set_id(&mut self, id: u16) {
        self.id = id;
    }

    /// Returns `true` if the `DF` (Don't Fragment) bit is set.
    pub fn dont_fragment(&self) -> bool {
        // Stored at the 14th bit.
        (self.flags_and_offset >> 14) & 1 == 1
    }

    /// Returns `true` if the `MF` (More Fragments) bit is set.
    pub fn more_fragments(&self) -> bool {
        // Stored at the 13th bit.
        (self.flags_and_offset >> 13) & 1 == 1
    }

    /// Returns the `fragment offset` field of the IPv4 header.
    pub fn fragment_offset(&self) -> u16 {
        // Stored in the lower 13 bits.
        self.flags_and_offset & 0x1FFF
    }

    /// Returns `true` if the datagram is one piece of a fragmented datagram.
    pub fn is_fragment(&self) -> bool {
        self.more_fragments() || self.fragment_offset() != 0
    }

    /// Returns the `time to live` field of the IPv4 header.
    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    /// Returns the `protocol` field of the IPv4 header.
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Returns the `header checksum` field of the IPv4 header.
    pub fn header_checksum(&self) -> u16 {
        self.header_checksum
    }

    /// Computes and updates the header checksum for the IPv4 header.
    pub fn set_header_checksum(&mut self) {
        self.header_checksum = self.compute_header_checksum();
    }

    /// Returns the `source address` field of the IPv4 header.
    pub fn src(&self) -> [u8; 4] {
        self.src_addr
    }

    /// Returns the `destination address` field of the IPv4 header.
    pub fn dst(&self) -> [u8; 4] {
        self.dst_addr
    }

    /// Returns the length of the IPv4 header in bytes, including any options,
    /// not including payload.
    pub fn header_len(&self) -> usize {
        (self.ihl() as usize) << 2
    }

    /// Returns the payload length announced by the IPv4 header.
    pub fn payload_len(&self) -> usize {
        // total_len >= (IHL << 2) is checked when parsing.
        self.total_len as usize - self.header_len()
    }

    /// Returns the computed checksum of the option-less IPv4 header.
    ///
    /// For purposes of computing the checksum, the value of the checksum field
    /// is zero.
    pub fn compute_header_checksum(&self) -> u16 {
        let mut header_bytes = self.to_be_bytes();

        // Checksum field must be 0 for computation.
        header_bytes[10] = 0x00;
        header_bytes[11] = 0x00;

        internet_checksum(&[&header_bytes])
    }

    /// Returns the memory representation of the IPv4 header as a byte array in
    /// big-endian (network) byte order.
    ///
    /// Options are never serialized, so the IHL is always written as 5.
    #[allow(clippy::wrong_self_convention)]
    pub fn to_be_bytes(&self) -> [u8; Self::MIN_HEADER_LEN as usize] {
        let mut raw_header = [0u8; Self::MIN_HEADER_LEN as usize];

        raw_header[0] = (4 << 4) | Self::MIN_IHL;
        raw_header[1] = self.tos;
        raw_header[2..4].copy_from_slice(&self.total_len.to_be_bytes());
        raw_header[4..6].copy_from_slice(&self.id.to_be_bytes());
        raw_header[6..8].copy_from_slice(&self.flags_and_offset.to_be_bytes());
        raw_header[8] = self.ttl;
        raw_header[9] = self.protocol.into();
        raw_header[10..12].copy_from_slice(&self.header_checksum.to_be_bytes());
        raw_header[12..16].copy_from_slice(&self.src_addr);
        raw_header[16..20].copy_from_slice(&self.dst_addr);

        raw_header
    }

    /// Writes the IPv4 header to the given output stream.
    ///
    /// # Note
    ///
    /// The caller must ensure the checksum is computed and updated before
    /// writing the header.
    pub fn write<T: io::Write>(&self, output: &mut T) -> crate::Result<()> {
        Ok(output.write_all(&self.to_be_bytes())?)
    }
}

impl TryFrom<&[u8]> for Ipv4Header {
    type Error = Error;

    /// Parses the header at the front of a datagram, verifying the header
    /// checksum over the raw bytes (options included) and checking that the
    /// buffer holds the full `total length`.
    fn try_from(header_raw: &[u8]) -> Result<Self, Self::Error> {
        if header_raw.len() < Self::MIN_HEADER_LEN as usize {
            return Err(Error::Parse(ParseError::InvalidBufferLength {
                provided: header_raw.len(),
                min: Self::MIN_HEADER_LEN as usize,
            }));
        }

        let version_ihl = header_raw[0];

        if (version_ihl >> 4) != 4 {
            return Err(Error::Parse(ParseError::InvalidVersion {
                provided: version_ihl >> 4,
                expected: 4,
            }));
        }

        let ihl = version_ihl & 0xF;

        if ihl < Self::MIN_IHL {
            return Err(Error::Parse(ParseError::InvalidIhl {
                provided: ihl,
                min: Self::MIN_IHL,
            }));
        }

        let header_len = (ihl as usize) << 2;
        let total_len = u16::from_be_bytes([header_raw[2], header_raw[3]]);

        // Total length is less than the header length, or more bytes were
        // announced than received.
        if (total_len as usize) < header_len || (total_len as usize) > header_raw.len() {
            return Err(Error::Parse(ParseError::InvalidTotalLength {
                provided: total_len,
                available: header_raw.len(),
            }));
        }

        let header_checksum = u16::from_be_bytes([header_raw[10], header_raw[11]]);

        // Summing the header including its checksum yields zero when intact.
        let residue = internet_checksum(&[&header_raw[..header_len]]);

        if residue != 0 {
            let mut zeroed = header_raw[..header_len].to_vec();
            zeroed[10] = 0x00;
            zeroed[11] = 0x00;

            return Err(Error::Parse(ParseError::InvalidChecksum {
                provided: header_checksum,
                expected: internet_checksum(&[&zeroed]),
            }));
        }

        Ok(Self {
            version_ihl,
            tos: header_raw[1],
            total_len,
            id: u16::from_be_bytes([header_raw[4], header_raw[5]]),
            flags_and_offset: u16::from_be_bytes([header_raw[6], header_raw[7]]),
            ttl: header_raw[8],
            protocol: Protocol::from(header_raw[9]),
            header_checksum,
            src_addr: [
                header_raw[12],
                header_raw[13],
                header_raw[14],
                header_raw[15],
            ],
            dst_addr: [
                header_raw[16],
                header_raw[17],
                header_raw[18],
                header_raw[19],
            ],
        })
    }
}

impl Default for Ipv4Header {
    fn default() -> Self {
        Self {
            // Version = 4
            // IHL = 5
            version_ihl: 0b0100_0101,
            tos: 0,
            id: 0,
            // Bit 0 = 0 (Reserved)
            // Bit 1 = 1 (Don't Fragment)
            // Bit 2 = 0 (Last Fragment)
            //
            // Fragment Offset = 0
            flags_and_offset: 0b010_0000000000000,
            header_checksum: 0,

            total_len: Self::MIN_HEADER_LEN,
            ttl: 0,
            protocol: Protocol::TCP,
            src_addr: [0; 4],
            dst_addr: [0; 4],
        }
    }
}

/// Assigned Internet Protocol Numbers (RFC 1700) the stack distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub enum Protocol {
    /// Internet Control Message
    ICMP,
    /// Transmission Control
    TCP,
    /// User Datagram
    UDP,
    /// Any other protocol number, carried through unchanged.
    Other(u8),
}

impl From<Protocol> for u8 {
    fn from(proto: Protocol) -> u8 {
        match proto {
            Protocol::ICMP => 1,
            Protocol::TCP => 6,
            Protocol::UDP => 17,
            Protocol::Other(val) => val,
        }
    }
}

impl From<u8> for Protocol {
    fn from(val: u8) -> Self {
        match val {
            1 => Protocol::ICMP,
            6 => Protocol::TCP,
            17 => Protocol::UDP,
            _ => Protocol::Other(val),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn ipv4_header_parsing_no_panic(header_bytes in prop::collection::vec(any::<u8>(), 0..Ipv4Header::MAX_HEADER_LEN as usize)) {
            if let Ok(header) = Ipv4Header::try_from(&header_bytes[..]) {
                prop_assert!(header.header_len() <= header_bytes.len());
                prop_assert!(header.total_len() as usize <= header_bytes.len());
            }
        }
    }

    const HEADER_BYTES: [u8; 20] = [
        0x45, 0x00, 0x00, 0x3c, 0xbe, 0xfa, 0x40, 0x00, 0x40, 0x06, 0xfa, 0x43, 0xc0, 0xa8, 0x00,
        0x01, 0xc0, 0xa8, 0x00, 0x2c,
    ];

    fn datagram() -> Vec<u8> {
        // Total length of 60 bytes: header followed by 40 bytes of payload.
        let mut buf = HEADER_BYTES.to_vec();
        buf.resize(60, 0xAB);
        buf
    }

    #[test]
    fn ipv4_header_basic_valid() {
        let buf = datagram();

        let header = Ipv4Header::try_from(&buf[..]);
        assert!(header.is_ok());
        let header = header.unwrap();

        assert_eq!(header.version(), 4);
        assert_eq!(header.ihl(), 5);
        assert_eq!(header.tos(), 0);
        assert_eq!(header.total_len(), 60);
        assert_eq!(header.id(), 48890);
        assert!(header.dont_fragment());
        assert!(!header.more_fragments());
        assert!(!header.is_fragment());
        assert_eq!(header.fragment_offset(), 0);
        assert_eq!(header.ttl(), 64);
        assert_eq!(header.protocol(), Protocol::TCP);
        assert_eq!(header.header_checksum(), 0xFA43);
        assert_eq!(header.src(), [192u8, 168u8, 0u8, 1u8]);
        assert_eq!(header.dst(), [192u8, 168u8, 0u8, 44u8]);
        assert_eq!(header.header_len(), 20);
        assert_eq!(header.payload_len(), 40);
        assert_eq!(header.to_be_bytes(), HEADER_BYTES);
    }

    #[test]
    fn ipv4_header_new_computes_checksum() {
        let mut header = Ipv4Header::new([10, 0, 0, 2], [93, 184, 216, 34], 40, 64, Protocol::TCP)
            .unwrap();
        header.set_id(0x1234);
        header.set_header_checksum();

        assert!(header.dont_fragment());
        assert_eq!(header.total_len(), 60);

        let mut buf = header.to_be_bytes().to_vec();
        buf.resize(60, 0);

        assert_eq!(Ipv4Header::try_from(&buf[..]).unwrap(), header);
    }

    #[test]
    fn ipv4_header_payload_too_large_invalid() {
        let header = Ipv4Header::new([0; 4], [0; 4], 70_000, 64, Protocol::TCP);

        assert!(matches!(
            header,
            Err(Error::Header(HeaderError::PayloadTooLarge {
                provided: 70_000,
                ..
            }))
        ));
    }

    #[test]
    fn ipv4_header_any_bit_flip_is_detected() {
        let buf = datagram();

        for byte in 0..Ipv4Header::MIN_HEADER_LEN as usize {
            for bit in 0..8 {
                let mut corrupted = buf.clone();
                corrupted[byte] ^= 1 << bit;

                assert!(
                    Ipv4Header::try_from(&corrupted[..]).is_err(),
                    "bit {bit} of byte {byte} flipped unnoticed"
                );
            }
        }
    }

    #[test]
    fn ipv4_header_with_options_skipped() {
        // IHL of 6 with a 4 byte NOP option word.
        let mut raw = vec![
            0x46, 0x00, 0x00, 0x1c, 0x00, 0x01, 0x40, 0x00, 0x40, 0x06, 0x00, 0x00, 0x0a, 0x00,
            0x00, 0x01, 0x0a, 0x00, 0x00, 0x02, 0x01, 0x01, 0x01, 0x01, 0xde, 0xad, 0xbe, 0xef,
        ];
        let checksum = internet_checksum(&[&raw[..24]]);
        raw[10..12].copy_from_slice(&checksum.to_be_bytes());

        let header = Ipv4Header::try_from(&raw[..]).unwrap();

        assert_eq!(header.header_len(), 24);
        assert_eq!(header.payload_len(), 4);
        assert_eq!(&raw[header.header_len()..header.total_len() as usize], &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn ipv4_header_invalid_fields() {
        let mut buf = datagram();
        buf[0] = 0x65;
        assert!(matches!(
            Ipv4Header::try_from(&buf[..]),
            Err(Error::Parse(ParseError::InvalidVersion { provided: 6, expected: 4 }))
        ));

        let mut buf = datagram();
        buf[0] = 0x44;
        assert!(matches!(
            Ipv4Header::try_from(&buf[..]),
            Err(Error::Parse(ParseError::InvalidIhl { provided: 4, min: 5 }))
        ));

        // Announces 60 bytes but only the header arrived.
        assert!(matches!(
            Ipv4Header::try_from(&HEADER_BYTES[..]),
            Err(Error::Parse(ParseError::InvalidTotalLength { provided: 60, available: 20 }))
        ));

        assert!(Ipv4Header::try_from(&HEADER_BYTES[..19]).is_err());
    }

    #[test]
    fn protocol_numbers_round_trip() {
        assert_eq!(u8::from(Protocol::TCP), 6);
        assert_eq!(Protocol::from(6), Protocol::TCP);
        assert_eq!(Protocol::from(89), Protocol::Other(89));
        assert_eq!(u8::from(Protocol::Other(89)), 89);
    }
}

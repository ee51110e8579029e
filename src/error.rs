//! Error types for the raw-socket stack, covering link failures, malformed
//! frames/datagrams/segments, fatal connection aborts, and HTTP responses.

use std::{error, fmt, io, result};

/// Creates a [`crate::Error::Io`] with a custom message prefixed to the current
/// `errno` value.
macro_rules! errno {
    ($($arg:tt)+) => {{
        let errno = ::std::io::Error::last_os_error();
        let prefix = format!($($arg)+);
        let msg = format!("{prefix}: {errno}");
        $crate::Error::Io(::std::io::Error::new(errno.kind(), msg))
    }};
}
pub(crate) use errno;

/// A convenience wrapper around `Result` for [crate::Error].
pub type Result<T> = result::Result<T, Error>;

/// Set of errors that can occur while operating the stack.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The underlying link could not be read from or written to.
    Io(io::Error),
    /// Error parsing a frame, datagram, or segment.
    Parse(ParseError),
    /// Error constructing a header.
    Header(HeaderError),
    /// The connection was given up after its retry budget was exhausted.
    Aborted(Abort),
    /// The HTTP response could not be used.
    Http(HttpError),
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Error {
        Error::Parse(err)
    }
}

impl From<HeaderError> for Error {
    fn from(err: HeaderError) -> Error {
        Error::Header(err)
    }
}

impl From<Abort> for Error {
    fn from(err: Abort) -> Error {
        Error::Aborted(err)
    }
}

impl From<HttpError> for Error {
    fn from(err: HttpError) -> Error {
        Error::Http(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Io(ref err) => fmt::Display::fmt(err, f),
            Error::Parse(ref err) => fmt::Display::fmt(err, f),
            Error::Header(ref err) => fmt::Display::fmt(err, f),
            Error::Aborted(ref err) => fmt::Display::fmt(err, f),
            Error::Http(ref err) => fmt::Display::fmt(err, f),
        }
    }
}

/// Error occurred while trying to parse raw bytes received from the link.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum ParseError {
    /// Input buffer shorter than the fixed part of the header.
    InvalidBufferLength { provided: usize, min: usize },
    /// Invalid IPv4 version.
    InvalidVersion { provided: u8, expected: u8 },
    /// Invalid IPv4 IHL.
    InvalidIhl { provided: u8, min: u8 },
    /// Invalid IPv4 total length.
    ///
    /// Value provided is less than `IHL << 2` or larger than the buffer.
    InvalidTotalLength { provided: u16, available: usize },
    /// Invalid TCP data offset.
    InvalidDataOffset { provided: u8, min: u8 },
    /// Mismatch between the provided and expected TCP header length.
    ///
    /// Value provided is less than `data_offset << 2`.
    HeaderLengthMismatch { provided: usize, expected: usize },
    /// TCP options longer than the single supported 32-bit word.
    UnsupportedOptions { provided: usize, max: usize },
    /// Checksum carried by the header does not match the computed one.
    InvalidChecksum { provided: u16, expected: u16 },
    /// ARP packet for a hardware/protocol pair other than Ethernet/IPv4.
    UnsupportedArp { htype: u16, ptype: u16 },
}

impl error::Error for ParseError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ParseError::InvalidBufferLength { provided, min } => {
                write!(
                    f,
                    "invalid buffer length: {provided} bytes (less than minimum required {min} bytes)"
                )
            }
            ParseError::InvalidVersion { provided, expected } => {
                write!(
                    f,
                    "invalid IP version: IPv{provided} (must be IPv{expected})"
                )
            }
            ParseError::InvalidIhl { provided, min } => {
                write!(f, "invalid IPv4 IHL: {provided} (less than minimum {min})")
            }
            ParseError::InvalidTotalLength {
                provided,
                available,
            } => {
                write!(
                    f,
                    "invalid IPv4 total length: {provided} bytes (header or buffer of {available} bytes does not agree)"
                )
            }
            ParseError::InvalidDataOffset { provided, min } => {
                write!(
                    f,
                    "invalid TCP data offset: {provided} (less than minimum {min})"
                )
            }
            ParseError::HeaderLengthMismatch { provided, expected } => {
                write!(
                    f,
                    "invalid TCP header length: {provided} bytes (less than indicated by data offset: {expected} bytes)"
                )
            }
            ParseError::UnsupportedOptions { provided, max } => {
                write!(
                    f,
                    "unsupported TCP options length: {provided} bytes (only {max} bytes are representable)"
                )
            }
            ParseError::InvalidChecksum { provided, expected } => {
                write!(
                    f,
                    "invalid checksum: 0x{provided:04x} (expected 0x{expected:04x})"
                )
            }
            ParseError::UnsupportedArp { htype, ptype } => {
                write!(
                    f,
                    "unsupported ARP packet: htype 0x{htype:04x}, ptype 0x{ptype:04x} (only Ethernet/IPv4)"
                )
            }
        }
    }
}

/// Error occurred while trying to create a header.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum HeaderError {
    /// Invalid payload length for an IPv4 header.
    PayloadTooLarge { provided: usize, max: u16 },
}

impl error::Error for HeaderError {}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HeaderError::PayloadTooLarge { provided, max } => {
                write!(
                    f,
                    "failed to set IPv4 payload length: {provided} bytes (exceeds maximum allowed {max} bytes)"
                )
            }
        }
    }
}

/// Reasons a connection is given up for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abort {
    /// No `SYN_ACK` arrived for the original `SYN` or its single retransmission.
    Handshake,
    /// The peer never opened a window large enough for the next segment.
    SendStalled,
    /// Nothing arrived from the peer for the whole datagram timeout.
    LinkSilent,
    /// The peer reset the connection.
    Reset,
    /// The gateway did not answer the ARP request.
    ArpUnresolved,
}

impl error::Error for Abort {}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match *self {
            Abort::Handshake => "connection aborted: no SYN_ACK after retransmitting SYN",
            Abort::SendStalled => "connection aborted: peer window never admitted pending data",
            Abort::LinkSilent => "connection aborted: no datagram received from peer",
            Abort::Reset => "connection reset by peer",
            Abort::ArpUnresolved => "gateway hardware address could not be resolved",
        };

        f.write_str(msg)
    }
}

/// Error occurred while interpreting an HTTP exchange.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum HttpError {
    /// The response has no status line or no header terminator.
    Malformed,
    /// The response status was not `200`.
    Status(String),
    /// The host name did not resolve to an IPv4 address.
    Unresolved(String),
}

impl error::Error for HttpError {}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpError::Malformed => f.write_str("malformed HTTP response"),
            HttpError::Status(ref code) => {
                write!(f, "unexpected HTTP status code: {code} (expected 200)")
            }
            HttpError::Unresolved(ref host) => {
                write!(f, "failed to resolve an IPv4 address for host: {host}")
            }
        }
    }
}

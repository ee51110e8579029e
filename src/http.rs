//! A minimal HTTP/1.0 client fetching one resource over [TcpSocket].

use std::net::{IpAddr, Ipv4Addr, TcpListener, ToSocketAddrs};

use tracing::{info, warn};

use crate::config::{LinkConfig, TcpConfig};
use crate::error::HttpError;
use crate::link::IpLink;
use crate::protocol::{Socket, SocketAddr, TcpSocket};
use crate::Result;

const SCHEME: &str = "http://";
const CRLF: &str = "\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// File name used when the URL names no file.
pub const DEFAULT_FILE_NAME: &str = "index.html";

/// A `GET` request for one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Host the request is sent to.
    pub host: String,
    /// Absolute path of the resource, `/` at least.
    pub path: String,
}

impl Request {
    /// Splits `url` into host and path. The `http://` prefix is optional.
    pub fn from_url(url: &str) -> Self {
        let url = url.strip_prefix(SCHEME).unwrap_or(url);

        match url.find('/') {
            Some(idx) => Self {
                host: url[..idx].to_string(),
                path: url[idx..].to_string(),
            },
            None => Self {
                host: url.to_string(),
                path: "/".to_string(),
            },
        }
    }

    /// Renders the request as sent on the wire.
    pub fn render(&self) -> String {
        format!("GET {} HTTP/1.0{CRLF}Host: {}{CRLF}{CRLF}", self.path, self.host)
    }
}

/// A parsed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code as it appears in the status line.
    pub status: String,
    /// Everything after the header block.
    pub body: Vec<u8>,
}

impl Response {
    /// Parses the status code and body out of a raw response.
    ///
    /// # Errors
    ///
    /// Returns [HttpError::Malformed] if the status line has no status code
    /// or the header block is not terminated.
    pub fn parse(raw: &[u8]) -> std::result::Result<Self, HttpError> {
        let line_end = find(raw, CRLF.as_bytes()).ok_or(HttpError::Malformed)?;
        let status_line = String::from_utf8_lossy(&raw[..line_end]);

        let status = status_line
            .split_whitespace()
            .nth(1)
            .ok_or(HttpError::Malformed)?
            .to_string();

        let body_start = find(raw, HEADER_END).ok_or(HttpError::Malformed)? + HEADER_END.len();

        Ok(Self {
            status,
            body: raw[body_start..].to_vec(),
        })
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Returns the name of the file the resource at `url` is saved as: the last
/// path component, or [DEFAULT_FILE_NAME] when the URL has no path or ends
/// with `/`.
pub fn output_file_name(url: &str) -> String {
    let url = url.strip_prefix(SCHEME).unwrap_or(url);

    match url.rfind('/') {
        Some(idx) if idx + 1 < url.len() => url[idx + 1..].to_string(),
        _ => DEFAULT_FILE_NAME.to_string(),
    }
}

/// Fetches `url` over a raw link and returns the response body.
///
/// # Errors
///
/// Returns an error if the host does not resolve, the link cannot be opened,
/// the connection is aborted, or the response is malformed or not `200`.
pub fn get(url: &str, tcp: TcpConfig, link: &LinkConfig) -> Result<Vec<u8>> {
    let request = Request::from_url(url);
    let remote = resolve(&request.host, tcp.dst_port)?;

    let ip = IpLink::open(remote, link)?;
    let local = SocketAddr::new(ip.local_addr(), free_port()?);
    let sock = Socket::new(local, SocketAddr::new(remote, tcp.dst_port));

    info!("[{sock}] GET {} from {}", request.path, request.host);

    let mut socket = TcpSocket::new(ip, sock, tcp);
    socket.send(request.render().as_bytes())?;

    let raw = socket.receive(usize::MAX);

    match socket.close() {
        Ok(true) => {}
        Ok(false) => warn!("[{sock}] FIN unanswered, connection closed locally"),
        Err(err) => warn!("[{sock}] failed to close connection: {err}"),
    }

    let response = Response::parse(&raw)?;

    if response.status != "200" {
        return Err(HttpError::Status(response.status).into());
    }

    info!("[{sock}] received {} byte body", response.body.len());

    Ok(response.body)
}

fn resolve(host: &str, port: u16) -> Result<Ipv4Addr> {
    (host, port)
        .to_socket_addrs()?
        .find_map(|addr| match addr.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| HttpError::Unresolved(host.to_string()).into())
}

/// Asks the kernel for an unused local port.
fn free_port() -> Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    Ok(listener.local_addr()?.port())
}

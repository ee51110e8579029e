//! TCP implementation in user-space over a raw packet socket, built for
//! learning purposes, together with the Ethernet, ARP, and IPv4 layers it
//! needs and a minimal HTTP/1.0 client on top.
//!
//! Not suitable for production use.

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

#[cfg(not(target_os = "linux"))]
compile_error!("This crate is only compatible with Linux systems that support AF_PACKET sockets.");

pub mod config;
pub mod error;
pub mod http;
pub mod link;
pub mod protocol;

pub use error::{Error, HeaderError, ParseError, Result};

//! Reliable byte-stream transport for [TCP] over an unreliable [IPv4]
//! datagram link.
//!
//! This module implements the segment codec, the connection record, the
//! handshake and teardown, and the send and receive engines driving one
//! client connection.
//!
//! [TCP]:  https://www.rfc-editor.org/rfc/rfc793
//! [IPv4]: https://www.rfc-editor.org/rfc/rfc791

pub mod fsm;
pub mod handshake;
pub mod headers;

mod channel;
pub use channel::Channel;

mod recv;
pub use recv::{Delivery, Pending, ReceiveEngine};

mod segment;
pub use segment::Segment;

mod send;
pub use send::SendEngine;

pub mod socket;
pub use socket::{Socket, SocketAddr};

mod stream;
pub use stream::TcpSocket;

pub use fsm::{ConnectionState, Tcb};

//! Transport abstractions for the node runtime.
//!
//! `udp::UdpTransport` is the real loopback two-socket implementation the
//! runtime sends and receives datagrams through.

pub mod udp;

pub use udp::{TransportError, UdpTransport, RX_BASE, TX_BASE};

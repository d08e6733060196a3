//! Connection management for Director participants and game clients.
//!
//! This module handles the lifecycle of connections: tracking, outbound
//! delivery and the length-prefixed framing both listeners speak.

pub mod framing;
pub mod registry;

pub use framing::{encode_frame, FrameBuffer};
pub use registry::{ConnectionEntry, ConnectionRegistry, Outbound};

/// Type alias for connection identifiers.
///
/// Connection IDs are used to uniquely identify connections throughout
/// their lifecycle on the server.
pub type ConnectionId = usize;

/// Which listener accepted a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// A Director participant (AI or UberDog process)
    Director,
    /// A game client served by the Agent
    Client,
}

impl std::fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionKind::Director => f.write_str("director"),
            ConnectionKind::Client => f.write_str("client"),
        }
    }
}

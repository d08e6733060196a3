//! Registry of live connections and their outbound queues.
//!
//! The registry is owned by the event loop. Connection handler tasks hand it
//! the sending half of an unbounded channel when the socket is accepted; the
//! registry frames every outbound datagram and pushes it there without
//! waiting, so a slow peer never stalls the handler chain.

use super::{encode_frame, ConnectionId, ConnectionKind};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::SystemTime;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Instructions for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A complete frame, length prefix included
    Frame(Vec<u8>),
    /// Close the socket after flushing what was queued before
    Close(String),
}

/// Tracking information for one connection.
#[derive(Debug)]
pub struct ConnectionEntry {
    pub kind: ConnectionKind,
    pub remote_addr: SocketAddr,
    pub connected_at: SystemTime,
    sender: UnboundedSender<Outbound>,
}

/// Central table of all connections, keyed by connection ID.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection accepted by one of the listeners.
    ///
    /// # Arguments
    ///
    /// * `connection_id` - ID assigned by the accept loop
    /// * `kind` - Which listener accepted it
    /// * `remote_addr` - The network address of the peer
    /// * `sender` - Queue drained by the connection's writer task
    pub fn register(
        &mut self,
        connection_id: ConnectionId,
        kind: ConnectionKind,
        remote_addr: SocketAddr,
        sender: UnboundedSender<Outbound>,
    ) {
        info!("🔗 {} connection {} from {}", kind, connection_id, remote_addr);
        self.connections.insert(
            connection_id,
            ConnectionEntry {
                kind,
                remote_addr,
                connected_at: SystemTime::now(),
                sender,
            },
        );
    }

    /// Removes a connection, returning its entry if it was known.
    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<ConnectionEntry> {
        let entry = self.connections.remove(&connection_id)?;
        info!("❌ {} connection {} from {} closed", entry.kind, connection_id, entry.remote_addr);
        Some(entry)
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.get(&connection_id)
    }

    pub fn kind(&self, connection_id: ConnectionId) -> Option<ConnectionKind> {
        self.connections.get(&connection_id).map(|entry| entry.kind)
    }

    /// Frames `body` and queues it for the connection.
    ///
    /// Returns false if the connection is unknown, its writer is gone, or the
    /// body does not fit in a frame; in the last case the datagram is dropped
    /// and the connection stays open.
    pub fn send(&self, connection_id: ConnectionId, body: &[u8]) -> bool {
        let Some(entry) = self.connections.get(&connection_id) else {
            debug!("Dropping datagram for unknown connection {}", connection_id);
            return false;
        };
        let frame = match encode_frame(body) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("⚠️ Dropping datagram for connection {}: {}", connection_id, e);
                return false;
            }
        };
        entry.sender.send(Outbound::Frame(frame)).is_ok()
    }

    /// Asks the connection's writer to close the socket.
    pub fn kick_connection(&self, connection_id: ConnectionId, reason: &str) -> bool {
        let Some(entry) = self.connections.get(&connection_id) else {
            return false;
        };
        warn!("🦶 Kicking {} connection {}: {}", entry.kind, connection_id, reason);
        entry.sender.send(Outbound::Close(reason.to_string())).is_ok()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn count_by_kind(&self, kind: ConnectionKind) -> usize {
        self.connections.values().filter(|entry| entry.kind == kind).count()
    }
}

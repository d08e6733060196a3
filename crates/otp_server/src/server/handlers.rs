//! Connection handling logic for framed TCP peers.
//!
//! Each accepted socket gets one task running [`handle_connection`]: a reader
//! that reassembles frames and forwards them to the event loop, and a writer
//! that drains the connection's outbound queue. Whichever half finishes
//! first ends the connection.

use super::event_loop::ServerEvent;
use crate::connection::{ConnectionId, ConnectionKind, FrameBuffer, Outbound};
use crate::error::ServerError;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace};

const READ_BUFFER_SIZE: usize = 8192;

/// Handles a single connection from establishment to cleanup.
///
/// # Connection Flow
///
/// 1. Register the connection and its outbound queue with the event loop
/// 2. Run the reader and writer halves until either ends
/// 3. Report the disconnect so the event loop can run cleanup
///
/// # Arguments
///
/// * `stream` - The accepted TCP stream
/// * `addr` - The remote address of the peer
/// * `connection_id` - ID assigned by the accept loop
/// * `kind` - Which listener accepted the stream
/// * `events` - The event loop's inbox
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    connection_id: ConnectionId,
    kind: ConnectionKind,
    events: UnboundedSender<ServerEvent>,
) -> Result<(), ServerError> {
    stream
        .set_nodelay(true)
        .map_err(|e| ServerError::Network(format!("Failed to set TCP_NODELAY: {e}")))?;
    let (reader, writer) = stream.into_split();

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    events
        .send(ServerEvent::Connected {
            connection_id,
            kind,
            remote_addr: addr,
            sender: outbound_tx,
        })
        .map_err(|_| ServerError::Internal("event loop closed".to_string()))?;

    let result = tokio::select! {
        result = read_frames(reader, connection_id, &events) => result,
        result = write_frames(writer, connection_id, outbound_rx) => result,
    };

    // The event loop may already be gone during shutdown.
    let _ = events.send(ServerEvent::Disconnected { connection_id });
    debug!("🔌 {} connection {} from {} closed", kind, connection_id, addr);
    result
}

async fn read_frames(
    mut reader: OwnedReadHalf,
    connection_id: ConnectionId,
    events: &UnboundedSender<ServerEvent>,
) -> Result<(), ServerError> {
    let mut frames = FrameBuffer::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = reader
            .read(&mut buffer)
            .await
            .map_err(|e| ServerError::Network(format!("read from {connection_id} failed: {e}")))?;
        if read == 0 {
            trace!("Connection {} reached end of stream", connection_id);
            return Ok(());
        }
        frames.push(&buffer[..read]);
        while let Some(bytes) = frames.next_frame() {
            events
                .send(ServerEvent::Datagram { connection_id, bytes })
                .map_err(|_| ServerError::Internal("event loop closed".to_string()))?;
        }
    }
}

async fn write_frames(
    mut writer: OwnedWriteHalf,
    connection_id: ConnectionId,
    mut outbound: UnboundedReceiver<Outbound>,
) -> Result<(), ServerError> {
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Frame(frame) => writer
                .write_all(&frame)
                .await
                .map_err(|e| ServerError::Network(format!("write to {connection_id} failed: {e}")))?,
            Outbound::Close(reason) => {
                debug!("Closing connection {}: {}", connection_id, reason);
                let _ = writer.shutdown().await;
                return Ok(());
            }
        }
    }
    Ok(())
}

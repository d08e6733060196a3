//! Core server implementation.
//!
//! This module contains [`OtpServer`], which binds the Director and client
//! listeners, runs their accept loops and hands the collaborators to the
//! event loop.

use super::event_loop::{run_event_loop, ServerEvent};
use super::handlers::handle_connection;
use crate::config::ServerConfig;
use crate::connection::{ConnectionId, ConnectionKind};
use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use futures::stream::{FuturesUnordered, StreamExt};
use otp_core::{CodecProvider, ObjectStore, ShutdownState, ZoneGeometry};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// The replication server.
///
/// Owns the configuration and the collaborators (schema, zone geometry and
/// object store) until [`OtpServer::start`] moves them into the event loop.
///
/// # Architecture
///
/// * **Accept loops**: one per listener, spawning a task per connection
/// * **Connection tasks**: frame reassembly and outbound writes
/// * **Event loop**: the single owner of the Director, State Server, Agent
///   and database server
pub struct OtpServer {
    config: ServerConfig,
    schema: Arc<dyn CodecProvider>,
    geometry: Arc<dyn ZoneGeometry>,
    store: Box<dyn ObjectStore>,
}

/// Shared connection bookkeeping for the accept loops.
#[derive(Clone)]
struct AcceptContext {
    events: UnboundedSender<ServerEvent>,
    next_id: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_connections: usize,
    shutdown_state: ShutdownState,
}

impl OtpServer {
    pub fn new(
        config: ServerConfig,
        schema: Arc<dyn CodecProvider>,
        geometry: Arc<dyn ZoneGeometry>,
        store: Box<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            schema,
            geometry,
            store,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds both configured listeners and serves until shutdown.
    pub async fn start(self, shutdown_state: ShutdownState) -> Result<(), ServerError> {
        let director = bind(self.config.director_address).await?;
        let client = bind(self.config.client_address).await?;
        self.serve(director, client, shutdown_state).await
    }

    /// Serves on already bound listeners until shutdown is initiated.
    pub async fn serve(
        self,
        director_listener: TcpListener,
        client_listener: TcpListener,
        shutdown_state: ShutdownState,
    ) -> Result<(), ServerError> {
        info!(
            "🚀 Message Director listening on {}",
            local_addr(&director_listener)?
        );
        info!("🚀 Client Agent listening on {}", local_addr(&client_listener)?);

        let OtpServer {
            config,
            schema,
            geometry,
            store,
        } = self;
        let dispatcher = Dispatcher::new(&config, schema, geometry, store);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let event_loop = tokio::spawn(run_event_loop(
            dispatcher,
            events_rx,
            config.stats_interval_secs,
            shutdown_state.clone(),
        ));

        let context = AcceptContext {
            events: events_tx,
            next_id: Arc::new(AtomicUsize::new(1)),
            active: Arc::new(AtomicUsize::new(0)),
            max_connections: config.max_connections,
            shutdown_state: shutdown_state.clone(),
        };
        let mut accept_futures = [
            (director_listener, ConnectionKind::Director),
            (client_listener, ConnectionKind::Client),
        ]
        .into_iter()
        .map(|(listener, kind)| accept_loop(listener, kind, context.clone()))
        .collect::<FuturesUnordered<_>>();
        drop(context);

        tokio::select! {
            _ = accept_futures.next() => {
                warn!("⚠️ An accept loop stopped; shutting down");
                shutdown_state.initiate_shutdown();
            }
            _ = wait_for_shutdown(&shutdown_state) => {}
        }
        drop(accept_futures);

        info!("🧹 Performing server cleanup...");
        let dispatcher = event_loop
            .await
            .map_err(|e| ServerError::Internal(format!("event loop panicked: {e}")))?;
        let stats = dispatcher.stats();
        info!(
            "✅ Server stopped with {} live object(s) and {} routed message(s)",
            stats.objects, stats.routed
        );
        Ok(())
    }
}

async fn bind(address: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(address)
        .await
        .map_err(|e| ServerError::Network(format!("Failed to bind {address}: {e}")))
}

fn local_addr(listener: &TcpListener) -> Result<SocketAddr, ServerError> {
    listener
        .local_addr()
        .map_err(|e| ServerError::Network(format!("Listener has no local address: {e}")))
}

async fn wait_for_shutdown(shutdown_state: &ShutdownState) {
    while !shutdown_state.is_shutdown_initiated() {
        sleep(Duration::from_millis(100)).await;
    }
}

async fn accept_loop(listener: TcpListener, kind: ConnectionKind, context: AcceptContext) {
    loop {
        if context.shutdown_state.is_shutdown_initiated() {
            info!("🛑 {} accept loop stopping - shutdown initiated", kind);
            break;
        }

        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Failed to accept {} connection: {}", kind, e);
                break;
            }
        };

        if context.active.load(Ordering::SeqCst) >= context.max_connections {
            warn!(
                "⚠️ Refusing {} connection from {}: {} connections open",
                kind, addr, context.max_connections
            );
            continue;
        }

        let connection_id: ConnectionId = context.next_id.fetch_add(1, Ordering::SeqCst);
        let events = context.events.clone();
        let active = context.active.clone();
        active.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, connection_id, kind, events).await {
                warn!("Connection {} error: {}", connection_id, e);
            }
            active.fetch_sub(1, Ordering::SeqCst);
        });
    }
}

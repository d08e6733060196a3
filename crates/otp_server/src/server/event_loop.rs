//! The event loop: the only task that touches server state.
//!
//! Connection tasks report what happens on their sockets as [`ServerEvent`]s
//! over one unbounded channel. The loop applies them to the
//! [`Dispatcher`] strictly in arrival order, so every message and every
//! consequence it routes is fully handled before the next one starts.

use crate::connection::{ConnectionId, ConnectionKind, Outbound};
use crate::dispatch::Dispatcher;
use otp_core::ShutdownState;
use std::net::SocketAddr;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

/// What a connection task reports to the event loop.
#[derive(Debug)]
pub enum ServerEvent {
    Connected {
        connection_id: ConnectionId,
        kind: ConnectionKind,
        remote_addr: SocketAddr,
        sender: UnboundedSender<Outbound>,
    },
    /// One complete frame body
    Datagram {
        connection_id: ConnectionId,
        bytes: Vec<u8>,
    },
    Disconnected {
        connection_id: ConnectionId,
    },
}

/// How often the loop looks at the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Applies events until shutdown is initiated or every sender is gone.
///
/// Returns the dispatcher so callers can inspect the final state.
pub async fn run_event_loop(
    mut dispatcher: Dispatcher,
    mut events: UnboundedReceiver<ServerEvent>,
    stats_interval_secs: u64,
    shutdown_state: ShutdownState,
) -> Dispatcher {
    let mut shutdown_poll = interval(SHUTDOWN_POLL);
    shutdown_poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // A zero interval disables the health line; the ticker still needs a period.
    let stats_enabled = stats_interval_secs > 0;
    let mut stats_ticker = interval(Duration::from_secs(stats_interval_secs.max(1)));
    stats_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    stats_ticker.tick().await;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("All connection tasks gone, event loop stopping");
                    break;
                };
                apply(&mut dispatcher, event);
            }
            _ = stats_ticker.tick(), if stats_enabled => {
                let stats = dispatcher.stats();
                info!(
                    "📊 {} object(s), {} participant(s), {} client(s), {} message(s) routed",
                    stats.objects, stats.participants, stats.clients, stats.routed
                );
            }
            _ = shutdown_poll.tick() => {
                if shutdown_state.is_shutdown_initiated() {
                    info!("🛑 Event loop stopping - shutdown initiated");
                    break;
                }
            }
        }
    }
    dispatcher
}

fn apply(dispatcher: &mut Dispatcher, event: ServerEvent) {
    match event {
        ServerEvent::Connected {
            connection_id,
            kind,
            remote_addr,
            sender,
        } => dispatcher.connect(connection_id, kind, remote_addr, sender),
        ServerEvent::Datagram { connection_id, bytes } => dispatcher.receive(connection_id, &bytes),
        ServerEvent::Disconnected { connection_id } => dispatcher.disconnect(connection_id),
    }
}

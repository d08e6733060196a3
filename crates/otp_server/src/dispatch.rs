//! The single owner of all server state.
//!
//! [`Dispatcher`] holds the connection registry, the Director, the State
//! Server, the Agent and the database server. The event loop feeds it
//! connection events one at a time; each event runs to completion, including
//! every message the handlers route in response, before the next one is
//! looked at.

use crate::agent::Agent;
use crate::config::ServerConfig;
use crate::connection::{ConnectionId, ConnectionKind, ConnectionRegistry, Outbound};
use crate::database::DatabaseServer;
use crate::director::{Bus, MessageDirector};
use crate::state_server::StateServer;
use otp_core::{CodecProvider, ObjectStore, ZoneGeometry};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, warn};

/// Snapshot of the server for the health log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    pub objects: usize,
    pub participants: usize,
    pub clients: usize,
    pub routed: u64,
}

pub struct Dispatcher {
    schema: Arc<dyn CodecProvider>,
    registry: ConnectionRegistry,
    director: MessageDirector,
    state_server: StateServer,
    agent: Agent,
    database: DatabaseServer,
}

impl Dispatcher {
    pub fn new(
        config: &ServerConfig,
        schema: Arc<dyn CodecProvider>,
        geometry: Arc<dyn ZoneGeometry>,
        store: Box<dyn ObjectStore>,
    ) -> Self {
        let database = DatabaseServer::new(store, schema.as_ref());
        Self {
            registry: ConnectionRegistry::new(),
            director: MessageDirector::new(config.uberdog_name.clone()),
            state_server: StateServer::new(schema.as_ref()),
            agent: Agent::new(geometry, config.talk_field.clone()),
            database,
            schema,
        }
    }

    /// Registers a connection accepted by one of the listeners.
    pub fn connect(
        &mut self,
        connection_id: ConnectionId,
        kind: ConnectionKind,
        remote_addr: SocketAddr,
        sender: UnboundedSender<Outbound>,
    ) {
        self.registry.register(connection_id, kind, remote_addr, sender);
        match kind {
            ConnectionKind::Director => self.director.connect(connection_id),
            ConnectionKind::Client => self.agent.connect(connection_id),
        }
    }

    /// Handles one framed datagram read from a connection.
    pub fn receive(&mut self, connection_id: ConnectionId, bytes: &[u8]) {
        match self.registry.kind(connection_id) {
            Some(ConnectionKind::Director) => {
                // Short or malformed datagrams are dropped; the participant stays connected.
                if let Err(e) = self.director.receive(&self.registry, connection_id, bytes) {
                    warn!("⚠️ Dropping datagram from participant {}: {}", connection_id, e);
                }
            }
            Some(ConnectionKind::Client) => {
                let mut bus = Bus::new(&mut self.director, &self.registry);
                let result = self.agent.handle_client(
                    self.schema.as_ref(),
                    &self.state_server,
                    &mut self.database,
                    &mut bus,
                    connection_id,
                    bytes,
                );
                if let Err(e) = result {
                    if e.is_fatal() {
                        self.registry.kick_connection(connection_id, &e.to_string());
                    } else {
                        debug!("Ignoring client {} datagram: {}", connection_id, e);
                    }
                }
            }
            None => debug!("Datagram from unregistered connection {}", connection_id),
        }
        self.drain();
    }

    /// Tears a connection down and runs its cleanup.
    ///
    /// Director participants replay their post-remove messages; clients
    /// release their avatar.
    pub fn disconnect(&mut self, connection_id: ConnectionId) {
        let Some(entry) = self.registry.remove(connection_id) else {
            return;
        };
        match entry.kind {
            ConnectionKind::Director => {
                for datagram in self.director.disconnect(connection_id) {
                    if let Err(e) = self.director.receive(&self.registry, connection_id, &datagram) {
                        warn!("⚠️ Bad post-remove message from {}: {}", connection_id, e);
                    }
                }
            }
            ConnectionKind::Client => {
                let mut bus = Bus::new(&mut self.director, &self.registry);
                if let Err(e) = self.agent.disconnect(&mut bus, connection_id) {
                    warn!("⚠️ Cleanup of client {} failed: {}", connection_id, e);
                }
            }
        }
        self.drain();
    }

    /// Runs the local handler chain until no routed message is pending.
    pub fn drain(&mut self) {
        while let Some(envelope) = self.director.next_pending() {
            let schema = self.schema.as_ref();

            let mut bus = Bus::new(&mut self.director, &self.registry);
            if let Err(e) = self.state_server.handle(schema, &mut bus, &mut self.agent, &envelope) {
                warn!(
                    "⚠️ State server rejected message {} from {}: {}",
                    envelope.code, envelope.sender, e
                );
            }

            self.agent.handle_routed(&self.registry, &envelope);

            let mut bus = Bus::new(&mut self.director, &self.registry);
            if let Err(e) = self
                .database
                .handle(schema, &mut bus, &mut self.state_server, &envelope)
            {
                error!(
                    "❌ Database server failed on message {} from {}: {}",
                    envelope.code, envelope.sender, e
                );
            }
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            objects: self.state_server.len(),
            participants: self.director.participant_count(),
            clients: self.agent.session_count(),
            routed: self.director.stats().routed,
        }
    }

    pub fn state_server(&self) -> &StateServer {
        &self.state_server
    }

    pub fn director(&self) -> &MessageDirector {
        &self.director
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn database_mut(&mut self) -> &mut DatabaseServer {
        &mut self.database
    }

    pub fn schema(&self) -> &dyn CodecProvider {
        self.schema.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::Harness;
    use otp_core::Datagram;

    #[test]
    fn short_director_datagrams_are_dropped_without_a_kick() {
        let mut harness = Harness::new();
        let ai = harness.participant(None, &[4000]);
        let other = harness.participant(None, &[]);

        // One channel announced, three of its eight bytes present.
        harness.dispatcher.receive(ai, &[1, 0, 0, 0]);
        assert!(!harness.was_kicked(ai));

        // The participant keeps its subscriptions.
        let mut payload = Datagram::new();
        payload.add_u32(7);
        harness.send_envelope(other, vec![4000], 55, 9999, payload);
        let routed = harness.envelopes(ai);
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].code, 9999);
    }

    #[test]
    fn stats_count_participants_and_clients() {
        let mut harness = Harness::new();
        harness.participant(None, &[4000]);
        harness.client();
        let stats = harness.dispatcher.stats();
        assert_eq!(stats.participants, 1);
        assert_eq!(stats.clients, 1);
        assert_eq!(stats.objects, 0);
    }
}

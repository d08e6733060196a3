//! The Director: channel-based publish/subscribe between connected processes.
//!
//! Every routed message is written once to each participant subscribed to at
//! least one of its channels, and queued once for the local handler chain
//! (State Server, Agent, store adapter). The queue is drained by the
//! dispatcher after the current handler returns, so handlers never re-enter
//! each other and every message runs to completion.

mod participant;

pub use participant::Participant;

use crate::connection::{ConnectionId, ConnectionRegistry};
use otp_core::{Channel, ControlMessage, Datagram, DirectorDatagram, Envelope, ProtocolError};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, trace, warn};

/// Counters reported by the health log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectorStats {
    /// Messages handed to the local handler chain
    pub routed: u64,
    /// Copies written to participant connections
    pub delivered: u64,
}

#[derive(Debug)]
pub struct MessageDirector {
    participants: BTreeMap<ConnectionId, Participant>,
    pending: VecDeque<Envelope>,
    uberdog_name: String,
    stats: DirectorStats,
}

impl MessageDirector {
    pub fn new(uberdog_name: impl Into<String>) -> Self {
        Self {
            participants: BTreeMap::new(),
            pending: VecDeque::new(),
            uberdog_name: uberdog_name.into(),
            stats: DirectorStats::default(),
        }
    }

    pub fn connect(&mut self, connection_id: ConnectionId) {
        self.participants.insert(connection_id, Participant::new());
    }

    /// Forgets a participant and returns its post-remove datagrams.
    ///
    /// The caller replays them through [`MessageDirector::receive`] with the
    /// same connection ID, exactly once.
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Vec<Vec<u8>> {
        match self.participants.remove(&connection_id) {
            Some(participant) => {
                if !participant.post_remove.is_empty() {
                    info!(
                        "🪦 Replaying {} post-remove message(s) for {}",
                        participant.post_remove.len(),
                        connection_id
                    );
                }
                participant.post_remove
            }
            None => Vec::new(),
        }
    }

    pub fn participant(&self, connection_id: ConnectionId) -> Option<&Participant> {
        self.participants.get(&connection_id)
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Primary channel of the participant that named itself UberDog.
    pub fn uberdog_channel(&self) -> Option<Channel> {
        self.participants
            .values()
            .find(|participant| participant.name == self.uberdog_name)
            .and_then(Participant::primary_channel)
    }

    pub fn stats(&self) -> DirectorStats {
        self.stats
    }

    /// Sends a message originated by a local handler.
    pub fn route(
        &mut self,
        registry: &ConnectionRegistry,
        channels: Vec<Channel>,
        sender: Channel,
        code: u16,
        payload: Datagram,
    ) -> Result<(), ProtocolError> {
        let envelope = Envelope::new(channels, sender, code, payload.into_bytes());
        let bytes = envelope.encode()?;
        self.deliver(registry, None, &envelope.channels, bytes.as_bytes());
        self.enqueue(envelope);
        Ok(())
    }

    /// Handles a datagram read from participant `origin`.
    ///
    /// Control messages update the participant; routed messages are copied to
    /// every other subscribed participant and queued for local handling.
    pub fn receive(
        &mut self,
        registry: &ConnectionRegistry,
        origin: ConnectionId,
        bytes: &[u8],
    ) -> Result<(), ProtocolError> {
        match DirectorDatagram::decode(bytes)? {
            DirectorDatagram::Control(message) => {
                self.apply_control(origin, message);
                Ok(())
            }
            DirectorDatagram::Routed(envelope) => {
                trace!(
                    "Routing code {} from {} to {:?}",
                    envelope.code,
                    envelope.sender,
                    envelope.channels
                );
                self.deliver(registry, Some(origin), &envelope.channels, bytes);
                self.enqueue(envelope);
                Ok(())
            }
        }
    }

    /// Next message waiting for the local handler chain.
    pub fn next_pending(&mut self) -> Option<Envelope> {
        self.pending.pop_front()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn enqueue(&mut self, envelope: Envelope) {
        if envelope.channels.is_empty() {
            return;
        }
        self.stats.routed += 1;
        self.pending.push_back(envelope);
    }

    fn deliver(&mut self, registry: &ConnectionRegistry, origin: Option<ConnectionId>, channels: &[Channel], bytes: &[u8]) {
        for (id, participant) in &self.participants {
            if Some(*id) == origin || !participant.is_subscribed_to_any(channels) {
                continue;
            }
            if registry.send(*id, bytes) {
                self.stats.delivered += 1;
            }
        }
    }

    fn apply_control(&mut self, origin: ConnectionId, message: ControlMessage) {
        let Some(participant) = self.participants.get_mut(&origin) else {
            debug!("Control message from departed participant {}", origin);
            return;
        };
        match message {
            ControlMessage::SetChannel(channel) => participant.subscribe(channel),
            ControlMessage::RemoveChannel(channel) => {
                if !participant.unsubscribe(channel) {
                    warn!("⚠️ Participant {} removed unsubscribed channel {}", origin, channel);
                }
            }
            ControlMessage::AddPostRemove(datagram) => participant.post_remove.push(datagram),
            ControlMessage::SetConnectionName(name) => {
                info!("🏷️ Participant {} is {}", origin, name);
                participant.name = name;
            }
            ControlMessage::SetConnectionUrl(url) => participant.url = url,
        }
        debug!(
            "Participant {} ({}) channels {:?}",
            origin,
            participant.name,
            participant.channels()
        );
    }
}

/// A handler's view of the Director: routing plus direct connection access.
pub struct Bus<'a> {
    pub director: &'a mut MessageDirector,
    pub registry: &'a ConnectionRegistry,
}

impl<'a> Bus<'a> {
    pub fn new(director: &'a mut MessageDirector, registry: &'a ConnectionRegistry) -> Self {
        Self { director, registry }
    }

    pub fn route(
        &mut self,
        channels: Vec<Channel>,
        sender: Channel,
        code: u16,
        payload: Datagram,
    ) -> Result<(), ProtocolError> {
        self.director.route(self.registry, channels, sender, code, payload)
    }

    pub fn uberdog_channel(&self) -> Option<Channel> {
        self.director.uberdog_channel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionKind, Outbound};
    use std::net::SocketAddr;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn join(
        registry: &mut ConnectionRegistry,
        director: &mut MessageDirector,
        id: ConnectionId,
        channels: &[Channel],
    ) -> UnboundedReceiver<Outbound> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(id, ConnectionKind::Director, SocketAddr::from(([127, 0, 0, 1], 1)), tx);
        director.connect(id);
        for channel in channels {
            let dg = ControlMessage::SetChannel(*channel).to_datagram();
            director.receive(registry, id, dg.as_bytes()).unwrap();
        }
        rx
    }

    fn frames(rx: &mut UnboundedReceiver<Outbound>) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Ok(Outbound::Frame(frame)) = rx.try_recv() {
            out.push(frame[2..].to_vec());
        }
        out
    }

    #[test]
    fn one_copy_per_connection_and_one_local_dispatch() {
        let mut registry = ConnectionRegistry::new();
        let mut director = MessageDirector::new("UberDog");
        let mut a = join(&mut registry, &mut director, 1, &[10, 11]);
        let mut b = join(&mut registry, &mut director, 2, &[12]);

        director
            .route(&registry, vec![10, 11, 99], 5, 2004, Datagram::new())
            .unwrap();

        assert_eq!(frames(&mut a).len(), 1);
        assert!(frames(&mut b).is_empty());
        assert!(director.next_pending().is_some());
        assert!(director.next_pending().is_none());
        assert_eq!(director.stats(), DirectorStats { routed: 1, delivered: 1 });
    }

    #[test]
    fn unroutable_channels_still_reach_local_handlers() {
        let registry = ConnectionRegistry::new();
        let mut director = MessageDirector::new("UberDog");
        director.route(&registry, vec![777], 1, 2004, Datagram::new()).unwrap();
        assert_eq!(director.next_pending().unwrap().channels, vec![777]);
    }

    #[test]
    fn participants_do_not_hear_their_own_messages() {
        let mut registry = ConnectionRegistry::new();
        let mut director = MessageDirector::new("UberDog");
        let mut a = join(&mut registry, &mut director, 1, &[10]);
        let mut b = join(&mut registry, &mut director, 2, &[10]);

        let bytes = Envelope::new(vec![10], 10, 2004, vec![1, 2]).encode().unwrap();
        director.receive(&registry, 1, bytes.as_bytes()).unwrap();

        assert!(frames(&mut a).is_empty());
        assert_eq!(frames(&mut b), vec![bytes.into_bytes()]);
        assert_eq!(director.pending_len(), 1);
    }

    #[test]
    fn control_messages_track_names_and_post_removes() {
        let mut registry = ConnectionRegistry::new();
        let mut director = MessageDirector::new("UberDog");
        let _a = join(&mut registry, &mut director, 1, &[4000, 4001]);
        assert_eq!(director.uberdog_channel(), None);

        let name = ControlMessage::SetConnectionName("UberDog".into()).to_datagram();
        director.receive(&registry, 1, name.as_bytes()).unwrap();
        assert_eq!(director.uberdog_channel(), Some(4000));

        let will = Envelope::new(vec![20_100_000], 4000, 2063, vec![0; 8]).encode().unwrap();
        let post = ControlMessage::AddPostRemove(will.as_bytes().to_vec()).to_datagram();
        director.receive(&registry, 1, post.as_bytes()).unwrap();
        assert_eq!(director.pending_len(), 0);

        assert_eq!(director.disconnect(1), vec![will.into_bytes()]);
        assert!(director.disconnect(1).is_empty());
        assert_eq!(director.participant_count(), 0);
    }

    #[test]
    fn truncated_datagrams_are_errors() {
        let mut registry = ConnectionRegistry::new();
        let mut director = MessageDirector::new("UberDog");
        let _a = join(&mut registry, &mut director, 1, &[]);
        assert!(director.receive(&registry, 1, &[1, 0, 0]).is_err());
        assert_eq!(director.pending_len(), 0);
    }
}

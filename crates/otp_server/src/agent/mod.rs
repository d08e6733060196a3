//! The Agent: per-client interest and visibility.
//!
//! Game clients do not subscribe to Director channels. Instead each client
//! holds *interests* (a parent object and a set of zones under it) and the
//! Agent translates the State Server's life-cycle stream into the minimal
//! create / update / disable / location traffic each client needs.
//!
//! The Agent also serves the client protocol itself: choosing an avatar,
//! sending field updates and relocating the client's own avatar.

pub mod interest;
pub mod session;

pub use interest::{Interest, InterestSet};
pub use session::AgentSession;

use crate::connection::{ConnectionId, ConnectionRegistry};
use crate::database::DatabaseServer;
use crate::director::Bus;
use crate::error::AgentError;
use crate::state_server::StateServer;
use otp_core::msgtypes::{client, stateserver};
use otp_core::{
    Channel, ClientMessage, CodecProvider, Datagram, DistributedObject, DoId, Envelope, FieldDescriptor, FieldId,
    Location, ProtocolError, StoreError, ZoneGeometry, ZoneId, CHAT_MANAGER_CHANNEL, PUPPET_CHANNEL_OFFSET,
    STATE_SERVER_CHANNEL,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Reason code sent with `CLIENT_GO_GET_LOST` when the avatar is deleted
/// from under its client.
pub const GO_GET_LOST_AVATAR_DELETED: u16 = 153;

pub struct Agent {
    sessions: BTreeMap<ConnectionId, AgentSession>,
    geometry: Arc<dyn ZoneGeometry>,
    talk_field: String,
}

impl Agent {
    pub fn new(geometry: Arc<dyn ZoneGeometry>, talk_field: impl Into<String>) -> Self {
        Self {
            sessions: BTreeMap::new(),
            geometry,
            talk_field: talk_field.into(),
        }
    }

    pub fn connect(&mut self, connection_id: ConnectionId) {
        self.sessions.insert(connection_id, AgentSession::new(connection_id));
    }

    /// Releases a client: its avatar is deleted the same way an explicit
    /// release would, then its interests are dropped in bulk.
    pub fn disconnect(&mut self, bus: &mut Bus<'_>, connection_id: ConnectionId) -> Result<(), ProtocolError> {
        let Some(session) = self.sessions.remove(&connection_id) else {
            return Ok(());
        };
        if let Some(avatar_id) = session.avatar_id {
            info!("👋 Client {} left, releasing avatar {}", connection_id, avatar_id);
            release_avatar(bus, avatar_id)?;
        }
        Ok(())
    }

    pub fn session(&self, connection_id: ConnectionId) -> Option<&AgentSession> {
        self.sessions.get(&connection_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Serves one datagram from a game client.
    pub fn handle_client(
        &mut self,
        schema: &dyn CodecProvider,
        state: &StateServer,
        database: &mut DatabaseServer,
        bus: &mut Bus<'_>,
        connection_id: ConnectionId,
        bytes: &[u8],
    ) -> Result<(), AgentError> {
        if !self.sessions.contains_key(&connection_id) {
            debug!("Datagram from unknown client {}", connection_id);
            return Ok(());
        }

        match ClientMessage::decode(bytes)? {
            ClientMessage::Heartbeat => {
                trace!("Heartbeat from client {}", connection_id);
                Ok(())
            }
            ClientMessage::SetAvatar { av_id } => self.set_avatar(schema, database, bus, connection_id, av_id),
            ClientMessage::ObjectUpdateField { do_id, field_id, value } => {
                self.client_update_field(schema, state, bus, connection_id, do_id, field_id, value)
            }
            ClientMessage::ObjectLocation { do_id, location } => {
                let avatar_id = self.avatar_of(connection_id);
                if avatar_id != Some(do_id) {
                    return Err(AgentError::NotOwner(do_id));
                }
                let mut dg = Datagram::new();
                dg.add_u32(location.parent_id);
                dg.add_u32(location.zone_id);
                bus.route(vec![Channel::from(do_id)], Channel::from(do_id), stateserver::OBJECT_SET_ZONE, dg)?;
                Ok(())
            }
            ClientMessage::AddInterest {
                handle,
                context,
                parent_id,
                zones,
            } => self.add_interest(schema, state, bus.registry, connection_id, handle, context, parent_id, &zones),
            ClientMessage::RemoveInterest { handle, context } => {
                self.remove_interest(state, bus.registry, connection_id, handle, context)
            }
        }
    }

    /// Forwards field updates addressed to an avatar's puppet channel to the
    /// client playing it.
    pub fn handle_routed(&self, registry: &ConnectionRegistry, envelope: &Envelope) {
        for channel in &envelope.channels {
            let Some(avatar_id) = channel
                .checked_sub(PUPPET_CHANNEL_OFFSET)
                .and_then(|id| DoId::try_from(id).ok())
            else {
                continue;
            };
            for session in self.sessions.values().filter(|session| session.owns(avatar_id)) {
                if envelope.code == stateserver::OBJECT_UPDATE_FIELD {
                    send_client(registry, session.connection_id, client::OBJECT_UPDATE_FIELD, &envelope.payload);
                } else {
                    warn!(
                        "⚠️ Unexpected message {} on puppet channel of avatar {}",
                        envelope.code, avatar_id
                    );
                }
            }
        }
    }

    /// Tells clients about a newly generated object.
    pub fn announce_create(
        &self,
        registry: &ConnectionRegistry,
        schema: &dyn CodecProvider,
        object: &DistributedObject,
        sender: Channel,
    ) -> Result<(), ProtocolError> {
        let mut payload = None;
        for session in self.sessions.values() {
            if session.is_sender(sender) {
                continue;
            }
            if session.has_interest(object.location) || session.owns(object.do_id) {
                if payload.is_none() {
                    payload = Some(create_object_payload(schema, object)?);
                }
                if let Some(dg) = &payload {
                    send_client(
                        registry,
                        session.connection_id,
                        client::CREATE_OBJECT_REQUIRED_OTHER,
                        dg.as_bytes(),
                    );
                }
            }
        }
        Ok(())
    }

    /// Tells clients an object is gone. A client whose own avatar was
    /// deleted by someone else is logged out.
    pub fn announce_delete(&mut self, registry: &ConnectionRegistry, object: &DistributedObject, sender: Channel) {
        let mut dg = Datagram::new();
        dg.add_u32(object.do_id);

        for session in self.sessions.values_mut() {
            if session.is_sender(sender) {
                continue;
            }
            if session.owns(object.do_id) {
                info!(
                    "🚪 Avatar {} of client {} deleted by {}",
                    object.do_id, session.connection_id, sender
                );
                let mut lost = Datagram::new();
                lost.add_u16(GO_GET_LOST_AVATAR_DELETED);
                lost.add_string("Your avatar was deleted.");
                send_client(registry, session.connection_id, client::GO_GET_LOST, lost.as_bytes());
                registry.kick_connection(session.connection_id, "avatar deleted");
                session.avatar_id = None;
                session.interests.clear();
            } else if session.has_interest(object.location) {
                send_client(registry, session.connection_id, client::OBJECT_DISABLE, dg.as_bytes());
            }
        }
    }

    /// Translates a location change into location, disable or create
    /// messages depending on what each client could see before and after.
    pub fn announce_move(
        &self,
        registry: &ConnectionRegistry,
        schema: &dyn CodecProvider,
        object: &DistributedObject,
        previous: Location,
        sender: Channel,
    ) -> Result<(), ProtocolError> {
        let mut disable = Datagram::new();
        disable.add_u32(object.do_id);

        let mut location = Datagram::new();
        location.add_u32(object.do_id);
        location.add_u32(object.location.parent_id);
        location.add_u32(object.location.zone_id);

        let mut create = None;
        for session in self.sessions.values() {
            if session.is_sender(sender) {
                continue;
            }
            let id = session.connection_id;
            if session.owns(object.do_id) {
                send_client(registry, id, client::OBJECT_LOCATION, location.as_bytes());
            } else if session.has_interest(previous) {
                if session.has_interest(object.location) {
                    send_client(registry, id, client::OBJECT_LOCATION, location.as_bytes());
                } else {
                    send_client(registry, id, client::OBJECT_DISABLE, disable.as_bytes());
                }
            } else if session.has_interest(object.location) {
                if create.is_none() {
                    create = Some(create_object_payload(schema, object)?);
                }
                if let Some(dg) = &create {
                    send_client(registry, id, client::CREATE_OBJECT_REQUIRED_OTHER, dg.as_bytes());
                }
            }
        }
        Ok(())
    }

    /// Forwards a field update to clients that may receive it: `broadcast`
    /// fields to everyone interested, `ownrecv` fields only to the owner.
    pub fn announce_update(
        &self,
        registry: &ConnectionRegistry,
        object: &DistributedObject,
        field: &FieldDescriptor,
        value: &[u8],
        sender: Channel,
    ) {
        if !(field.is_ownrecv() || field.is_broadcast()) {
            return;
        }
        let owner_only = field.is_ownrecv() || !field.is_broadcast();

        let mut dg = Datagram::new();
        dg.add_u32(object.do_id);
        dg.add_u16(field.id);
        dg.append_data(value);

        for session in self.sessions.values() {
            if session.is_sender(sender) {
                continue;
            }
            let owner = session.owns(object.do_id);
            if owner_only && !owner {
                continue;
            }
            if owner || session.has_interest(object.location) {
                send_client(registry, session.connection_id, client::OBJECT_UPDATE_FIELD, dg.as_bytes());
            }
        }
    }

    fn avatar_of(&self, connection_id: ConnectionId) -> Option<DoId> {
        self.sessions
            .get(&connection_id)
            .and_then(|session| session.avatar_id)
    }

    fn set_avatar(
        &mut self,
        schema: &dyn CodecProvider,
        database: &mut DatabaseServer,
        bus: &mut Bus<'_>,
        connection_id: ConnectionId,
        av_id: DoId,
    ) -> Result<(), AgentError> {
        let Some(session) = self.sessions.get_mut(&connection_id) else {
            return Ok(());
        };

        if av_id == 0 {
            let avatar_id = session.avatar_id.take().ok_or(AgentError::NoAvatar)?;
            info!("🎭 Client {} released avatar {}", connection_id, avatar_id);
            release_avatar(bus, avatar_id)?;
            return Ok(());
        }

        if session.avatar_id.is_some() {
            return Err(AgentError::AvatarAlreadyChosen);
        }
        if !database.has(av_id) {
            return Err(AgentError::UnknownAvatar(av_id));
        }
        let avatar = database.load(av_id)?;
        let class = schema
            .class_by_name(&avatar.class_name)
            .ok_or_else(|| StoreError::Format(format!("unknown class {}", avatar.class_name)))?;

        let mut generate = Datagram::new();
        generate.add_u32(0);
        generate.add_u32(0);
        generate.add_u16(class.id);
        generate.add_u32(av_id);
        avatar.pack_required(schema, &mut generate)?;
        avatar.pack_other(schema, &mut generate)?;

        let mut details = Datagram::new();
        details.add_u32(av_id);
        details.add_u8(0);
        avatar.pack_required(schema, &mut details)?;

        session.avatar_id = Some(av_id);
        info!("🎭 Client {} plays avatar {} ({})", connection_id, av_id, class.name);
        bus.route(
            vec![STATE_SERVER_CHANNEL],
            Channel::from(av_id),
            stateserver::OBJECT_GENERATE_WITH_REQUIRED_OTHER,
            generate,
        )?;
        send_client(
            bus.registry,
            connection_id,
            client::GET_AVATAR_DETAILS_RESP,
            details.as_bytes(),
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn client_update_field(
        &self,
        schema: &dyn CodecProvider,
        state: &StateServer,
        bus: &mut Bus<'_>,
        connection_id: ConnectionId,
        do_id: DoId,
        field_id: FieldId,
        value: Vec<u8>,
    ) -> Result<(), AgentError> {
        let avatar_id = self.avatar_of(connection_id).ok_or(AgentError::NoAvatar)?;
        let object = state.object(do_id).ok_or(AgentError::NoSuchObject(do_id))?;
        let field = schema.describe_field(object.class_id, field_id)?;

        let own = do_id == avatar_id;
        if !(field.is_clsend() || (field.is_ownsend() && own)) {
            return Err(AgentError::FieldNotSendable { do_id, field_id });
        }

        // Talk from the chat manager channel so the speaker hears itself too.
        let sender = if own && field.name == self.talk_field {
            CHAT_MANAGER_CHANNEL
        } else {
            Channel::from(avatar_id)
        };

        let mut dg = Datagram::new();
        dg.add_u32(do_id);
        dg.add_u16(field_id);
        dg.append_data(&value);
        bus.route(vec![Channel::from(do_id)], sender, stateserver::OBJECT_UPDATE_FIELD, dg)?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn add_interest(
        &mut self,
        schema: &dyn CodecProvider,
        state: &StateServer,
        registry: &ConnectionRegistry,
        connection_id: ConnectionId,
        handle: u16,
        context: u32,
        parent_id: DoId,
        zones: &[ZoneId],
    ) -> Result<(), AgentError> {
        let mut expanded = BTreeSet::new();
        for zone in zones {
            self.geometry.expand(*zone, &mut expanded);
        }

        let Some(session) = self.sessions.get_mut(&connection_id) else {
            return Ok(());
        };
        let avatar_id = session.avatar_id;

        // Zones of the replaced interest that stay visible need no create.
        let mut kept_zones = BTreeSet::new();
        if let Some(old) = session.interests.remove(handle) {
            let vacated: Vec<Location> = if old.parent_id == parent_id {
                old.locations()
                    .filter(|location| !expanded.contains(&location.zone_id))
                    .collect()
            } else {
                old.locations().collect()
            };
            disable_invisible(state, registry, session, &vacated);
            if old.parent_id == parent_id {
                kept_zones = old.zones;
            }
        }

        let new_zones: Vec<ZoneId> = expanded
            .iter()
            .copied()
            .filter(|zone| !kept_zones.contains(zone) && !session.has_interest(Location::new(parent_id, *zone)))
            .collect();

        let mut visible: Vec<&DistributedObject> = new_zones
            .iter()
            .flat_map(|zone| state.objects_at(Location::new(parent_id, *zone)))
            .filter(|object| Some(object.do_id) != avatar_id)
            .collect();
        visible.sort_by_key(|object| (object.class_id, object.do_id));

        debug!(
            "Client {} interest {} on {} covers {} zone(s), {} new object(s)",
            connection_id,
            handle,
            parent_id,
            expanded.len(),
            visible.len()
        );
        for object in visible {
            let dg = create_object_payload(schema, object)?;
            send_client(registry, connection_id, client::CREATE_OBJECT_REQUIRED_OTHER, dg.as_bytes());
        }

        session.interests.insert(handle, Interest::new(parent_id, expanded));
        send_done_interest(registry, connection_id, handle, context);
        Ok(())
    }

    fn remove_interest(
        &mut self,
        state: &StateServer,
        registry: &ConnectionRegistry,
        connection_id: ConnectionId,
        handle: u16,
        context: u32,
    ) -> Result<(), AgentError> {
        let Some(session) = self.sessions.get_mut(&connection_id) else {
            return Ok(());
        };
        let old = session
            .interests
            .remove(handle)
            .ok_or(AgentError::UnknownInterest(handle))?;
        let vacated: Vec<Location> = old.locations().collect();
        disable_invisible(state, registry, session, &vacated);
        send_done_interest(registry, connection_id, handle, context);
        Ok(())
    }
}

/// Disables objects in `vacated` that no remaining interest covers.
fn disable_invisible(
    state: &StateServer,
    registry: &ConnectionRegistry,
    session: &AgentSession,
    vacated: &[Location],
) {
    for location in vacated {
        if session.has_interest(*location) {
            continue;
        }
        for object in state.objects_at(*location) {
            if session.owns(object.do_id) {
                continue;
            }
            let mut dg = Datagram::new();
            dg.add_u32(object.do_id);
            send_client(registry, session.connection_id, client::OBJECT_DISABLE, dg.as_bytes());
        }
    }
}

fn release_avatar(bus: &mut Bus<'_>, avatar_id: DoId) -> Result<(), ProtocolError> {
    let mut dg = Datagram::new();
    dg.add_u32(avatar_id);
    let channel = Channel::from(avatar_id);
    bus.route(vec![channel], channel, stateserver::OBJECT_DELETE_RAM, dg)
}

fn send_done_interest(registry: &ConnectionRegistry, connection_id: ConnectionId, handle: u16, context: u32) {
    let mut dg = Datagram::new();
    dg.add_u16(handle);
    dg.add_u32(context);
    send_client(registry, connection_id, client::DONE_INTEREST_RESP, dg.as_bytes());
}

/// `parent, zone, class, id, broadcast required fields, other fields`.
fn create_object_payload(schema: &dyn CodecProvider, object: &DistributedObject) -> Result<Datagram, ProtocolError> {
    let mut dg = Datagram::new();
    dg.add_u32(object.location.parent_id);
    dg.add_u32(object.location.zone_id);
    dg.add_u16(object.class_id);
    dg.add_u32(object.do_id);
    object.pack_required_broadcast(schema, &mut dg)?;
    object.pack_other(schema, &mut dg)?;
    Ok(dg)
}

/// Client datagrams are the `u16` code followed by the payload.
fn send_client(registry: &ConnectionRegistry, connection_id: ConnectionId, code: u16, payload: &[u8]) {
    let mut dg = Datagram::new();
    dg.add_u16(code);
    dg.append_data(payload);
    registry.send(connection_id, dg.as_bytes());
}

#[cfg(test)]
mod tests;

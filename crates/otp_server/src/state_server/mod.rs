//! The State Server: sole owner of every live distributed object.
//!
//! Requests arrive either on the root channel ([`STATE_SERVER_CHANNEL`]) or
//! on an object's own channel. Each request is decoded into a
//! [`StateServerMessage`], applied to the object table, and its consequences
//! are routed to the object's *closure*: the object's senders plus the
//! senders of its parent. The Agent is told about every life-cycle change so
//! it can fan out to game clients by spatial interest.

use crate::agent::Agent;
use crate::director::Bus;
use otp_core::msgtypes::stateserver;
use otp_core::{
    channel_to_do_id, Channel, ClassId, CodecProvider, Datagram, DatagramIterator, DistributedObject, DoId, Envelope,
    FieldId, FieldKind, Location, ParamType, ProtocolError, StateServerMessage, CENTRAL_LOGGER_CHANNEL, STATE_SERVER_CHANNEL,
};
use std::collections::{BTreeSet, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, trace, warn};

/// Codes the State Server emits as notifications; they may reach object
/// channels that are also senders and are not requests.
const NOTIFICATION_CODES: [u16; 5] = [
    stateserver::OBJECT_ENTERZONE_WITH_REQUIRED_OTHER,
    stateserver::OBJECT_CHANGE_ZONE,
    stateserver::OBJECT_LEAVING_AI_INTEREST,
    stateserver::OBJECT_NOTFOUND,
    stateserver::QUERY_OBJECT_ALL_RESP,
];

/// Objects that live on reserved channels whenever the schema declares their class.
const SERVICE_OBJECTS: [(&str, Channel); 2] = [
    ("ObjectServer", STATE_SERVER_CHANNEL),
    ("CentralLogger", CENTRAL_LOGGER_CHANNEL),
];

#[derive(Debug, Default)]
pub struct StateServer {
    objects: HashMap<DoId, DistributedObject>,
    locations: HashMap<Location, BTreeSet<DoId>>,
}

impl StateServer {
    /// Creates the object table, seeded with the service objects `schema` declares.
    ///
    /// The `ObjectServer` answers for the root channel; its fields come from
    /// the schema defaults except `setDateCreated`, which gets the start time.
    pub fn new(schema: &dyn CodecProvider) -> Self {
        let mut server = Self::default();
        for (class_name, channel) in SERVICE_OBJECTS {
            let (Some(class), Some(do_id)) = (schema.class_by_name(class_name), channel_to_do_id(channel)) else {
                continue;
            };
            let mut object = DistributedObject::new(do_id, class.id, Location::PLACEHOLDER);
            if let Some(field) = schema
                .field_by_name(class.id, "setDateCreated")
                .filter(|field| field.kind == FieldKind::Atomic(vec![ParamType::UInt32]))
            {
                let created = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|elapsed| elapsed.as_secs() as u32)
                    .unwrap_or_default();
                object.apply_values(schema, vec![(field.id, created.to_le_bytes().to_vec())]);
            }
            info!("🏛️ Seeded {} object {}", class_name, do_id);
            server.insert(object);
        }
        server
    }

    pub fn object(&self, do_id: DoId) -> Option<&DistributedObject> {
        self.objects.get(&do_id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Live objects at `location`, in id order.
    pub fn objects_at(&self, location: Location) -> impl Iterator<Item = &DistributedObject> + '_ {
        self.locations
            .get(&location)
            .into_iter()
            .flatten()
            .filter_map(|do_id| self.objects.get(do_id))
    }

    /// Reserves `do_id` with a `(0, 0)` object that a later generate fills in.
    ///
    /// Returns false if the id is already live.
    pub fn register_placeholder(&mut self, do_id: DoId, class_id: ClassId) -> bool {
        if self.objects.contains_key(&do_id) {
            return false;
        }
        debug!("Reserving placeholder object {} (class {})", do_id, class_id);
        self.insert(DistributedObject::new(do_id, class_id, Location::PLACEHOLDER));
        true
    }

    /// Applies one routed message to every channel it addresses here.
    pub fn handle(
        &mut self,
        schema: &dyn CodecProvider,
        bus: &mut Bus<'_>,
        agent: &mut Agent,
        envelope: &Envelope,
    ) -> Result<(), ProtocolError> {
        // Our own notifications come back through the Director; they carry no requests.
        if envelope.sender == STATE_SERVER_CHANNEL {
            return Ok(());
        }

        for channel in &envelope.channels {
            let target = if *channel == STATE_SERVER_CHANNEL {
                None
            } else {
                match channel_to_do_id(*channel).filter(|do_id| self.objects.contains_key(do_id)) {
                    Some(do_id) => Some(do_id),
                    None => continue,
                }
            };

            if envelope.payload.is_empty() {
                warn!("⚠️ Empty state server message {} on channel {}", envelope.code, channel);
                return Ok(());
            }
            if target.is_some() && NOTIFICATION_CODES.contains(&envelope.code) {
                trace!("Notification {} on object channel {}", envelope.code, channel);
                continue;
            }

            let mut di = DatagramIterator::new(&envelope.payload);
            let message = StateServerMessage::decode(envelope.code, &mut di)?;
            match target {
                None => self.handle_root(schema, bus, agent, envelope.sender, message)?,
                Some(do_id) => self.handle_object(schema, bus, agent, do_id, *channel, envelope.sender, message)?,
            }
        }
        Ok(())
    }

    fn handle_root(
        &mut self,
        schema: &dyn CodecProvider,
        bus: &mut Bus<'_>,
        agent: &mut Agent,
        sender: Channel,
        message: StateServerMessage,
    ) -> Result<(), ProtocolError> {
        let root = channel_to_do_id(STATE_SERVER_CHANNEL).unwrap_or_default();
        match message {
            StateServerMessage::Generate {
                location,
                class_id,
                do_id,
                with_other,
                fields,
            } => self.generate(schema, bus, agent, sender, location, class_id, do_id, with_other, &fields),
            StateServerMessage::DeleteRam { do_id } => match self.objects.get(&do_id) {
                Some(object) if object.is_placeholder() => {
                    debug!("Ignoring delete of placeholder object {}", do_id);
                    Ok(())
                }
                Some(_) => self.delete_object(bus, agent, do_id, STATE_SERVER_CHANNEL),
                None => {
                    debug!("Delete of unknown object {} from {}", do_id, sender);
                    let mut dg = Datagram::new();
                    dg.add_u32(do_id);
                    bus.route(vec![sender], STATE_SERVER_CHANNEL, stateserver::OBJECT_NOTFOUND, dg)
                }
            },
            StateServerMessage::ShardRest { owner } => self.shard_rest(bus, agent, owner),
            // The seeded ObjectServer stands for the root channel itself.
            StateServerMessage::QueryObjectAll { context } if self.objects.contains_key(&root) => {
                self.query_object_all(schema, bus, root, context, sender)
            }
            StateServerMessage::UpdateField {
                do_id,
                field_id,
                value,
            } if do_id == root && self.objects.contains_key(&root) => {
                self.update_field(schema, bus, agent, root, field_id, &value, sender)
            }
            other => Err(ProtocolError::UnknownCode {
                code: other.code(),
                target: "state server root",
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_object(
        &mut self,
        schema: &dyn CodecProvider,
        bus: &mut Bus<'_>,
        agent: &mut Agent,
        do_id: DoId,
        channel: Channel,
        sender: Channel,
        message: StateServerMessage,
    ) -> Result<(), ProtocolError> {
        let addressed = match &message {
            StateServerMessage::Generate { do_id, .. }
            | StateServerMessage::UpdateField { do_id, .. }
            | StateServerMessage::DeleteRam { do_id } => Some(*do_id),
            _ => None,
        };
        if let Some(addressed) = addressed.filter(|addressed| *addressed != do_id) {
            return Err(ProtocolError::ChannelMismatch {
                do_id: addressed,
                channel,
            });
        }

        match message {
            StateServerMessage::Generate {
                location,
                class_id,
                with_other,
                fields,
                ..
            } => self.generate(schema, bus, agent, sender, location, class_id, do_id, with_other, &fields),
            StateServerMessage::UpdateField { field_id, value, .. } => {
                self.update_field(schema, bus, agent, do_id, field_id, &value, sender)
            }
            StateServerMessage::DeleteRam { .. } => {
                if self.objects.get(&do_id).is_some_and(DistributedObject::is_placeholder) {
                    debug!("Ignoring delete of placeholder object {}", do_id);
                    return Ok(());
                }
                self.delete_object(bus, agent, do_id, sender)
            }
            StateServerMessage::SetZone { location } => self.set_zone(schema, bus, agent, do_id, location, sender),
            StateServerMessage::QueryObjectAll { context } => self.query_object_all(schema, bus, do_id, context, sender),
            StateServerMessage::ShardRest { .. } => Err(ProtocolError::UnknownCode {
                code: stateserver::SHARD_REST,
                target: "object channel",
            }),
        }
    }

    /// Channels entitled to an object's events: its senders, then its
    /// parent's senders, without duplicates and without `sender`.
    pub fn closure(&self, object: &DistributedObject, sender: Channel) -> Vec<Channel> {
        let parent_senders = self
            .objects
            .get(&object.location.parent_id)
            .map(|parent| parent.senders.as_slice())
            .unwrap_or_default();
        let mut channels = Vec::new();
        for channel in object.senders.iter().chain(parent_senders) {
            if *channel != sender && !channels.contains(channel) {
                channels.push(*channel);
            }
        }
        channels
    }

    #[allow(clippy::too_many_arguments)]
    fn generate(
        &mut self,
        schema: &dyn CodecProvider,
        bus: &mut Bus<'_>,
        agent: &mut Agent,
        sender: Channel,
        location: Location,
        class_id: ClassId,
        do_id: DoId,
        with_other: bool,
        fields: &[u8],
    ) -> Result<(), ProtocolError> {
        if schema.class(class_id).is_none() {
            return Err(ProtocolError::UnknownClass(class_id));
        }

        let mut object = match self.objects.get(&do_id) {
            Some(existing) => {
                if existing.class_id != class_id {
                    warn!(
                        "⚠️ Generate of object {} as class {} over class {}",
                        do_id, class_id, existing.class_id
                    );
                }
                existing.clone()
            }
            None => DistributedObject::new(do_id, class_id, location),
        };
        object.class_id = class_id;
        object.location = location;
        object.add_sender(sender);

        // Decode into the copy so a malformed generate leaves the table untouched.
        let mut di = DatagramIterator::new(fields);
        object.receive_required(schema, &mut di)?;
        if with_other {
            object.receive_other(schema, &mut di)?;
        }
        let code = if with_other {
            stateserver::OBJECT_GENERATE_WITH_REQUIRED_OTHER
        } else {
            stateserver::OBJECT_GENERATE_WITH_REQUIRED
        };
        di.expect_end(code)?;

        debug!("Generating object {} (class {}) at {} for {}", do_id, class_id, location, sender);
        self.insert(object);
        let object = self.objects.get(&do_id).ok_or(ProtocolError::UnknownObject(do_id))?;

        let interested = self.closure(object, sender);
        if !interested.is_empty() {
            let payload = enter_zone_payload(schema, object)?;
            bus.route(interested, sender, stateserver::OBJECT_ENTERZONE_WITH_REQUIRED_OTHER, payload)?;
        }
        agent.announce_create(bus.registry, schema, object, sender)
    }

    #[allow(clippy::too_many_arguments)]
    fn update_field(
        &mut self,
        schema: &dyn CodecProvider,
        bus: &mut Bus<'_>,
        agent: &mut Agent,
        do_id: DoId,
        field_id: FieldId,
        value: &[u8],
        sender: Channel,
    ) -> Result<(), ProtocolError> {
        let object = self.objects.get_mut(&do_id).ok_or(ProtocolError::UnknownObject(do_id))?;
        let field = schema.describe_field(object.class_id, field_id)?;
        let mut di = DatagramIterator::new(value);
        let values = schema.decode_field(field, &mut di)?;
        di.expect_end(stateserver::OBJECT_UPDATE_FIELD)?;
        object.apply_values(schema, values);

        let object = self.objects.get(&do_id).ok_or(ProtocolError::UnknownObject(do_id))?;
        let uberdog = bus.uberdog_channel();
        let own_channel = Channel::from(do_id);
        let mut interested = self.closure(object, sender);
        interested.retain(|channel| {
            if *channel == own_channel {
                return false;
            }
            if !object.senders.contains(channel) {
                return true;
            }
            if Some(*channel) == uberdog
                && (field.is_db() || !(field.is_clrecv() || field.is_clsend() || field.is_airecv()))
            {
                return true;
            }
            field.is_airecv()
        });

        trace!("Object {} field {} updated by {}", do_id, field.name, sender);
        if !interested.is_empty() {
            let mut dg = Datagram::new();
            dg.add_u32(do_id);
            dg.add_u16(field_id);
            dg.append_data(value);
            bus.route(interested, sender, stateserver::OBJECT_UPDATE_FIELD, dg)?;
        }
        agent.announce_update(bus.registry, object, field, value, sender);
        Ok(())
    }

    fn delete_object(
        &mut self,
        bus: &mut Bus<'_>,
        agent: &mut Agent,
        do_id: DoId,
        sender: Channel,
    ) -> Result<(), ProtocolError> {
        let Some(object) = self.remove(do_id) else {
            return Ok(());
        };
        debug!("Deleting object {} at {} for {}", do_id, object.location, sender);

        // The deleting sender always hears the delete so it can release the channel.
        let mut interested = self.closure(&object, sender);
        interested.push(sender);
        let mut dg = Datagram::new();
        dg.add_u32(do_id);
        bus.route(interested, sender, stateserver::OBJECT_DELETE_RAM, dg)?;

        agent.announce_delete(bus.registry, &object, sender);
        Ok(())
    }

    fn set_zone(
        &mut self,
        schema: &dyn CodecProvider,
        bus: &mut Bus<'_>,
        agent: &mut Agent,
        do_id: DoId,
        location: Location,
        sender: Channel,
    ) -> Result<(), ProtocolError> {
        let previous = self
            .objects
            .get(&do_id)
            .map(|object| object.location)
            .ok_or(ProtocolError::UnknownObject(do_id))?;
        let old_parent = self.objects.get(&previous.parent_id);
        let previous_parent_channel = old_parent.and_then(DistributedObject::primary_sender);
        let moved_by_parent = old_parent.is_some_and(|parent| parent.senders.contains(&sender));

        self.relocate(do_id, location);
        let object = self.objects.get(&do_id).ok_or(ProtocolError::UnknownObject(do_id))?;
        trace!("Object {} moved {} -> {} by {}", do_id, previous, location, sender);

        if !moved_by_parent {
            if location.parent_id == previous.parent_id {
                let interested = self.closure(object, sender);
                if !interested.is_empty() {
                    let mut dg = Datagram::new();
                    dg.add_u32(do_id);
                    dg.add_u32(location.parent_id);
                    dg.add_u32(location.zone_id);
                    dg.add_u32(previous.parent_id);
                    dg.add_u32(previous.zone_id);
                    bus.route(interested, sender, stateserver::OBJECT_CHANGE_ZONE, dg)?;
                }
            } else {
                if let Some(channel) = previous_parent_channel {
                    let mut dg = Datagram::new();
                    dg.add_u32(do_id);
                    bus.route(vec![channel], sender, stateserver::OBJECT_LEAVING_AI_INTEREST, dg)?;
                }
                let interested = self.closure(object, sender);
                if !interested.is_empty() {
                    let payload = enter_zone_payload(schema, object)?;
                    bus.route(interested, sender, stateserver::OBJECT_ENTERZONE_WITH_REQUIRED_OTHER, payload)?;
                }
            }
        }

        agent.announce_move(bus.registry, schema, object, previous, sender)
    }

    fn query_object_all(
        &self,
        schema: &dyn CodecProvider,
        bus: &mut Bus<'_>,
        do_id: DoId,
        context: u32,
        sender: Channel,
    ) -> Result<(), ProtocolError> {
        let object = self.objects.get(&do_id).ok_or(ProtocolError::UnknownObject(do_id))?;
        let mut dg = Datagram::new();
        dg.add_u32(context);
        dg.append_data(enter_zone_payload(schema, object)?.as_bytes());
        bus.route(vec![sender], STATE_SERVER_CHANNEL, stateserver::QUERY_OBJECT_ALL_RESP, dg)
    }

    /// Deletes everything `owner` created, or that lives under an object it
    /// created.
    fn shard_rest(&mut self, bus: &mut Bus<'_>, agent: &mut Agent, owner: Channel) -> Result<(), ProtocolError> {
        let mut doomed: Vec<DoId> = self
            .objects
            .values()
            .filter(|object| {
                object.senders.contains(&owner)
                    || self
                        .objects
                        .get(&object.location.parent_id)
                        .is_some_and(|parent| parent.senders.contains(&owner))
            })
            .map(|object| object.do_id)
            .collect();
        doomed.sort_unstable();

        info!("🧹 Shard {} at rest, deleting {} object(s)", owner, doomed.len());
        for do_id in doomed {
            if self.objects.get(&do_id).is_some_and(|object| !object.is_placeholder()) {
                self.delete_object(bus, agent, do_id, STATE_SERVER_CHANNEL)?;
            }
        }
        Ok(())
    }

    fn insert(&mut self, object: DistributedObject) {
        if let Some(previous) = self.objects.get(&object.do_id) {
            let location = previous.location;
            self.unindex(object.do_id, location);
        }
        self.locations
            .entry(object.location)
            .or_default()
            .insert(object.do_id);
        self.objects.insert(object.do_id, object);
    }

    fn remove(&mut self, do_id: DoId) -> Option<DistributedObject> {
        let object = self.objects.remove(&do_id)?;
        self.unindex(do_id, object.location);
        Some(object)
    }

    fn relocate(&mut self, do_id: DoId, location: Location) {
        let Some(object) = self.objects.get_mut(&do_id) else {
            return;
        };
        let previous = std::mem::replace(&mut object.location, location);
        self.unindex(do_id, previous);
        self.locations.entry(location).or_default().insert(do_id);
    }

    fn unindex(&mut self, do_id: DoId, location: Location) {
        if let Some(ids) = self.locations.get_mut(&location) {
            ids.remove(&do_id);
            if ids.is_empty() {
                self.locations.remove(&location);
            }
        }
    }
}

/// `parent, zone, class, id, required fields, other fields`.
fn enter_zone_payload(schema: &dyn CodecProvider, object: &DistributedObject) -> Result<Datagram, ProtocolError> {
    let mut dg = Datagram::new();
    dg.add_u32(object.location.parent_id);
    dg.add_u32(object.location.zone_id);
    dg.add_u16(object.class_id);
    dg.add_u32(object.do_id);
    object.pack_required(schema, &mut dg)?;
    object.pack_other(schema, &mut dg)?;
    Ok(dg)
}

//! The database server: persistent objects behind the Director.
//!
//! Listens on [`DATABASE_CHANNEL`] for stored-value requests and on the
//! channels of stored objects it has loaded, where `db` field updates are
//! written back to the [`ObjectStore`]. Responses are sent from the State
//! Server root channel.

use crate::director::Bus;
use crate::error::ServerError;
use crate::state_server::StateServer;
use otp_core::msgtypes::{dbserver, stateserver};
use otp_core::{
    channel_to_do_id, Channel, CodecProvider, DatabaseMessage, Datagram, DatagramIterator, DoId, Envelope,
    FieldDescriptor, ObjectStore, ProtocolError, StoreError, StoredObject, DATABASE_CHANNEL, STATE_SERVER_CHANNEL,
};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Field whose presence marks a class as a creatable stored object.
pub const STORED_OBJECT_MARKER: &str = "DcObjectType";

/// Avatar class that carries the marker but is never created by type index
/// nor reserved on lookup; avatars are generated by the Agent.
const AVATAR_CLASS: &str = "DistributedToon";

/// Value returned for a requested field the object does not hold.
const MISSING_VALUE: &[u8] = b"DEADBEEF";

pub struct DatabaseServer {
    store: Box<dyn ObjectStore>,
    /// Classes carrying the marker field, in schema order, avatars excluded
    marker_classes: Vec<String>,
    loaded: HashSet<DoId>,
}

impl DatabaseServer {
    pub fn new(store: Box<dyn ObjectStore>, schema: &dyn CodecProvider) -> Self {
        let marker_classes = (0..schema.class_count())
            .filter_map(|id| u16::try_from(id).ok())
            .filter_map(|id| schema.class(id))
            .filter(|class| class.name != AVATAR_CLASS)
            .filter(|class| schema.field_by_name(class.id, STORED_OBJECT_MARKER).is_some())
            .map(|class| class.name.clone())
            .collect();
        Self {
            store,
            marker_classes,
            loaded: HashSet::new(),
        }
    }

    pub fn marker_classes(&self) -> &[String] {
        &self.marker_classes
    }

    pub fn has(&self, do_id: DoId) -> bool {
        self.store.has(do_id)
    }

    /// Loads a stored object; later `db` updates routed to it are persisted.
    pub fn load(&mut self, do_id: DoId) -> Result<StoredObject, StoreError> {
        let object = self.store.load(do_id)?;
        self.loaded.insert(do_id);
        Ok(object)
    }

    /// Creates an object of `class_name` with every `db` field defaulted.
    pub fn create(&mut self, schema: &dyn CodecProvider, class_name: &str) -> Result<StoredObject, StoreError> {
        let do_id = self.store.create(class_name)?;
        let mut object = self.store.load(do_id)?;
        object.apply_defaults(schema)?;
        self.store.save(&object)?;
        info!("💾 Created stored {} {}", class_name, do_id);
        Ok(object)
    }

    pub fn save(&mut self, object: &StoredObject) -> Result<(), StoreError> {
        self.store.save(object)
    }

    pub fn handle(
        &mut self,
        schema: &dyn CodecProvider,
        bus: &mut Bus<'_>,
        state: &mut StateServer,
        envelope: &Envelope,
    ) -> Result<(), ServerError> {
        for channel in &envelope.channels {
            if *channel == DATABASE_CHANNEL {
                let mut di = DatagramIterator::new(&envelope.payload);
                let message = DatabaseMessage::decode(envelope.code, &mut di)?;
                self.handle_request(schema, bus, state, envelope.sender, message)?;
            } else if let Some(do_id) = channel_to_do_id(*channel).filter(|id| self.loaded.contains(id)) {
                if envelope.code == stateserver::OBJECT_UPDATE_FIELD {
                    self.persist_update(schema, do_id, *channel, &envelope.payload)?;
                }
            }
        }
        Ok(())
    }

    fn handle_request(
        &mut self,
        schema: &dyn CodecProvider,
        bus: &mut Bus<'_>,
        state: &mut StateServer,
        sender: Channel,
        message: DatabaseMessage,
    ) -> Result<(), ServerError> {
        match message {
            DatabaseMessage::GetStoredValues { context, do_id, names } => {
                self.get_stored_values(schema, bus, state, sender, context, do_id, &names)
            }
            DatabaseMessage::SetStoredValues { do_id, names, values } => {
                if !self.store.has(do_id) {
                    debug!("Set stored values of unknown object {}", do_id);
                    return Ok(());
                }
                let mut object = self.load(do_id)?;
                assign_values(schema, &mut object, &names, &values);
                self.store.save(&object)?;
                Ok(())
            }
            DatabaseMessage::CreateStoredObject {
                context,
                object_type,
                names,
                values,
            } => {
                let mut dg = Datagram::new();
                dg.add_u32(context);
                match self.marker_classes.get(usize::from(object_type)).cloned() {
                    Some(class_name) => {
                        let mut object = self.create(schema, &class_name)?;
                        assign_values(schema, &mut object, &names, &values);
                        self.store.save(&object)?;
                        dg.add_u8(0);
                        dg.add_u32(object.do_id);
                    }
                    None => {
                        warn!("⚠️ Create of unknown stored object type {}", object_type);
                        dg.add_u8(1);
                    }
                }
                bus.route(vec![sender], STATE_SERVER_CHANNEL, dbserver::CREATE_STORED_OBJECT_RESP, dg)?;
                Ok(())
            }
            DatabaseMessage::DeleteStoredObject => {
                info!("🗑️ Stored object delete requested by {}; ignored", sender);
                Ok(())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn get_stored_values(
        &mut self,
        schema: &dyn CodecProvider,
        bus: &mut Bus<'_>,
        state: &mut StateServer,
        sender: Channel,
        context: u32,
        do_id: DoId,
        names: &[String],
    ) -> Result<(), ServerError> {
        let mut dg = Datagram::new();
        dg.add_u32(context);
        dg.add_u32(do_id);
        dg.add_u16(names.len() as u16);
        names.iter().for_each(|name| dg.add_string(name));

        if !self.store.has(do_id) {
            dg.add_u8(1);
            bus.route(vec![sender], STATE_SERVER_CHANNEL, dbserver::GET_STORED_VALUES_RESP, dg)?;
            return Ok(());
        }
        dg.add_u8(0);

        let object = self.load(do_id)?;
        let found: Vec<Option<&Vec<u8>>> = names.iter().map(|name| object.fields.get(name)).collect();
        for value in &found {
            dg.add_blob(value.map(Vec::as_slice).unwrap_or(MISSING_VALUE));
        }
        for value in &found {
            dg.add_u8(u8::from(value.is_some()));
        }
        bus.route(vec![sender], STATE_SERVER_CHANNEL, dbserver::GET_STORED_VALUES_RESP, dg)?;

        if self.marker_classes.contains(&object.class_name) {
            if let Some(class) = schema.class_by_name(&object.class_name) {
                state.register_placeholder(do_id, class.id);
            }
        }
        Ok(())
    }

    fn persist_update(
        &mut self,
        schema: &dyn CodecProvider,
        do_id: DoId,
        channel: Channel,
        payload: &[u8],
    ) -> Result<(), ServerError> {
        let mut di = DatagramIterator::new(payload);
        let addressed = di.get_u32()?;
        if addressed != do_id {
            return Err(ProtocolError::ChannelMismatch {
                do_id: addressed,
                channel,
            }
            .into());
        }
        let field_id = di.get_u16()?;

        let mut object = self.store.load(do_id)?;
        let class = schema
            .class_by_name(&object.class_name)
            .ok_or_else(|| StoreError::Format(format!("unknown class {}", object.class_name)))?;
        let field = schema.describe_field(class.id, field_id)?;
        let values = schema.decode_field(field, &mut di)?;
        di.expect_end(stateserver::OBJECT_UPDATE_FIELD)?;

        if object.store_values(schema, values) {
            self.store.save(&object)?;
            debug!("Persisted {} of stored object {}", field.name, do_id);
        }
        Ok(())
    }
}

/// Stores `values` under the atomic fields of the object's class they name.
///
/// Unknown names and values that do not decode as their field are skipped.
fn assign_values(schema: &dyn CodecProvider, object: &mut StoredObject, names: &[String], values: &[Vec<u8>]) {
    let Some(class) = schema.class_by_name(&object.class_name) else {
        return;
    };
    for (name, value) in names.iter().zip(values) {
        let Some(field) = schema.field_by_name(class.id, name).filter(|field| field.is_atomic()) else {
            debug!("Stored object {} has no field {}", object.do_id, name);
            continue;
        };
        if !decodes_exactly(field, value) {
            warn!("⚠️ Malformed value for {} of stored object {}", name, object.do_id);
            continue;
        }
        object.fields.insert(name.clone(), value.clone());
    }
}

fn decodes_exactly(field: &FieldDescriptor, value: &[u8]) -> bool {
    let mut di = DatagramIterator::new(value);
    field.read_atomic(&mut di).is_ok() && di.remaining_size() == 0
}

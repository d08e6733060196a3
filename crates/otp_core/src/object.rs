//! Live distributed objects as held by the State Server.

use crate::datagram::{Datagram, DatagramIterator};
use crate::error::ProtocolError;
use crate::schema::{CodecProvider, FieldDescriptor};
use crate::types::{Channel, ClassId, DoId, FieldId, Location};
use std::collections::BTreeMap;

/// A replicated object instance.
///
/// Only required and ram atomic fields are kept; everything else passes
/// through the server without being stored.
#[derive(Debug, Clone)]
pub struct DistributedObject {
    pub do_id: DoId,
    pub class_id: ClassId,
    pub location: Location,
    /// Channels that created or took ownership of the object, oldest first
    pub senders: Vec<Channel>,
    fields: BTreeMap<FieldId, Vec<u8>>,
}

impl DistributedObject {
    pub fn new(do_id: DoId, class_id: ClassId, location: Location) -> Self {
        Self {
            do_id,
            class_id,
            location,
            senders: Vec::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Records an owning channel, keeping insertion order and no duplicates.
    pub fn add_sender(&mut self, channel: Channel) {
        if !self.senders.contains(&channel) {
            self.senders.push(channel);
        }
    }

    /// The channel that first claimed the object.
    pub fn primary_sender(&self) -> Option<Channel> {
        self.senders.first().copied()
    }

    pub fn is_placeholder(&self) -> bool {
        self.location.is_placeholder()
    }

    /// Stored value of a field, if any.
    pub fn field(&self, field_id: FieldId) -> Option<&[u8]> {
        self.fields.get(&field_id).map(Vec::as_slice)
    }

    /// Stores decoded atomic values, dropping those the object does not keep.
    pub fn apply_values(&mut self, schema: &dyn CodecProvider, values: Vec<(FieldId, Vec<u8>)>) {
        for (field_id, value) in values {
            let kept = schema
                .field(field_id)
                .map(|field| field.is_atomic() && (field.is_required() || field.is_ram()))
                .unwrap_or(false);
            if kept {
                self.fields.insert(field_id, value);
            }
        }
    }

    /// Reads one value of `field` and stores what the object keeps.
    pub fn receive_field(
        &mut self,
        schema: &dyn CodecProvider,
        field: &FieldDescriptor,
        di: &mut DatagramIterator<'_>,
    ) -> Result<(), ProtocolError> {
        let values = schema.decode_field(field, di)?;
        self.apply_values(schema, values);
        Ok(())
    }

    /// Reads every required field of the class, in class order.
    pub fn receive_required(
        &mut self,
        schema: &dyn CodecProvider,
        di: &mut DatagramIterator<'_>,
    ) -> Result<(), ProtocolError> {
        for field in self.class_fields(schema)? {
            if field.is_required() && field.is_atomic() {
                self.receive_field(schema, field, di)?;
            }
        }
        Ok(())
    }

    /// Reads a `u16` count followed by `(field id, value)` pairs.
    pub fn receive_other(
        &mut self,
        schema: &dyn CodecProvider,
        di: &mut DatagramIterator<'_>,
    ) -> Result<(), ProtocolError> {
        let count = di.get_u16()?;
        for _ in 0..count {
            let field_id = di.get_u16()?;
            let field = schema.describe_field(self.class_id, field_id)?;
            self.receive_field(schema, field, di)?;
        }
        Ok(())
    }

    /// Packs the stored value of `field`, or its default when unset.
    pub fn pack_field(&self, schema: &dyn CodecProvider, field: &FieldDescriptor, dg: &mut Datagram) {
        for atomic in schema.atomics(field) {
            match self.fields.get(&atomic.id) {
                Some(value) => dg.append_data(value),
                None => dg.append_data(&atomic.default),
            }
        }
    }

    pub fn pack_required(&self, schema: &dyn CodecProvider, dg: &mut Datagram) -> Result<(), ProtocolError> {
        for field in self.class_fields(schema)? {
            if field.is_required() && field.is_atomic() {
                self.pack_field(schema, field, dg);
            }
        }
        Ok(())
    }

    /// Required fields that are also broadcast, as sent to observing clients.
    pub fn pack_required_broadcast(
        &self,
        schema: &dyn CodecProvider,
        dg: &mut Datagram,
    ) -> Result<(), ProtocolError> {
        for field in self.class_fields(schema)? {
            if field.is_required() && field.is_broadcast() && field.is_atomic() {
                self.pack_field(schema, field, dg);
            }
        }
        Ok(())
    }

    /// Broadcast, non-required fields that currently hold a value.
    pub fn pack_other(&self, schema: &dyn CodecProvider, dg: &mut Datagram) -> Result<(), ProtocolError> {
        let mut body = Datagram::new();
        let mut count: u16 = 0;
        for field in self.class_fields(schema)? {
            if field.is_broadcast() && !field.is_required() && self.fields.contains_key(&field.id) {
                body.add_u16(field.id);
                self.pack_field(schema, field, &mut body);
                count += 1;
            }
        }
        dg.add_u16(count);
        dg.append_data(body.as_bytes());
        Ok(())
    }

    fn class_fields<'s>(&self, schema: &'s dyn CodecProvider) -> Result<Vec<&'s FieldDescriptor>, ProtocolError> {
        let class = schema
            .class(self.class_id)
            .ok_or(ProtocolError::UnknownClass(self.class_id))?;
        Ok(class.fields.iter().filter_map(|id| schema.field(*id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TomlSchema;

    const SCHEMA: &str = r#"
        [[class]]
        name = "DistributedToon"

        [[class.field]]
        name = "setName"
        keywords = ["required", "broadcast", "ram", "db"]
        params = ["string"]
        default = ["Toon"]

        [[class.field]]
        name = "setHp"
        keywords = ["required", "ownrecv"]
        params = ["int16"]

        [[class.field]]
        name = "setAnimState"
        keywords = ["broadcast", "ram"]
        params = ["string"]

        [[class.field]]
        name = "setChat"
        keywords = ["broadcast"]
        params = ["string"]
    "#;

    fn schema() -> TomlSchema {
        TomlSchema::parse(SCHEMA).unwrap()
    }

    #[test]
    fn senders_stay_unique_and_ordered() {
        let mut object = DistributedObject::new(42, 0, Location::new(100, 200));
        object.add_sender(7);
        object.add_sender(9);
        object.add_sender(7);
        assert_eq!(object.senders, vec![7, 9]);
        assert_eq!(object.primary_sender(), Some(7));
    }

    #[test]
    fn required_round_trip_uses_defaults() {
        let schema = schema();
        let object = DistributedObject::new(42, 0, Location::new(100, 200));
        let mut dg = Datagram::new();
        object.pack_required(&schema, &mut dg).unwrap();

        let mut di = DatagramIterator::new(dg.as_bytes());
        assert_eq!(di.get_string().unwrap(), "Toon");
        assert_eq!(di.get_i16().unwrap(), 0);
        assert_eq!(di.remaining_size(), 0);

        let mut copy = DistributedObject::new(43, 0, Location::PLACEHOLDER);
        let mut di = DatagramIterator::new(dg.as_bytes());
        copy.receive_required(&schema, &mut di).unwrap();
        assert!(copy.field(0).is_some());
    }

    #[test]
    fn only_ram_or_required_fields_are_stored() {
        let schema = schema();
        let mut object = DistributedObject::new(42, 0, Location::new(100, 200));
        let mut dg = Datagram::new();
        dg.add_string("hello");
        let chat = schema.field(3).unwrap();
        object
            .receive_field(&schema, chat, &mut DatagramIterator::new(dg.as_bytes()))
            .unwrap();
        assert!(object.field(3).is_none());

        let anim = schema.field(2).unwrap();
        object
            .receive_field(&schema, anim, &mut DatagramIterator::new(dg.as_bytes()))
            .unwrap();
        assert_eq!(object.field(2), Some(dg.as_bytes()));
    }

    #[test]
    fn other_lists_set_broadcast_fields() {
        let schema = schema();
        let mut object = DistributedObject::new(42, 0, Location::new(100, 200));

        let mut empty = Datagram::new();
        object.pack_other(&schema, &mut empty).unwrap();
        assert_eq!(empty.as_bytes(), &[0, 0]);

        let mut other = Datagram::new();
        other.add_u16(1);
        other.add_u16(2);
        other.add_string("Sad");
        object
            .receive_other(&schema, &mut DatagramIterator::new(other.as_bytes()))
            .unwrap();

        let mut packed = Datagram::new();
        object.pack_other(&schema, &mut packed).unwrap();
        assert_eq!(packed, other);
    }

    #[test]
    fn other_rejects_foreign_fields() {
        let schema = schema();
        let mut object = DistributedObject::new(42, 0, Location::new(100, 200));
        let mut other = Datagram::new();
        other.add_u16(1);
        other.add_u16(77);
        assert!(matches!(
            object.receive_other(&schema, &mut DatagramIterator::new(other.as_bytes())),
            Err(ProtocolError::UnknownField { field_id: 77, .. })
        ));
    }
}

//! # Schema / codec provider
//!
//! The server never interprets field values. It only needs to know, for a
//! class and a field number, which keyword flags the field carries, what
//! its default packs to, and how many bytes a value occupies on the wire.
//! [`CodecProvider`] exposes exactly that; [`TomlSchema`] implements it from a
//! schema file.

mod field;
mod file;

pub use field::{FieldDescriptor, FieldFlags, FieldKind, ParamType};
pub use file::TomlSchema;

use crate::datagram::DatagramIterator;
use crate::error::ProtocolError;
use crate::types::{ClassId, FieldId};

/// A class and the fields it carries, inherited ones first.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    pub id: ClassId,
    pub name: String,
    /// Every field of the class in declaration order
    pub fields: Vec<FieldId>,
}

impl ClassDescriptor {
    pub fn has_field(&self, field_id: FieldId) -> bool {
        self.fields.contains(&field_id)
    }
}

/// Field facts consumed by the State Server, the Agent and the store adapter.
pub trait CodecProvider: Send + Sync {
    /// Class by number.
    fn class(&self, class_id: ClassId) -> Option<&ClassDescriptor>;

    /// Class by name.
    fn class_by_name(&self, name: &str) -> Option<&ClassDescriptor>;

    /// Field by global number.
    fn field(&self, field_id: FieldId) -> Option<&FieldDescriptor>;

    /// Number of classes; ids run from zero.
    fn class_count(&self) -> usize;

    /// Field `field_id` of class `class_id`, or a protocol error when the
    /// class does not carry it.
    fn describe_field(&self, class_id: ClassId, field_id: FieldId) -> Result<&FieldDescriptor, ProtocolError> {
        let class = self.class(class_id).ok_or(ProtocolError::UnknownClass(class_id))?;
        if !class.has_field(field_id) {
            return Err(ProtocolError::UnknownField { class_id, field_id });
        }
        self.field(field_id)
            .ok_or(ProtocolError::UnknownField { class_id, field_id })
    }

    /// Field of a class looked up by name.
    fn field_by_name(&self, class_id: ClassId, name: &str) -> Option<&FieldDescriptor> {
        self.class(class_id)?
            .fields
            .iter()
            .filter_map(|id| self.field(*id))
            .find(|field| field.name == name)
    }

    /// Atomic fields a value of `field` expands to, in wire order.
    fn atomics<'s>(&'s self, field: &'s FieldDescriptor) -> Vec<&'s FieldDescriptor> {
        match &field.kind {
            FieldKind::Atomic(_) => vec![field],
            FieldKind::Molecular(ids) => ids.iter().filter_map(|id| self.field(*id)).collect(),
        }
    }

    /// Reads one value of `field` from `di`, split into its atomic parts.
    fn decode_field(
        &self,
        field: &FieldDescriptor,
        di: &mut DatagramIterator<'_>,
    ) -> Result<Vec<(FieldId, Vec<u8>)>, ProtocolError> {
        self.atomics(field)
            .into_iter()
            .map(|atomic| Ok((atomic.id, atomic.read_atomic(di)?.to_vec())))
            .collect()
    }
}

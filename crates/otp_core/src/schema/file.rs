//! TOML schema files.
//!
//! ```toml
//! [[class]]
//! name = "DistributedNode"
//!
//! [[class.field]]
//! name = "setX"
//! keywords = ["broadcast", "ram"]
//! params = ["float64"]
//!
//! [[class]]
//! name = "DistributedToon"
//! parents = ["DistributedNode"]
//!
//! [[class.field]]
//! name = "setName"
//! keywords = ["required", "broadcast", "ram", "db"]
//! params = ["string"]
//! default = ["Toon"]
//!
//! [[class.field]]
//! name = "setXY"
//! molecular = ["setX", "setY"]
//! ```
//!
//! Class numbers follow file order. Field numbers are global and follow
//! declaration order across the whole file.

use super::field::{FieldDescriptor, FieldFlags, FieldKind, ParamType};
use super::{ClassDescriptor, CodecProvider};
use crate::datagram::Datagram;
use crate::error::SchemaError;
use crate::types::{ClassId, FieldId};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default, rename = "class")]
    classes: Vec<ClassEntry>,
}

#[derive(Debug, Deserialize)]
struct ClassEntry {
    name: String,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default, rename = "field")]
    fields: Vec<FieldEntry>,
}

#[derive(Debug, Deserialize)]
struct FieldEntry {
    name: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    params: Vec<String>,
    default: Option<Vec<toml::Value>>,
    molecular: Option<Vec<String>>,
}

/// Schema loaded from a TOML description.
#[derive(Debug, Clone, Default)]
pub struct TomlSchema {
    classes: Vec<ClassDescriptor>,
    fields: Vec<FieldDescriptor>,
    class_names: HashMap<String, ClassId>,
}

impl TomlSchema {
    /// Reads and builds a schema file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let schema = Self::parse(&text)?;
        info!(
            "📜 Loaded schema {} ({} classes, {} fields)",
            path.display(),
            schema.classes.len(),
            schema.fields.len()
        );
        Ok(schema)
    }

    /// Builds a schema from TOML text.
    pub fn parse(text: &str) -> Result<Self, SchemaError> {
        let file: SchemaFile = toml::from_str(text)?;
        let mut schema = TomlSchema::default();
        for entry in file.classes {
            schema.add_class(entry)?;
        }
        Ok(schema)
    }

    fn add_class(&mut self, entry: ClassEntry) -> Result<(), SchemaError> {
        let id = ClassId::try_from(self.classes.len())
            .map_err(|_| SchemaError::Invalid("too many classes".into()))?;
        if self.class_names.contains_key(&entry.name) {
            return Err(SchemaError::Invalid(format!("class {} declared twice", entry.name)));
        }

        let mut fields: Vec<FieldId> = Vec::new();
        for parent in &entry.parents {
            let parent_id = *self.class_names.get(parent).ok_or_else(|| {
                SchemaError::Invalid(format!("class {} inherits unknown class {parent}", entry.name))
            })?;
            for inherited in &self.classes[usize::from(parent_id)].fields {
                let name = &self.fields[usize::from(*inherited)].name;
                if self.position_by_name(&fields, name).is_none() {
                    fields.push(*inherited);
                }
            }
        }

        for field_entry in entry.fields {
            let descriptor = self.build_field(&entry.name, &fields, field_entry)?;
            let field_id = descriptor.id;
            match self.position_by_name(&fields, &descriptor.name) {
                Some(position) => fields[position] = field_id,
                None => fields.push(field_id),
            }
            self.fields.push(descriptor);
        }

        self.class_names.insert(entry.name.clone(), id);
        self.classes.push(ClassDescriptor {
            id,
            name: entry.name,
            fields,
        });
        Ok(())
    }

    fn position_by_name(&self, fields: &[FieldId], name: &str) -> Option<usize> {
        fields
            .iter()
            .position(|id| self.fields[usize::from(*id)].name == name)
    }

    fn build_field(
        &self,
        class_name: &str,
        class_fields: &[FieldId],
        entry: FieldEntry,
    ) -> Result<FieldDescriptor, SchemaError> {
        let id = FieldId::try_from(self.fields.len())
            .map_err(|_| SchemaError::Invalid("too many fields".into()))?;
        let invalid = |reason: String| SchemaError::Invalid(format!("{class_name}.{}: {reason}", entry.name));

        let mut flags = FieldFlags::empty();
        for keyword in &entry.keywords {
            let flag = FieldFlags::from_keyword(keyword)
                .ok_or_else(|| invalid(format!("unknown keyword {keyword}")))?;
            flags.insert(flag);
        }

        if let Some(names) = &entry.molecular {
            let mut atomics = Vec::with_capacity(names.len());
            let mut default = Vec::new();
            for name in names {
                let atomic = self
                    .position_by_name(class_fields, name)
                    .map(|position| &self.fields[usize::from(class_fields[position])])
                    .filter(|field| field.is_atomic())
                    .ok_or_else(|| invalid(format!("{name} is not an atomic field of the class")))?;
                atomics.push(atomic.id);
                default.extend_from_slice(&atomic.default);
            }
            if entry.keywords.is_empty() {
                if let Some(first) = atomics.first() {
                    flags = self.fields[usize::from(*first)].flags;
                }
            }
            return Ok(FieldDescriptor {
                id,
                name: entry.name,
                flags,
                kind: FieldKind::Molecular(atomics),
                default,
            });
        }

        let params = entry
            .params
            .iter()
            .map(|name| ParamType::parse(name).ok_or_else(|| invalid(format!("unknown type {name}"))))
            .collect::<Result<Vec<_>, _>>()?;

        let mut default = Datagram::new();
        match &entry.default {
            Some(values) => {
                if values.len() != params.len() {
                    return Err(invalid(format!(
                        "{} default values for {} parameters",
                        values.len(),
                        params.len()
                    )));
                }
                for (param, value) in params.iter().zip(values) {
                    param.pack_value(value, &mut default).map_err(invalid)?;
                }
            }
            None => params.iter().for_each(|param| param.pack_zero(&mut default)),
        }

        Ok(FieldDescriptor {
            id,
            name: entry.name,
            flags,
            kind: FieldKind::Atomic(params),
            default: default.into_bytes(),
        })
    }
}

impl CodecProvider for TomlSchema {
    fn class(&self, class_id: ClassId) -> Option<&ClassDescriptor> {
        self.classes.get(usize::from(class_id))
    }

    fn class_by_name(&self, name: &str) -> Option<&ClassDescriptor> {
        let id = self.class_names.get(name)?;
        self.class(*id)
    }

    fn field(&self, field_id: FieldId) -> Option<&FieldDescriptor> {
        self.fields.get(usize::from(field_id))
    }

    fn class_count(&self) -> usize {
        self.classes.len()
    }
}

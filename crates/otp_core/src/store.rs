//! Persistent object storage.
//!
//! Stored objects keep their persisted (`db`) fields by name as packed bytes,
//! so a schema change that renumbers fields does not invalidate the store.

use crate::datagram::Datagram;
use crate::error::StoreError;
use crate::schema::{ClassDescriptor, CodecProvider, FieldDescriptor};
use crate::types::{DoId, FieldId};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// First id handed out by a fresh store.
pub const FIRST_STORED_ID: DoId = 10_000_000;

/// A persisted object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub do_id: DoId,
    pub class_name: String,
    /// Packed values keyed by field name
    pub fields: BTreeMap<String, Vec<u8>>,
}

impl StoredObject {
    pub fn new(do_id: DoId, class_name: impl Into<String>) -> Self {
        Self {
            do_id,
            class_name: class_name.into(),
            fields: BTreeMap::new(),
        }
    }

    fn class<'s>(&self, schema: &'s dyn CodecProvider) -> Result<&'s ClassDescriptor, StoreError> {
        schema
            .class_by_name(&self.class_name)
            .ok_or_else(|| StoreError::Format(format!("unknown class {}", self.class_name)))
    }

    fn atomic_fields<'s>(&self, schema: &'s dyn CodecProvider) -> Result<Vec<&'s FieldDescriptor>, StoreError> {
        Ok(self
            .class(schema)?
            .fields
            .iter()
            .filter_map(|id| schema.field(*id))
            .filter(|field| field.is_atomic())
            .collect())
    }

    /// Fills every unset `db` field with its schema default.
    pub fn apply_defaults(&mut self, schema: &dyn CodecProvider) -> Result<(), StoreError> {
        for field in self.atomic_fields(schema)? {
            if field.is_db() && !self.fields.contains_key(&field.name) {
                self.fields.insert(field.name.clone(), field.default.clone());
            }
        }
        Ok(())
    }

    /// Stores the `db` parts of decoded atomic values; returns true if any changed.
    pub fn store_values(&mut self, schema: &dyn CodecProvider, values: Vec<(FieldId, Vec<u8>)>) -> bool {
        let mut changed = false;
        for (field_id, value) in values {
            if let Some(field) = schema.field(field_id).filter(|field| field.is_db()) {
                self.fields.insert(field.name.clone(), value);
                changed = true;
            }
        }
        changed
    }

    /// Required fields of the class, falling back to defaults.
    pub fn pack_required(&self, schema: &dyn CodecProvider, dg: &mut Datagram) -> Result<(), StoreError> {
        for field in self.atomic_fields(schema)? {
            if field.is_required() {
                match self.fields.get(&field.name) {
                    Some(value) => dg.append_data(value),
                    None => dg.append_data(&field.default),
                }
            }
        }
        Ok(())
    }

    /// Persisted, non-required fields that hold a value, as `u16` count
    /// followed by `(field id, value)` pairs.
    pub fn pack_other(&self, schema: &dyn CodecProvider, dg: &mut Datagram) -> Result<(), StoreError> {
        let mut body = Datagram::new();
        let mut count: u16 = 0;
        for field in self.atomic_fields(schema)? {
            if !field.is_db() || field.is_required() {
                continue;
            }
            if let Some(value) = self.fields.get(&field.name) {
                body.add_u16(field.id);
                body.append_data(value);
                count += 1;
            }
        }
        dg.add_u16(count);
        dg.append_data(body.as_bytes());
        Ok(())
    }
}

/// Load/save-by-id object persistence.
pub trait ObjectStore: Send {
    fn has(&self, do_id: DoId) -> bool;

    fn load(&mut self, do_id: DoId) -> Result<StoredObject, StoreError>;

    fn save(&mut self, object: &StoredObject) -> Result<(), StoreError>;

    /// Allocates a fresh id and persists an empty object of `class_name`.
    fn create(&mut self, class_name: &str) -> Result<DoId, StoreError>;
}

/// Store that lives only as long as the process.
#[derive(Debug)]
pub struct MemoryStore {
    objects: HashMap<DoId, StoredObject>,
    next_id: DoId,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: HashMap::new(),
            next_id: FIRST_STORED_ID,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for MemoryStore {
    fn has(&self, do_id: DoId) -> bool {
        self.objects.contains_key(&do_id)
    }

    fn load(&mut self, do_id: DoId) -> Result<StoredObject, StoreError> {
        self.objects.get(&do_id).cloned().ok_or(StoreError::NotFound(do_id))
    }

    fn save(&mut self, object: &StoredObject) -> Result<(), StoreError> {
        self.objects.insert(object.do_id, object.clone());
        Ok(())
    }

    fn create(&mut self, class_name: &str) -> Result<DoId, StoreError> {
        let do_id = self.next_id;
        self.next_id += 1;
        self.objects.insert(do_id, StoredObject::new(do_id, class_name));
        Ok(do_id)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    do_id: DoId,
    class_name: String,
    /// base64 of the packed value
    fields: BTreeMap<String, String>,
}

/// One `{doId}.json` file per object under a directory.
#[derive(Debug)]
pub struct FileStore {
    directory: PathBuf,
    cache: HashMap<DoId, StoredObject>,
    next_id: DoId,
}

impl FileStore {
    /// Opens (creating if needed) a store directory.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;

        let mut highest: Option<DoId> = None;
        for entry in std::fs::read_dir(&directory)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<DoId>().ok())
            {
                highest = Some(highest.map_or(id, |h| h.max(id)));
            }
        }
        let next_id = highest.map_or(FIRST_STORED_ID, |h| h + 1);
        info!("🗄️ Opened object store at {} (next id {})", directory.display(), next_id);

        Ok(Self {
            directory,
            cache: HashMap::new(),
            next_id,
        })
    }

    fn path_for(&self, do_id: DoId) -> PathBuf {
        self.directory.join(format!("{do_id}.json"))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn read(&self, do_id: DoId) -> Result<StoredObject, StoreError> {
        let text = std::fs::read_to_string(self.path_for(do_id))?;
        let record: StoredRecord = serde_json::from_str(&text)?;
        if record.do_id != do_id {
            return Err(StoreError::Format(format!(
                "file for {do_id} holds object {}",
                record.do_id
            )));
        }
        let fields: BTreeMap<String, Vec<u8>> = record
            .fields
            .into_iter()
            .map(|(name, value)| {
                BASE64
                    .decode(value)
                    .map(|bytes| (name, bytes))
                    .map_err(|e| StoreError::Format(e.to_string()))
            })
            .collect::<Result<_, StoreError>>()?;
        Ok(StoredObject {
            do_id,
            class_name: record.class_name,
            fields,
        })
    }
}

impl ObjectStore for FileStore {
    fn has(&self, do_id: DoId) -> bool {
        self.cache.contains_key(&do_id) || self.path_for(do_id).is_file()
    }

    fn load(&mut self, do_id: DoId) -> Result<StoredObject, StoreError> {
        if let Some(object) = self.cache.get(&do_id) {
            return Ok(object.clone());
        }
        if !self.path_for(do_id).is_file() {
            return Err(StoreError::NotFound(do_id));
        }
        let object = self.read(do_id)?;
        debug!("📂 Loaded stored object {} ({})", do_id, object.class_name);
        self.cache.insert(do_id, object.clone());
        Ok(object)
    }

    fn save(&mut self, object: &StoredObject) -> Result<(), StoreError> {
        let record = StoredRecord {
            do_id: object.do_id,
            class_name: object.class_name.clone(),
            fields: object
                .fields
                .iter()
                .map(|(name, value)| (name.clone(), BASE64.encode(value)))
                .collect(),
        };
        std::fs::write(self.path_for(object.do_id), serde_json::to_string_pretty(&record)?)?;
        self.cache.insert(object.do_id, object.clone());
        Ok(())
    }

    fn create(&mut self, class_name: &str) -> Result<DoId, StoreError> {
        let do_id = self.next_id;
        self.next_id += 1;
        self.save(&StoredObject::new(do_id, class_name))?;
        Ok(do_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datagram::DatagramIterator;
    use crate::schema::TomlSchema;

    const SCHEMA: &str = r#"
        [[class]]
        name = "DistributedToon"

        [[class.field]]
        name = "setName"
        keywords = ["required", "broadcast", "db"]
        params = ["string"]
        default = ["Toon"]

        [[class.field]]
        name = "setMoney"
        keywords = ["db", "ownrecv"]
        params = ["uint16"]
        default = [40]

        [[class.field]]
        name = "setChat"
        keywords = ["broadcast"]
        params = ["string"]
    "#;

    #[test]
    fn memory_store_allocates_from_first_id() {
        let mut store = MemoryStore::new();
        let first = store.create("DistributedToon").unwrap();
        let second = store.create("DistributedToon").unwrap();
        assert_eq!(first, FIRST_STORED_ID);
        assert_eq!(second, FIRST_STORED_ID + 1);
        assert!(store.has(first));
        assert!(matches!(store.load(5), Err(StoreError::NotFound(5))));
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let mut store = FileStore::open(dir.path()).unwrap();
            let id = store.create("DistributedToon").unwrap();
            let mut object = store.load(id).unwrap();
            object.fields.insert("setName".into(), vec![3, 0, b'B', b'o', b'b']);
            store.save(&object).unwrap();
            id
        };

        let mut reopened = FileStore::open(dir.path()).unwrap();
        assert!(reopened.has(id));
        let object = reopened.load(id).unwrap();
        assert_eq!(object.class_name, "DistributedToon");
        assert_eq!(object.fields["setName"], vec![3, 0, b'B', b'o', b'b']);
        assert_eq!(reopened.create("DistributedToon").unwrap(), id + 1);
    }

    #[test]
    fn defaults_and_packing() {
        let schema = TomlSchema::parse(SCHEMA).unwrap();
        let mut object = StoredObject::new(FIRST_STORED_ID, "DistributedToon");
        object.apply_defaults(&schema).unwrap();
        assert_eq!(object.fields.len(), 2);

        let mut required = Datagram::new();
        object.pack_required(&schema, &mut required).unwrap();
        assert_eq!(DatagramIterator::new(required.as_bytes()).get_string().unwrap(), "Toon");

        let mut other = Datagram::new();
        object.pack_other(&schema, &mut other).unwrap();
        let mut di = DatagramIterator::new(other.as_bytes());
        assert_eq!(di.get_u16().unwrap(), 1);
        assert_eq!(di.get_u16().unwrap(), 1);
        assert_eq!(di.get_u16().unwrap(), 40);
        assert!(di.expect_end(0).is_ok());
    }

    #[test]
    fn only_db_values_are_stored() {
        let schema = TomlSchema::parse(SCHEMA).unwrap();
        let mut object = StoredObject::new(FIRST_STORED_ID, "DistributedToon");
        assert!(!object.store_values(&schema, vec![(2, vec![0, 0])]));
        assert!(object.store_values(&schema, vec![(1, vec![9, 0])]));
        assert_eq!(object.fields["setMoney"], vec![9, 0]);
    }
}

//! # OTP Core
//!
//! Shared building blocks of the replication server: identifiers and reserved
//! channels, the little-endian datagram codec, message codes and typed
//! messages, the schema (codec provider) interface, distributed objects, zone
//! geometry and persistent object storage.
//!
//! ## Layout
//!
//! - [`types`] - channel / object identifiers and [`Location`]
//! - [`datagram`] - [`Datagram`] writer and [`DatagramIterator`] reader
//! - [`msgtypes`] - numeric message codes grouped by consumer
//! - [`messages`] - one closed enum of requests per consuming component
//! - [`schema`] - [`CodecProvider`] and the TOML-described [`TomlSchema`]
//! - [`object`] - [`DistributedObject`] with required/other packing
//! - [`zones`] - zone canonicalisation and [`ZoneGeometry`]
//! - [`store`] - [`ObjectStore`] with in-memory and file-backed stores
//! - [`shutdown`] - [`ShutdownState`] shared by the runtime tasks
//!
//! Nothing in this crate performs I/O on sockets; the runtime lives in
//! `otp_server`.

pub mod datagram;
pub mod error;
pub mod messages;
pub mod msgtypes;
pub mod object;
pub mod schema;
pub mod shutdown;
pub mod store;
pub mod types;
pub mod zones;

pub use datagram::{Datagram, DatagramIterator};
pub use error::{ProtocolError, SchemaError, StoreError};
pub use messages::{ClientMessage, ControlMessage, DatabaseMessage, DirectorDatagram, Envelope, StateServerMessage};
pub use object::DistributedObject;
pub use schema::{ClassDescriptor, CodecProvider, FieldDescriptor, FieldFlags, FieldKind, ParamType, TomlSchema};
pub use shutdown::ShutdownState;
pub use store::{FileStore, MemoryStore, ObjectStore, StoredObject};
pub use types::*;
pub use zones::{VisGroups, ZoneGeometry};

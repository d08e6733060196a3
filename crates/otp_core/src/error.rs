//! Error types shared by the codec, schema and store layers.

use crate::types::{Channel, ClassId, DoId, FieldId};

/// Failures while decoding or validating a protocol message.
///
/// None of these are fatal for the connection that sent the message; the
/// caller aborts processing of the message and logs the error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The datagram ended before a value could be read
    #[error("datagram truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// A handler finished with undecoded bytes left over
    #[error("message {code} left {remaining} undecoded bytes")]
    TrailingBytes { code: u16, remaining: usize },

    /// A message code that the receiving component does not handle
    #[error("unknown message code {code} on {target}")]
    UnknownCode { code: u16, target: &'static str },

    /// A class number unknown to the schema
    #[error("unknown class {0}")]
    UnknownClass(ClassId),

    /// A field number that the class does not declare
    #[error("class {class_id} has no field {field_id}")]
    UnknownField { class_id: ClassId, field_id: FieldId },

    /// The object id inside a message does not match its destination channel
    #[error("object {do_id} does not match channel {channel}")]
    ChannelMismatch { do_id: DoId, channel: Channel },

    /// A message addressed to an object that does not exist
    #[error("unknown object {0}")]
    UnknownObject(DoId),

    /// A frame body larger than the 16-bit length prefix allows
    #[error("frame of {0} bytes exceeds the 65535 byte limit")]
    FrameTooLarge(usize),

    /// More destination channels than the envelope can carry
    #[error("{0} channels exceed the 255 channel envelope limit")]
    TooManyChannels(usize),
}

/// Failures while loading or building a schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read schema: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse schema: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid schema: {0}")]
    Invalid(String),
}

/// Failures reported by a persistent object store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object {0} is not stored")]
    NotFound(DoId),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed stored object: {0}")]
    Format(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Format(e.to_string())
    }
}

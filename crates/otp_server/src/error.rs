//! Error types and handling for the replication server.
//!
//! Two layers exist: [`ServerError`] for anything the runtime reports to its
//! caller, and [`AgentError`] for violations committed by a single game
//! client, which cost that client its connection and nothing else.

use otp_core::{DoId, FieldId, ProtocolError, SchemaError, StoreError};

/// Enumeration of possible server errors.
///
/// Network and internal failures come from the runtime itself; the wrapped
/// variants come from the codec, schema and store layers.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related errors such as binding failures or connection issues
    #[error("Network error: {0}")]
    Network(String),

    /// Internal server errors such as a closed event loop
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Something a game client did that it is not allowed to do.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The client named an object the State Server does not hold
    #[error("object {0} does not exist")]
    NoSuchObject(DoId),

    /// The field may not be sent by this client
    #[error("field {field_id} of object {do_id} is not client-sendable")]
    FieldNotSendable { do_id: DoId, field_id: FieldId },

    /// Only the client's own avatar may be moved
    #[error("client may not relocate object {0}")]
    NotOwner(DoId),

    #[error("an avatar is already chosen")]
    AvatarAlreadyChosen,

    #[error("no avatar is chosen")]
    NoAvatar,

    #[error("avatar {0} is not stored")]
    UnknownAvatar(DoId),

    #[error("no interest with handle {0}")]
    UnknownInterest(u16),
}

impl AgentError {
    /// Whether the client should be disconnected for this error.
    ///
    /// Unknown message codes are only logged.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AgentError::Protocol(ProtocolError::UnknownCode { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_do_not_disconnect() {
        let soft = AgentError::from(ProtocolError::UnknownCode {
            code: 9,
            target: "client agent",
        });
        assert!(!soft.is_fatal());
        assert!(AgentError::NoAvatar.is_fatal());
        assert!(AgentError::from(ProtocolError::Truncated { needed: 4, remaining: 1 }).is_fatal());
    }
}

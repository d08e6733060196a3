//! # Core Type Definitions
//!
//! Identifier aliases and the handful of reserved channel numbers shared by
//! every component of the server.
//!
//! ## Channel space
//!
//! Channels are plain 64-bit numbers. Only a few values carry meaning:
//!
//! - [`CONTROL_CHANNEL`] - connection control sub-protocol on the Director
//! - [`STATE_SERVER_CHANNEL`] - the State Server's root channel
//! - [`DATABASE_CHANNEL`] - the persistent-store adapter
//! - [`puppet_channel`] - per-avatar ownership channel (`doId + 2^32`)
//!
//! An object's own id doubles as its channel.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pub/sub address on the Director.
pub type Channel = u64;

/// Distributed object identifier.
pub type DoId = u32;

/// Zone identifier under a parent object.
pub type ZoneId = u32;

/// Class number assigned by the schema.
pub type ClassId = u16;

/// Field number assigned by the schema.
pub type FieldId = u16;

/// Reserved channel for connection control messages.
pub const CONTROL_CHANNEL: Channel = 0;

/// Root channel of the State Server.
pub const STATE_SERVER_CHANNEL: Channel = 20_100_000;

/// Channel served by the persistent-store adapter.
pub const DATABASE_CHANNEL: Channel = 4003;

/// Offset added to an avatar id to obtain its puppet channel.
pub const PUPPET_CHANNEL_OFFSET: Channel = 1 << 32;

/// Channel used as sender for chat relayed on behalf of a client.
pub const CHAT_MANAGER_CHANNEL: Channel = 4681;

/// Channel of the logger object seeded by the State Server.
pub const CENTRAL_LOGGER_CHANNEL: Channel = 4688;

/// Reserved "quiet" zone: never matches an interest, never delivered to.
pub const QUIET_ZONE: ZoneId = 1;

/// Returns the puppet (ownership) channel for an avatar.
pub fn puppet_channel(do_id: DoId) -> Channel {
    Channel::from(do_id) + PUPPET_CHANNEL_OFFSET
}

/// Converts a channel to an object id when it lies in the object id space.
pub fn channel_to_do_id(channel: Channel) -> Option<DoId> {
    DoId::try_from(channel).ok()
}

/// Hierarchical position of an object: a zone under a parent object.
///
/// A location also works as a pub/sub topic ("everyone watching `zone_id`
/// under `parent_id`"). The location `(0, 0)` marks a placeholder object
/// that was pre-allocated before its first generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Location {
    /// Parent object id
    pub parent_id: DoId,
    /// Zone under the parent
    pub zone_id: ZoneId,
}

impl Location {
    /// Location carried by pre-allocated placeholder objects.
    pub const PLACEHOLDER: Location = Location {
        parent_id: 0,
        zone_id: 0,
    };

    /// Creates a location.
    pub fn new(parent_id: DoId, zone_id: ZoneId) -> Self {
        Self { parent_id, zone_id }
    }

    /// Returns true for the `(0, 0)` placeholder location.
    pub fn is_placeholder(&self) -> bool {
        *self == Self::PLACEHOLDER
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.parent_id, self.zone_id)
    }
}

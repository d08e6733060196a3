use super::interest::InterestSet;
use crate::connection::ConnectionId;
use otp_core::{Channel, DoId, Location};

/// Per-client state kept by the Agent.
#[derive(Debug)]
pub struct AgentSession {
    pub connection_id: ConnectionId,
    /// The avatar this client plays, once chosen
    pub avatar_id: Option<DoId>,
    pub interests: InterestSet,
}

impl AgentSession {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            avatar_id: None,
            interests: InterestSet::new(),
        }
    }

    pub fn owns(&self, do_id: DoId) -> bool {
        self.avatar_id == Some(do_id)
    }

    /// Whether a message from `sender` originated with this client's avatar.
    pub fn is_sender(&self, sender: Channel) -> bool {
        self.avatar_id.is_some_and(|avatar| Channel::from(avatar) == sender)
    }

    pub fn has_interest(&self, location: Location) -> bool {
        self.interests.has_interest(location)
    }
}

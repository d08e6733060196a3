use crate::datagram::{Datagram, DatagramIterator};
use crate::error::ProtocolError;
use crate::msgtypes::client;
use crate::types::{DoId, FieldId, Location, ZoneId};

/// Requests a game client may send to its Agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Heartbeat,
    /// Choose an avatar; `0` releases the current one
    SetAvatar { av_id: DoId },
    ObjectUpdateField {
        do_id: DoId,
        field_id: FieldId,
        value: Vec<u8>,
    },
    ObjectLocation { do_id: DoId, location: Location },
    AddInterest {
        handle: u16,
        context: u32,
        parent_id: DoId,
        zones: Vec<ZoneId>,
    },
    RemoveInterest { handle: u16, context: u32 },
}

impl ClientMessage {
    /// Decodes a client datagram: `u16 code` followed by the payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut di = DatagramIterator::new(bytes);
        let code = di.get_u16()?;
        let message = match code {
            client::HEARTBEAT => ClientMessage::Heartbeat,
            client::SET_AVATAR => ClientMessage::SetAvatar { av_id: di.get_u32()? },
            client::OBJECT_UPDATE_FIELD => ClientMessage::ObjectUpdateField {
                do_id: di.get_u32()?,
                field_id: di.get_u16()?,
                value: di.get_remaining_bytes().to_vec(),
            },
            client::OBJECT_LOCATION => {
                let do_id = di.get_u32()?;
                let parent_id = di.get_u32()?;
                let zone_id = di.get_u32()?;
                ClientMessage::ObjectLocation {
                    do_id,
                    location: Location::new(parent_id, zone_id),
                }
            }
            client::ADD_INTEREST => {
                let handle = di.get_u16()?;
                let context = di.get_u32()?;
                let parent_id = di.get_u32()?;
                let mut zones = Vec::with_capacity(di.remaining_size() / 4);
                while di.remaining_size() > 0 {
                    zones.push(di.get_u32()?);
                }
                ClientMessage::AddInterest {
                    handle,
                    context,
                    parent_id,
                    zones,
                }
            }
            client::REMOVE_INTEREST => {
                let handle = di.get_u16()?;
                // Older clients omit the context.
                let context = if di.remaining_size() >= 4 { di.get_u32()? } else { 0 };
                ClientMessage::RemoveInterest { handle, context }
            }
            code => {
                return Err(ProtocolError::UnknownCode {
                    code,
                    target: "client agent",
                })
            }
        };
        di.expect_end(code)?;
        Ok(message)
    }

    pub fn code(&self) -> u16 {
        match self {
            ClientMessage::Heartbeat => client::HEARTBEAT,
            ClientMessage::SetAvatar { .. } => client::SET_AVATAR,
            ClientMessage::ObjectUpdateField { .. } => client::OBJECT_UPDATE_FIELD,
            ClientMessage::ObjectLocation { .. } => client::OBJECT_LOCATION,
            ClientMessage::AddInterest { .. } => client::ADD_INTEREST,
            ClientMessage::RemoveInterest { .. } => client::REMOVE_INTEREST,
        }
    }

    /// Encodes the message including its code.
    pub fn to_datagram(&self) -> Datagram {
        let mut dg = Datagram::new();
        dg.add_u16(self.code());
        match self {
            ClientMessage::Heartbeat => {}
            ClientMessage::SetAvatar { av_id } => dg.add_u32(*av_id),
            ClientMessage::ObjectUpdateField { do_id, field_id, value } => {
                dg.add_u32(*do_id);
                dg.add_u16(*field_id);
                dg.append_data(value);
            }
            ClientMessage::ObjectLocation { do_id, location } => {
                dg.add_u32(*do_id);
                dg.add_u32(location.parent_id);
                dg.add_u32(location.zone_id);
            }
            ClientMessage::AddInterest {
                handle,
                context,
                parent_id,
                zones,
            } => {
                dg.add_u16(*handle);
                dg.add_u32(*context);
                dg.add_u32(*parent_id);
                for zone in zones {
                    dg.add_u32(*zone);
                }
            }
            ClientMessage::RemoveInterest { handle, context } => {
                dg.add_u16(*handle);
                dg.add_u32(*context);
            }
        }
        dg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_interest_reads_zones_to_the_end() {
        let message = ClientMessage::AddInterest {
            handle: 3,
            context: 11,
            parent_id: 100,
            zones: vec![200, 201, 1],
        };
        let bytes = message.to_datagram().into_bytes();
        assert_eq!(ClientMessage::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn add_interest_with_partial_zone_is_truncated() {
        let mut dg = ClientMessage::AddInterest {
            handle: 3,
            context: 11,
            parent_id: 100,
            zones: vec![200],
        }
        .to_datagram();
        dg.add_u16(7);
        assert!(matches!(ClientMessage::decode(dg.as_bytes()), Err(ProtocolError::Truncated { .. })));
    }

    #[test]
    fn remove_interest_context_is_optional() {
        let mut dg = Datagram::new();
        dg.add_u16(client::REMOVE_INTEREST);
        dg.add_u16(5);
        assert_eq!(
            ClientMessage::decode(dg.as_bytes()).unwrap(),
            ClientMessage::RemoveInterest { handle: 5, context: 0 }
        );
    }

    #[test]
    fn unknown_code() {
        let mut dg = Datagram::new();
        dg.add_u16(1);
        assert!(matches!(
            ClientMessage::decode(dg.as_bytes()),
            Err(ProtocolError::UnknownCode { code: 1, .. })
        ));
    }
}

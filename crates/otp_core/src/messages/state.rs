use crate::datagram::{Datagram, DatagramIterator};
use crate::error::ProtocolError;
use crate::msgtypes::stateserver;
use crate::types::{Channel, ClassId, DoId, FieldId, Location};

/// Requests handled by the State Server.
///
/// Field data stays packed: it can only be split with the schema, which the
/// State Server applies once it has resolved the target object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateServerMessage {
    Generate {
        location: Location,
        class_id: ClassId,
        do_id: DoId,
        /// Whether an "other" field list follows the required fields
        with_other: bool,
        fields: Vec<u8>,
    },
    UpdateField {
        do_id: DoId,
        field_id: FieldId,
        value: Vec<u8>,
    },
    DeleteRam {
        do_id: DoId,
    },
    SetZone {
        location: Location,
    },
    QueryObjectAll {
        context: u32,
    },
    ShardRest {
        owner: Channel,
    },
}

impl StateServerMessage {
    /// Decodes a request; fixed-size requests must consume the payload exactly.
    pub fn decode(code: u16, di: &mut DatagramIterator<'_>) -> Result<Self, ProtocolError> {
        let message = match code {
            stateserver::OBJECT_GENERATE_WITH_REQUIRED | stateserver::OBJECT_GENERATE_WITH_REQUIRED_OTHER => {
                let parent_id = di.get_u32()?;
                let zone_id = di.get_u32()?;
                let class_id = di.get_u16()?;
                let do_id = di.get_u32()?;
                StateServerMessage::Generate {
                    location: Location::new(parent_id, zone_id),
                    class_id,
                    do_id,
                    with_other: code == stateserver::OBJECT_GENERATE_WITH_REQUIRED_OTHER,
                    fields: di.get_remaining_bytes().to_vec(),
                }
            }
            stateserver::OBJECT_UPDATE_FIELD => StateServerMessage::UpdateField {
                do_id: di.get_u32()?,
                field_id: di.get_u16()?,
                value: di.get_remaining_bytes().to_vec(),
            },
            stateserver::OBJECT_DELETE_RAM => StateServerMessage::DeleteRam { do_id: di.get_u32()? },
            stateserver::OBJECT_SET_ZONE => {
                let parent_id = di.get_u32()?;
                let zone_id = di.get_u32()?;
                StateServerMessage::SetZone {
                    location: Location::new(parent_id, zone_id),
                }
            }
            stateserver::QUERY_OBJECT_ALL => StateServerMessage::QueryObjectAll { context: di.get_u32()? },
            stateserver::SHARD_REST => StateServerMessage::ShardRest { owner: di.get_u64()? },
            code => {
                return Err(ProtocolError::UnknownCode {
                    code,
                    target: "state server",
                })
            }
        };
        di.expect_end(code)?;
        Ok(message)
    }

    pub fn code(&self) -> u16 {
        match self {
            StateServerMessage::Generate { with_other: true, .. } => stateserver::OBJECT_GENERATE_WITH_REQUIRED_OTHER,
            StateServerMessage::Generate { with_other: false, .. } => stateserver::OBJECT_GENERATE_WITH_REQUIRED,
            StateServerMessage::UpdateField { .. } => stateserver::OBJECT_UPDATE_FIELD,
            StateServerMessage::DeleteRam { .. } => stateserver::OBJECT_DELETE_RAM,
            StateServerMessage::SetZone { .. } => stateserver::OBJECT_SET_ZONE,
            StateServerMessage::QueryObjectAll { .. } => stateserver::QUERY_OBJECT_ALL,
            StateServerMessage::ShardRest { .. } => stateserver::SHARD_REST,
        }
    }

    pub fn payload(&self) -> Datagram {
        let mut dg = Datagram::new();
        match self {
            StateServerMessage::Generate {
                location,
                class_id,
                do_id,
                fields,
                ..
            } => {
                dg.add_u32(location.parent_id);
                dg.add_u32(location.zone_id);
                dg.add_u16(*class_id);
                dg.add_u32(*do_id);
                dg.append_data(fields);
            }
            StateServerMessage::UpdateField { do_id, field_id, value } => {
                dg.add_u32(*do_id);
                dg.add_u16(*field_id);
                dg.append_data(value);
            }
            StateServerMessage::DeleteRam { do_id } => dg.add_u32(*do_id),
            StateServerMessage::SetZone { location } => {
                dg.add_u32(location.parent_id);
                dg.add_u32(location.zone_id);
            }
            StateServerMessage::QueryObjectAll { context } => dg.add_u32(*context),
            StateServerMessage::ShardRest { owner } => dg.add_u64(*owner),
        }
        dg
    }
}

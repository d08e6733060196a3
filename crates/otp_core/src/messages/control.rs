use crate::datagram::{Datagram, DatagramIterator};
use crate::error::ProtocolError;
use crate::msgtypes::control;
use crate::types::{Channel, CONTROL_CHANNEL};

/// Connection control requests sent to the Director on channel 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    SetChannel(Channel),
    RemoveChannel(Channel),
    /// Datagram replayed as if received from this connection when it drops
    AddPostRemove(Vec<u8>),
    SetConnectionName(String),
    SetConnectionUrl(String),
}

impl ControlMessage {
    pub fn decode(code: u16, di: &mut DatagramIterator<'_>) -> Result<Self, ProtocolError> {
        let message = match code {
            control::SET_CHANNEL => ControlMessage::SetChannel(di.get_u64()?),
            control::REMOVE_CHANNEL => ControlMessage::RemoveChannel(di.get_u64()?),
            control::ADD_POST_REMOVE => ControlMessage::AddPostRemove(di.get_blob()?.to_vec()),
            control::SET_CON_NAME => ControlMessage::SetConnectionName(di.get_string()?),
            control::SET_CON_URL => ControlMessage::SetConnectionUrl(di.get_string()?),
            code => {
                return Err(ProtocolError::UnknownCode {
                    code,
                    target: "director control",
                })
            }
        };
        Ok(message)
    }

    pub fn code(&self) -> u16 {
        match self {
            ControlMessage::SetChannel(_) => control::SET_CHANNEL,
            ControlMessage::RemoveChannel(_) => control::REMOVE_CHANNEL,
            ControlMessage::AddPostRemove(_) => control::ADD_POST_REMOVE,
            ControlMessage::SetConnectionName(_) => control::SET_CON_NAME,
            ControlMessage::SetConnectionUrl(_) => control::SET_CON_URL,
        }
    }

    /// Full Director datagram: one channel (0), the code, then the payload.
    pub fn to_datagram(&self) -> Datagram {
        let mut dg = Datagram::new();
        dg.add_u8(1);
        dg.add_u64(CONTROL_CHANNEL);
        dg.add_u16(self.code());
        match self {
            ControlMessage::SetChannel(channel) | ControlMessage::RemoveChannel(channel) => dg.add_u64(*channel),
            ControlMessage::AddPostRemove(datagram) => dg.add_blob(datagram),
            ControlMessage::SetConnectionName(value) | ControlMessage::SetConnectionUrl(value) => {
                dg.add_string(value)
            }
        }
        dg
    }
}

use super::control::ControlMessage;
use crate::datagram::{Datagram, DatagramIterator};
use crate::error::ProtocolError;
use crate::types::{Channel, CONTROL_CHANNEL};

/// A routed Director message.
///
/// Wire layout: `u8 count`, `count × u64 channel`, `u64 sender`, `u16 code`,
/// payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub channels: Vec<Channel>,
    pub sender: Channel,
    pub code: u16,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(channels: Vec<Channel>, sender: Channel, code: u16, payload: Vec<u8>) -> Self {
        Self {
            channels,
            sender,
            code,
            payload,
        }
    }

    pub fn encode(&self) -> Result<Datagram, ProtocolError> {
        let count = u8::try_from(self.channels.len())
            .map_err(|_| ProtocolError::TooManyChannels(self.channels.len()))?;
        let mut dg = Datagram::new();
        dg.add_u8(count);
        for channel in &self.channels {
            dg.add_u64(*channel);
        }
        dg.add_u64(self.sender);
        dg.add_u16(self.code);
        dg.append_data(&self.payload);
        Ok(dg)
    }
}

/// Anything a Director participant may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectorDatagram {
    Control(ControlMessage),
    Routed(Envelope),
}

impl DirectorDatagram {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut di = DatagramIterator::new(bytes);
        let count = di.get_u8()?;
        let mut channels = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            channels.push(di.get_u64()?);
        }

        if channels == [CONTROL_CHANNEL] {
            let code = di.get_u16()?;
            let message = ControlMessage::decode(code, &mut di)?;
            di.expect_end(code)?;
            return Ok(DirectorDatagram::Control(message));
        }

        let sender = di.get_u64()?;
        let code = di.get_u16()?;
        let payload = di.get_remaining_bytes().to_vec();
        Ok(DirectorDatagram::Routed(Envelope {
            channels,
            sender,
            code,
            payload,
        }))
    }
}

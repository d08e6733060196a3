//! `u16` little-endian length-prefixed framing.

use otp_core::ProtocolError;

/// Largest frame body the length prefix can describe.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Prefixes `body` with its length.
pub fn encode_frame(body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let length = u16::try_from(body.len()).map_err(|_| ProtocolError::FrameTooLarge(body.len()))?;
    let mut frame = Vec::with_capacity(body.len() + 2);
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(body);
    Ok(frame)
}

/// Reassembles frames from a byte stream.
///
/// Partial frames stay buffered until the rest of their bytes arrive, so one
/// read may yield zero, one or several complete datagrams.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Removes and returns the next complete frame body.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        if self.buffer.len() < 2 {
            return None;
        }
        let length = usize::from(u16::from_le_bytes([self.buffer[0], self.buffer[1]]));
        if self.buffer.len() < length + 2 {
            return None;
        }
        let body = self.buffer[2..length + 2].to_vec();
        self.buffer.drain(..length + 2);
        Some(body)
    }

    /// Bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

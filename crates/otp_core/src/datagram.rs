//! Little-endian datagram writer and reader.
//!
//! Every message on the wire, Director envelope or client protocol, is built
//! with [`Datagram`] and decoded with [`DatagramIterator`]. Strings and blobs
//! carry a `u16` length prefix.

use crate::error::ProtocolError;
use tracing::warn;

/// Growable little-endian message buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Datagram {
    data: Vec<u8>,
}

impl Datagram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn add_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_u64(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_i8(&mut self, value: i8) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_i16(&mut self, value: i16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_i64(&mut self, value: i64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_f64(&mut self, value: f64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a length-prefixed blob.
    ///
    /// Blobs longer than `u16::MAX` cannot be represented and are cut to
    /// that length.
    pub fn add_blob(&mut self, value: &[u8]) {
        let value = match u16::try_from(value.len()) {
            Ok(_) => value,
            Err(_) => {
                warn!("✂️ Truncating {} byte blob to fit a u16 length", value.len());
                &value[..usize::from(u16::MAX)]
            }
        };
        self.add_u16(value.len() as u16);
        self.data.extend_from_slice(value);
    }

    /// Appends a length-prefixed string.
    pub fn add_string(&mut self, value: &str) {
        self.add_blob(value.as_bytes());
    }

    /// Appends raw bytes without a length prefix.
    pub fn append_data(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for Datagram {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// Cursor over a received datagram.
#[derive(Debug, Clone)]
pub struct DatagramIterator<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> DatagramIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, index: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining_size(&self) -> usize {
        self.data.len() - self.index
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.index
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], ProtocolError> {
        let remaining = self.remaining_size();
        if needed > remaining {
            return Err(ProtocolError::Truncated { needed, remaining });
        }
        let bytes = &self.data[self.index..self.index + needed];
        self.index += needed;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(u8::from_le_bytes(self.take_array()?))
    }

    pub fn get_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    pub fn get_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn get_u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn get_i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(i16::from_le_bytes(self.take_array()?))
    }

    pub fn get_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn get_f64(&mut self) -> Result<f64, ProtocolError> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    /// Reads `count` raw bytes.
    pub fn get_bytes(&mut self, count: usize) -> Result<&'a [u8], ProtocolError> {
        self.take(count)
    }

    /// Reads a length-prefixed blob.
    pub fn get_blob(&mut self) -> Result<&'a [u8], ProtocolError> {
        let length = self.get_u16()?;
        self.take(usize::from(length))
    }

    /// Reads a length-prefixed string; invalid UTF-8 is replaced.
    pub fn get_string(&mut self) -> Result<String, ProtocolError> {
        Ok(String::from_utf8_lossy(self.get_blob()?).into_owned())
    }

    /// Consumes and returns everything left.
    pub fn get_remaining_bytes(&mut self) -> &'a [u8] {
        let bytes = &self.data[self.index..];
        self.index = self.data.len();
        bytes
    }

    /// Fails with [`ProtocolError::TrailingBytes`] when bytes are left over.
    pub fn expect_end(&self, code: u16) -> Result<(), ProtocolError> {
        match self.remaining_size() {
            0 => Ok(()),
            remaining => Err(ProtocolError::TrailingBytes { code, remaining }),
        }
    }
}

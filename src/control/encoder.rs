//! Length-encoded record writer.
//!
//! Layout of one record:
//! - field count as a 4 byte big-endian integer
//! - for each field, its UTF-8 byte length as a 4 byte big-endian integer
//!   followed by the bytes themselves

use crate::error::{BridgeError, BridgeResult};

/// Accumulates length-encoded records in memory.
///
/// Encoding never touches the channel, so a record is either written whole
/// by the caller or not at all.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    buf: Vec<u8>,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn num_fields(&mut self, count: u32) -> &mut Self {
        self.buf.extend_from_slice(&count.to_be_bytes());
        self
    }

    /// Appends one field. Fails, leaving the buffer untouched, when the field
    /// does not fit the 32-bit length prefix.
    pub fn field(&mut self, value: &str) -> BridgeResult<&mut Self> {
        let bytes = value.as_bytes();
        let len = length_prefix(bytes.len(), "field length")?;
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(bytes);
        Ok(self)
    }

    /// Encodes a complete record from `fields`. On failure the buffer is
    /// restored to its state before the call.
    pub fn record<S: AsRef<str>>(&mut self, fields: &[S]) -> BridgeResult<&mut Self> {
        let count = length_prefix(fields.len(), "field count")?;
        let start = self.buf.len();
        self.num_fields(count);
        let encoded = fields
            .iter()
            .try_for_each(|field| self.field(field.as_ref()).map(|_| ()));
        if let Err(e) = encoded {
            self.buf.truncate(start);
            return Err(e);
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Converts a length to its 32-bit prefix, rejecting anything that would not
/// match the bytes that follow.
fn length_prefix(len: usize, what: &str) -> BridgeResult<u32> {
    u32::try_from(len).map_err(|_| {
        BridgeError::invalid_argument(format!(
            "{} {} exceeds the {} byte frame limit",
            what,
            len,
            u32::MAX
        ))
    })
}

//! Control messages multiplexed onto the data channel.

use super::FrameEncoder;
use crate::error::{BridgeError, BridgeResult};

/// Name of the control column. The engine identifies the control field by
/// this name in the header record.
pub const CONTROL_MESSAGE_FIELD_NAME: &str = ".";

/// Control field value marking the end of the data stream.
pub const END_OF_DATA_MESSAGE_CODE: &str = "$";

/// Size of the padding message that pushes preceding messages through the
/// engine's input buffer.
pub const FLUSH_SPACES_LENGTH: usize = 8192;

/// Encodes control messages sized to the channel's record width.
#[derive(Debug, Clone, Copy)]
pub struct ControlMessageEncoder {
    num_fields: u32,
}

impl ControlMessageEncoder {
    /// `num_fields` is the record width including the control column.
    pub fn new(num_fields: u32) -> BridgeResult<Self> {
        if num_fields == 0 {
            return Err(BridgeError::invalid_argument(
                "record width must include the control field",
            ));
        }
        Ok(Self { num_fields })
    }

    pub fn num_fields(&self) -> u32 {
        self.num_fields
    }

    /// Encodes one control record: blank values for every field except the
    /// control field, which comes last.
    pub fn message(&self, encoder: &mut FrameEncoder, code: &str) -> BridgeResult<()> {
        encoder.num_fields(self.num_fields);
        for _ in 1..self.num_fields {
            encoder.field("")?;
        }
        encoder.field(code)?;
        Ok(())
    }

    pub fn fill_command_buffer(&self, encoder: &mut FrameEncoder) -> BridgeResult<()> {
        self.message(encoder, &" ".repeat(FLUSH_SPACES_LENGTH))
    }

    /// The end-of-data sentinel followed by the buffer fill.
    ///
    /// Returned as one buffer so it can be written and flushed as a unit.
    pub fn end_of_data(&self) -> BridgeResult<Vec<u8>> {
        let mut encoder = FrameEncoder::with_capacity(
            2 * (4 + 4 * self.num_fields as usize) + END_OF_DATA_MESSAGE_CODE.len()
                + FLUSH_SPACES_LENGTH,
        );
        self.message(&mut encoder, END_OF_DATA_MESSAGE_CODE)?;
        self.fill_command_buffer(&mut encoder)?;
        Ok(encoder.into_bytes())
    }
}

#[cfg(test)]
#[path = "tests/message_tests.rs"]
mod tests;

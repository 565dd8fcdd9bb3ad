//! Record framing for the engine's data channel.
//!
//! Data records and control messages share one byte stream. Every record is
//! length encoded (field count, then length-prefixed fields) and has the same
//! number of fields, so the engine's fixed-width parser never misaligns. The
//! last field of each record is the control field: empty for data, a reserved
//! code for control messages.

mod encoder;
mod message;

pub use encoder::FrameEncoder;
pub use message::{
    ControlMessageEncoder, CONTROL_MESSAGE_FIELD_NAME, END_OF_DATA_MESSAGE_CODE,
    FLUSH_SPACES_LENGTH,
};

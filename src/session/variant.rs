//! Per-engine capabilities plugged into the shared session.

use crate::config::{ConfigHolder, ProcessConfig};
use crate::control::ControlMessageEncoder;
use crate::error::BridgeResult;

/// What differs between engine kinds. Everything else (channels, ordering,
/// kill handling) lives in [`ProcessSession`](super::ProcessSession).
pub trait EngineVariant: Send + Sync {
    type Config: std::fmt::Debug + Send + Sync;

    fn name(&self) -> &'static str;

    fn config(&self) -> &Self::Config;

    fn job_id(&self) -> &str;

    /// Record width to use when the caller does not set one.
    fn default_record_width(&self) -> Option<u32> {
        None
    }

    /// Asks the engine to persist its state. Must not fail for engines that
    /// persist on their own.
    fn persist_state(&self) -> BridgeResult<()>;

    /// Encodes the end-of-data control message for records of `record_width`
    /// fields.
    fn encode_end_of_data(&self, record_width: u32) -> BridgeResult<Vec<u8>>;
}

/// Data frame analytics engine.
#[derive(Debug, Clone)]
pub struct AnalyticsEngine {
    config: ConfigHolder,
}

impl AnalyticsEngine {
    pub const NAME: &'static str = "analytics";

    pub fn new(config: ConfigHolder) -> Self {
        Self { config }
    }
}

impl EngineVariant for AnalyticsEngine {
    type Config = ProcessConfig;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn config(&self) -> &ProcessConfig {
        self.config.get()
    }

    fn job_id(&self) -> &str {
        self.config.job_id()
    }

    /// One column per analysed field plus the control column.
    fn default_record_width(&self) -> Option<u32> {
        Some(self.config.get().cols.saturating_add(1))
    }

    /// Nothing to persist: the analytics engine writes its own state
    /// out-of-band when it finishes.
    fn persist_state(&self) -> BridgeResult<()> {
        Ok(())
    }

    fn encode_end_of_data(&self, record_width: u32) -> BridgeResult<Vec<u8>> {
        ControlMessageEncoder::new(record_width)?.end_of_data()
    }
}

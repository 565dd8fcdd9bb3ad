//! Bridge between a host process and an external analytics engine.
//!
//! A [`ProcessSession`] owns the pipes to one engine invocation. It restores
//! previously persisted state into the engine's restore channel, streams
//! length-encoded records over the data channel, and finishes with an
//! end-of-data control message so the engine knows to start computing.
//!
//! ```no_run
//! # async fn run(store: &analytics_bridge::MemoryStateStore) -> anyhow::Result<()> {
//! use analytics_bridge::{NamedPipes, ProcessConfig, SessionBuilder};
//!
//! let config = ProcessConfig::load("process.yaml".as_ref())?;
//! let pipes = NamedPipes::new("/tmp/engine_input").with_restore("/tmp/engine_restore");
//! let mut session = SessionBuilder::new().config(config).connect(pipes.connect()).await?;
//!
//! session.restore_state(store, "job1_regression_state#").await?;
//! session.write_header(&["x", "y"]).await?;
//! session.write_record(&["1.0", "2.0"]).await?;
//! session.write_end_of_data_message().await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod kill;
pub mod pipes;
pub mod restore;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{AnalysisConfig, ConfigHolder, ProcessConfig};
pub use error::{BridgeError, BridgeResult};
pub use kill::KillFlag;
#[cfg(unix)]
pub use pipes::NamedPipes;
pub use pipes::{connect_with_timeout, ChannelHandles};
pub use restore::{
    FileStateStore, MemoryStateStore, RestoreCursor, RestoreOutcome, StateDocument, StateStore,
};
pub use session::{AnalyticsEngine, EngineVariant, ProcessSession, SessionBuilder, SessionState};

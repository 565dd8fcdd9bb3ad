//! One engine invocation, from connected pipes to end-of-data.
//!
//! The session owns the channel handles and enforces write ordering on them:
//! restored state first, then data records, then the end-of-data control
//! message last. Engine-specific behaviour comes from an [`EngineVariant`].

mod state;
mod variant;

pub use state::SessionState;
pub use variant::{AnalyticsEngine, EngineVariant};

use crate::config::{ConfigHolder, ProcessConfig};
use crate::control::{FrameEncoder, CONTROL_MESSAGE_FIELD_NAME};
use crate::error::{BridgeError, BridgeResult};
use crate::kill::KillFlag;
use crate::pipes::{
    connect_with_timeout, BoxedReader, BoxedWriter, ChannelHandles, DEFAULT_CONNECT_TIMEOUT,
};
use crate::restore::{RestoreCursor, RestoreOutcome, StateRestorer, StateStore};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Called with a description of the failure when a session crashes.
pub type CrashHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Files owned by a session, removed when the session goes away.
#[derive(Debug, Default)]
struct ScratchFiles(Vec<PathBuf>);

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in self.0.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("Failed to delete file [{}]: {}", path.display(), e);
                }
            }
        }
    }
}

/// Configures and opens a [`ProcessSession`].
pub struct SessionBuilder {
    config: Option<ProcessConfig>,
    record_width: Option<u32>,
    kill_flag: KillFlag,
    connect_timeout: Duration,
    files_to_delete: Vec<PathBuf>,
    on_crash: Option<CrashHandler>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            config: None,
            record_width: None,
            kill_flag: KillFlag::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            files_to_delete: Vec::new(),
            on_crash: None,
        }
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ProcessConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Fields per record, control column included.
    pub fn record_width(mut self, width: u32) -> Self {
        self.record_width = Some(width);
        self
    }

    pub fn kill_flag(mut self, kill_flag: KillFlag) -> Self {
        self.kill_flag = kill_flag;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn file_to_delete(mut self, path: PathBuf) -> Self {
        self.files_to_delete.push(path);
        self
    }

    pub fn on_crash(mut self, handler: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_crash = Some(Box::new(handler));
        self
    }

    /// Builds an analytics session over already connected channels.
    pub fn build(
        mut self,
        channels: ChannelHandles,
    ) -> BridgeResult<ProcessSession<AnalyticsEngine>> {
        let variant = AnalyticsEngine::new(ConfigHolder::new(self.config.take())?);
        self.build_with_variant(variant, channels)
    }

    /// Validates the configuration, then waits for `connector` to open the
    /// channels. The connector is never polled when validation fails.
    pub async fn connect<F>(
        mut self,
        connector: F,
    ) -> BridgeResult<ProcessSession<AnalyticsEngine>>
    where
        F: Future<Output = std::io::Result<ChannelHandles>>,
    {
        let variant = AnalyticsEngine::new(ConfigHolder::new(self.config.take())?);
        let record_width = self.resolve_record_width(&variant)?;

        let channels = match connect_with_timeout(connector, self.connect_timeout).await {
            Ok(channels) => channels,
            Err(e) => {
                let message = format!(
                    "[{}] {} engine failed to start: {}",
                    variant.job_id(),
                    variant.name(),
                    e
                );
                tracing::error!("{}", message);
                if let Some(handler) = &self.on_crash {
                    handler(&message);
                }
                return Err(e);
            }
        };
        Ok(self.assemble(variant, record_width, channels))
    }

    pub fn build_with_variant<V: EngineVariant>(
        self,
        variant: V,
        channels: ChannelHandles,
    ) -> BridgeResult<ProcessSession<V>> {
        let record_width = self.resolve_record_width(&variant)?;
        Ok(self.assemble(variant, record_width, channels))
    }

    fn resolve_record_width<V: EngineVariant>(&self, variant: &V) -> BridgeResult<u32> {
        match self.record_width.or_else(|| variant.default_record_width()) {
            Some(width) if width > 0 => Ok(width),
            Some(_) => Err(BridgeError::invalid_argument("record width must be positive")),
            None => Err(BridgeError::invalid_argument("record width is required")),
        }
    }

    fn assemble<V: EngineVariant>(
        self,
        variant: V,
        record_width: u32,
        channels: ChannelHandles,
    ) -> ProcessSession<V> {
        tracing::debug!(
            "[{}] Opened {} session with record width {} ({:?})",
            variant.job_id(),
            variant.name(),
            record_width,
            channels
        );
        ProcessSession {
            variant,
            channels,
            record_width,
            kill_flag: self.kill_flag,
            state: SessionState::Created,
            records_written: 0,
            on_crash: self.on_crash,
            scratch_files: ScratchFiles(self.files_to_delete),
        }
    }
}

/// A connected engine invocation.
pub struct ProcessSession<V: EngineVariant = AnalyticsEngine> {
    variant: V,
    channels: ChannelHandles,
    record_width: u32,
    kill_flag: KillFlag,
    state: SessionState,
    /// Records written to the data channel, header included.
    records_written: u64,
    on_crash: Option<CrashHandler>,
    scratch_files: ScratchFiles,
}

impl<V: EngineVariant> ProcessSession<V> {
    pub fn name(&self) -> &'static str {
        self.variant.name()
    }

    /// The configuration the session was built with. Validated at build time.
    pub fn config(&self) -> &V::Config {
        self.variant.config()
    }

    pub fn job_id(&self) -> &str {
        self.variant.job_id()
    }

    pub fn record_width(&self) -> u32 {
        self.record_width
    }

    pub fn kill_flag(&self) -> &KillFlag {
        &self.kill_flag
    }

    pub fn is_killed(&self) -> bool {
        self.kill_flag.is_killed()
    }

    /// Current state. A kill flag set from outside shows up here as `Killed`
    /// even before the session itself has acted on it.
    pub fn state(&self) -> SessionState {
        if self.kill_flag.is_killed() && !self.state.is_terminal() {
            SessionState::Killed
        } else {
            self.state
        }
    }

    pub fn kill(&mut self) {
        self.kill_flag.kill();
        if !self.state.is_terminal() {
            tracing::info!("[{}] Killing {} session", self.job_id(), self.name());
            self.state = SessionState::Killed;
        }
    }

    /// Delegates to the engine variant; performs no channel I/O.
    pub fn persist_state(&self) -> BridgeResult<()> {
        self.variant.persist_state()
    }

    /// Streams the state series `prefix1, prefix2, ...` from `store` into the
    /// restore channel, releasing the channel afterwards.
    ///
    /// Must run before any record is written. A kill, whether set before the
    /// call or observed mid-restore, ends the restore successfully with the
    /// restore channel released and leaves the session `Killed`.
    pub async fn restore_state<S>(
        &mut self,
        store: &S,
        prefix: &str,
    ) -> BridgeResult<RestoreOutcome>
    where
        S: StateStore + ?Sized,
    {
        let cursor = RestoreCursor::new(prefix)?;
        if self.state() == SessionState::Killed {
            return self.cancel_restore().await;
        }
        self.check_transition(SessionState::Restoring, "restore state")?;
        let channel = self
            .channels
            .restore
            .take()
            .ok_or(BridgeError::ChannelUnavailable { channel: "restore" })?;
        self.state = SessionState::Restoring;

        let restored = StateRestorer::new(store, &self.kill_flag, self.variant.job_id())
            .restore(cursor, channel)
            .await;

        match restored {
            Ok(outcome) if outcome.is_cancelled() => {
                self.state = SessionState::Killed;
                Ok(outcome)
            }
            Ok(outcome) => {
                self.state = SessionState::Streaming;
                Ok(outcome)
            }
            Err(e) => Err(self.crash(e)),
        }
    }

    /// Writes the header record: one name per analysed field followed by the
    /// control field name. Only valid as the first record on the data channel.
    pub async fn write_header<S: AsRef<str>>(&mut self, field_names: &[S]) -> BridgeResult<()> {
        if self.records_written > 0 {
            return Err(BridgeError::InvalidState {
                operation: "write header after records",
                state: self.state(),
            });
        }
        self.write_row(field_names, CONTROL_MESSAGE_FIELD_NAME, "write header")
            .await
    }

    /// Writes one data record. `values` holds every field except the control
    /// field, which is always written empty for data.
    pub async fn write_record<S: AsRef<str>>(&mut self, values: &[S]) -> BridgeResult<()> {
        self.write_row(values, "", "write record").await
    }

    pub async fn flush(&mut self) -> BridgeResult<()> {
        self.check_transition(SessionState::Streaming, "flush")?;
        let flushed = self.channels.data.flush().await;
        flushed.map_err(|e| self.crash(BridgeError::io("failed to flush data channel", e)))
    }

    /// Signals the engine that no more data follows. This is the last write
    /// the session makes on the data channel.
    pub async fn write_end_of_data_message(&mut self) -> BridgeResult<()> {
        self.check_transition(SessionState::Finalized, "write end of data")?;
        let frame = self.variant.encode_end_of_data(self.record_width)?;

        let written = write_frame(&mut self.channels.data, &frame).await;
        match written {
            Ok(()) => {
                tracing::info!("[{}] Sent end-of-data to {} engine", self.job_id(), self.name());
                self.state = SessionState::Finalized;
                Ok(())
            }
            Err(e) => Err(self.crash(BridgeError::io("failed to write end-of-data message", e))),
        }
    }

    /// Hands the engine's output stream to the caller. Returns `None` if the
    /// session has no output channel or it was already taken.
    pub fn take_output(&mut self) -> Option<BoxedReader> {
        self.channels.output.take()
    }

    /// Closes every channel still held and deletes the session's files.
    ///
    /// Closing the data channel signals end of input to the engine. Every
    /// channel is shut down even if an earlier one fails; the first failure
    /// is reported.
    pub async fn close(self) -> BridgeResult<()> {
        let ProcessSession {
            variant,
            channels,
            scratch_files,
            ..
        } = self;
        let ChannelHandles { data, restore, .. } = channels;
        let mut first_error = None;

        if let Some(restore) = restore {
            if let Err(e) = shutdown(restore).await {
                first_error.get_or_insert(BridgeError::io("failed to close restore channel", e));
            }
        }
        if let Err(e) = shutdown(data).await {
            first_error.get_or_insert(BridgeError::io("failed to close data channel", e));
        }
        drop(scratch_files);

        tracing::debug!("[{}] Closed {} session", variant.job_id(), variant.name());
        first_error.map_or(Ok(()), Err)
    }

    async fn write_row<S: AsRef<str>>(
        &mut self,
        values: &[S],
        control: &str,
        operation: &'static str,
    ) -> BridgeResult<()> {
        let expected = self.record_width as usize - 1;
        if values.len() != expected {
            return Err(BridgeError::invalid_argument(format!(
                "record has {} fields, expected {}",
                values.len(),
                expected
            )));
        }
        self.check_transition(SessionState::Streaming, operation)?;

        let mut encoder = FrameEncoder::new();
        encoder.num_fields(self.record_width);
        for value in values {
            encoder.field(value.as_ref())?;
        }
        encoder.field(control)?;

        let written = self.channels.data.write_all(encoder.as_bytes()).await;
        match written {
            Ok(()) => {
                self.state = SessionState::Streaming;
                self.records_written += 1;
                Ok(())
            }
            Err(e) => Err(self.crash(BridgeError::io("failed to write record", e))),
        }
    }

    /// Releases the restore channel without fetching anything, for a session
    /// that was killed before restoring.
    async fn cancel_restore(&mut self) -> BridgeResult<RestoreOutcome> {
        self.state = SessionState::Killed;
        if let Some(channel) = self.channels.restore.take() {
            shutdown(channel)
                .await
                .map_err(|e| BridgeError::io("failed to close restore channel", e))?;
        }
        tracing::info!("[{}] Restore skipped, session was killed", self.job_id());
        Ok(RestoreOutcome::Cancelled { documents: 0 })
    }

    /// Fails with `InvalidState` unless the session may move to `to`. Picks up
    /// an external kill first, so nothing is written after one.
    fn check_transition(&mut self, to: SessionState, operation: &'static str) -> BridgeResult<()> {
        let current = self.state();
        self.state = current;
        if current.can_transition_to(to) {
            Ok(())
        } else {
            Err(BridgeError::InvalidState {
                operation,
                state: current,
            })
        }
    }

    /// Moves the session to `Crashed` and reports the failure. Failures after
    /// a kill are the expected result of the kill and are not reported.
    fn crash(&mut self, error: BridgeError) -> BridgeError {
        if self.kill_flag.is_killed() {
            self.state = SessionState::Killed;
            return error;
        }
        self.state = SessionState::Crashed;
        let message = format!(
            "[{}] {} engine session failed: {}",
            self.job_id(),
            self.name(),
            error
        );
        tracing::error!("{}", message);
        if let Some(handler) = &self.on_crash {
            handler(&message);
        }
        error
    }
}

async fn write_frame(writer: &mut BoxedWriter, frame: &[u8]) -> std::io::Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await
}

async fn shutdown(mut writer: BoxedWriter) -> std::io::Result<()> {
    writer.shutdown().await
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;

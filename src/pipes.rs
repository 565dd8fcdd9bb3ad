//! Channel handles connecting a session to its engine process.
//!
//! The spawning side creates the pipes; this module only opens and owns
//! them. Each handle is moved out exactly once, which is what guarantees it is
//! closed exactly once.

use crate::error::{BridgeError, BridgeResult};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Default time allowed for the engine to open its end of the pipes.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// The byte streams one session owns for its lifetime.
pub struct ChannelHandles {
    /// Records and control messages, host to engine.
    pub(crate) data: BoxedWriter,
    /// Persisted state, host to engine.
    pub(crate) restore: Option<BoxedWriter>,
    /// Results, engine to host.
    pub(crate) output: Option<BoxedReader>,
}

impl std::fmt::Debug for ChannelHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandles")
            .field("data", &true)
            .field("restore", &self.restore.is_some())
            .field("output", &self.output.is_some())
            .finish()
    }
}

impl ChannelHandles {
    pub fn new(data: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            data: Box::new(data),
            restore: None,
            output: None,
        }
    }

    pub fn with_restore(mut self, restore: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        self.restore = Some(Box::new(restore));
        self
    }

    pub fn with_output(mut self, output: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.output = Some(Box::new(output));
        self
    }

    /// Uses the child's stdin as the data channel and its stdout, when piped,
    /// as the output channel.
    pub fn from_child(child: &mut tokio::process::Child) -> std::io::Result<Self> {
        let stdin = child.stdin.take().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "engine process was spawned without a piped stdin",
            )
        })?;
        let mut handles = Self::new(stdin);
        if let Some(stdout) = child.stdout.take() {
            handles = handles.with_output(stdout);
        }
        Ok(handles)
    }

    pub fn has_restore(&self) -> bool {
        self.restore.is_some()
    }
}

/// Waits for `connector` to open the channels, failing once `timeout` expires.
pub async fn connect_with_timeout<F>(
    connector: F,
    timeout: Duration,
) -> BridgeResult<ChannelHandles>
where
    F: Future<Output = std::io::Result<ChannelHandles>>,
{
    match tokio::time::timeout(timeout, connector).await {
        Ok(Ok(handles)) => Ok(handles),
        Ok(Err(e)) => Err(BridgeError::io("failed to connect to engine", e)),
        Err(_) => Err(BridgeError::ConnectTimeout { timeout }),
    }
}

#[cfg(unix)]
pub use named::NamedPipes;

#[cfg(unix)]
mod named {
    use super::ChannelHandles;
    use nix::errno::Errno;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tokio::net::unix::pipe;

    const RETRY_INTERVAL: Duration = Duration::from_millis(20);

    /// FIFOs created by the spawning side for one engine invocation.
    #[derive(Debug, Clone)]
    pub struct NamedPipes {
        pub input: PathBuf,
        pub restore: Option<PathBuf>,
        pub output: Option<PathBuf>,
    }

    impl NamedPipes {
        pub fn new(input: impl Into<PathBuf>) -> Self {
            Self {
                input: input.into(),
                restore: None,
                output: None,
            }
        }

        pub fn with_restore(mut self, path: impl Into<PathBuf>) -> Self {
            self.restore = Some(path.into());
            self
        }

        pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
            self.output = Some(path.into());
            self
        }

        /// Opens every pipe, waiting for the engine to attach to the write
        /// sides. Never gives up on its own; wrap it in
        /// [`connect_with_timeout`](super::connect_with_timeout).
        pub async fn connect(self) -> std::io::Result<ChannelHandles> {
            let mut handles = ChannelHandles::new(open_sender(&self.input).await?);
            if let Some(path) = &self.restore {
                handles = handles.with_restore(open_sender(path).await?);
            }
            if let Some(path) = &self.output {
                handles = handles.with_output(pipe::OpenOptions::new().open_receiver(path)?);
            }
            Ok(handles)
        }
    }

    async fn open_sender(path: &Path) -> std::io::Result<pipe::Sender> {
        loop {
            match pipe::OpenOptions::new().open_sender(path) {
                Ok(sender) => return Ok(sender),
                // No reader attached yet
                Err(e) if e.raw_os_error() == Some(Errno::ENXIO as i32) => {
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/pipes_tests.rs"]
mod tests;

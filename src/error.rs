//! Error types for the engine bridge.
//!
//! Argument and lifecycle errors are raised before any I/O happens. Every
//! other variant is fatal to the operation that raised it: a half-written
//! control frame or a partially copied state document cannot be resumed, so
//! nothing here is retried.

use crate::session::SessionState;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Errors raised by the bridge between the host and the engine process.
#[derive(Debug)]
pub enum BridgeError {
    /// A required input was missing or empty.
    InvalidArgument { message: String },
    /// The operation is not allowed in the session's current state.
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    /// The session has no such channel, or it was already released.
    ChannelUnavailable { channel: &'static str },
    /// A channel write, flush or close failed.
    Io {
        context: String,
        source: std::io::Error,
    },
    /// The state store failed to answer a fetch.
    StoreFetch { id: String, source: anyhow::Error },
    /// The engine did not become ready within the connect timeout.
    ConnectTimeout { timeout: Duration },
}

/// Result alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns true if the failure leaves the engine channels in an undefined
    /// state, so the whole session has to be treated as failed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::StoreFetch { .. } | Self::ConnectTimeout { .. }
        )
    }
}

impl Display for BridgeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument { message } => write!(f, "invalid argument: {}", message),
            Self::InvalidState { operation, state } => {
                write!(f, "cannot {} while session is {}", operation, state)
            }
            Self::ChannelUnavailable { channel } => {
                write!(f, "{} channel is not available", channel)
            }
            Self::Io { context, source } => write!(f, "{}: {}", context, source),
            Self::StoreFetch { id, source } => {
                write!(f, "failed to fetch state document [{}]: {:#}", id, source)
            }
            Self::ConnectTimeout { timeout } => write!(
                f,
                "timed out after {:?} waiting for the engine to connect",
                timeout
            ),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::StoreFetch { source, .. } => Some(&**source),
            _ => None,
        }
    }
}

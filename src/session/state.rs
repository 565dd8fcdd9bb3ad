use serde::{Deserialize, Serialize};

/// Lifecycle of one engine invocation.
///
/// `Created → Restoring → Streaming → Finalized` on the happy path. Restoring
/// is optional. `Killed` and `Crashed` end the session from any state that
/// has not already ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Restoring,
    Streaming,
    /// End-of-data sent; the engine is computing.
    Finalized,
    Killed,
    Crashed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Created => write!(f, "Created"),
            SessionState::Restoring => write!(f, "Restoring"),
            SessionState::Streaming => write!(f, "Streaming"),
            SessionState::Finalized => write!(f, "Finalized"),
            SessionState::Killed => write!(f, "Killed"),
            SessionState::Crashed => write!(f, "Crashed"),
        }
    }
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Killed | SessionState::Crashed)
    }

    pub fn can_transition_to(&self, to: SessionState) -> bool {
        use SessionState::*;

        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, to),
            (Created, Restoring)
                | (Restoring, Streaming)
                | (Created, Streaming)
                | (Streaming, Streaming)
                | (Created, Finalized)
                | (Streaming, Finalized)
                | (_, Killed)
                | (_, Crashed)
        )
    }
}

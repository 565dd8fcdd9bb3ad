//! Transfer of persisted engine state into the engine's restore channel.
//!
//! State is stored as a series of documents sharing an id prefix and
//! addressed by a sequence number starting at 1. Documents are fetched one at
//! a time so memory stays bounded no matter how large the state is.

pub mod file_store;
mod restorer;
mod store;

pub use file_store::{FileStateStore, StoredStateDocument};
pub use restorer::{write_state_document, RestoreCursor, RestoreOutcome, StateRestorer};
pub use store::{MemoryStateStore, StateDocument, StateStore};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One persisted piece of engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDocument {
    pub id: String,
    pub payload: Vec<u8>,
}

impl StateDocument {
    pub fn new(id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
        }
    }

    /// Builds the document at position `sequence` of the series `prefix`.
    pub fn in_series(prefix: &str, sequence: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(format!("{}{}", prefix, sequence), payload)
    }
}

/// Read side of the document store holding persisted state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetches the document with exactly this id.
    ///
    /// A missing document is `Ok(None)`, not an error. Errors are reserved for
    /// a store that could not answer.
    async fn fetch(&self, id: &str) -> anyhow::Result<Option<StateDocument>>;
}

/// In-process state store.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    documents: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document: StateDocument) {
        self.documents().insert(document.id, document.payload);
    }

    /// Inserts `payloads` as documents 1..=N of the series `prefix`.
    pub fn insert_series<P>(&self, prefix: &str, payloads: impl IntoIterator<Item = P>)
    where
        P: Into<Vec<u8>>,
    {
        for (index, payload) in payloads.into_iter().enumerate() {
            self.insert(StateDocument::in_series(prefix, index as u64 + 1, payload));
        }
    }

    pub fn len(&self) -> usize {
        self.documents().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The map is only ever updated by single inserts, so a writer that
    /// panicked cannot have left it half-updated.
    fn documents(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn fetch(&self, id: &str) -> anyhow::Result<Option<StateDocument>> {
        Ok(self
            .documents()
            .get(id)
            .map(|payload| StateDocument::new(id, payload.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_document_is_none() {
        let store = MemoryStateStore::new();
        assert!(store.fetch("job_1").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_series_ids() {
        let store = MemoryStateStore::new();
        store.insert_series("job1_", ["a", "b"]);

        assert_eq!(store.len(), 2);
        let doc = store.fetch("job1_2").await.unwrap().unwrap();
        assert_eq!(doc, StateDocument::new("job1_2", "b"));
        assert!(store.fetch("job1_3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_after_poisoned_lock() {
        let store = std::sync::Arc::new(MemoryStateStore::new());
        let holder = std::sync::Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = holder.documents.lock().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(store.documents.is_poisoned());

        store.insert(StateDocument::new("job1_1", "{}"));

        assert_eq!(store.len(), 1);
        let doc = store.fetch("job1_1").await.unwrap().unwrap();
        assert_eq!(doc.payload, b"{}".to_vec());
    }
}

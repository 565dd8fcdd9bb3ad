//! File-based state store.
//!
//! Stores state documents as JSONL (one JSON object per line) with:
//! - Shared/exclusive file locking between readers and writers
//! - Base64 payloads so binary state survives the JSON encoding
//! - Last-write-wins when a document id is stored more than once

use super::store::{StateDocument, StateStore};
use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// A stored state document record in the state log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredStateDocument {
    pub id: String,
    pub stored_at: DateTime<Utc>,
    /// Base64 encoded payload bytes.
    pub payload: String,
}

/// File-based state store.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    /// Path to the JSONL state log.
    pub log_path: PathBuf,
}

impl FileStateStore {
    pub fn new(log_path: PathBuf) -> Self {
        Self { log_path }
    }

    /// Appends a document to the log, replacing any earlier one with the same id.
    pub fn append(&self, document: &StateDocument) -> anyhow::Result<()> {
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create store dir: {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .with_context(|| format!("Failed to open state log: {}", self.log_path.display()))?;

        file.lock_exclusive()
            .context("Failed to lock state log for writing")?;

        let record = StoredStateDocument {
            id: document.id.clone(),
            stored_at: Utc::now(),
            payload: STANDARD.encode(&document.payload),
        };
        let line = serde_json::to_string(&record)?;
        writeln!(file, "{}", line)?;

        // Ensure the document is persisted before reporting success
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    fn read_document(&self, id: &str) -> anyhow::Result<Option<StateDocument>> {
        let file = match File::open(&self.log_path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to open state log: {}", self.log_path.display())
                })
            }
        };

        file.lock_shared()
            .context("Failed to lock state log for reading")?;

        find_latest(BufReader::new(file), id, &self.log_path)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn fetch(&self, id: &str) -> anyhow::Result<Option<StateDocument>> {
        self.read_document(id)
    }
}

/// Scans the log for the last record stored under `id`.
fn find_latest(
    reader: impl BufRead,
    id: &str,
    path: &Path,
) -> anyhow::Result<Option<StateDocument>> {
    let mut latest = None;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let stored: StoredStateDocument = serde_json::from_str(&line).with_context(|| {
            format!("Corrupt state log {} at line {}", path.display(), index + 1)
        })?;

        if stored.id == id {
            latest = Some(stored);
        }
    }

    latest
        .map(|stored| {
            let payload = STANDARD
                .decode(stored.payload.as_bytes())
                .with_context(|| format!("Invalid payload encoding for [{}]", stored.id))?;
            Ok(StateDocument::new(stored.id, payload))
        })
        .transpose()
}

#[cfg(test)]
#[path = "tests/file_store_tests.rs"]
mod tests;

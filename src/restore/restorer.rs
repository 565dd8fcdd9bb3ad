use super::store::StateStore;
use crate::error::{BridgeError, BridgeResult};
use crate::kill::KillFlag;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Position within one series of state documents.
///
/// Sequence numbers start at 1 and only move forward, one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreCursor {
    prefix: String,
    sequence: u64,
}

impl RestoreCursor {
    pub fn new(prefix: impl Into<String>) -> BridgeResult<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(BridgeError::invalid_argument(
                "state document id prefix must not be empty",
            ));
        }
        Ok(Self {
            prefix,
            sequence: 1,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Sequence number of the next document to fetch.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn next_id(&self) -> String {
        format!("{}{}", self.prefix, self.sequence)
    }

    fn advance(&mut self) {
        self.sequence += 1;
    }
}

/// How a restore ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The store ran out of documents.
    Completed { documents: u64 },
    /// The kill flag was observed before the store ran out.
    Cancelled { documents: u64 },
}

impl RestoreOutcome {
    pub fn documents(&self) -> u64 {
        match self {
            Self::Completed { documents } | Self::Cancelled { documents } => *documents,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// True when there was no prior state to restore.
    pub fn is_cold_start(&self) -> bool {
        matches!(self, Self::Completed { documents: 0 })
    }
}

/// Copies a state document series from a store into the restore channel.
pub struct StateRestorer<'a, S: StateStore + ?Sized> {
    store: &'a S,
    kill_flag: &'a KillFlag,
    job_id: &'a str,
}

impl<'a, S: StateStore + ?Sized> StateRestorer<'a, S> {
    pub fn new(store: &'a S, kill_flag: &'a KillFlag, job_id: &'a str) -> Self {
        Self {
            store,
            kill_flag,
            job_id,
        }
    }

    /// Streams the series addressed by `cursor` into `channel`.
    ///
    /// The channel is owned for the duration of the call and is shut down on
    /// every exit path. The kill flag is checked between documents only, so a
    /// document that has started is always written whole.
    pub async fn restore<W>(
        &self,
        cursor: RestoreCursor,
        mut channel: W,
    ) -> BridgeResult<RestoreOutcome>
    where
        W: AsyncWrite + Unpin,
    {
        let copied = self.copy_documents(cursor, &mut channel).await;
        let closed = channel.shutdown().await;
        drop(channel);

        match (copied, closed) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(BridgeError::io("failed to close restore channel", e)),
            (Ok(outcome), Ok(())) => Ok(outcome),
        }
    }

    async fn copy_documents<W>(
        &self,
        mut cursor: RestoreCursor,
        channel: &mut W,
    ) -> BridgeResult<RestoreOutcome>
    where
        W: AsyncWrite + Unpin,
    {
        let mut documents = 0u64;

        loop {
            if self.kill_flag.is_killed() {
                tracing::info!(
                    "[{}] Restore cancelled after {} state document(s)",
                    self.job_id,
                    documents
                );
                return Ok(RestoreOutcome::Cancelled { documents });
            }

            // One document per round trip keeps memory bounded
            let id = cursor.next_id();
            let fetched = self
                .store
                .fetch(&id)
                .await
                .map_err(|source| BridgeError::StoreFetch {
                    id: id.clone(),
                    source,
                })?;
            let Some(document) = fetched else {
                break;
            };

            tracing::debug!(
                "[{}] Restoring state document [{}]",
                self.job_id,
                document.id
            );
            write_state_document(&document.payload, channel)
                .await
                .map_err(|e| {
                    BridgeError::io(format!("failed to write state document [{}]", id), e)
                })?;

            documents += 1;
            cursor.advance();
        }

        if documents == 0 {
            tracing::info!(
                "[{}] No state found under prefix [{}]",
                self.job_id,
                cursor.prefix()
            );
        } else {
            tracing::info!(
                "[{}] Restored {} state document(s)",
                self.job_id,
                documents
            );
        }
        Ok(RestoreOutcome::Completed { documents })
    }
}

/// Writes one state document followed by a NUL terminator.
///
/// The engine's reader treats NUL as end-of-document, which lets several
/// documents share one pipe. Trailing NULs already present in the payload are
/// dropped so they are not mistaken for empty documents.
pub async fn write_state_document<W>(payload: &[u8], channel: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let end = payload
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    if let Some(body) = payload.get(..end).filter(|body| !body.is_empty()) {
        channel.write_all(body).await?;
    }
    channel.write_all(&[0]).await
}

#[cfg(test)]
#[path = "tests/restorer_tests.rs"]
mod tests;

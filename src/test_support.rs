//! Shared fixtures for unit tests: recording channels, instrumented stores
//! and a decoder for length-encoded records.

use crate::kill::KillFlag;
use crate::restore::{MemoryStateStore, StateDocument, StateStore};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

#[derive(Debug, Default)]
struct Recorded {
    bytes: Vec<u8>,
    flushes: usize,
    shutdowns: usize,
}

/// An in-memory channel that records everything written to it.
///
/// Clones share the recording, so a test keeps one clone and hands the other
/// to the code under test.
#[derive(Debug, Clone, Default)]
pub struct RecordingChannel {
    recorded: Arc<Mutex<Recorded>>,
    fail_writes: bool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel whose writes fail with a broken pipe.
    pub fn broken() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.recorded.lock().unwrap().bytes.clone()
    }

    pub fn flushes(&self) -> usize {
        self.recorded.lock().unwrap().flushes
    }

    pub fn shutdowns(&self) -> usize {
        self.recorded.lock().unwrap().shutdowns
    }

    /// The NUL-terminated documents written so far.
    pub fn documents(&self) -> Vec<Vec<u8>> {
        let bytes = self.bytes();
        let mut documents: Vec<Vec<u8>> = bytes.split(|&b| b == 0).map(<[u8]>::to_vec).collect();
        // Split leaves an empty tail after the last terminator.
        documents.pop();
        documents
    }
}

impl AsyncWrite for RecordingChannel {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if self.fail_writes {
            return Poll::Ready(Err(std::io::Error::new(
                ErrorKind::BrokenPipe,
                "engine closed the pipe",
            )));
        }
        self.recorded.lock().unwrap().bytes.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.recorded.lock().unwrap().flushes += 1;
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.recorded.lock().unwrap().shutdowns += 1;
        Poll::Ready(Ok(()))
    }
}

/// Wraps a memory store, counting fetches and optionally failing or
/// killing the session at a given fetch.
#[derive(Debug, Default)]
pub struct InstrumentedStore {
    pub inner: MemoryStateStore,
    fetches: AtomicUsize,
    fail_at_fetch: Option<usize>,
    kill_after_fetch: Option<(usize, KillFlag)>,
}

impl InstrumentedStore {
    pub fn with_series(prefix: &str, count: usize) -> Self {
        let store = Self::default();
        store
            .inner
            .insert_series(prefix, (1..=count).map(|i| format!("{{\"doc\":{}}}", i)));
        store
    }

    /// Makes the `n`th fetch (1-based) fail.
    pub fn failing_at(mut self, n: usize) -> Self {
        self.fail_at_fetch = Some(n);
        self
    }

    /// Sets `flag` once `n` fetches have returned.
    pub fn killing_after(mut self, n: usize, flag: KillFlag) -> Self {
        self.kill_after_fetch = Some((n, flag));
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateStore for InstrumentedStore {
    async fn fetch(&self, id: &str) -> anyhow::Result<Option<StateDocument>> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_at_fetch == Some(n) {
            anyhow::bail!("state index unavailable");
        }
        let result = self.inner.fetch(id).await;
        if let Some((after, flag)) = &self.kill_after_fetch {
            if n >= *after {
                flag.kill();
            }
        }
        result
    }
}

/// Decodes length-encoded records back into their string fields.
pub fn decode_records(mut bytes: &[u8]) -> Vec<Vec<String>> {
    fn take_u32(bytes: &mut &[u8]) -> usize {
        let (head, rest) = bytes.split_at(4);
        *bytes = rest;
        u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as usize
    }

    let mut records = Vec::new();
    while !bytes.is_empty() {
        let count = take_u32(&mut bytes);
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            let len = take_u32(&mut bytes);
            let (field, rest) = bytes.split_at(len);
            fields.push(String::from_utf8(field.to_vec()).unwrap());
            bytes = rest;
        }
        records.push(fields);
    }
    records
}

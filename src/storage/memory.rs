use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use super::s3::{folder_key, sort_entries};
use super::{encode_key, join_url, ObjectDownload, ObjectEntry, ObjectStore, StorageError};

/// Operations a [`MemoryStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    List,
    Upload,
    Download,
    Delete,
    Rename,
    CreateFolder,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    error: StorageError,
    /// `None` fails every call until cleared.
    remaining: Option<u32>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<String, StoredObject>,
    failures: HashMap<StoreOp, InjectedFailure>,
    calls: Vec<(StoreOp, String)>,
}

/// In-process bucket, for tests and offline use.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    base_url: String,
    read_chunk: usize,
    latency: Option<Duration>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            base_url: String::new(),
            read_chunk: 64 * 1024,
            latency: None,
        }
    }

    /// Public/CDN base URL used by [`ObjectStore::file_url`].
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Maximum bytes handed out per read of a download stream.
    pub fn with_read_chunk(mut self, bytes: usize) -> Self {
        self.read_chunk = bytes.max(1);
        self
    }

    /// Delay applied before every operation completes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.lock().objects.insert(
            key.into(),
            StoredObject {
                data: data.into(),
                modified: Utc::now(),
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(key).map(|o| o.data.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    /// Keys passed to each call, in call order.
    pub fn calls(&self, op: StoreOp) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, key)| key.clone())
            .collect()
    }

    /// Fail the next `times` calls of `op` with `error`.
    pub fn fail_times(&self, op: StoreOp, error: StorageError, times: u32) {
        self.lock().failures.insert(
            op,
            InjectedFailure {
                error,
                remaining: Some(times),
            },
        );
    }

    /// Fail every call of `op` with `error` until [`clear_failures`](Self::clear_failures).
    pub fn fail_always(&self, op: StoreOp, error: StorageError) {
        self.lock().failures.insert(
            op,
            InjectedFailure {
                error,
                remaining: None,
            },
        );
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the call and return the injected failure, if any.
    async fn enter(&self, op: StoreOp, key: &str) -> Result<(), StorageError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        state.calls.push((op, key.to_string()));

        let Some(failure) = state.failures.get_mut(&op) else {
            return Ok(());
        };
        let error = failure.error.clone();
        let exhausted = match failure.remaining.as_mut() {
            None => false,
            Some(n) => {
                *n = n.saturating_sub(1);
                *n == 0
            }
        };
        if exhausted {
            state.failures.remove(&op);
        }
        Err(error)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StorageError> {
        self.enter(StoreOp::List, prefix).await?;

        let state = self.lock();
        let mut entries: Vec<ObjectEntry> = Vec::new();
        for (key, object) in state.objects.range(prefix.to_string()..) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.find('/') {
                Some(idx) => {
                    let folder = format!("{prefix}{}", &rest[..=idx]);
                    if !entries.iter().any(|e| e.key == folder) {
                        entries.push(ObjectEntry {
                            key: folder,
                            size: 0,
                            last_modified: None,
                            is_prefix: true,
                        });
                    }
                }
                None => entries.push(ObjectEntry {
                    key: key.clone(),
                    size: object.data.len() as u64,
                    last_modified: Some(object.modified),
                    is_prefix: false,
                }),
            }
        }

        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn upload_stream(&self, key: &str, mut body: File, size: u64) -> Result<(), StorageError> {
        self.enter(StoreOp::Upload, key).await?;

        let mut data = Vec::with_capacity(size as usize);
        body.read_to_end(&mut data)
            .await
            .map_err(|e| StorageError::other(format!("Failed to read local file: {e}")))?;
        if data.len() as u64 != size {
            return Err(StorageError::other(format!(
                "Size mismatch for {key}: expected {size} bytes, got {}",
                data.len()
            )));
        }

        self.insert(key, data);
        Ok(())
    }

    async fn download_stream(&self, key: &str) -> Result<ObjectDownload, StorageError> {
        self.enter(StoreOp::Download, key).await?;

        let data = self.get(key).ok_or_else(|| StorageError::not_found(key))?;
        let content_length = Some(data.len() as u64);
        Ok(ObjectDownload {
            reader: Box::pin(ChunkedReader {
                data,
                pos: 0,
                chunk: self.read_chunk,
            }),
            content_length,
        })
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.enter(StoreOp::Delete, key).await?;
        self.lock().objects.remove(key);
        Ok(())
    }

    async fn rename_object(&self, old_key: &str, new_key: &str) -> Result<(), StorageError> {
        self.enter(StoreOp::Rename, old_key).await?;

        let mut state = self.lock();
        let object = state
            .objects
            .remove(old_key)
            .ok_or_else(|| StorageError::not_found(old_key))?;
        state.objects.insert(new_key.to_string(), object);
        Ok(())
    }

    async fn create_folder(&self, path: &str) -> Result<(), StorageError> {
        let key = folder_key(path);
        self.enter(StoreOp::CreateFolder, &key).await?;
        self.insert(key, Vec::new());
        Ok(())
    }

    fn file_url(&self, key: &str) -> String {
        if self.base_url.is_empty() {
            format!("memory:///{}", encode_key(key))
        } else {
            join_url(&self.base_url, &encode_key(key))
        }
    }
}

/// Hands out an in-memory body at most `chunk` bytes per read.
struct ChunkedReader {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
}

impl AsyncRead for ChunkedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let remaining = self.data.len() - self.pos;
        let n = remaining.min(self.chunk).min(buf.remaining());
        let start = self.pos;
        buf.put_slice(&self.data[start..start + n]);
        self.pos += n;
        Poll::Ready(Ok(()))
    }
}

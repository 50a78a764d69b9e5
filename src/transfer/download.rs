//! Download queue engine.
//!
//! Objects are downloaded one at a time, oldest first, into the resolved
//! download directory under a sanitized, collision-free name. Byte-level
//! progress is published after every chunk when the size is known.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;

use super::item::{QueueSummary, TransferId, TransferItem, TransferKind, TransferStatus};
use super::naming::{
    create_unique_file, fallback_download_dir, resolve_download_dir, sanitize_file_name,
};
use super::queue::TransferQueue;
use super::CompletionCallback;
use crate::storage::{file_name_of_key, ObjectStore, StorageError};

/// Read buffer per chunk.
const CHUNK_SIZE: usize = 64 * 1024;

struct DownloadInner {
    queue: TransferQueue,
    store: Arc<dyn ObjectStore>,
    download_dir: Option<PathBuf>,
    fallback_dir: PathBuf,
    on_complete: Option<CompletionCallback>,
}

/// Sequential download queue bound to one store.
///
/// Cheap to clone; clones share the same queue. Methods that may start the
/// drain loop must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<DownloadInner>,
}

/// Where downloads land and what to do when one finishes.
#[derive(Clone, Default)]
pub struct DownloadOptions {
    /// Preferred directory; the platform downloads directory when unset.
    pub download_dir: Option<PathBuf>,
    /// Used when the preferred directory is unavailable or cannot be created.
    pub fallback_dir: Option<PathBuf>,
    pub on_complete: Option<CompletionCallback>,
}

impl DownloadManager {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_options(store, DownloadOptions::default())
    }

    pub fn with_options(store: Arc<dyn ObjectStore>, options: DownloadOptions) -> Self {
        Self {
            inner: Arc::new(DownloadInner {
                queue: TransferQueue::new(TransferKind::Download),
                store,
                download_dir: options.download_dir.or_else(dirs::download_dir),
                fallback_dir: options.fallback_dir.unwrap_or_else(fallback_download_dir),
                on_complete: options.on_complete,
            }),
        }
    }

    /// Queue `key` for download. `size`, when known, enables fractional progress.
    pub fn add_to_queue(&self, key: &str, size: Option<u64>) -> TransferId {
        let mut item = self
            .inner
            .queue
            .new_item(key.to_string(), file_name_of_key(key).to_string());
        item.size = size;
        let id = item.id.clone();

        log::info!("Queued download of {key}");
        self.inner.queue.push(vec![item]);
        self.ensure_draining();
        id
    }

    /// Re-queue a failed item in place. Returns `false` if `id` is not a failed item.
    pub fn retry(&self, id: &TransferId) -> bool {
        let retried = self.inner.queue.retry(id);
        if retried {
            log::debug!("Retrying download {id}");
            self.ensure_draining();
        }
        retried
    }

    pub fn retry_all_failed(&self) -> usize {
        let count = self.inner.queue.retry_all_failed();
        if count > 0 {
            self.ensure_draining();
        }
        count
    }

    /// Drop an item at any status. An in-flight download still runs to the
    /// end; its result is discarded.
    pub fn remove(&self, id: &TransferId) -> bool {
        self.inner.queue.remove(id)
    }

    pub fn clear_completed(&self) -> usize {
        self.inner.queue.clear_completed()
    }

    /// Empty the queue; refused (returns `false`) while anything is pending
    /// or active.
    pub fn clear_all(&self) -> bool {
        self.inner.queue.clear_all()
    }

    pub fn snapshot(&self) -> Vec<TransferItem> {
        self.inner.queue.snapshot()
    }

    pub fn summary(&self) -> QueueSummary {
        self.inner.queue.summary()
    }

    /// Change counter, bumped after every mutation of the queue.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.queue.subscribe()
    }

    pub async fn wait_idle(&self) {
        self.inner.queue.wait_idle().await
    }

    fn ensure_draining(&self) {
        if self.inner.queue.try_start_drain() {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.drain().await });
        }
    }
}

impl DownloadInner {
    async fn drain(&self) {
        let _guard = self.queue.drain_guard();

        while let Some(item) = self.queue.claim_next() {
            log::debug!("Downloading {}", item.key);

            match self.download(&item).await {
                Ok((path, received)) => {
                    let updated = self.queue.update(&item.id, |i| {
                        i.status = TransferStatus::Success;
                        i.progress = 1.0;
                        i.transferred = received;
                        i.size = Some(i.size.unwrap_or(received));
                        i.save_path = Some(path.clone());
                    });
                    log::info!("Downloaded {} to {}", item.key, path.display());

                    if let (Some(updated), Some(callback)) = (updated, &self.on_complete) {
                        callback(&updated);
                    }
                }
                Err(e) => {
                    log::warn!("Download of {} failed: {e}", item.key);
                    self.queue.update(&item.id, |i| {
                        i.status = TransferStatus::Failed;
                        i.error_message = Some(e.to_string());
                    });
                }
            }
        }
    }

    /// A partially written file is left in place on failure.
    async fn download(&self, item: &TransferItem) -> Result<(PathBuf, u64), StorageError> {
        let dir = resolve_download_dir(self.download_dir.as_deref(), &self.fallback_dir).await?;
        let name = sanitize_file_name(&item.file_name);

        let mut download = self.store.download_stream(&item.key).await?;

        let size = match (item.size, download.content_length) {
            (Some(size), _) => Some(size),
            (None, Some(length)) => {
                self.queue.update(&item.id, |i| i.size = Some(length));
                Some(length)
            }
            (None, None) => None,
        };

        // Checked against the filesystem right before writing, never cached
        let (path, mut file) = create_unique_file(&dir, &name).await?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut received: u64 = 0;
        loop {
            let n = download
                .reader
                .read(&mut buf)
                .await
                .map_err(|e| StorageError::transport(format!("Failed to read {}: {e}", item.key)))?;
            if n == 0 {
                break;
            }

            file.write_all(&buf[..n])
                .await
                .map_err(|e| StorageError::local(&path, e))?;
            received += n as u64;

            let progress = fraction(received, size);
            self.queue.update(&item.id, |i| {
                i.transferred = received;
                if let Some(progress) = progress {
                    i.progress = progress;
                }
            });
        }

        file.flush().await.map_err(|e| StorageError::local(&path, e))?;
        Ok((path, received))
    }
}

fn fraction(received: u64, size: Option<u64>) -> Option<f64> {
    match size {
        Some(size) if size > 0 => Some((received as f64 / size as f64).min(1.0)),
        _ => None,
    }
}

/// Resolved download directory for display purposes.
pub fn default_download_dir(configured: Option<&Path>) -> PathBuf {
    configured
        .map(Path::to_path_buf)
        .or_else(dirs::download_dir)
        .unwrap_or_else(fallback_download_dir)
}

//! Upload queue engine.
//!
//! Local files are uploaded one at a time, oldest first. A failure marks the
//! item `failed` and the loop moves on; only the user retries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::File;
use tokio::sync::watch;

use super::item::{QueueSummary, TransferId, TransferItem, TransferKind, TransferStatus};
use super::queue::TransferQueue;
use super::CompletionCallback;
use crate::storage::{ObjectStore, StorageError};

struct UploadInner {
    queue: TransferQueue,
    store: Arc<dyn ObjectStore>,
    on_complete: Option<CompletionCallback>,
}

/// Sequential upload queue bound to one store.
///
/// Cheap to clone; clones share the same queue. Methods that may start the
/// drain loop must be called from within a Tokio runtime.
#[derive(Clone)]
pub struct UploadManager {
    inner: Arc<UploadInner>,
}

impl UploadManager {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::build(store, None)
    }

    /// `on_complete` runs after each successful upload, e.g. to invalidate a
    /// cached listing of the target prefix.
    pub fn with_callback(store: Arc<dyn ObjectStore>, on_complete: CompletionCallback) -> Self {
        Self::build(store, Some(on_complete))
    }

    fn build(store: Arc<dyn ObjectStore>, on_complete: Option<CompletionCallback>) -> Self {
        Self {
            inner: Arc::new(UploadInner {
                queue: TransferQueue::new(TransferKind::Upload),
                store,
                on_complete,
            }),
        }
    }

    /// Queue `paths` for upload under `target_prefix`; the key of each is
    /// `target_prefix` followed by the file name. Returns immediately.
    pub fn add_to_queue<I, P>(&self, paths: I, target_prefix: &str) -> Vec<TransferId>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let items: Vec<TransferItem> = paths
            .into_iter()
            .map(|path| {
                let path = path.into();
                let file_name = file_name_of(&path);
                let mut item = self
                    .inner
                    .queue
                    .new_item(format!("{target_prefix}{file_name}"), file_name);
                item.local_path = Some(path);
                item
            })
            .collect();

        let ids: Vec<TransferId> = items.iter().map(|i| i.id.clone()).collect();
        if !ids.is_empty() {
            log::info!("Queued {} upload(s) to '{target_prefix}'", ids.len());
        }
        self.inner.queue.push(items);
        self.ensure_draining();
        ids
    }

    /// Re-queue a failed item in place. Returns `false` if `id` is not a failed item.
    pub fn retry(&self, id: &TransferId) -> bool {
        let retried = self.inner.queue.retry(id);
        if retried {
            log::debug!("Retrying upload {id}");
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

    /// Drop an item at any status. An in-flight upload still runs to the end;
    /// its result is discarded.
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

impl UploadInner {
    async fn drain(&self) {
        let _guard = self.queue.drain_guard();

        while let Some(item) = self.queue.claim_next() {
            log::debug!("Uploading {} -> {}", display_path(&item), item.key);

            match self.upload(&item).await {
                Ok(size) => {
                    let url = self.store.file_url(&item.key);
                    let updated = self.queue.update(&item.id, |i| {
                        i.status = TransferStatus::Success;
                        i.progress = 1.0;
                        i.transferred = size;
                        i.size = Some(size);
                        i.result_url = Some(url);
                    });
                    log::info!("Uploaded {}", item.key);

                    if let (Some(updated), Some(callback)) = (updated, &self.on_complete) {
                        callback(&updated);
                    }
                }
                Err(e) => {
                    log::warn!("Upload of {} failed: {e}", item.key);
                    self.queue.update(&item.id, |i| {
                        i.status = TransferStatus::Failed;
                        i.error_message = Some(e.to_string());
                    });
                }
            }
        }
    }

    async fn upload(&self, item: &TransferItem) -> Result<u64, StorageError> {
        let path = item
            .local_path
            .as_deref()
            .ok_or_else(|| StorageError::other("Upload has no source file"))?;
        if item.file_name.is_empty() {
            return Err(StorageError::local(path, "Path has no file name"));
        }

        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| StorageError::local(path, e))?
            .len();
        self.queue.update(&item.id, |i| i.size = Some(size));

        let file = File::open(path)
            .await
            .map_err(|e| StorageError::local(path, e))?;

        self.store.upload_stream(&item.key, file, size).await?;
        Ok(size)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn display_path(item: &TransferItem) -> String {
    item.local_path
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

mod update;

pub use update::update;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;
use tui_logger::TuiWidgetState;

use crate::models::listing::DirectoryCache;
use crate::storage::{ObjectEntry, ObjectStore, StorageError};
use crate::transfer::{
    default_download_dir, DownloadManager, DownloadOptions, TransferId, TransferItem,
    TransferKind, UploadManager,
};

/// Result of a background listing fetch, tagged with its prefix.
pub type ListingResult = (String, Result<Vec<ObjectEntry>, StorageError>);

pub struct App {
    pub store: Arc<dyn ObjectStore>,
    pub uploads: UploadManager,
    pub downloads: DownloadManager,
    pub cache: Arc<DirectoryCache>,
    pub app_title: String,
    pub download_dir: PathBuf,
    pub should_quit: bool,

    // Listing panel
    pub prefix: String,
    pub listing: Vec<ObjectEntry>,
    pub listing_error: Option<String>,
    pub listing_receiver: Option<oneshot::Receiver<ListingResult>>,

    // Queue panel: uploads then downloads, newest first within each
    pub queue_rows: Vec<TransferItem>,
    pub selected_queue_index: usize,

    // UI Messages
    pub error_message: String,
    pub log_state: TuiWidgetState,
}

impl App {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        profile_name: &str,
        download_dir: Option<PathBuf>,
    ) -> Self {
        let cache = Arc::new(DirectoryCache::new());

        let upload_cache = Arc::clone(&cache);
        let uploads = UploadManager::with_callback(
            Arc::clone(&store),
            Arc::new(move |item: &TransferItem| upload_cache.invalidate_for_key(&item.key)),
        );
        let downloads = DownloadManager::with_options(
            Arc::clone(&store),
            DownloadOptions {
                download_dir: download_dir.clone(),
                ..DownloadOptions::default()
            },
        );

        Self {
            store,
            uploads,
            downloads,
            cache,
            app_title: format!("s3q - {profile_name}"),
            download_dir: default_download_dir(download_dir.as_deref()),
            should_quit: false,
            prefix: String::new(),
            listing: Vec::new(),
            listing_error: None,
            listing_receiver: None,
            queue_rows: Vec::new(),
            selected_queue_index: 0,
            error_message: String::new(),
            log_state: TuiWidgetState::new().set_default_display_level(log::LevelFilter::Info),
        }
    }

    pub fn show_error(&mut self, message: &str) {
        self.error_message = message.to_string();
    }

    pub fn selected_item(&self) -> Option<&TransferItem> {
        self.queue_rows.get(self.selected_queue_index)
    }

    /// Re-read both queues, keeping the selection on the same item when it
    /// still exists.
    pub fn refresh_queue(&mut self) {
        let selected_id = self.selected_item().map(|item| item.id.clone());

        let mut rows = self.uploads.snapshot();
        rows.reverse();
        let mut downloads = self.downloads.snapshot();
        downloads.reverse();
        rows.extend(downloads);
        self.queue_rows = rows;

        self.selected_queue_index = selected_id
            .and_then(|id| self.queue_rows.iter().position(|item| item.id == id))
            .unwrap_or(self.selected_queue_index)
            .min(self.queue_rows.len().saturating_sub(1));
    }

    /// The listing is reloaded when its cache entry was invalidated, unless
    /// the last attempt failed or a fetch is already running.
    pub fn needs_listing(&self) -> bool {
        !self.listing_loading()
            && self.listing_error.is_none()
            && !self.cache.is_cached(&self.prefix)
    }

    pub fn listing_loading(&self) -> bool {
        self.listing_receiver.is_some()
    }

    /// Fetch the listing of the current prefix in the background (non-blocking).
    /// A fetch still running is superseded.
    pub fn start_listing(&mut self) {
        let (tx, rx) = oneshot::channel();
        self.listing_receiver = Some(rx);

        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let prefix = self.prefix.clone();
        tokio::spawn(async move {
            let result = cache.list(store.as_ref(), &prefix).await;
            let _ = tx.send((prefix, result));
        });
    }

    /// Apply a finished listing fetch (checked from the event loop).
    /// Returns true if the listing panel changed.
    pub fn check_listing_complete(&mut self) -> bool {
        let Some(rx) = self.listing_receiver.as_mut() else {
            return false;
        };
        let (prefix, result) = match rx.try_recv() {
            Ok(done) => done,
            Err(oneshot::error::TryRecvError::Empty) => return false,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.listing_receiver = None;
                self.listing_error = Some("Listing task ended unexpectedly".to_string());
                return true;
            }
        };
        self.listing_receiver = None;

        if prefix != self.prefix {
            return false;
        }
        match result {
            Ok(entries) => {
                self.listing = entries;
                self.listing_error = None;
            }
            Err(e) => {
                log::warn!("Listing '{prefix}' failed: {e}");
                self.listing_error = Some(e.to_string());
            }
        }
        true
    }

    /// Start a fetch and wait until it has been applied.
    #[cfg(test)]
    pub(crate) async fn wait_for_listing(&mut self) {
        if !self.listing_loading() {
            self.start_listing();
        }
        for _ in 0..1000 {
            self.check_listing_complete();
            if !self.listing_loading() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        panic!("listing of '{}' never arrived", self.prefix);
    }

    pub fn retry(&self, kind: TransferKind, id: &TransferId) -> bool {
        match kind {
            TransferKind::Upload => self.uploads.retry(id),
            TransferKind::Download => self.downloads.retry(id),
        }
    }

    pub fn remove(&self, kind: TransferKind, id: &TransferId) -> bool {
        match kind {
            TransferKind::Upload => self.uploads.remove(id),
            TransferKind::Download => self.downloads.remove(id),
        }
    }

    pub fn unfinished_count(&self) -> usize {
        let uploads = self.uploads.summary();
        let downloads = self.downloads.summary();
        uploads.pending + uploads.active + downloads.pending + downloads.active
    }

    /// Warning for transfers that are dropped when the app exits now.
    pub fn unfinished_warning(&self) -> Option<String> {
        match self.unfinished_count() {
            0 => None,
            n => Some(format!("Quitting with {n} transfer(s) unfinished; they were not completed")),
        }
    }
}

//! Upload and download queues.
//!
//! Each engine owns an ordered list of [`TransferItem`]s and drains it with a
//! single background task, one transfer at a time. The two engines are
//! independent and run concurrently with each other.

pub mod download;
pub mod item;
pub mod naming;
mod queue;
pub mod upload;

pub use download::{default_download_dir, DownloadManager, DownloadOptions};
pub use item::{QueueSummary, TransferId, TransferItem, TransferKind, TransferStatus};
pub use upload::UploadManager;

use std::sync::Arc;

/// Invoked with the finished item after each successful transfer.
pub type CompletionCallback = Arc<dyn Fn(&TransferItem) + Send + Sync>;

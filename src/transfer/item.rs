use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Upload,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    Active,
    Success,
    Failed,
}

/// Opaque, never-reused identifier of a queued transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferId(String);

impl TransferId {
    pub(crate) fn new(created_at: DateTime<Utc>, seq: u64, file_name: &str) -> Self {
        Self(format!(
            "{}-{seq}-{file_name}",
            created_at.timestamp_millis()
        ))
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One upload or download tracked by a queue.
#[derive(Debug, Clone)]
pub struct TransferItem {
    pub id: TransferId,
    pub kind: TransferKind,
    /// Full object key within the bucket.
    pub key: String,
    /// Upload source. Unset for downloads.
    pub local_path: Option<PathBuf>,
    /// Last segment of `key`.
    pub file_name: String,
    pub size: Option<u64>,
    pub status: TransferStatus,
    /// Fraction in `[0.0, 1.0]`; only meaningful when `size` is known.
    pub progress: f64,
    /// Bytes moved so far in the current attempt.
    pub transferred: u64,
    pub error_message: Option<String>,
    /// Public URL of an uploaded object, set on success.
    pub result_url: Option<String>,
    /// Local file a download was written to, set on success.
    pub save_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl TransferItem {
    pub(crate) fn new(
        id: TransferId,
        kind: TransferKind,
        key: String,
        file_name: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            key,
            local_path: None,
            file_name,
            size: None,
            status: TransferStatus::Pending,
            progress: 0.0,
            transferred: 0,
            error_message: None,
            result_url: None,
            save_path: None,
            created_at,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            TransferStatus::Success | TransferStatus::Failed
        )
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self.status,
            TransferStatus::Pending | TransferStatus::Active
        )
    }

    /// `None` while the size is unknown and the item is not done yet.
    pub fn progress_percentage(&self) -> Option<u16> {
        match (self.status, self.size) {
            (TransferStatus::Success, _) => Some(100),
            (_, Some(size)) if size > 0 => Some((self.progress.clamp(0.0, 1.0) * 100.0) as u16),
            _ => None,
        }
    }

    /// Back to a fresh `pending` attempt.
    pub(crate) fn reset(&mut self) {
        self.status = TransferStatus::Pending;
        self.progress = 0.0;
        self.transferred = 0;
        self.error_message = None;
        self.result_url = None;
        self.save_path = None;
    }
}

/// Item counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSummary {
    pub pending: usize,
    pub active: usize,
    pub success: usize,
    pub failed: usize,
}

impl QueueSummary {
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a TransferItem>) -> Self {
        let mut summary = Self::default();
        for item in items {
            match item.status {
                TransferStatus::Pending => summary.pending += 1,
                TransferStatus::Active => summary.active += 1,
                TransferStatus::Success => summary.success += 1,
                TransferStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }

    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.active == 0
    }
}

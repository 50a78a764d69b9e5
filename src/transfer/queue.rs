//! Ordered item list shared by the upload and download engines.
//!
//! All mutation goes through this type and happens inside short, synchronous
//! critical sections, so the drain task and the public engine methods can be
//! called from any thread. Every mutation bumps a change counter on a watch
//! channel; observers re-read [`TransferQueue::snapshot`].

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::watch;

use super::item::{QueueSummary, TransferId, TransferItem, TransferKind, TransferStatus};

#[derive(Default)]
struct QueueState {
    items: Vec<TransferItem>,
    /// A drain task is running (or about to).
    draining: bool,
    next_seq: u64,
}

pub(crate) struct TransferQueue {
    kind: TransferKind,
    state: Mutex<QueueState>,
    changes: watch::Sender<u64>,
}

impl TransferQueue {
    pub fn new(kind: TransferKind) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            kind,
            state: Mutex::new(QueueState::default()),
            changes,
        }
    }

    // Critical sections never leave the state half-updated, so a poisoned
    // lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    /// Build a pending item with a fresh id. Not yet part of the queue.
    pub fn new_item(&self, key: String, file_name: String) -> TransferItem {
        let seq = {
            let mut state = self.lock();
            state.next_seq += 1;
            state.next_seq
        };
        let created_at = Utc::now();
        TransferItem::new(
            TransferId::new(created_at, seq, &file_name),
            self.kind,
            key,
            file_name,
            created_at,
        )
    }

    pub fn push(&self, items: Vec<TransferItem>) {
        if items.is_empty() {
            return;
        }
        self.lock().items.extend(items);
        self.notify();
    }

    /// Claim the right to run the drain loop. Returns `false` when a loop is
    /// already running or there is nothing to do.
    pub fn try_start_drain(&self) -> bool {
        let mut state = self.lock();
        if state.draining || !state.items.iter().any(|i| i.status == TransferStatus::Pending) {
            return false;
        }
        state.draining = true;
        true
    }

    /// Mark the first pending item active and hand back a copy of it. When
    /// nothing is pending, releases the drain claim and returns `None`.
    pub fn claim_next(&self) -> Option<TransferItem> {
        let claimed = {
            let mut state = self.lock();
            match state
                .items
                .iter_mut()
                .find(|i| i.status == TransferStatus::Pending)
            {
                Some(item) => {
                    item.status = TransferStatus::Active;
                    item.progress = 0.0;
                    item.transferred = 0;
                    Some(item.clone())
                }
                None => {
                    state.draining = false;
                    None
                }
            }
        };
        // Releasing the claim is a change too: `wait_idle` watches for it
        self.notify();
        claimed
    }

    /// Apply `f` to the item with `id`. Returns the updated copy, or `None`
    /// when the item has been removed in the meantime.
    pub fn update(
        &self,
        id: &TransferId,
        f: impl FnOnce(&mut TransferItem),
    ) -> Option<TransferItem> {
        let updated = {
            let mut state = self.lock();
            let item = state.items.iter_mut().find(|i| &i.id == id)?;
            f(item);
            item.clone()
        };
        self.notify();
        Some(updated)
    }

    /// Make a failed item pending again, in place.
    pub fn retry(&self, id: &TransferId) -> bool {
        let retried = {
            let mut state = self.lock();
            match state
                .items
                .iter_mut()
                .find(|i| &i.id == id && i.status == TransferStatus::Failed)
            {
                Some(item) => {
                    item.reset();
                    true
                }
                None => false,
            }
        };
        if retried {
            self.notify();
        }
        retried
    }

    pub fn retry_all_failed(&self) -> usize {
        let count = {
            let mut state = self.lock();
            let mut count = 0;
            for item in state
                .items
                .iter_mut()
                .filter(|i| i.status == TransferStatus::Failed)
            {
                item.reset();
                count += 1;
            }
            count
        };
        if count > 0 {
            self.notify();
        }
        count
    }

    pub fn remove(&self, id: &TransferId) -> bool {
        let removed = {
            let mut state = self.lock();
            let before = state.items.len();
            state.items.retain(|i| &i.id != id);
            state.items.len() != before
        };
        if removed {
            log::debug!("{:?} queue: removed {id}", self.kind);
            self.notify();
        }
        removed
    }

    pub fn clear_completed(&self) -> usize {
        let removed = {
            let mut state = self.lock();
            let before = state.items.len();
            state.items.retain(|i| i.status != TransferStatus::Success);
            before - state.items.len()
        };
        if removed > 0 {
            log::debug!("{:?} queue: cleared {removed} completed item(s)", self.kind);
            self.notify();
        }
        removed
    }

    /// Empty the queue unless something is still pending or active.
    /// Returns `false` when refused.
    pub fn clear_all(&self) -> bool {
        let cleared = {
            let mut state = self.lock();
            if state.items.iter().any(TransferItem::is_in_flight) {
                None
            } else {
                let count = state.items.len();
                state.items.clear();
                Some(count)
            }
        };
        match cleared {
            None => {
                log::debug!("{:?} queue: clear all refused, transfers in flight", self.kind);
                false
            }
            Some(0) => true,
            Some(count) => {
                log::debug!("{:?} queue: cleared all {count} item(s)", self.kind);
                self.notify();
                true
            }
        }
    }

    pub fn snapshot(&self) -> Vec<TransferItem> {
        self.lock().items.clone()
    }

    pub fn summary(&self) -> QueueSummary {
        QueueSummary::from_items(self.lock().items.iter())
    }

    fn is_idle(&self) -> bool {
        let state = self.lock();
        !state.draining && QueueSummary::from_items(state.items.iter()).is_idle()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Resolve once no item is pending or active and the drain loop has
    /// exited, so completion callbacks have run.
    pub async fn wait_idle(&self) {
        let mut changes = self.changes.subscribe();
        loop {
            if self.is_idle() {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn drain_guard(&self) -> DrainGuard<'_> {
        DrainGuard { queue: self }
    }
}

/// Held by a running drain task. If the task unwinds, the active item is
/// failed and the drain claim released so the next enqueue can restart it.
pub(crate) struct DrainGuard<'a> {
    queue: &'a TransferQueue,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        {
            let mut state = self.queue.lock();
            state.draining = false;
            for item in state
                .items
                .iter_mut()
                .filter(|i| i.status == TransferStatus::Active)
            {
                item.status = TransferStatus::Failed;
                item.error_message = Some("Transfer aborted unexpectedly".to_string());
            }
        }
        self.queue.notify();
    }
}

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use s3q::storage::{MemoryStore, StorageError, StoreOp};
use s3q::transfer::{TransferItem, TransferStatus, UploadManager};
use tempfile::TempDir;

fn write_files(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            std::fs::write(&path, format!("contents of {name}")).unwrap();
            path
        })
        .collect()
}

async fn wait_for(manager: &UploadManager, pred: impl Fn(&[TransferItem]) -> bool) {
    for _ in 0..1000 {
        if pred(&manager.snapshot()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached: {:?}", manager.snapshot());
}

#[tokio::test]
async fn uploads_complete_in_insertion_order() {
    let dir = TempDir::new().unwrap();
    let files = write_files(dir.path(), &["c.txt", "a.txt", "b.txt"]);
    let store = Arc::new(MemoryStore::new());
    let manager = UploadManager::new(store.clone());

    manager.add_to_queue(files[..2].to_vec(), "up/");
    manager.add_to_queue(files[2..].to_vec(), "up/");
    manager.wait_idle().await;

    assert_eq!(
        store.calls(StoreOp::Upload),
        vec!["up/c.txt", "up/a.txt", "up/b.txt"]
    );
    assert!(manager
        .snapshot()
        .iter()
        .all(|i| i.status == TransferStatus::Success));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn at_most_one_upload_is_active() {
    let dir = TempDir::new().unwrap();
    let files = write_files(dir.path(), &["1.bin", "2.bin", "3.bin", "4.bin"]);
    let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(10)));
    let manager = UploadManager::new(store);

    let max_active = Arc::new(AtomicUsize::new(0));
    let observer = {
        let manager = manager.clone();
        let max_active = max_active.clone();
        let mut changes = manager.subscribe();
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let active = manager
                    .snapshot()
                    .iter()
                    .filter(|i| i.status == TransferStatus::Active)
                    .count();
                max_active.fetch_max(active, Ordering::SeqCst);
            }
        })
    };

    manager.add_to_queue(files[..2].to_vec(), "");
    // Enqueuing while the loop runs must not start a second one
    manager.add_to_queue(files[2..].to_vec(), "");
    manager.wait_idle().await;
    observer.abort();

    assert_eq!(manager.summary().success, 4);
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn clear_all_only_empties_a_settled_queue() {
    let dir = TempDir::new().unwrap();
    let files = write_files(dir.path(), &["a.txt", "b.txt"]);
    let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(50)));
    let manager = UploadManager::new(store);

    manager.add_to_queue(files, "");
    let before = manager.snapshot();
    assert!(!manager.clear_all());
    let after = manager.snapshot();
    assert_eq!(
        before.iter().map(|i| &i.id).collect::<Vec<_>>(),
        after.iter().map(|i| &i.id).collect::<Vec<_>>()
    );

    manager.wait_idle().await;
    assert!(manager.clear_all());
    assert!(manager.snapshot().is_empty());
}

#[tokio::test]
async fn retry_resets_state_and_reattempts() {
    let dir = TempDir::new().unwrap();
    let files = write_files(dir.path(), &["a.txt"]);
    let store = Arc::new(MemoryStore::new());
    store.fail_times(
        StoreOp::Upload,
        StorageError::transport("connection reset"),
        1,
    );
    let manager = UploadManager::new(store.clone());

    let ids = manager.add_to_queue(files, "uploads/");
    manager.wait_idle().await;
    let failed = &manager.snapshot()[0];
    assert_eq!(failed.status, TransferStatus::Failed);
    assert!(failed.error_message.as_deref().unwrap().contains("connection reset"));

    assert!(manager.retry(&ids[0]));
    let retried = &manager.snapshot()[0];
    assert!(retried.error_message.is_none());
    assert_eq!(retried.progress, 0.0);
    assert!(retried.is_in_flight());

    manager.wait_idle().await;
    assert_eq!(manager.snapshot()[0].status, TransferStatus::Success);
    assert_eq!(store.calls(StoreOp::Upload).len(), 2);
}

#[tokio::test]
async fn retried_item_keeps_its_position() {
    let dir = TempDir::new().unwrap();
    let mut files = write_files(dir.path(), &["a.txt", "c.txt"]);
    let missing = dir.path().join("b.txt");
    files.insert(1, missing.clone());
    let store = Arc::new(MemoryStore::new());
    let manager = UploadManager::new(store.clone());

    let ids = manager.add_to_queue(files, "");
    manager.wait_idle().await;
    let statuses: Vec<_> = manager.snapshot().iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        vec![
            TransferStatus::Success,
            TransferStatus::Failed,
            TransferStatus::Success
        ]
    );
    assert!(manager.snapshot()[1]
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("Local file error"));

    std::fs::write(&missing, "now it exists").unwrap();
    assert!(manager.retry(&ids[1]));
    manager.wait_idle().await;

    let snapshot = manager.snapshot();
    let order: Vec<_> = snapshot.iter().map(|i| i.id.clone()).collect();
    assert_eq!(order, ids);
    assert!(snapshot.iter().all(|i| i.status == TransferStatus::Success));
    assert_eq!(store.get("b.txt").unwrap(), b"now it exists");
}

#[tokio::test]
async fn successful_uploads_carry_public_urls() {
    let dir = TempDir::new().unwrap();
    let files = write_files(dir.path(), &["a.txt", "b.txt"]);
    let store = Arc::new(MemoryStore::new().with_base_url("https://cdn.example.com/"));
    let manager = UploadManager::new(store.clone());

    manager.add_to_queue(files, "uploads/");
    manager.wait_idle().await;

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.len(), 2);
    let expected = [
        ("uploads/a.txt", "https://cdn.example.com/uploads/a.txt"),
        ("uploads/b.txt", "https://cdn.example.com/uploads/b.txt"),
    ];
    for (item, (key, url)) in snapshot.iter().zip(expected) {
        assert_eq!(item.status, TransferStatus::Success);
        assert_eq!(item.key, key);
        assert_eq!(item.result_url.as_deref(), Some(url));
        assert_eq!(item.progress, 1.0);
        assert_eq!(item.size, Some(item.transferred));
    }
    assert_eq!(store.get("uploads/a.txt").unwrap(), b"contents of a.txt");
}

#[tokio::test]
async fn authorization_failure_then_retry_succeeds() {
    let dir = TempDir::new().unwrap();
    let files = write_files(dir.path(), &["a.txt"]);
    let store = Arc::new(MemoryStore::new());
    store.fail_always(
        StoreOp::Upload,
        StorageError::unauthorized("InvalidAccessKeyId"),
    );
    let manager = UploadManager::new(store.clone());

    let ids = manager.add_to_queue(files, "uploads/");
    manager.wait_idle().await;
    let item = &manager.snapshot()[0];
    assert_eq!(item.status, TransferStatus::Failed);
    assert!(!item.error_message.as_deref().unwrap_or_default().is_empty());
    assert!(item.result_url.is_none());

    store.clear_failures();
    assert!(manager.retry(&ids[0]));
    manager.wait_idle().await;
    assert_eq!(manager.snapshot()[0].status, TransferStatus::Success);
}

#[tokio::test]
async fn removing_an_active_upload_discards_its_result() {
    let dir = TempDir::new().unwrap();
    let files = write_files(dir.path(), &["a.txt"]);
    let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(100)));
    let completed = Arc::new(AtomicUsize::new(0));
    let manager = {
        let completed = completed.clone();
        UploadManager::with_callback(
            store.clone(),
            Arc::new(move |_: &TransferItem| {
                completed.fetch_add(1, Ordering::SeqCst);
            }),
        )
    };

    let ids = manager.add_to_queue(files, "");
    wait_for(&manager, |items| {
        items.first().is_some_and(|i| i.status == TransferStatus::Active)
    })
    .await;
    assert!(manager.remove(&ids[0]));
    manager.wait_idle().await;

    assert!(manager.snapshot().is_empty());
    assert_eq!(completed.load(Ordering::SeqCst), 0);
    // The transfer itself was not cancelled
    assert!(store.get("a.txt").is_some());
}

#[tokio::test]
async fn completion_callback_sees_each_success() {
    let dir = TempDir::new().unwrap();
    let files = write_files(dir.path(), &["a.txt", "b.txt"]);
    let store = Arc::new(MemoryStore::new());
    store.fail_times(StoreOp::Upload, StorageError::other("boom"), 1);
    let keys = Arc::new(std::sync::Mutex::new(Vec::new()));
    let manager = {
        let keys = keys.clone();
        UploadManager::with_callback(
            store,
            Arc::new(move |item: &TransferItem| {
                assert_eq!(item.status, TransferStatus::Success);
                keys.lock().unwrap().push(item.key.clone());
            }),
        )
    };

    manager.add_to_queue(files, "docs/");
    manager.wait_idle().await;

    assert_eq!(*keys.lock().unwrap(), vec!["docs/b.txt".to_string()]);
}

#[tokio::test]
async fn empty_enqueue_is_a_no_op() {
    let store = Arc::new(MemoryStore::new());
    let manager = UploadManager::new(store.clone());
    let changes = manager.subscribe();

    let ids = manager.add_to_queue(Vec::<PathBuf>::new(), "uploads/");

    assert!(ids.is_empty());
    assert!(manager.snapshot().is_empty());
    assert!(!changes.has_changed().unwrap());
    manager.wait_idle().await;
    assert!(store.calls(StoreOp::Upload).is_empty());
}

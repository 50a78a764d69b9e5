//! Object-store capability used by the transfer queues.
//!
//! The queues only ever talk to [`ObjectStore`]; which backend sits behind it
//! is decided once, in [`connect`], from the configured server profile.

mod error;
mod memory;
mod r2;
mod s3;

pub use error::StorageError;
pub use memory::{MemoryStore, StoreOp};
pub use r2::R2Store;
pub use s3::{S3Options, S3Store};

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::AsyncRead;

use crate::models::config::{Provider, ServerProfile};

/// Sequential byte stream of an object's body.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// One entry of a delimiter listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    /// Common prefix ("folder") rather than an object.
    pub is_prefix: bool,
}

impl ObjectEntry {
    /// Last path segment, without the trailing `/` of folders.
    pub fn name(&self) -> &str {
        file_name_of_key(self.key.trim_end_matches('/'))
    }
}

/// An opened object body together with the length the transport reported.
pub struct ObjectDownload {
    pub reader: ObjectReader,
    pub content_length: Option<u64>,
}

/// Operations against one bucket of an S3-compatible store.
///
/// Every call may fail with a transport or authorization error. Implementations
/// must be safe to call from the upload and download queues at the same time.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List folders and objects directly under `prefix`.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StorageError>;

    /// Store `size` bytes read from `body` under `key`, replacing any existing object.
    async fn upload_stream(&self, key: &str, body: File, size: u64) -> Result<(), StorageError>;

    /// Open the object under `key` for sequential reading.
    async fn download_stream(&self, key: &str) -> Result<ObjectDownload, StorageError>;

    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;

    /// Server-side copy to `new_key`, then delete `old_key`.
    async fn rename_object(&self, old_key: &str, new_key: &str) -> Result<(), StorageError>;

    /// Create an empty folder marker object. A missing trailing `/` is appended.
    async fn create_folder(&self, path: &str) -> Result<(), StorageError>;

    /// Externally reachable URL of `key`.
    fn file_url(&self, key: &str) -> String;
}

/// Build the backend matching `profile`.
pub async fn connect(profile: &ServerProfile) -> anyhow::Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match profile.provider {
        Provider::Memory => Arc::new(
            MemoryStore::new().with_base_url(profile.public_base_url.clone().unwrap_or_default()),
        ),
        _ if profile.is_r2() => Arc::new(R2Store::connect(profile).await?),
        _ => Arc::new(S3Store::connect(S3Options::from_profile(profile)).await?),
    };
    log::info!(
        "Connected profile '{}' to bucket '{}' ({:?})",
        profile.name,
        profile.bucket,
        profile.provider
    );
    Ok(store)
}

/// Last `/`-separated segment of an object key.
pub fn file_name_of_key(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Portion of `key` up to and including the last `/`; empty for root-level keys.
pub fn prefix_of(key: &str) -> &str {
    match key.rfind('/') {
        Some(idx) => &key[..=idx],
        None => "",
    }
}

/// `base` + `/` + `path`, with exactly one slash at the seam.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

/// Percent-encode each key segment, keeping `/` separators.
pub(crate) fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

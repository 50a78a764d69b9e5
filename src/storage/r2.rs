use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::fs::File;

use super::{
    encode_key, join_url, ObjectDownload, ObjectEntry, ObjectStore, S3Options, S3Store,
    StorageError,
};
use crate::models::config::ServerProfile;

/// Cloudflare R2 backend.
///
/// R2 speaks the S3 API on `https://<account>.r2.cloudflarestorage.com` with
/// region `auto`, but only accepts checksums when the operation requires them,
/// and serves public objects from an `r2.dev` or custom domain rather than the
/// API endpoint.
pub struct R2Store {
    inner: S3Store,
    endpoint: String,
    public_base_url: Option<String>,
}

impl R2Store {
    pub async fn connect(profile: &ServerProfile) -> Result<Self> {
        let endpoint = match (&profile.endpoint_url, &profile.account_id) {
            (Some(endpoint), _) => endpoint.clone(),
            (None, Some(account)) => r2_endpoint(account),
            (None, None) => bail!(
                "Profile '{}' needs either an endpoint URL or an R2 account id",
                profile.name
            ),
        };

        let options = S3Options {
            region: "auto".to_string(),
            endpoint_url: Some(endpoint.clone()),
            path_style: true,
            relaxed_checksums: true,
            // Public URLs are resolved here, not by the inner client
            public_base_url: None,
            ..S3Options::from_profile(profile)
        };

        Ok(Self {
            inner: S3Store::connect(options).await?,
            endpoint,
            public_base_url: profile.public_base_url.clone(),
        })
    }
}

pub(crate) fn r2_endpoint(account_id: &str) -> String {
    format!("https://{account_id}.r2.cloudflarestorage.com")
}

#[async_trait]
impl ObjectStore for R2Store {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StorageError> {
        self.inner.list_objects(prefix).await
    }

    async fn upload_stream(&self, key: &str, body: File, size: u64) -> Result<(), StorageError> {
        self.inner.upload_stream(key, body, size).await
    }

    async fn download_stream(&self, key: &str) -> Result<ObjectDownload, StorageError> {
        self.inner.download_stream(key).await
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete_object(key).await
    }

    async fn rename_object(&self, old_key: &str, new_key: &str) -> Result<(), StorageError> {
        self.inner.rename_object(old_key, new_key).await
    }

    async fn create_folder(&self, path: &str) -> Result<(), StorageError> {
        self.inner.create_folder(path).await
    }

    fn file_url(&self, key: &str) -> String {
        let encoded = encode_key(key);
        match &self.public_base_url {
            Some(base) => join_url(base, &encoded),
            None => join_url(&self.endpoint, &format!("{}/{encoded}", self.inner.bucket())),
        }
    }
}

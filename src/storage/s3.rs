use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{RequestChecksumCalculation, ResponseChecksumValidation};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, Length};
use aws_sdk_s3::Client;
use chrono::DateTime;
use tokio::fs::File;

use super::{encode_key, join_url, ObjectDownload, ObjectEntry, ObjectStore, StorageError};
use crate::models::config::ServerProfile;

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone, Default)]
pub struct S3Options {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, R2, Ceph...).
    pub endpoint_url: Option<String>,
    /// Address buckets as `endpoint/bucket/key` (MinIO, Ceph).
    pub path_style: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Named profile from `~/.aws/credentials`, used when no static keys are set.
    pub aws_profile: Option<String>,
    /// Roles assumed in order on top of the base credentials.
    pub role_chain: Vec<String>,
    pub public_base_url: Option<String>,
    /// Only compute/validate checksums when the operation requires them.
    pub relaxed_checksums: bool,
}

impl S3Options {
    pub fn from_profile(profile: &ServerProfile) -> Self {
        Self {
            bucket: profile.bucket.clone(),
            region: profile.region.clone(),
            endpoint_url: profile.endpoint_url.clone(),
            path_style: profile.uses_path_style(),
            access_key_id: profile.access_key_id.clone(),
            secret_access_key: profile.secret_access_key.clone(),
            aws_profile: profile.aws_profile.clone(),
            role_chain: profile.role_chain.clone(),
            public_base_url: profile.public_base_url.clone(),
            relaxed_checksums: false,
        }
    }
}

/// AWS S3 and generic S3-compatible backend.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
    public_base_url: Option<String>,
}

impl S3Store {
    pub async fn connect(options: S3Options) -> Result<Self> {
        let region = aws_config::Region::new(options.region.clone());

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region.clone());
        match (&options.access_key_id, &options.secret_access_key) {
            (Some(key), Some(secret)) => {
                loader = loader.credentials_provider(Credentials::new(
                    key.as_str(),
                    secret.as_str(),
                    None,
                    None,
                    "s3q-static",
                ));
            }
            _ => {
                if let Some(profile) = &options.aws_profile {
                    loader = loader.profile_name(profile);
                }
            }
        }
        let mut config = loader.load().await;

        // Chain through multiple roles if provided
        for (index, role) in options.role_chain.iter().enumerate() {
            let sts_client = aws_sdk_sts::Client::new(&config);

            let assumed_role = sts_client
                .assume_role()
                .role_arn(role)
                .role_session_name(format!(
                    "s3q-chain-{}-{}",
                    index,
                    chrono::Utc::now().timestamp()
                ))
                .send()
                .await
                .context(format!(
                    "Failed to assume role (step {} of {}): {role}",
                    index + 1,
                    options.role_chain.len()
                ))?;

            if let Some(creds) = assumed_role.credentials() {
                let expiration = std::time::SystemTime::try_from(*creds.expiration()).ok();

                let credentials = Credentials::new(
                    creds.access_key_id(),
                    creds.secret_access_key(),
                    Some(creds.session_token().to_string()),
                    expiration,
                    "AssumedRole",
                );

                config = aws_config::defaults(BehaviorVersion::latest())
                    .credentials_provider(credentials)
                    .region(region.clone())
                    .load()
                    .await;
            }
        }

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&config);

        if let Some(endpoint) = &options.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        if options.path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        if options.relaxed_checksums {
            s3_config_builder = s3_config_builder
                .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
                .response_checksum_validation(ResponseChecksumValidation::WhenRequired);
        }

        let client = Client::from_conf(s3_config_builder.build());

        Ok(Self {
            client,
            bucket: options.bucket,
            region: options.region,
            endpoint_url: options.endpoint_url,
            public_base_url: options.public_base_url,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn copy_object(&self, source_key: &str, dest_key: &str) -> Result<(), StorageError> {
        let copy_source = format!("{}/{}", self.bucket, encode_key(source_key));

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(&copy_source)
            .key(dest_key)
            .send()
            .await
            .map_err(|e| classify(e, source_key, "Failed to copy object"))?;

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StorageError> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .delimiter("/")
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| {
                    let bucket = &self.bucket;
                    classify(e, bucket, &format!("Failed to list objects in bucket '{bucket}'"))
                })?;

            for cp in resp.common_prefixes() {
                if let Some(prefix_str) = cp.prefix() {
                    objects.push(ObjectEntry {
                        key: prefix_str.to_string(),
                        size: 0,
                        last_modified: None,
                        is_prefix: true,
                    });
                }
            }

            for obj in resp.contents() {
                if let Some(key) = obj.key() {
                    if key != prefix && !key.ends_with('/') {
                        objects.push(ObjectEntry {
                            key: key.to_string(),
                            size: obj.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0),
                            last_modified: obj
                                .last_modified()
                                .and_then(|t| DateTime::from_timestamp(t.secs(), 0)),
                            is_prefix: false,
                        });
                    }
                }
            }

            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        sort_entries(&mut objects);
        Ok(objects)
    }

    async fn upload_stream(&self, key: &str, body: File, size: u64) -> Result<(), StorageError> {
        let body = ByteStream::read_from()
            .file(body)
            .length(Length::Exact(size))
            .build()
            .await
            .map_err(|e| StorageError::other(format!("Failed to read local file: {e}")))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(size as i64)
            .body(body)
            .send()
            .await
            .map_err(|e| classify(e, key, "Failed to upload object"))?;

        Ok(())
    }

    async fn download_stream(&self, key: &str) -> Result<ObjectDownload, StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, key, "Failed to get object"))?;

        let content_length = resp.content_length().and_then(|l| u64::try_from(l).ok());

        Ok(ObjectDownload {
            reader: Box::pin(resp.body.into_async_read()),
            content_length,
        })
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, key, "Failed to delete object"))?;

        Ok(())
    }

    async fn rename_object(&self, old_key: &str, new_key: &str) -> Result<(), StorageError> {
        self.copy_object(old_key, new_key).await?;
        self.delete_object(old_key).await
    }

    async fn create_folder(&self, path: &str) -> Result<(), StorageError> {
        let key = folder_key(path);

        // Create empty object with trailing slash to represent folder
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from_static(b""))
            .send()
            .await
            .map_err(|e| classify(e, &key, "Failed to create folder"))?;

        Ok(())
    }

    fn file_url(&self, key: &str) -> String {
        let encoded = encode_key(key);
        match (&self.public_base_url, &self.endpoint_url) {
            (Some(base), _) => join_url(base, &encoded),
            (None, Some(endpoint)) => join_url(endpoint, &format!("{}/{encoded}", self.bucket)),
            (None, None) => format!(
                "https://{}.s3.{}.amazonaws.com/{encoded}",
                self.bucket, self.region
            ),
        }
    }
}

/// Folders first, then by key.
pub(crate) fn sort_entries(objects: &mut [ObjectEntry]) {
    objects.sort_by(|a, b| b.is_prefix.cmp(&a.is_prefix).then_with(|| a.key.cmp(&b.key)));
}

pub(crate) fn folder_key(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Map an SDK failure onto the storage error taxonomy.
fn classify<E>(err: SdkError<E>, key: &str, context: &str) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = format!("{context}: {}", DisplayErrorContext(&err));
    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            StorageError::Transport { message }
        }
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            match (status, service.err().code()) {
                (401 | 403, _)
                | (
                    _,
                    Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch"),
                ) => StorageError::Unauthorized { message },
                (404, _) | (_, Some("NoSuchKey" | "NoSuchBucket" | "NotFound")) => {
                    StorageError::not_found(key)
                }
                _ => StorageError::Other { message },
            }
        }
        _ => StorageError::Other { message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, is_prefix: bool) -> ObjectEntry {
        ObjectEntry {
            key: key.to_string(),
            size: 0,
            last_modified: None,
            is_prefix,
        }
    }

    #[test]
    fn folders_sort_before_objects() {
        let mut entries = vec![
            entry("b.txt", false),
            entry("z/", true),
            entry("a.txt", false),
            entry("c/", true),
        ];
        sort_entries(&mut entries);
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["c/", "z/", "a.txt", "b.txt"]);
    }

    #[test]
    fn folder_keys_end_with_slash() {
        assert_eq!(folder_key("photos"), "photos/");
        assert_eq!(folder_key("photos/"), "photos/");
    }
}

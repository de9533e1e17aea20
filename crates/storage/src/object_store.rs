//! Object storage interface for the derived bucket and the public source archives.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::{
    aws::AmazonS3Builder, memory::InMemory, path::Path, Attribute, Attributes, ClientOptions,
    ObjectStore, PutOptions, PutPayload, RetryConfig,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};

/// Credentials and endpoint of the bucket artifacts are published to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// MinIO ignores this but the signer needs one
    pub region: String,
    /// Needed for a plain-HTTP MinIO endpoint
    pub allow_http: bool,
    /// Retries for transient failures
    pub max_retries: usize,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://minio:9000".to_string(),
            bucket: "derived".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            allow_http: true,
            max_retries: 5,
        }
    }
}

/// Configuration for an anonymous, read-only public archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceArchiveConfig {
    pub bucket: String,
    pub region: String,
    pub max_retries: usize,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl SourceArchiveConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: "us-east-1".to_string(),
            max_retries: 5,
            timeout_secs: 60,
        }
    }
}

/// Listing entry for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Object storage client.
#[derive(Clone)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl std::fmt::Debug for ObjectStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStorage")
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl ObjectStorage {
    /// Create a credentialed client for the derived bucket.
    pub fn new(config: &ObjectStorageConfig) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_bucket_name(&config.bucket)
            .with_access_key_id(&config.access_key_id)
            .with_secret_access_key(&config.secret_access_key)
            .with_region(&config.region)
            .with_retry(RetryConfig {
                max_retries: config.max_retries,
                ..Default::default()
            });

        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: config.bucket.clone(),
        })
    }

    /// Create an unsigned client for a public archive bucket.
    pub fn anonymous(config: &SourceArchiveConfig) -> StorageResult<Self> {
        let store = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_skip_signature(true)
            .with_retry(RetryConfig {
                max_retries: config.max_retries,
                ..Default::default()
            })
            .with_client_options(
                ClientOptions::new().with_timeout(Duration::from_secs(config.timeout_secs)),
            )
            .build()
            .map_err(|e| {
                StorageError::Config(format!("Failed to create client for {}: {}", config.bucket, e))
            })?;

        Ok(Self {
            store: Arc::new(store),
            bucket: config.bucket.clone(),
        })
    }

    /// Process-local store, used by tests and dry runs.
    pub fn in_memory(bucket: impl Into<String>) -> Self {
        Self::from_store(Arc::new(InMemory::new()), bucket)
    }

    pub fn from_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Overwriting write; `content_type` is stored as object metadata.
    #[instrument(skip(self, data), fields(bucket = %self.bucket, path = %path))]
    pub async fn put(&self, path: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        debug!(size = data.len(), content_type, "Writing object");

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&Path::from(path), PutPayload::from(data), options)
            .await
            .map(|_| ())
            .map_err(|e| StorageError::from_backend(path, e))
    }

    /// Whole object body. A missing key is [`StorageError::NotFound`].
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn get(&self, path: &str) -> StorageResult<Bytes> {
        let backend = |e| StorageError::from_backend(path, e);
        let body = self.store.get(&Path::from(path)).await.map_err(backend)?;
        let bytes = body.bytes().await.map_err(backend)?;
        debug!(size = bytes.len(), "Read object");
        Ok(bytes)
    }

    /// Read an object if it exists.
    pub async fn get_opt(&self, path: &str) -> StorageResult<Option<Bytes>> {
        match self.get(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// HEAD request.
    pub async fn exists(&self, path: &str) -> StorageResult<bool> {
        match self.store.head(&Path::from(path)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::from_backend(path, e)),
        }
    }

    /// List objects under a prefix, sorted by key.
    #[instrument(skip(self), fields(bucket = %self.bucket, prefix = %prefix))]
    pub async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        use futures::TryStreamExt;

        let listed: Vec<_> = self
            .store
            .list(Some(&Path::from(prefix)))
            .try_collect()
            .await
            .map_err(|e| StorageError::from_backend(prefix, e))?;

        let mut objects: Vec<ObjectInfo> = listed
            .into_iter()
            .map(|meta| ObjectInfo {
                key: meta.location.to_string(),
                last_modified: meta.last_modified,
                size: meta.size as u64,
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(count = objects.len(), "Listed objects");
        Ok(objects)
    }
}

//! Store construction for the supported dataset backends.
//!
//! The NWM retrospective archive is a public (anonymous) S3 bucket; the
//! groundwater subsets live in GCS; local filesystem stores are used for
//! fixtures and offline work. Object-store backends are wrapped in an
//! async-to-sync adapter so the synchronous zarrs API can be used from
//! within a tokio runtime.

use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use serde::{Deserialize, Serialize};
use zarrs::storage::ReadableStorage;
use zarrs_filesystem::FilesystemStore;
use zarrs_object_store::AsyncObjectStore;
use zarrs_storage::storage_adapter::async_to_sync::{
    AsyncToSyncBlockOn, AsyncToSyncStorageAdapter,
};

use crate::error::{DatasetError, Result};

/// Blocking executor that works from within a tokio runtime.
///
/// Uses `tokio::task::block_in_place` to move the current task to a blocking
/// thread, then uses the runtime handle to drive the future. This avoids the
/// "cannot start a runtime from within a runtime" error.
#[derive(Clone, Copy)]
pub struct TokioBlockOn;

impl AsyncToSyncBlockOn for TokioBlockOn {
    fn block_on<F: core::future::Future>(&self, future: F) -> F::Output {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
    }
}

/// The kind of store a dataset lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local filesystem store.
    Local,
    /// S3-compatible object store (AWS S3, MinIO).
    S3,
    /// Google Cloud Storage.
    Gcs,
}

/// Connection configuration for a dataset store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Which backend to use.
    pub backend: BackendKind,
    /// Endpoint URL for S3, ignored for GCS; filesystem root for local stores.
    pub locator: String,
    /// Bucket name (object-store backends only).
    pub bucket: String,
    /// Region for S3 ("us-east-1" works for most public buckets).
    pub region: String,
    /// Skip request signing; the NWM retrospective bucket is public.
    pub anonymous: bool,
    /// Credentials for non-anonymous access.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl StoreConfig {
    /// Anonymous S3 configuration, the common case for NWM data.
    pub fn s3_anonymous(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::S3,
            locator: endpoint.into(),
            bucket: bucket.into(),
            region: "us-east-1".to_string(),
            anonymous: true,
            access_key_id: None,
            secret_access_key: None,
        }
    }

    /// Local filesystem store rooted at `root`.
    pub fn local(root: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Local,
            locator: root.into(),
            bucket: String::new(),
            region: String::new(),
            anonymous: true,
            access_key_id: None,
            secret_access_key: None,
        }
    }

    /// GCS store for the given bucket.
    pub fn gcs(bucket: impl Into<String>) -> Self {
        Self {
            backend: BackendKind::Gcs,
            locator: String::new(),
            bucket: bucket.into(),
            region: String::new(),
            anonymous: true,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

/// Create a readable zarrs storage for the configured backend.
pub fn create_storage(config: &StoreConfig) -> Result<ReadableStorage> {
    match config.backend {
        BackendKind::Local => {
            let store = FilesystemStore::new(&config.locator).map_err(|e| {
                DatasetError::open_failed(format!(
                    "failed to open filesystem store {}: {e}",
                    config.locator
                ))
            })?;
            Ok(Arc::new(store))
        }
        BackendKind::S3 => {
            let mut builder = AmazonS3Builder::new()
                .with_endpoint(&config.locator)
                .with_bucket_name(&config.bucket)
                .with_region(&config.region);

            if config.anonymous {
                builder = builder.with_skip_signature(true);
            } else if let (Some(key), Some(secret)) =
                (&config.access_key_id, &config.secret_access_key)
            {
                builder = builder
                    .with_access_key_id(key)
                    .with_secret_access_key(secret);
            }

            let s3 = builder.build().map_err(|e| {
                DatasetError::open_failed(format!("failed to create S3 client: {e}"))
            })?;

            let async_store = Arc::new(AsyncObjectStore::new(s3));
            Ok(Arc::new(AsyncToSyncStorageAdapter::new(
                async_store,
                TokioBlockOn,
            )))
        }
        BackendKind::Gcs => {
            let gcs = GoogleCloudStorageBuilder::new()
                .with_bucket_name(&config.bucket)
                .build()
                .map_err(|e| {
                    DatasetError::open_failed(format!("failed to create GCS client: {e}"))
                })?;

            let async_store = Arc::new(AsyncObjectStore::new(gcs));
            Ok(Arc::new(AsyncToSyncStorageAdapter::new(
                async_store,
                TokioBlockOn,
            )))
        }
    }
}

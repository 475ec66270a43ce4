//! Blob storage
//!
//! Supports S3-compatible services (MinIO, Cloudflare R2, Backblaze B2,
//! AWS S3) and a local filesystem backend for development.

mod local;
mod s3_client;
mod types;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;

pub use local::LocalBlobStore;
pub use s3_client::S3BlobStore;
pub use types::*;

/// Bucket + key addressed object storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `data` under `bucket/key`
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: &PutOptions,
    ) -> std::result::Result<StoredObjectRef, BlobWriteError>;

    /// Short backend description for logs
    fn describe(&self) -> String;
}

/// Build the configured backend
pub async fn connect(config: &StorageConfig, buckets: &[&str]) -> Result<Arc<dyn BlobStore>> {
    let store: Arc<dyn BlobStore> = match config.backend {
        StorageBackend::S3 => Arc::new(S3BlobStore::new(config, buckets).await?),
        StorageBackend::Local => Arc::new(LocalBlobStore::new(config.local_path.clone())),
    };
    Ok(store)
}

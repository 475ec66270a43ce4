//! S3-compatible blob store
//!
//! Wraps the AWS SDK for S3-compatible storage access.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata},
    primitives::ByteStream,
    Client,
};
use axum::body::Bytes;

use crate::config::{StorageConfig, StorageProvider};
use crate::error::{Result, StorageError};

use super::types::{BlobWriteError, OverwritePolicy, PutOptions, StoredObjectRef};
use super::BlobStore;

/// S3-compatible blob store
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    provider: StorageProvider,
    endpoint: String,
}

impl S3BlobStore {
    /// Create a new S3 client from configuration
    ///
    /// Each bucket in `buckets` is probed once; a missing bucket is logged,
    /// not fatal.
    pub async fn new(config: &StorageConfig, buckets: &[&str]) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(StorageError::ConnectionFailed("S3_ENDPOINT is not set".to_string()).into());
        }

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "tunehub",
        );

        let region = config
            .region
            .clone()
            .unwrap_or_else(|| config.provider.default_region().to_string());

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint)
            .region(Region::new(region))
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO and other S3-compatible services
            .build();

        let client = Client::from_conf(s3_config);

        for bucket in buckets {
            match client.head_bucket().bucket(*bucket).send().await {
                Ok(_) => {
                    tracing::info!("Connected to S3 bucket: {}", bucket);
                }
                Err(e) => {
                    tracing::warn!(
                        "Could not verify bucket {}: {}. Will attempt operations anyway.",
                        bucket,
                        DisplayErrorContext(&e)
                    );
                }
            }
        }

        Ok(Self {
            client,
            provider: config.provider,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: &PutOptions,
    ) -> std::result::Result<StoredObjectRef, BlobWriteError> {
        if key.is_empty() {
            return Err(BlobWriteError::InvalidKey(key.to_string()));
        }

        let size = data.len();
        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .cache_control(options.cache_control.header_value());

        if let Some(content_type) = &options.content_type {
            request = request.content_type(content_type);
        }

        if options.overwrite == OverwritePolicy::RejectIfExists {
            request = request.if_none_match("*");
        }

        request.send().await.map_err(|e| {
            let status = e.raw_response().map(|r| r.status().as_u16());
            if status == Some(412) || e.code() == Some("PreconditionFailed") {
                BlobWriteError::AlreadyExists {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                BlobWriteError::Rejected {
                    bucket: bucket.to_string(),
                    reason: DisplayErrorContext(&e).to_string(),
                }
            }
        })?;

        tracing::debug!(bucket = %bucket, key = %key, size = size, "Stored object in S3");

        Ok(StoredObjectRef {
            path: key.to_string(),
        })
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.provider.name(), self.endpoint)
    }
}

//! Local filesystem blob store
//!
//! Objects live at `<root>/<bucket>/<url-encoded key>`, so titles containing
//! path separators cannot escape the bucket directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use axum::body::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::types::{BlobWriteError, OverwritePolicy, PutOptions, StoredObjectRef};
use super::BlobStore;

/// Filesystem-backed blob store
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, BlobWriteError> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == "." || bucket == ".." {
            return Err(BlobWriteError::InvalidKey(format!("bucket {:?}", bucket)));
        }
        Ok(self.root.join(bucket))
    }

    /// Filesystem path backing `bucket/key`
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, BlobWriteError> {
        let encoded = urlencoding::encode(key);
        if encoded.is_empty() || encoded == "." || encoded == ".." {
            return Err(BlobWriteError::InvalidKey(key.to_string()));
        }
        Ok(self.bucket_dir(bucket)?.join(encoded.as_ref()))
    }

    /// Read an object back
    pub async fn read(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BlobWriteError> {
        let path = self.object_path(bucket, key)?;
        Ok(tokio::fs::read(&path).await?)
    }
}

/// Write `data` through `writer`, removing `path` if the write fails
///
/// A failed put must not leave a partial object under its key.
async fn write_or_discard<W>(mut writer: W, path: &Path, data: &[u8]) -> Result<(), BlobWriteError>
where
    W: AsyncWrite + Unpin,
{
    let written = match writer.write_all(data).await {
        Ok(()) => writer.flush().await,
        Err(e) => Err(e),
    };
    drop(writer);

    if let Err(e) = written {
        if let Err(cleanup) = tokio::fs::remove_file(path).await {
            tracing::warn!(
                path = %path.display(),
                error = %cleanup,
                "Failed to remove partial object"
            );
        }
        return Err(BlobWriteError::Io(e));
    }

    Ok(())
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        options: &PutOptions,
    ) -> Result<StoredObjectRef, BlobWriteError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut open = tokio::fs::OpenOptions::new();
        open.write(true);
        match options.overwrite {
            OverwritePolicy::RejectIfExists => open.create_new(true),
            OverwritePolicy::Replace => open.create(true).truncate(true),
        };

        let file = open.open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                BlobWriteError::AlreadyExists {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                BlobWriteError::Io(e)
            }
        })?;

        write_or_discard(file, &path, &data).await?;

        tracing::debug!(
            bucket = %bucket,
            key = %key,
            size = data.len(),
            path = %path.display(),
            "Stored object on local disk"
        );

        Ok(StoredObjectRef {
            path: key.to_string(),
        })
    }

    fn describe(&self) -> String {
        format!("local ({})", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path().to_path_buf());

        let stored = store
            .put("songs", "song-Lo-Fi Beat-abc", Bytes::from_static(b"audio"), &PutOptions::new())
            .await
            .unwrap();

        assert_eq!(stored.path, "song-Lo-Fi Beat-abc");
        assert_eq!(store.read("songs", "song-Lo-Fi Beat-abc").await.unwrap(), b"audio");
    }

    #[tokio::test]
    async fn test_reject_if_exists() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path().to_path_buf());
        let options = PutOptions::new();

        store
            .put("images", "image-x-1", Bytes::from_static(b"first"), &options)
            .await
            .unwrap();

        let result = store
            .put("images", "image-x-1", Bytes::from_static(b"second"), &options)
            .await;

        assert!(matches!(result, Err(BlobWriteError::AlreadyExists { .. })));
        assert_eq!(store.read("images", "image-x-1").await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_replace_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path().to_path_buf());
        let options = PutOptions::new().with_overwrite(OverwritePolicy::Replace);

        store.put("images", "k", Bytes::from_static(b"first"), &options).await.unwrap();
        store.put("images", "k", Bytes::from_static(b"second"), &options).await.unwrap();

        assert_eq!(store.read("images", "k").await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_key_with_separator_stays_in_bucket() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path().to_path_buf());

        store
            .put("songs", "song-../../etc-1", Bytes::from_static(b"x"), &PutOptions::new())
            .await
            .unwrap();

        let path = store.object_path("songs", "song-../../etc-1").unwrap();
        assert_eq!(path.parent().unwrap(), temp_dir.path().join("songs"));
        assert!(path.exists());
    }

    /// Writer failing every write
    struct BrokenWriter;

    impl AsyncWrite for BrokenWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_object() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("song-x-1");
        tokio::fs::write(&path, b"").await.unwrap();

        let result = write_or_discard(BrokenWriter, &path, b"audio").await;

        assert!(matches!(result, Err(BlobWriteError::Io(_))));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_successful_write_keeps_object() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("song-x-1");
        let file = tokio::fs::File::create(&path).await.unwrap();

        write_or_discard(file, &path, b"audio").await.unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"audio");
    }

    #[tokio::test]
    async fn test_invalid_bucket() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(temp_dir.path().to_path_buf());

        let result = store
            .put("../songs", "k", Bytes::from_static(b"x"), &PutOptions::new())
            .await;
        assert!(matches!(result, Err(BlobWriteError::InvalidKey(_))));
    }
}

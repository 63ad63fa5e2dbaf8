//! Blob store interface with in-memory and filesystem backends.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tracing::debug;

use relay_core::BoxFuture;

use crate::error::{TransportError, TransportResult};

/// Put/get byte payloads by bucket and key.
pub trait BlobStore: Send + Sync {
    fn put<'a>(&'a self, bucket: &'a str, key: &'a str, data: Bytes)
    -> BoxFuture<'a, TransportResult<()>>;

    fn get<'a>(&'a self, bucket: &'a str, key: &'a str) -> BoxFuture<'a, TransportResult<Bytes>>;
}

/// Ephemeral blob store (for testing and single-process runs).
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<(String, String), Bytes>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `bucket/key` has been written.
    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.blobs
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(&(bucket.to_string(), key.to_string()))
    }
}

impl BlobStore for MemoryBlobStore {
    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        data: Bytes,
    ) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(async move {
            self.blobs
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert((bucket.to_string(), key.to_string()), data);
            Ok(())
        })
    }

    fn get<'a>(&'a self, bucket: &'a str, key: &'a str) -> BoxFuture<'a, TransportResult<Bytes>> {
        Box::pin(async move {
            self.blobs
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .get(&(bucket.to_string(), key.to_string()))
                .cloned()
                .ok_or_else(|| TransportError::BlobNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
        })
    }
}

/// Blob store rooted at a directory: one subdirectory per bucket, one file
/// per key.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, bucket: &str, key: &str) -> TransportResult<PathBuf> {
        validate_component(bucket)?;
        validate_component(key)?;
        Ok(self.root.join(bucket).join(key))
    }
}

/// Bucket names and keys map to single path components; anything that could
/// escape the root is rejected.
fn validate_component(name: &str) -> TransportResult<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(TransportError::InvalidKey(name.to_string()));
    }
    Ok(())
}

impl BlobStore for FsBlobStore {
    fn put<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        data: Bytes,
    ) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(async move {
            let path = self.path_for(bucket, key)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &data).await?;
            debug!(?path, bytes = data.len(), "blob written");
            Ok(())
        })
    }

    fn get<'a>(&'a self, bucket: &'a str, key: &'a str) -> BoxFuture<'a, TransportResult<Bytes>> {
        Box::pin(async move {
            let path = self.path_for(bucket, key)?;
            match tokio::fs::read(&path).await {
                Ok(data) => Ok(Bytes::from(data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(TransportError::BlobNotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    })
                }
                Err(e) => Err(e.into()),
            }
        })
    }
}

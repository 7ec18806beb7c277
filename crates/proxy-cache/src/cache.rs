//! The cache contract shared by the local store and the proxying cache

use crate::error::Result;
use async_trait::async_trait;
use disk_blob_store::{BlobReader, DiskStore, StoreStats};

/// A content-addressed blob cache.
///
/// Keys are 64-character lowercase hex SHA-256 digests. `get` returning
/// `Ok(None)` means the key is absent everywhere the implementation looked —
/// that is not an error, it signals the artifact must be (re)produced.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Check for a key without transferring content. With `verify_hash`, the
    /// stored content is re-digested and a mismatch counts as absent.
    async fn contains(&self, key: &str, verify_hash: bool) -> bool;

    /// Stream a blob and its size out of the cache.
    async fn get(&self, key: &str, verify_hash: bool) -> Result<Option<(BlobReader, u64)>>;

    /// Stream a blob of exactly `size_bytes` into the cache. With
    /// `verify_digest`, the content's SHA-256 must equal `key` or the write
    /// is rejected.
    async fn put(
        &self,
        key: &str,
        size_bytes: u64,
        reader: BlobReader,
        verify_digest: bool,
    ) -> Result<()>;

    /// Statistics for the locally held tier
    async fn stats(&self) -> StoreStats;
}

#[async_trait]
impl Cache for DiskStore {
    async fn contains(&self, key: &str, verify_hash: bool) -> bool {
        DiskStore::contains(self, key, verify_hash).await
    }

    async fn get(&self, key: &str, verify_hash: bool) -> Result<Option<(BlobReader, u64)>> {
        Ok(DiskStore::get(self, key, verify_hash).await?)
    }

    async fn put(
        &self,
        key: &str,
        size_bytes: u64,
        reader: BlobReader,
        verify_digest: bool,
    ) -> Result<()> {
        Ok(DiskStore::put(self, key, size_bytes, reader, verify_digest).await?)
    }

    async fn stats(&self) -> StoreStats {
        DiskStore::stats(self).await
    }
}

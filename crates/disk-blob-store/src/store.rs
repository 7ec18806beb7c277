//! Disk-backed blob store with in-memory index

use crate::error::{Result, StoreError};
use crate::key::validate_key;
use crate::types::{BlobReader, EntryMeta, StoreStats};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const WRITE_BUF_SIZE: usize = 64 * 1024;

/// A size-bounded blob store addressed by content key
///
/// Blobs live as flat files named by their key. The index is rebuilt from the
/// directory on open, so the store survives restarts.
pub struct DiskStore {
    root: PathBuf,
    max_size_bytes: u64,
    entries: RwLock<HashMap<String, EntryMeta>>,
    current_size: AtomicU64,
    tmp_seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DiskStore {
    /// Open a store rooted at `root`, creating the directory if needed and
    /// scanning any pre-existing blobs back into the index.
    pub async fn open(root: impl Into<PathBuf>, max_size_bytes: u64) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;

        let mut entries = HashMap::new();
        let mut total = 0u64;
        let mut dir = fs::read_dir(&root).await?;
        while let Some(dirent) = dir.next_entry().await? {
            let meta = dirent.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let name = dirent.file_name().to_string_lossy().into_owned();
            if validate_key(&name).is_err() {
                if name.contains(".tmp") {
                    // leftover from an interrupted write
                    let _ = fs::remove_file(dirent.path()).await;
                } else {
                    warn!(file = %name, "ignoring unrecognized file in store directory");
                }
                continue;
            }
            let stored_at: DateTime<Utc> = meta
                .modified()
                .map(DateTime::from)
                .unwrap_or_else(|_| Utc::now());
            total += meta.len();
            entries.insert(
                name,
                EntryMeta {
                    size_bytes: meta.len(),
                    stored_at,
                },
            );
        }

        info!(
            root = ?root,
            entries = entries.len(),
            total_size_bytes = total,
            max_size_bytes,
            "disk store opened"
        );

        Ok(Self {
            root,
            max_size_bytes,
            entries: RwLock::new(entries),
            current_size: AtomicU64::new(total),
            tmp_seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Check whether a blob is present. With `verify_hash`, the stored file
    /// is re-digested and a mismatch is treated as absent (the corrupt entry
    /// is dropped).
    pub async fn contains(&self, key: &str, verify_hash: bool) -> bool {
        if validate_key(key).is_err() {
            return false;
        }
        let present = {
            let entries = self.entries.read().await;
            entries.contains_key(key)
        };
        if !present {
            return false;
        }
        if verify_hash && !self.digest_matches(key).await {
            warn!(key = %key, "stored blob failed hash verification, dropping entry");
            self.remove_entry(key).await;
            return false;
        }
        true
    }

    /// Stream a blob out of the store. Returns `None` when the key is absent.
    pub async fn get(&self, key: &str, verify_hash: bool) -> Result<Option<(BlobReader, u64)>> {
        validate_key(key)?;

        let meta = {
            let entries = self.entries.read().await;
            entries.get(key).cloned()
        };
        let Some(meta) = meta else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        if verify_hash && !self.digest_matches(key).await {
            warn!(key = %key, "stored blob failed hash verification, dropping entry");
            self.remove_entry(key).await;
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        match fs::File::open(self.blob_path(key)).await {
            Ok(file) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, size_bytes = meta.size_bytes, "store hit");
                Ok(Some((Box::new(file) as BlobReader, meta.size_bytes)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // index entry without a backing file, e.g. removed out of band
                warn!(key = %key, "indexed blob missing on disk, dropping entry");
                self.remove_entry(key).await;
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stream a blob into the store under `key`.
    ///
    /// The content is written to a temp file and committed with a rename, so
    /// concurrent readers see either the previous blob or the complete new
    /// one. The write fails, leaving the store untouched, when the byte count
    /// does not match `size_bytes`, when `verify_digest` is set and the
    /// content's SHA-256 does not equal `key`, or when the reader errors.
    pub async fn put(
        &self,
        key: &str,
        size_bytes: u64,
        mut reader: BlobReader,
        verify_digest: bool,
    ) -> Result<()> {
        validate_key(key)?;
        self.evict_for(size_bytes).await;

        let tmp = self.root.join(format!(
            "{key}.tmp{}",
            self.tmp_seq.fetch_add(1, Ordering::Relaxed)
        ));
        if let Err(e) = self
            .write_blob(&tmp, key, size_bytes, &mut reader, verify_digest)
            .await
        {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        if let Err(e) = fs::rename(&tmp, self.blob_path(key)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        let previous = {
            let mut entries = self.entries.write().await;
            entries.insert(
                key.to_string(),
                EntryMeta {
                    size_bytes,
                    stored_at: Utc::now(),
                },
            )
        };
        if let Some(previous) = previous {
            self.current_size
                .fetch_sub(previous.size_bytes, Ordering::Relaxed);
        }
        self.current_size.fetch_add(size_bytes, Ordering::Relaxed);

        debug!(key = %key, size_bytes, "blob committed");
        Ok(())
    }

    /// Current store statistics
    pub async fn stats(&self) -> StoreStats {
        let entries = self.entries.read().await;
        StoreStats {
            entries: entries.len(),
            total_size_bytes: self.current_size.load(Ordering::Relaxed),
            max_size_bytes: self.max_size_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    async fn write_blob(
        &self,
        tmp: &Path,
        key: &str,
        expected: u64,
        reader: &mut BlobReader,
        verify_digest: bool,
    ) -> Result<()> {
        let mut file = fs::File::create(tmp).await?;
        let mut hasher = verify_digest.then(Sha256::new);
        let mut written = 0u64;
        let mut buf = vec![0u8; WRITE_BUF_SIZE];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            written += n as u64;
            if written > expected {
                return Err(StoreError::SizeMismatch {
                    key: key.to_string(),
                    expected,
                    actual: written,
                });
            }
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(&buf[..n]);
            }
            file.write_all(&buf[..n]).await?;
        }

        if written != expected {
            return Err(StoreError::SizeMismatch {
                key: key.to_string(),
                expected,
                actual: written,
            });
        }
        if let Some(hasher) = hasher {
            let computed = hex::encode(hasher.finalize());
            if computed != key {
                return Err(StoreError::DigestMismatch {
                    key: key.to_string(),
                    computed,
                });
            }
        }
        file.flush().await?;
        Ok(())
    }

    /// Evict oldest entries until `incoming` more bytes fit under the cap
    async fn evict_for(&self, incoming: u64) {
        if self.current_size.load(Ordering::Relaxed) + incoming <= self.max_size_bytes {
            return;
        }
        let target = self.max_size_bytes.saturating_sub(incoming);

        loop {
            if self.current_size.load(Ordering::Relaxed) <= target {
                break;
            }
            let oldest = {
                let entries = self.entries.read().await;
                entries
                    .iter()
                    .min_by_key(|(_, e)| e.stored_at)
                    .map(|(k, _)| k.clone())
            };
            match oldest {
                Some(key) => {
                    self.remove_entry(&key).await;
                    debug!(key = %key, "evicted oldest entry");
                }
                None => break,
            }
        }
    }

    async fn remove_entry(&self, key: &str) {
        let entry = {
            let mut entries = self.entries.write().await;
            entries.remove(key)
        };
        if let Some(entry) = entry {
            self.current_size
                .fetch_sub(entry.size_bytes, Ordering::Relaxed);
            let _ = fs::remove_file(self.blob_path(key)).await;
        }
    }

    async fn digest_matches(&self, key: &str) -> bool {
        let Ok(mut file) = fs::File::open(self.blob_path(key)).await else {
            return false;
        };
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; WRITE_BUF_SIZE];
        loop {
            match file.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => hasher.update(&buf[..n]),
                Err(_) => return false,
            }
        }
        hex::encode(hasher.finalize()) == key
    }
}

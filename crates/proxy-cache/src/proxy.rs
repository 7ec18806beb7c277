//! Read-through, asynchronously write-through proxying cache

use crate::backend::HttpBackend;
use crate::cache::Cache;
use crate::error::Result;
use crate::replicate::{ReplicationOptions, Replicator};
use async_trait::async_trait;
use bytes::Bytes;
use disk_blob_store::{BlobReader, DiskStore, StoreStats};
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use std::io;
use std::sync::Arc;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::warn;

const TEE_CHUNK_SIZE: usize = 64 * 1024;
const TEE_CHANNEL_DEPTH: usize = 8;

/// A cache that serves from a local [`DiskStore`] and falls back to a remote
/// [`HttpBackend`].
///
/// Reads that miss locally fetch from the remote tier and populate the local
/// store while the caller consumes the stream. Writes commit locally and are
/// replicated to the remote tier in the background; replication failures are
/// logged and never reach the writer. The instance holds no per-request
/// state — construct once, share behind an `Arc`.
pub struct ProxyCache {
    local: Arc<DiskStore>,
    backend: Arc<HttpBackend>,
    replicator: Replicator,
}

impl ProxyCache {
    pub fn new(local: Arc<DiskStore>, backend: HttpBackend) -> Self {
        Self::with_options(local, backend, ReplicationOptions::default())
    }

    pub fn with_options(
        local: Arc<DiskStore>,
        backend: HttpBackend,
        options: ReplicationOptions,
    ) -> Self {
        let backend = Arc::new(backend);
        let replicator = Replicator::spawn(Arc::clone(&backend), Arc::clone(&local), options);
        Self {
            local,
            backend,
            replicator,
        }
    }

    /// Wait for all scheduled replications to settle. Useful for tests and
    /// graceful shutdown; ordinary operation never joins the background work.
    pub async fn flush_replication(&self) {
        self.replicator.flush().await
    }

    /// Forward a remote stream to the caller while writing it into the local
    /// store. The returned reader yields EOF only once the local write has
    /// committed; a remote or local failure mid-stream faults the reader and
    /// commits nothing.
    fn tee_into_local(&self, key: &str, size_bytes: u64, remote: BlobReader) -> BlobReader {
        let (mut caller_tx, caller_rx) = mpsc::channel::<io::Result<Bytes>>(TEE_CHANNEL_DEPTH);
        let (mut store_tx, store_rx) = mpsc::channel::<io::Result<Bytes>>(TEE_CHANNEL_DEPTH);

        let local = Arc::clone(&self.local);
        let store_key = key.to_string();
        let put_handle = tokio::spawn(async move {
            let reader: BlobReader = Box::new(StreamReader::new(store_rx));
            local.put(&store_key, size_bytes, reader, false).await
        });

        let key = key.to_string();
        tokio::spawn(async move {
            let mut chunks = ReaderStream::with_capacity(remote, TEE_CHUNK_SIZE);
            let mut caller_gone = false;

            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(chunk) => {
                        if store_tx.send(Ok(chunk.clone())).await.is_err() {
                            // local writer bailed early; its error surfaces below
                            break;
                        }
                        if !caller_gone && caller_tx.send(Ok(chunk)).await.is_err() {
                            // caller hung up; keep populating the local store
                            caller_gone = true;
                        }
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "remote stream failed mid-transfer");
                        let _ = store_tx
                            .send(Err(io::Error::other(e.to_string())))
                            .await;
                        if !caller_gone {
                            let _ = caller_tx.send(Err(e)).await;
                        }
                        break;
                    }
                }
            }
            drop(store_tx);

            // hold the caller's EOF until the local write has settled; a
            // failed write faults the caller's stream instead of ending it
            match put_handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(key = %key, error = %e, "failed to populate local store from remote");
                    if !caller_gone {
                        let _ = caller_tx.send(Err(io::Error::other(e.to_string()))).await;
                    }
                }
                Err(e) => {
                    if !caller_gone {
                        let _ = caller_tx.send(Err(io::Error::other(e.to_string()))).await;
                    }
                }
            }
        });

        Box::new(StreamReader::new(caller_rx))
    }
}

#[async_trait]
impl Cache for ProxyCache {
    async fn contains(&self, key: &str, verify_hash: bool) -> bool {
        self.local.contains(key, verify_hash).await
    }

    async fn get(&self, key: &str, verify_hash: bool) -> Result<Option<(BlobReader, u64)>> {
        // hot path: no remote latency when the blob is already local
        if let Some(hit) = self.local.get(key, verify_hash).await? {
            return Ok(Some(hit));
        }

        let Some((remote, size_bytes)) = self.backend.fetch(key).await? else {
            return Ok(None);
        };
        Ok(Some((self.tee_into_local(key, size_bytes, remote), size_bytes)))
    }

    async fn put(
        &self,
        key: &str,
        size_bytes: u64,
        reader: BlobReader,
        verify_digest: bool,
    ) -> Result<()> {
        self.local.put(key, size_bytes, reader, verify_digest).await?;
        self.replicator.enqueue(key);
        Ok(())
    }

    async fn stats(&self) -> StoreStats {
        self.local.stats().await
    }
}

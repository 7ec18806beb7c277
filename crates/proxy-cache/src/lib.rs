//! Tiered proxying cache
//!
//! Composes a local [`disk_blob_store::DiskStore`] with an optional remote
//! object-storage tier (a generic HTTP object store or a Google Cloud Storage
//! bucket) behind a single [`Cache`] contract.
//!
//! Reads are served locally when possible; a miss fetches from the remote
//! tier and populates the local store as a side effect of the caller reading
//! the stream. Writes commit to the local store synchronously and are
//! replicated to the remote tier by a bounded background worker pool, on a
//! best-effort basis that is never visible to the writer.

pub mod backend;
pub mod cache;
pub mod error;
pub mod gcs;
pub mod proxy;
mod replicate;

pub use backend::HttpBackend;
pub use cache::Cache;
pub use error::{CacheError, Result};
pub use gcs::gcs_backend;
pub use proxy::ProxyCache;
pub use replicate::ReplicationOptions;

pub use disk_blob_store::{BlobReader, DiskStore, StoreStats};

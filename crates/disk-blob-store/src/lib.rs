//! Content-addressed blob store on local disk
//!
//! Blobs are addressed by the lowercase hex SHA-256 digest of their content,
//! stored as flat files under a single directory, and bounded by a maximum
//! total size with oldest-first eviction. Writes stream through a temp file
//! and are committed with a rename, so readers never observe a torn blob.

mod error;
mod key;
mod store;
mod types;

pub use error::{Result, StoreError};
pub use key::validate_key;
pub use store::DiskStore;
pub use types::{BlobReader, StoreStats};

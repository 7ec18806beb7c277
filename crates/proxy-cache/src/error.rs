//! Error types for the proxying cache

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// The remote backend answered a read with a non-success status. Carries
    /// the status and the response body verbatim.
    #[error("remote backend returned HTTP {status}: {body}")]
    BackendStatus { status: u16, body: String },

    /// The remote backend could not be reached at all (DNS, connection
    /// refusal, timeout), so there is no HTTP status to report.
    #[error("remote backend unreachable: {0}")]
    BackendTransport(String),

    /// The local store failed an operation it was expected to satisfy.
    #[error("local store error: {0}")]
    LocalStore(#[from] disk_blob_store::StoreError),

    /// Backend construction failed at startup.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;

//! Error types for the disk blob store

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid content key '{0}': expected 64 lowercase hex characters")]
    InvalidKey(String),

    #[error("size mismatch for '{key}': expected {expected} bytes, received {actual}")]
    SizeMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("content digest mismatch for '{key}': received content with digest {computed}")]
    DigestMismatch { key: String, computed: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_key_display() {
        let err = StoreError::InvalidKey("abc".to_string());
        assert!(format!("{}", err).contains("abc"));
        assert!(format!("{}", err).contains("64 lowercase hex"));
    }

    #[test]
    fn test_size_mismatch_display() {
        let err = StoreError::SizeMismatch {
            key: "deadbeef".to_string(),
            expected: 10,
            actual: 7,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("expected 10"));
        assert!(msg.contains("received 7"));
    }
}

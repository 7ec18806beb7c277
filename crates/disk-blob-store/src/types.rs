//! Store types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

/// Streaming blob contents
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Metadata for a stored blob
#[derive(Debug, Clone)]
pub(crate) struct EntryMeta {
    pub size_bytes: u64,
    pub stored_at: DateTime<Utc>,
}

/// Statistics about the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub entries: usize,
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_stats_default() {
        let stats = StoreStats::default();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_size_bytes, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_store_stats_serialization() {
        let stats = StoreStats {
            entries: 3,
            total_size_bytes: 4096,
            max_size_bytes: 1024 * 1024,
            hits: 10,
            misses: 2,
        };

        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("4096"));
        assert!(json.contains("\"entries\":3"));

        let deserialized: StoreStats = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.total_size_bytes, stats.total_size_bytes);
        assert_eq!(deserialized.hits, stats.hits);
    }
}

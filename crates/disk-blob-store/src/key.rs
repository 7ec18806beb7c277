//! Content key validation

use crate::error::{Result, StoreError};

/// Length of a hex-encoded SHA-256 digest
pub const KEY_LENGTH: usize = 64;

/// Check that a key is a well-formed content key (64 lowercase hex characters).
///
/// Keys are used as file names, so anything else is rejected before it can
/// touch the filesystem.
pub fn validate_key(key: &str) -> Result<()> {
    if key.len() == KEY_LENGTH
        && key
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_key() {
        let key = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
        assert!(validate_key(key).is_ok());
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!(validate_key("abc123").is_err());
        assert!(validate_key("").is_err());
        let long = "a".repeat(65);
        assert!(validate_key(&long).is_err());
    }

    #[test]
    fn test_rejects_uppercase_and_non_hex() {
        let upper = "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9";
        assert!(validate_key(upper).is_err());

        let non_hex = "z".repeat(64);
        assert!(validate_key(&non_hex).is_err());
    }

    #[test]
    fn test_rejects_path_traversal() {
        assert!(validate_key("../../../../../../../../../etc/passwd").is_err());
        assert!(validate_key("..").is_err());
    }
}

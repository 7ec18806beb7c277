//! Google Cloud Storage backend construction
//!
//! GCS support is purely credential and base-URL resolution: the result is
//! the same [`HttpBackend`] the generic HTTP path uses, pointed at
//! `https://storage.googleapis.com/<bucket>` with a bearer token attached
//! per request.

use crate::backend::HttpBackend;
use crate::error::{CacheError, Result};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use url::Url;

pub(crate) const CLOUD_PLATFORM_SCOPES: &[&str] =
    &["https://www.googleapis.com/auth/cloud-platform"];

/// Build a backend for a GCS bucket.
///
/// Credentials come from exactly one of two modes: the ambient environment
/// (`use_default_credentials`) or a JSON service-account key file. Neither or
/// both configured is a configuration error — the process should fail before
/// it starts serving.
pub async fn gcs_backend(
    bucket: &str,
    use_default_credentials: bool,
    json_credentials_file: Option<&Path>,
) -> Result<HttpBackend> {
    let provider: Arc<dyn TokenProvider> = match (use_default_credentials, json_credentials_file) {
        (true, None) => gcp_auth::provider().await.map_err(|e| {
            CacheError::Config(format!("failed to resolve default Google credentials: {e}"))
        })?,
        (false, Some(path)) => {
            let account = CustomServiceAccount::from_file(path).map_err(|e| {
                CacheError::Config(format!(
                    "failed to load Google credentials from '{}': {e}",
                    path.display()
                ))
            })?;
            Arc::new(account)
        }
        (true, Some(_)) => {
            return Err(CacheError::Config(
                "default Google credentials and a JSON credentials file are mutually exclusive"
                    .to_string(),
            ))
        }
        (false, None) => {
            return Err(CacheError::Config(
                "Google Cloud Storage needs either default credentials or a JSON credentials file"
                    .to_string(),
            ))
        }
    };

    let base_url = Url::parse(&format!("https://storage.googleapis.com/{bucket}"))
        .map_err(|e| CacheError::Config(format!("invalid GCS bucket name '{bucket}': {e}")))?;

    info!(bucket = %bucket, "replicating artifacts to GCS bucket");
    HttpBackend::with_token_provider(base_url, Some(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_no_credential_mode_is_rejected() {
        let err = gcs_backend("some-bucket", false, None).await.unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
        assert!(format!("{err}").contains("default credentials or a JSON credentials file"));
    }

    #[tokio::test]
    async fn test_both_credential_modes_are_rejected() {
        let err = gcs_backend("some-bucket", true, Some(Path::new("/tmp/creds.json")))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[tokio::test]
    async fn test_unreadable_credentials_file_fails() {
        let err = gcs_backend("some-bucket", false, Some(Path::new("/nonexistent/creds.json")))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[tokio::test]
    async fn test_malformed_credentials_file_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"this is not a service account key").unwrap();

        let err = gcs_backend("some-bucket", false, Some(file.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }
}

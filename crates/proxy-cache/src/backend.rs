//! HTTP transport for the remote tier
//!
//! Maps cache operations onto two verbs against `<base>/<key>`. The same
//! concrete type serves both the generic HTTP backend and GCS — the latter
//! only adds a bearer token per request (see [`crate::gcs`]).

use crate::error::{CacheError, Result};
use crate::gcs::CLOUD_PLATFORM_SCOPES;
use disk_blob_store::BlobReader;
use futures::StreamExt;
use gcp_auth::TokenProvider;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::{ReaderStream, StreamReader};
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// A remote object-storage backend addressed at a base URL.
///
/// The underlying client is shared and safe for unbounded concurrent use;
/// every request carries independent connect and read timeouts so a hung
/// remote cannot pin requests forever.
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("has_token_provider", &self.token_provider.is_some())
            .finish()
    }
}

impl HttpBackend {
    /// Backend for a plain HTTP object store. No authentication beyond what
    /// the URL itself carries.
    pub fn new(base_url: Url) -> Result<Self> {
        Self::with_token_provider(base_url, None)
    }

    pub(crate) fn with_token_provider(
        base_url: Url,
        token_provider: Option<Arc<dyn TokenProvider>>,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .build()
            .map_err(|e| CacheError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            token_provider,
        })
    }

    fn blob_url(&self, key: &str) -> String {
        format!("{}/{key}", self.base_url.as_str().trim_end_matches('/'))
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        match &self.token_provider {
            None => Ok(request),
            Some(provider) => {
                let token = provider.token(CLOUD_PLATFORM_SCOPES).await.map_err(|e| {
                    CacheError::BackendTransport(format!("failed to obtain access token: {e}"))
                })?;
                Ok(request.bearer_auth(token.as_str()))
            }
        }
    }

    /// Fetch a blob by key.
    ///
    /// A 2xx yields the body stream and the remote-reported content length.
    /// A 404 maps to `Ok(None)` so callers can distinguish "absent" from a
    /// failing backend; any other status or a transport failure is an error
    /// carrying everything the remote said.
    pub async fn fetch(&self, key: &str) -> Result<Option<(BlobReader, u64)>> {
        let url = self.blob_url(key);
        let request = self.authorize(self.client.get(&url)).await?;
        let response = request
            .send()
            .await
            .map_err(|e| CacheError::BackendTransport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CacheError::BackendStatus {
                status: status.as_u16(),
                body,
            });
        }

        let size_bytes = response.content_length().ok_or_else(|| {
            CacheError::BackendTransport(format!(
                "remote response for '{key}' is missing Content-Length"
            ))
        })?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        let reader = StreamReader::new(Box::pin(stream));
        Ok(Some((Box::new(reader) as BlobReader, size_bytes)))
    }

    /// Store a blob under key, streaming the body.
    ///
    /// Failures are reported like `fetch`'s; whether they are surfaced or
    /// merely logged is the caller's decision.
    pub async fn store(&self, key: &str, size_bytes: u64, reader: BlobReader) -> Result<()> {
        let url = self.blob_url(key);
        let body = reqwest::Body::wrap_stream(ReaderStream::new(reader));
        let request = self
            .authorize(self.client.put(&url))
            .await?
            .header(reqwest::header::CONTENT_LENGTH, size_bytes)
            .body(body);
        let response = request
            .send()
            .await
            .map_err(|e| CacheError::BackendTransport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CacheError::BackendStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::{get, put};
    use axum::Router;
    use std::sync::Mutex;
    use tokio::io::AsyncReadExt;

    async fn spawn_backend_server(router: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Url::parse(&format!("http://{addr}")).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_size() {
        let router = Router::new().route("/{*path}", get(|| async { "hello world" }));
        let base = spawn_backend_server(router).await;
        let backend = HttpBackend::new(base).unwrap();

        let (mut reader, size) = backend.fetch(&"a".repeat(64)).await.unwrap().unwrap();
        assert_eq!(size, 11);
        let mut body = Vec::new();
        reader.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"hello world");
    }

    #[tokio::test]
    async fn test_fetch_maps_404_to_none() {
        // no routes: everything 404s
        let base = spawn_backend_server(Router::new()).await;
        let backend = HttpBackend::new(base).unwrap();

        assert!(backend.fetch(&"b".repeat(64)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_carries_status_and_body() {
        let router = Router::new().route(
            "/{*path}",
            get(|| async { (axum::http::StatusCode::FORBIDDEN, "Foo bar error") }),
        );
        let base = spawn_backend_server(router).await;
        let backend = HttpBackend::new(base).unwrap();

        match backend.fetch(&"c".repeat(64)).await {
            Err(CacheError::BackendStatus { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "Foo bar error");
            }
            Err(other) => panic!("expected BackendStatus error, got {other:?}"),
            Ok(_) => panic!("expected the fetch to fail"),
        }
    }

    #[tokio::test]
    async fn test_fetch_transport_failure_has_no_status() {
        // nothing listens on port 1
        let backend = HttpBackend::new(Url::parse("http://127.0.0.1:1").unwrap()).unwrap();
        match backend.fetch(&"d".repeat(64)).await {
            Err(CacheError::BackendTransport(_)) => {}
            Err(other) => panic!("expected BackendTransport error, got {other:?}"),
            Ok(_) => panic!("expected the fetch to fail"),
        }
    }

    #[tokio::test]
    async fn test_store_streams_body_with_content_length() {
        type Captured = Arc<Mutex<Vec<(String, Option<String>, Vec<u8>)>>>;
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));

        async fn handler(
            State(captured): State<Captured>,
            axum::extract::Path(path): axum::extract::Path<String>,
            headers: HeaderMap,
            body: axum::body::Bytes,
        ) -> axum::http::StatusCode {
            let content_length = headers
                .get("content-length")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string());
            captured
                .lock()
                .unwrap()
                .push((path, content_length, body.to_vec()));
            axum::http::StatusCode::OK
        }

        let router = Router::new()
            .route("/{*path}", put(handler))
            .with_state(captured.clone());
        let base = spawn_backend_server(router).await;
        let backend = HttpBackend::new(base).unwrap();

        let key = "e".repeat(64);
        let data = b"payload bytes".to_vec();
        let reader: BlobReader = Box::new(std::io::Cursor::new(data.clone()));
        backend.store(&key, data.len() as u64, reader).await.unwrap();

        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let (path, content_length, body) = &captured[0];
        assert!(path.contains(&key));
        assert_eq!(content_length.as_deref(), Some("13"));
        assert_eq!(body, &data);
    }

    #[tokio::test]
    async fn test_store_reports_remote_rejection() {
        let router = Router::new().route(
            "/{*path}",
            put(|| async { (axum::http::StatusCode::FORBIDDEN, "Foo bar error") }),
        );
        let base = spawn_backend_server(router).await;
        let backend = HttpBackend::new(base).unwrap();

        let reader: BlobReader = Box::new(std::io::Cursor::new(b"data".to_vec()));
        match backend.store(&"f".repeat(64), 4, reader).await {
            Err(CacheError::BackendStatus { status, body }) => {
                assert_eq!(status, 403);
                assert_eq!(body, "Foo bar error");
            }
            other => panic!("expected BackendStatus error, got {other:?}"),
        }
    }
}

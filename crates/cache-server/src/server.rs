//! HTTP surface of the cache
//!
//! Serves `GET/HEAD/PUT` on key paths plus a `/status` page. Clients address
//! blobs bazel-style — `/ac/<key>` and `/cas/<key>` — but only the final
//! path segment is the content key; writes under `cas/` additionally have
//! their body digest checked against the key.

use crate::auth::{require_basic_auth, Htpasswd};
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use chrono::{DateTime, Utc};
use disk_blob_store::{validate_key, BlobReader, StoreError, StoreStats};
use futures::StreamExt;
use proxy_cache::{Cache, CacheError};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::{error, info, warn};

/// Shared state for the HTTP server
pub struct ServerState {
    pub cache: Arc<dyn Cache>,
    pub htpasswd: Option<Htpasswd>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(cache: Arc<dyn Cache>, htpasswd: Option<Htpasswd>) -> Self {
        Self {
            cache,
            htpasswd,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Status page payload
#[derive(Serialize)]
struct StatusResponse {
    status: String,
    uptime_secs: u64,
    store: StoreStats,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    // axum routes HEAD through the GET handler, which answers it from the
    // local index without opening a stream
    let cache_routes = Router::new()
        .route("/{*path}", get(get_blob).put(put_blob))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_basic_auth,
        ));

    Router::new()
        .route("/status", get(status))
        .merge(cache_routes)
        .with_state(state)
}

/// Start the HTTP server, with TLS when cert and key files are configured
pub async fn start_server(
    state: SharedState,
    addr: SocketAddr,
    tls: Option<(PathBuf, PathBuf)>,
) -> std::io::Result<()> {
    let router = create_router(state);
    match tls {
        Some((cert, key)) => {
            info!("listening on {} (TLS)", addr);
            let config = RustlsConfig::from_pem_file(cert, key).await?;
            axum_server::bind_rustls(addr, config)
                .serve(router.into_make_service())
                .await
        }
        None => {
            info!("listening on {}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, router).await
        }
    }
}

/// Status page with store statistics
async fn status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let store = state.cache.stats().await;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(StatusResponse {
        status: "ok".to_string(),
        uptime_secs,
        store,
    })
}

async fn get_blob(
    State(state): State<SharedState>,
    method: Method,
    Path(path): Path<String>,
) -> Response {
    let Some(key) = blob_key(&path) else {
        return bad_key_response(&path);
    };

    // existence probes stay local: no remote fetch, no body
    if method == Method::HEAD {
        return if state.cache.contains(key, false).await {
            StatusCode::OK.into_response()
        } else {
            StatusCode::NOT_FOUND.into_response()
        };
    }

    match state.cache.get(key, false).await {
        Ok(Some((reader, size_bytes))) => {
            info!(method = "GET", key = %key, size_bytes, "serving blob");
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .header(header::CONTENT_LENGTH, size_bytes)
                .body(Body::from_stream(ReaderStream::new(reader)))
                .unwrap()
        }
        Ok(None) => {
            info!(method = "GET", key = %key, "cache miss");
            (StatusCode::NOT_FOUND, "blob not found\n").into_response()
        }
        Err(err @ (CacheError::BackendStatus { .. } | CacheError::BackendTransport(_))) => {
            warn!(method = "GET", key = %key, error = %err, "remote backend failed");
            (StatusCode::BAD_GATEWAY, format!("{err}\n")).into_response()
        }
        Err(err) => {
            error!(method = "GET", key = %key, error = %err, "cache read failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{err}\n")).into_response()
        }
    }
}

async fn put_blob(
    State(state): State<SharedState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    request: Request,
) -> Response {
    let Some(key) = blob_key(&path) else {
        return bad_key_response(&path);
    };
    let Some(size_bytes) = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    else {
        return (StatusCode::LENGTH_REQUIRED, "Content-Length required\n").into_response();
    };

    // under cas/ the key is the content digest by protocol, so enforce it
    let verify_digest = path
        .rsplit('/')
        .nth(1)
        .map(|segment| segment == "cas")
        .unwrap_or(false);

    let stream = request
        .into_body()
        .into_data_stream()
        .map(|chunk| chunk.map_err(std::io::Error::other));
    let reader: BlobReader = Box::new(StreamReader::new(Box::pin(stream)));

    match state.cache.put(key, size_bytes, reader, verify_digest).await {
        Ok(()) => {
            info!(method = "PUT", key = %key, size_bytes, "stored blob");
            StatusCode::OK.into_response()
        }
        Err(CacheError::LocalStore(
            err @ (StoreError::SizeMismatch { .. } | StoreError::DigestMismatch { .. }),
        )) => {
            warn!(method = "PUT", key = %key, error = %err, "rejected blob");
            (StatusCode::BAD_REQUEST, format!("{err}\n")).into_response()
        }
        Err(err) => {
            error!(method = "PUT", key = %key, error = %err, "cache write failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{err}\n")).into_response()
        }
    }
}

/// The content key is the final path segment
fn blob_key(path: &str) -> Option<&str> {
    let key = path.rsplit('/').next()?;
    validate_key(key).ok()?;
    Some(key)
}

fn bad_key_response(path: &str) -> Response {
    warn!(path = %path, "rejected request with malformed content key");
    (
        StatusCode::BAD_REQUEST,
        "expected a 64-character lowercase hex content key\n",
    )
        .into_response()
}

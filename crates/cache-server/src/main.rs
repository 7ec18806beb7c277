//! Build-artifact cache server
//!
//! A content-addressable cache for build artifacts: a size-bounded local
//! disk store behind an HTTP front end, optionally proxying to a remote
//! object-storage tier (generic HTTP or Google Cloud Storage) with
//! read-through fetches and best-effort background replication.

mod auth;
mod config;
mod error;
mod server;

use crate::auth::Htpasswd;
use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::server::{start_server, ServerState, SharedState};
use disk_blob_store::DiskStore;
use proxy_cache::{gcs_backend, Cache, HttpBackend, ProxyCache};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};
use url::Url;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("cache_server=info".parse()?)
        .add_directive("proxy_cache=info".parse()?)
        .add_directive("disk_blob_store=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting artifact cache server...");

    let config = Config::load()?;
    let addr = config.listen_addr()?;

    let store = Arc::new(DiskStore::open(&config.dir, config.max_size_bytes()).await?);

    let cache: Arc<dyn Cache> = if let Some(gcs) = &config.gcs {
        let backend = gcs_backend(
            &gcs.bucket,
            gcs.use_default_credentials,
            gcs.json_credentials_file.as_deref(),
        )
        .await?;
        Arc::new(ProxyCache::new(Arc::clone(&store), backend))
    } else if let Some(http) = &config.http_backend {
        let base_url = Url::parse(&http.base_url)
            .map_err(|e| ServerError::Config(format!("invalid http_proxy base_url: {e}")))?;
        info!(base_url = %base_url, "proxying artifacts to HTTP backend");
        Arc::new(ProxyCache::new(Arc::clone(&store), HttpBackend::new(base_url)?))
    } else {
        store
    };

    let htpasswd = config
        .htpasswd_file
        .as_deref()
        .map(Htpasswd::from_file)
        .transpose()?;

    let tls = match (&config.tls_cert_file, &config.tls_key_file) {
        (Some(cert), Some(key)) => Some((cert.clone(), key.clone())),
        _ => None,
    };

    let state: SharedState = Arc::new(ServerState::new(cache, htpasswd));
    start_server(state, addr, tls).await?;

    Ok(())
}

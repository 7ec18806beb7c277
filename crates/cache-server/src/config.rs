//! Server configuration
//!
//! Settings come from `ARTIFACT_CACHE_*` environment variables, or from a
//! YAML file when `ARTIFACT_CACHE_CONFIG_FILE` is set (the file then wins
//! wholesale, mirroring how deployments pin the full configuration).

use crate::error::ServerError;
use serde::Deserialize;
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

const GIB: u64 = 1024 * 1024 * 1024;

fn default_port() -> u16 {
    8080
}

/// Remote GCS tier settings
#[derive(Debug, Clone, Deserialize)]
pub struct GcsConfig {
    pub bucket: String,
    #[serde(default)]
    pub use_default_credentials: bool,
    #[serde(default)]
    pub json_credentials_file: Option<PathBuf>,
}

/// Remote generic-HTTP tier settings
#[derive(Debug, Clone, Deserialize)]
pub struct HttpBackendConfig {
    pub base_url: String,
}

/// Resolved server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address to listen on; empty means all interfaces
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory for the local blob store
    pub dir: PathBuf,
    /// Maximum local store size in GiB
    pub max_size: u64,
    #[serde(default)]
    pub htpasswd_file: Option<PathBuf>,
    #[serde(default)]
    pub tls_cert_file: Option<PathBuf>,
    #[serde(default)]
    pub tls_key_file: Option<PathBuf>,
    #[serde(default, rename = "gcs_proxy")]
    pub gcs: Option<GcsConfig>,
    #[serde(default, rename = "http_proxy")]
    pub http_backend: Option<HttpBackendConfig>,
}

impl Config {
    /// Load configuration from the environment, or from the YAML file named
    /// by `ARTIFACT_CACHE_CONFIG_FILE` when present.
    pub fn load() -> Result<Self, ServerError> {
        match env::var("ARTIFACT_CACHE_CONFIG_FILE") {
            Ok(path) => Self::from_yaml_file(Path::new(&path)),
            Err(_) => Self::from_env(),
        }
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ServerError> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("failed to read config file '{}': {e}", path.display()))
        })?;
        Self::from_yaml(&data)
    }

    fn from_yaml(data: &str) -> Result<Self, ServerError> {
        let config: Config = serde_yaml::from_str(data)
            .map_err(|e| ServerError::Config(format!("failed to parse YAML config: {e}")))?;
        config.validate()
    }

    pub fn from_env() -> Result<Self, ServerError> {
        let dir = env::var("ARTIFACT_CACHE_DIR")
            .map(PathBuf::from)
            .map_err(|_| ServerError::Config("ARTIFACT_CACHE_DIR is required".to_string()))?;

        let max_size = env::var("ARTIFACT_CACHE_MAX_SIZE")
            .map_err(|_| {
                ServerError::Config("ARTIFACT_CACHE_MAX_SIZE (GiB) is required".to_string())
            })?
            .parse::<u64>()
            .map_err(|e| {
                ServerError::Config(format!("ARTIFACT_CACHE_MAX_SIZE must be a number: {e}"))
            })?;

        let host = env::var("ARTIFACT_CACHE_HOST").unwrap_or_default();
        let port = match env::var("ARTIFACT_CACHE_PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|e| {
                ServerError::Config(format!("ARTIFACT_CACHE_PORT must be a port number: {e}"))
            })?,
            Err(_) => default_port(),
        };

        let gcs = env::var("ARTIFACT_CACHE_GCS_BUCKET").ok().map(|bucket| GcsConfig {
            bucket,
            use_default_credentials: env::var("ARTIFACT_CACHE_GCS_USE_DEFAULT_CREDENTIALS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            json_credentials_file: env::var("ARTIFACT_CACHE_GCS_JSON_CREDENTIALS_FILE")
                .ok()
                .map(PathBuf::from),
        });

        let http_backend = env::var("ARTIFACT_CACHE_HTTP_PROXY_URL")
            .ok()
            .map(|base_url| HttpBackendConfig { base_url });

        let config = Config {
            host,
            port,
            dir,
            max_size,
            htpasswd_file: env::var("ARTIFACT_CACHE_HTPASSWD_FILE").ok().map(PathBuf::from),
            tls_cert_file: env::var("ARTIFACT_CACHE_TLS_CERT_FILE").ok().map(PathBuf::from),
            tls_key_file: env::var("ARTIFACT_CACHE_TLS_KEY_FILE").ok().map(PathBuf::from),
            gcs,
            http_backend,
        };
        config.validate()
    }

    fn validate(self) -> Result<Self, ServerError> {
        if self.dir.as_os_str().is_empty() {
            return Err(ServerError::Config("the 'dir' setting is required".to_string()));
        }
        if self.max_size == 0 {
            return Err(ServerError::Config(
                "the 'max_size' setting (GiB) is required and must be positive".to_string(),
            ));
        }
        if self.tls_cert_file.is_some() != self.tls_key_file.is_some() {
            return Err(ServerError::Config(
                "TLS needs both 'tls_cert_file' and 'tls_key_file'".to_string(),
            ));
        }
        if self.gcs.is_some() && self.http_backend.is_some() {
            return Err(ServerError::Config(
                "'gcs_proxy' and 'http_proxy' are mutually exclusive".to_string(),
            ));
        }
        if let Some(gcs) = &self.gcs {
            if gcs.use_default_credentials == gcs.json_credentials_file.is_some() {
                return Err(ServerError::Config(
                    "'gcs_proxy' needs exactly one of 'use_default_credentials' and \
                     'json_credentials_file'"
                        .to_string(),
                ));
            }
        }
        Ok(self)
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size * GIB
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ServerError> {
        let ip = if self.host.is_empty() {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            self.host.parse::<IpAddr>().map_err(|e| {
                ServerError::Config(format!("invalid listen host '{}': {e}", self.host))
            })?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

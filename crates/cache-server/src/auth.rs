//! htpasswd basic-auth gate for the cache routes
//!
//! Only bcrypt (`$2*$`) htpasswd entries are supported; anything else in the
//! file is rejected at startup rather than silently letting requests through.

use crate::error::ServerError;
use crate::server::SharedState;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Parsed htpasswd credentials
#[derive(Debug)]
pub struct Htpasswd {
    users: HashMap<String, String>,
}

impl Htpasswd {
    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!(
                "failed to read htpasswd file '{}': {e}",
                path.display()
            ))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ServerError> {
        let mut users = HashMap::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((user, hash)) = line.split_once(':') else {
                return Err(ServerError::Config(format!(
                    "malformed htpasswd entry on line {}",
                    lineno + 1
                )));
            };
            if !hash.starts_with("$2") {
                return Err(ServerError::Config(format!(
                    "unsupported htpasswd hash for user '{user}' on line {}: only bcrypt \
                     entries are supported",
                    lineno + 1
                )));
            }
            users.insert(user.to_string(), hash.to_string());
        }
        Ok(Self { users })
    }

    pub fn verify(&self, user: &str, password: &str) -> bool {
        self.users
            .get(user)
            .map(|hash| bcrypt::verify(password, hash).unwrap_or(false))
            .unwrap_or(false)
    }
}

/// Middleware guarding the cache routes when an htpasswd file is configured
pub async fn require_basic_auth(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(htpasswd) = &state.htpasswd else {
        return next.run(request).await;
    };

    if let Some((user, password)) = basic_credentials(request.headers()) {
        if htpasswd.verify(&user, &password) {
            return next.run(request).await;
        }
        warn!(user = %user, "rejected request with invalid credentials");
    } else {
        warn!("rejected request without credentials");
    }

    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"artifact-cache\"")],
        "authentication required\n",
    )
        .into_response()
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(password: &str) -> String {
        // minimum cost keeps the tests fast
        bcrypt::hash(password, 4).unwrap()
    }

    #[test]
    fn test_parse_and_verify() {
        let content = format!("# build agents\nagent:{}\n\n", hash("s3cret"));
        let htpasswd = Htpasswd::parse(&content).unwrap();

        assert!(htpasswd.verify("agent", "s3cret"));
        assert!(!htpasswd.verify("agent", "wrong"));
        assert!(!htpasswd.verify("nobody", "s3cret"));
    }

    #[test]
    fn test_malformed_line_is_rejected() {
        let err = Htpasswd::parse("no-colon-here\n").unwrap_err();
        assert!(format!("{err}").contains("line 1"));
    }

    #[test]
    fn test_non_bcrypt_entry_is_rejected() {
        let err = Htpasswd::parse("agent:{SHA}5en6G6MezRroT3XKqkdPOmY/BfQ=\n").unwrap_err();
        assert!(format!("{err}").contains("bcrypt"));
    }

    #[test]
    fn test_basic_credentials_decoding() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!(
                "Basic {}",
                base64::engine::general_purpose::STANDARD.encode("agent:s3cret")
            )
            .parse()
            .unwrap(),
        );

        let (user, password) = basic_credentials(&headers).unwrap();
        assert_eq!(user, "agent");
        assert_eq!(password, "s3cret");
    }

    #[test]
    fn test_basic_credentials_rejects_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer token".parse().unwrap());
        assert!(basic_credentials(&headers).is_none());

        headers.insert(header::AUTHORIZATION, "Basic !!!".parse().unwrap());
        assert!(basic_credentials(&headers).is_none());
    }
}

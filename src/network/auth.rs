//! Admin Authentication
//!
//! Internal control endpoints (create game, kick player) require a shared
//! token in a configured header. The token is held only as a digest and
//! compared without early exit.

use axum::http::HeaderMap;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::core::hash::{digests_equal, secret_digest, secret_fingerprint, SecretDigest};

/// Admin authentication configuration.
#[derive(Clone)]
pub struct AdminAuth {
    /// Lower-case header name carrying the token.
    header: String,
    /// Digest of the expected token.
    digest: SecretDigest,
}

impl std::fmt::Debug for AdminAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAuth")
            .field("header", &self.header)
            .field("fingerprint", &hex::encode(&self.digest[..4]))
            .finish()
    }
}

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Admin header absent.
    #[error("missing admin header {0}")]
    MissingHeader(String),
    /// Header present but not valid UTF-8.
    #[error("invalid header encoding")]
    InvalidFormat,
    /// Token does not match.
    #[error("invalid admin token")]
    InvalidToken,
}

impl AdminAuth {
    /// Create from a header name and the shared token.
    pub fn new(header: &str, token: &str) -> Self {
        Self {
            header: header.to_ascii_lowercase(),
            digest: secret_digest(token),
        }
    }

    /// Build from server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(&config.admin_header, &config.admin_token)
    }

    /// Header name requests must carry.
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Check a presented token.
    pub fn verify_token(&self, token: &str) -> Result<(), AuthError> {
        if digests_equal(&secret_digest(token), &self.digest) {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }

    /// Check request headers.
    pub fn verify(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let value = headers
            .get(self.header.as_str())
            .ok_or_else(|| AuthError::MissingHeader(self.header.clone()))?;
        let token = value.to_str().map_err(|_| AuthError::InvalidFormat)?;
        self.verify_token(token)
    }
}

/// Log-safe fingerprint of a configured token.
pub fn token_fingerprint(token: &str) -> String {
    secret_fingerprint(token)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(name: &'static str, value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(name, HeaderValue::from_str(value).unwrap());
        map
    }

    #[test]
    fn test_valid_token_accepted() {
        let auth = AdminAuth::new("X-Admin-Key", "s3cret");
        assert_eq!(auth.header(), "x-admin-key");
        assert!(auth.verify(&headers("x-admin-key", "s3cret")).is_ok());
    }

    #[test]
    fn test_wrong_token_rejected() {
        let auth = AdminAuth::new("x-admin-key", "s3cret");
        assert_eq!(
            auth.verify(&headers("x-admin-key", "s3cre")),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn test_wrong_header_rejected() {
        let auth = AdminAuth::new("x-admin-key", "s3cret");
        assert!(matches!(
            auth.verify(&headers("x-api-key", "s3cret")),
            Err(AuthError::MissingHeader(_))
        ));
    }

    #[test]
    fn test_debug_hides_token() {
        let auth = AdminAuth::new("x-admin-key", "hunter2");
        let debug = format!("{auth:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains(&token_fingerprint("hunter2")));
    }
}

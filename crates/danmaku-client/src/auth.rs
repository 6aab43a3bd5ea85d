//! Authorization header derivation.
//!
//! When session credentials are available, each request carries
//! `Authorization: SAPISIDHASH <ts>_<digest>` where the digest is
//! `SHA1("<ts> <sid> <origin>")`. The origin binds the digest to the site,
//! so the same session id produces different headers per origin.
//!
//! Absent credentials, requests go out unauthenticated.

use std::time::{SystemTime, UNIX_EPOCH};

use sha1::{Digest, Sha1};

use crate::constants::DEFAULT_ORIGIN;

/// Credentials derived from session state.
#[derive(Clone)]
pub struct AuthContext {
    session_id: String,
    origin: String,
}

impl AuthContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            origin: DEFAULT_ORIGIN.to_string(),
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// `Authorization` header value for the current time.
    pub fn authorization(&self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.authorization_at(now)
    }

    /// `Authorization` header value for a given unix timestamp (seconds).
    pub fn authorization_at(&self, unix_secs: u64) -> String {
        let input = format!("{unix_secs} {} {}", self.session_id, self.origin);
        let digest = Sha1::digest(input.as_bytes());
        format!("SAPISIDHASH {unix_secs}_{}", hex::encode(digest))
    }
}

// Never print the session id.
impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_shape() {
        let auth = AuthContext::new("sid-value");
        let header = auth.authorization_at(1_700_000_000);
        let rest = header.strip_prefix("SAPISIDHASH 1700000000_").unwrap();
        assert_eq!(rest.len(), 40, "sha1 hex digest");
        assert!(rest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_header_depends_on_inputs() {
        let auth = AuthContext::new("sid-value");
        assert_eq!(auth.authorization_at(10), auth.authorization_at(10));
        assert_ne!(auth.authorization_at(10), auth.authorization_at(11));

        let other_origin = AuthContext::new("sid-value").with_origin("https://example.com");
        assert_ne!(auth.authorization_at(10), other_origin.authorization_at(10));
    }

    #[test]
    fn test_debug_hides_session_id() {
        let auth = AuthContext::new("super-secret");
        assert!(!format!("{auth:?}").contains("super-secret"));
    }
}

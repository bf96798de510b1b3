//! Bearer-token authentication for the management API

use http::HeaderMap;
use tracing::{debug, warn};

/// Outcome of checking a request's credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// Token matched, or no token is configured
    Allowed,
    /// No `Authorization: Bearer` header
    Missing,
    /// A token was presented but did not match
    Invalid,
}

/// Authenticator for operator requests
///
/// With no token configured every request is allowed.
#[derive(Debug, Clone, Default)]
pub struct ApiAuth {
    token: Option<String>,
}

impl ApiAuth {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    /// Authentication is enforced only when a token is configured
    pub fn is_required(&self) -> bool {
        self.token.is_some()
    }

    pub fn check(&self, headers: &HeaderMap) -> AuthDecision {
        let Some(expected) = self.token.as_deref() else {
            return AuthDecision::Allowed;
        };

        let presented = headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match presented {
            None => {
                debug!("Request without bearer token");
                AuthDecision::Missing
            }
            Some(token) if constant_time_eq(token.trim().as_bytes(), expected.as_bytes()) => {
                AuthDecision::Allowed
            }
            Some(_) => {
                warn!("Rejected request with invalid API token");
                AuthDecision::Invalid
            }
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

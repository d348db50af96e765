//! # Access Scopes
//!
//! Bearer keys split the API into a query surface and a mutation surface.
//!
//! | Variable | Grants |
//! |----------|--------|
//! | `CLAIMGRAPH_API_KEY` | every route |
//! | `CLAIMGRAPH_READ_API_KEY` | query routes only |
//!
//! Without `CLAIMGRAPH_API_KEY` the API is open and the read key is ignored.
//! `/health` is never gated. Keys are read once when the router is built.
//!
//! Rejections carry the same JSON body as every other error:
//! - 401 when the header is missing, malformed, or carries an unknown key
//! - 403 when a read key is presented to a mutating route

use super::types::ErrorResponse;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub const WRITE_KEY_VAR: &str = "CLAIMGRAPH_API_KEY";
pub const READ_KEY_VAR: &str = "CLAIMGRAPH_READ_API_KEY";

/// What a route needs from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Queries: status, frontier stats, field and identity resolution.
    Read,
    /// Anything that writes to the store or claims frontier work.
    Write,
}

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denied {
    MissingCredentials,
    UnknownKey,
    ReadOnlyKey,
}

impl Denied {
    fn reason(self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_bearer_token",
            Self::UnknownKey => "unknown_api_key",
            Self::ReadOnlyKey => "read_only_key",
        }
    }
}

impl IntoResponse for Denied {
    fn into_response(self) -> Response {
        let (status, challenge, message) = match self {
            Self::MissingCredentials => (
                StatusCode::UNAUTHORIZED,
                "Bearer",
                "Unauthorized: bearer token required",
            ),
            Self::UnknownKey => (
                StatusCode::UNAUTHORIZED,
                r#"Bearer error="invalid_token""#,
                "Unauthorized: unknown API key",
            ),
            Self::ReadOnlyKey => (
                StatusCode::FORBIDDEN,
                r#"Bearer error="insufficient_scope""#,
                "Forbidden: read-only key cannot modify state",
            ),
        };
        (
            status,
            [(header::WWW_AUTHENTICATE, HeaderValue::from_static(challenge))],
            Json(ErrorResponse {
                error: message.to_string(),
            }),
        )
            .into_response()
    }
}

/// SHA-256 of a key. Comparing digests keeps the comparison length fixed.
type Fingerprint = [u8; 32];

fn fingerprint(key: &str) -> Fingerprint {
    Sha256::digest(key.as_bytes()).into()
}

fn same_key(provided: &Fingerprint, expected: &Fingerprint) -> bool {
    provided[..].ct_eq(&expected[..]).into()
}

/// The configured keys, stored as fingerprints.
#[derive(Clone)]
pub struct ApiKeys {
    write: Fingerprint,
    read: Option<Fingerprint>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("read_key", &self.read.is_some())
            .finish_non_exhaustive()
    }
}

impl ApiKeys {
    #[must_use]
    pub fn new(write: &str, read: Option<&str>) -> Self {
        Self {
            write: fingerprint(write),
            read: read.filter(|k| !k.is_empty()).map(fingerprint),
        }
    }

    /// Keys from the environment. `None` when no write key is set.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|k| !k.is_empty());
        let read = var(READ_KEY_VAR);
        let Some(write) = var(WRITE_KEY_VAR) else {
            if read.is_some() {
                tracing::warn!(
                    "{} is set without {}; the API stays open",
                    READ_KEY_VAR,
                    WRITE_KEY_VAR
                );
            }
            return None;
        };
        Some(Self::new(&write, read.as_deref()))
    }

    /// Check a presented token against `scope`.
    pub fn authorize(&self, token: Option<&str>, scope: Scope) -> Result<(), Denied> {
        let token = fingerprint(token.ok_or(Denied::MissingCredentials)?);
        if same_key(&token, &self.write) {
            return Ok(());
        }
        let is_read_key = self.read.as_ref().is_some_and(|read| same_key(&token, read));
        match (is_read_key, scope) {
            (true, Scope::Read) => Ok(()),
            (true, Scope::Write) => Err(Denied::ReadOnlyKey),
            (false, _) => Err(Denied::UnknownKey),
        }
    }
}

/// The token of an `Authorization: Bearer <token>` header. The scheme is
/// matched case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Route layer enforcing `scope` with the configured keys.
pub async fn require_scope(
    State((keys, scope)): State<(Arc<ApiKeys>, Scope)>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match keys.authorize(bearer_token(request.headers()), scope) {
        Ok(()) => next.run(request).await,
        Err(denied) => {
            tracing::warn!(
                event = "auth_failure",
                reason = denied.reason(),
                path = %request.uri().path(),
                ?scope,
                "request rejected"
            );
            denied.into_response()
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

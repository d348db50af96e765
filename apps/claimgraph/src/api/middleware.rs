//! # Middleware Module
//!
//! Global request rate limiting for the claimgraph HTTP API.
//!
//! ## Configuration
//!
//! - `CLAIMGRAPH_RATE_LIMIT`: requests per second across all clients
//!   (default: 100, `0` disables the limiter)

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;

const DEFAULT_RATE_LIMIT: u32 = 100;

/// Global rate limiter type alias.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Parse a `CLAIMGRAPH_RATE_LIMIT` value. Unset or unparsable values fall
/// back to the default.
pub fn parse_rate_limit(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT)
}

/// Requests per second configured in the environment.
pub fn get_rate_limit_from_env() -> u32 {
    parse_rate_limit(std::env::var("CLAIMGRAPH_RATE_LIMIT").ok().as_deref())
}

/// A limiter admitting `requests_per_second`, or `None` when that is zero.
pub fn create_rate_limiter(requests_per_second: u32) -> Option<GlobalRateLimiter> {
    let rps = NonZeroU32::new(requests_per_second)?;
    Some(Arc::new(RateLimiter::direct(Quota::per_second(rps))))
}

/// Rejects the request with 429 when the global quota is spent.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if limiter.check().is_ok() {
        return Ok(next.run(request).await);
    }
    tracing::warn!(
        method = %request.method(),
        path = %request.uri().path(),
        "Rate limit exceeded"
    );
    Err((StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"))
}

// =============================================================================
// TESTS
// =============================================================================

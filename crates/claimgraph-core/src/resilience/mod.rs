//! # Resilience
//!
//! Wrappers for calls into external capabilities (page fetch, extraction):
//! retry with exponential backoff and a per-dependency circuit breaker.
//!
//! Both are synchronous and block the calling thread while waiting. Nothing
//! here spawns threads.

mod breaker;
mod retry;

pub use breaker::{
    BreakerConfig, BreakerError, BreakerRegistry, BreakerState, CircuitBreaker, Clock, SystemClock,
};
pub use retry::{RetryPolicy, Retrier, parse_retry_after};

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// An error that knows whether the failed call is worth repeating.
pub trait RetryableError: std::fmt::Display {
    fn is_retryable(&self) -> bool;

    /// Provider-dictated wait before the next attempt, if any.
    ///
    /// Defaults to scanning the error text for a retry hint.
    fn retry_after(&self, now: DateTime<Utc>) -> Option<Duration> {
        parse_retry_after(&self.to_string(), now)
    }
}

/// Failure taxonomy for upstream fetch and extraction calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Network blip, 5xx, timeout. Retry with backoff.
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// 429 or equivalent. Retry after the provider's wait.
    #[error("rate limited: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },

    /// Billing or quota cap reached. The caller should switch to a fallback.
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    /// Credentials rejected. Abort.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Any other failure that will not go away on its own.
    #[error("permanent upstream failure: {0}")]
    Permanent(String),
}

impl RetryableError for UpstreamError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited { .. })
    }

    fn retry_after(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after: Some(wait),
                ..
            } => Some(*wait),
            Self::RateLimited { message, .. } => parse_retry_after(message, now),
            _ => None,
        }
    }
}

/// A rejected call is not retried; a failed one is judged by its own error.
impl<E: RetryableError> RetryableError for BreakerError<E> {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Open { .. } => false,
            Self::Inner(e) => e.is_retryable(),
        }
    }

    fn retry_after(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::Open { .. } => None,
            Self::Inner(e) => e.retry_after(now),
        }
    }
}

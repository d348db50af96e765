//! # Configuration
//!
//! Optional TOML file loaded with `--config`. Every section and every key
//! falls back to its default, so an empty file is a valid configuration.
//!
//! ```toml
//! [trust]
//! trusted_retailers = ["nix.ru", "citilink.ru"]
//! conflict_ratio_percent = 70
//!
//! [trust.domain_scores]
//! "ozon.ru" = 70
//!
//! [frontier]
//! stale_task_secs = 900
//!
//! [sources]
//! cache_window_hours = 24
//!
//! [retry]
//! max_attempts = 4
//!
//! [breaker]
//! failure_threshold = 5
//! ```
//!
//! Secrets and server knobs (API key, rate limit, CORS) stay in environment
//! variables; see [`crate::api`].

use claimgraph_core::{
    BreakerConfig, ClaimGraphError, RetryPolicy, TrustPolicy,
    primitives::{SOURCE_CACHE_WINDOW_HOURS, STALE_TASK_SECS},
};
use serde::Deserialize;
use std::path::Path;

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub trust: TrustPolicy,
    pub frontier: FrontierConfig,
    pub sources: SourcesConfig,
    pub retry: RetryPolicy,
    pub breaker: BreakerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FrontierConfig {
    /// Processing tasks claimed longer ago than this are returned to pending
    /// by `reclaim`.
    pub stale_task_secs: i64,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            stale_task_secs: STALE_TASK_SECS,
        }
    }
}

impl FrontierConfig {
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_task_secs.max(0))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// How long a fetched document counts as fresh.
    pub cache_window_hours: i64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            cache_window_hours: SOURCE_CACHE_WINDOW_HOURS,
        }
    }
}

impl SourcesConfig {
    pub fn cache_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cache_window_hours.max(0))
    }
}

impl AppConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ClaimGraphError> {
        toml::from_str(text).map_err(|e| ClaimGraphError::InvalidInput(format!("config: {}", e)))
    }

    /// Load from `path`, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ClaimGraphError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let metadata = std::fs::metadata(path).map_err(|e| {
            ClaimGraphError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ClaimGraphError::InvalidInput(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            ClaimGraphError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml(&text)?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

// =============================================================================
// TESTS
// =============================================================================

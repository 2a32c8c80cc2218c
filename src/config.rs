// src/config.rs
// =============================================================================
// Runtime configuration for a scan.
//
// Every tunable (request rate, retry budget, backoff schedule, timeout,
// worker count) lives here instead of being hard-coded. The CLI builds a
// ScanConfig from flags and WAYBACK_* environment variables; tests build one
// directly and point the endpoints at a mock server.
// =============================================================================

use std::time::Duration;

use crate::archive::{period_for, RetryPolicy};
use crate::error::ErrorKind;

pub const DEFAULT_USER_AGENT: &str = concat!("wayback-scan/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 1.0;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where the three archive APIs live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// CDX listing API
    pub cdx: String,
    /// Availability ("closest capture") API
    pub availability: String,
    /// Prefix for archived content, followed by `/<timestamp>id_/<url>`
    pub content: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            cdx: "https://web.archive.org/cdx/search/cdx".to_string(),
            availability: "https://archive.org/wayback/available".to_string(),
            content: "https://web.archive.org/web".to_string(),
        }
    }
}

impl Endpoints {
    /// Serves every API from one base URL, using the public path layout.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            cdx: format!("{}/cdx/search/cdx", base),
            availability: format!("{}/wayback/available", base),
            content: format!("{}/web", base),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub requests_per_second: f64,
    pub concurrency: usize,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub user_agent: String,
    pub endpoints: Endpoints,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            concurrency: DEFAULT_CONCURRENCY,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            endpoints: Endpoints::default(),
        }
    }
}

/// Reasons a configuration is refused before any request is made.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Pool(#[from] ErrorKind),

    #[error("request rate must be a positive, representable number of requests per second (got {0})")]
    InvalidRate(f64),
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency < 1 {
            return Err(ErrorKind::PoolExhausted(self.concurrency).into());
        }
        // Also refuses rates whose request spacing the limiter can't represent
        if period_for(self.requests_per_second).is_none() {
            return Err(ConfigError::InvalidRate(self.requests_per_second));
        }
        Ok(())
    }
}

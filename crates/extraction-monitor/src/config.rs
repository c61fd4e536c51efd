//! Configuration for the extraction monitor and its components.
//!
//! Every struct has a `Default` built from the constants below and accepts
//! partial JSON (missing keys keep their defaults).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{MonitorError, Result};

/// Default calls admitted per endpoint window.
pub const DEFAULT_CALL_LIMIT: u32 = 100;

/// Default endpoint window length (seconds).
pub const DEFAULT_WINDOW_SECS: u64 = 120;

/// Throttle applied when the provider signals 429 without a retry hint (seconds).
pub const DEFAULT_THROTTLE_SECS: u64 = 60;

/// Initial backoff delay (seconds).
pub const DEFAULT_BASE_DELAY_SECS: f64 = 1.0;

/// Upper bound for the stored backoff delay (seconds).
pub const DEFAULT_MAX_DELAY_SECS: f64 = 300.0;

/// Backoff growth factor.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default attempt budget for a reported error.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Running entities without progress for this long are flagged as stalled (seconds).
pub const DEFAULT_STALL_THRESHOLD_SECS: u64 = 600;

/// Background loop period (seconds).
pub const DEFAULT_LOOP_INTERVAL_SECS: u64 = 5;

/// Background loop period after a failed iteration (seconds).
pub const DEFAULT_ERROR_BACKOFF_SECS: u64 = 10;

/// Number of errors included in a status snapshot.
pub const DEFAULT_RECENT_ERROR_LIMIT: usize = 10;

/// Rate limiter configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Calls admitted per window for endpoints without an explicit override.
    pub default_limit: u32,
    /// Window length for endpoints without an explicit override.
    pub window_secs: u64,
    /// Throttle duration used when the provider gives no retry-after hint.
    pub default_throttle_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn default_throttle(&self) -> Duration {
        Duration::from_secs(self.default_throttle_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_CALL_LIMIT,
            window_secs: DEFAULT_WINDOW_SECS,
            default_throttle_secs: DEFAULT_THROTTLE_SECS,
        }
    }
}

/// Retry policy configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    pub base_delay_secs: f64,
    pub max_delay_secs: f64,
    pub backoff_multiplier: f64,
    /// Attempt budget stamped onto newly recorded errors.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: DEFAULT_BASE_DELAY_SECS,
            max_delay_secs: DEFAULT_MAX_DELAY_SECS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Top-level monitor configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorConfig {
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub stall_threshold_secs: u64,
    pub loop_interval_secs: u64,
    pub error_backoff_secs: u64,
    pub recent_error_limit: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            stall_threshold_secs: DEFAULT_STALL_THRESHOLD_SECS,
            loop_interval_secs: DEFAULT_LOOP_INTERVAL_SECS,
            error_backoff_secs: DEFAULT_ERROR_BACKOFF_SECS,
            recent_error_limit: DEFAULT_RECENT_ERROR_LIMIT,
        }
    }
}

impl MonitorConfig {
    /// Parses a (possibly partial) JSON document and validates the result.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MonitorError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the components cannot work with.
    pub fn validate(&self) -> Result<()> {
        let invalid =
            |msg: &str| -> Result<()> { Err(MonitorError::InvalidConfig(msg.to_string())) };

        if self.rate_limit.default_limit == 0 {
            return invalid("rateLimit.defaultLimit must be positive");
        }
        if self.rate_limit.window_secs == 0 {
            return invalid("rateLimit.windowSecs must be positive");
        }
        if self.retry.base_delay_secs.is_nan() || self.retry.base_delay_secs <= 0.0 {
            return invalid("retry.baseDelaySecs must be positive");
        }
        if self.retry.base_delay_secs > self.retry.max_delay_secs {
            return invalid("retry.baseDelaySecs must not exceed retry.maxDelaySecs");
        }
        if self.retry.backoff_multiplier.is_nan() || self.retry.backoff_multiplier < 1.0 {
            return invalid("retry.backoffMultiplier must be at least 1.0");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.maxAttempts must be positive");
        }
        if self.loop_interval_secs == 0 || self.error_backoff_secs == 0 {
            return invalid("loop intervals must be positive");
        }
        Ok(())
    }

    pub fn stall_threshold(&self) -> Duration {
        Duration::from_secs(self.stall_threshold_secs)
    }

    pub fn loop_interval(&self) -> Duration {
        Duration::from_secs(self.loop_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

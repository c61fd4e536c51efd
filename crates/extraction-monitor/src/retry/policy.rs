//! Exponential backoff with jitter for reported failures.
//!
//! The policy keeps one backoff state per error id. Every call to
//! [`RetryPolicy::next_delay`] grows the stored delay geometrically
//! (`stored * multiplier^attempt`, capped at the maximum) whether or not the
//! caller ends up retrying. Jitter only perturbs the returned value and is
//! never written back.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};
use rand::Rng;

use crate::config::RetryConfig;
use crate::errors::RetryClass;
use crate::models::{RetryableError, Severity};

/// Error kinds (or fragments of them) that retrying can never fix.
const NON_RETRYABLE_KINDS: &[&str] = &[
    "invalid_credential",
    "invalid_api_key",
    "forbidden",
    "not_found",
    "invalid_identifier",
];

/// Jitter factor range applied to returned delays.
const JITTER_MIN: f64 = 0.8;
const JITTER_MAX: f64 = 1.2;

#[derive(Debug)]
struct BackoffState {
    /// Stored (pre-jitter) delay in seconds.
    current_delay: f64,
    /// Bookkeeping counter, independent of `RetryableError::attempt_count`.
    attempts: u32,
}

/// Retry eligibility and backoff computation.
pub struct RetryPolicy {
    config: RetryConfig,
    states: Mutex<HashMap<String, BackoffState>>,
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::with_config(RetryConfig::default())
    }

    pub fn with_config(config: RetryConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn lock_states(&self) -> MutexGuard<'_, HashMap<String, BackoffState>> {
        self.states.lock().unwrap_or_else(|poisoned| {
            warn!("Retry policy mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Returns the retry classification for this error.
    ///
    /// - [`RetryClass::Never`]: Critical severity or a permanent kind
    /// - [`RetryClass::Exhausted`]: the attempt budget is used up
    /// - [`RetryClass::WithBackoff`]: eligible for another attempt
    pub fn classify(&self, error: &RetryableError) -> RetryClass {
        if error.severity == Severity::Critical || is_non_retryable_kind(&error.kind) {
            RetryClass::Never
        } else if error.attempt_count >= error.max_attempts {
            RetryClass::Exhausted
        } else {
            RetryClass::WithBackoff
        }
    }

    pub fn should_retry(&self, error: &RetryableError) -> bool {
        self.classify(error).is_retryable()
    }

    /// Computes the delay before the next attempt for `error_id`.
    ///
    /// The stored delay is seeded at the base delay on first use and
    /// multiplied by `multiplier^attempt` on every call, capped at the
    /// maximum. The returned value is the stored delay times a uniform jitter
    /// factor in `[0.8, 1.2]`.
    pub fn next_delay(&self, error_id: &str, attempt: u32) -> Duration {
        let stored = {
            let mut states = self.lock_states();
            let state = states
                .entry(error_id.to_string())
                .or_insert_with(|| BackoffState {
                    current_delay: self.config.base_delay_secs,
                    attempts: 0,
                });

            let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
            let grown = state.current_delay * self.config.backoff_multiplier.powi(exponent);
            state.current_delay = grown.min(self.config.max_delay_secs);
            state.current_delay
        };

        let jitter = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
        let delay = stored * jitter;
        debug!(
            "Retry policy: error {} attempt {} -> {:.2}s (stored {:.2}s)",
            error_id, attempt, delay, stored
        );
        Duration::from_secs_f64(delay)
    }

    /// Stored pre-jitter delay for an error, if any delay was computed.
    pub fn current_delay(&self, error_id: &str) -> Option<Duration> {
        self.lock_states()
            .get(error_id)
            .map(|state| Duration::from_secs_f64(state.current_delay))
    }

    /// Counts a retry attempt for `error_id`, returning the new count.
    pub fn record_attempt(&self, error_id: &str) -> u32 {
        let mut states = self.lock_states();
        let state = states
            .entry(error_id.to_string())
            .or_insert_with(|| BackoffState {
                current_delay: self.config.base_delay_secs,
                attempts: 0,
            });
        state.attempts += 1;
        state.attempts
    }

    pub fn attempts(&self, error_id: &str) -> u32 {
        self.lock_states()
            .get(error_id)
            .map(|state| state.attempts)
            .unwrap_or(0)
    }

    /// Forget all backoff state for `error_id`.
    pub fn reset(&self, error_id: &str) {
        if self.lock_states().remove(error_id).is_some() {
            debug!("Retry policy: reset state for error {}", error_id);
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `kind` names a failure that retrying cannot fix.
///
/// Matching is case-insensitive and treats `-` and spaces like `_`, so
/// "Invalid-Credentials" and "HTTP 403 Forbidden" both match.
pub fn is_non_retryable_kind(kind: &str) -> bool {
    let normalized: String = kind
        .chars()
        .map(|c| match c {
            '-' | ' ' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    NON_RETRYABLE_KINDS
        .iter()
        .any(|pattern| normalized.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::kinds;

    fn make_error(kind: &str, severity: Severity, attempts: u32) -> RetryableError {
        let mut error = RetryableError::new("op", "alice", kind, "boom", severity, 3);
        error.attempt_count = attempts;
        error
    }

    #[test]
    fn test_transient_error_retries() {
        let policy = RetryPolicy::new();
        let error = make_error(kinds::TIMEOUT, Severity::Medium, 0);
        assert!(policy.should_retry(&error));
        assert_eq!(policy.classify(&error), RetryClass::WithBackoff);
    }

    #[test]
    fn test_critical_never_retries() {
        let policy = RetryPolicy::new();
        let error = make_error(kinds::TIMEOUT, Severity::Critical, 0);
        assert!(!policy.should_retry(&error));
        assert_eq!(policy.classify(&error), RetryClass::Never);
    }

    #[test]
    fn test_forbidden_never_retries_regardless_of_attempts() {
        let policy = RetryPolicy::new();
        for attempts in 0..3 {
            let error = make_error("http_403_forbidden", Severity::Low, attempts);
            assert!(!policy.should_retry(&error));
        }
    }

    #[test]
    fn test_exhausted_attempts_stop_retrying() {
        let policy = RetryPolicy::new();
        let error = make_error(kinds::RATE_LIMITED, Severity::Medium, 3);
        assert!(!policy.should_retry(&error));
        assert_eq!(policy.classify(&error), RetryClass::Exhausted);
    }

    #[test]
    fn test_non_retryable_kind_matching() {
        assert!(is_non_retryable_kind("Invalid-Credentials"));
        assert!(is_non_retryable_kind("account not found"));
        assert!(is_non_retryable_kind("INVALID_IDENTIFIER"));
        assert!(!is_non_retryable_kind(kinds::TIMEOUT));
        assert!(!is_non_retryable_kind(kinds::STALLED));
    }

    #[test]
    fn test_stored_delay_grows_geometrically_per_call() {
        let policy = RetryPolicy::new();

        policy.next_delay("e1", 1);
        assert_eq!(policy.current_delay("e1"), Some(Duration::from_secs(2)));

        // Same attempt again still compounds the stored delay
        policy.next_delay("e1", 1);
        assert_eq!(policy.current_delay("e1"), Some(Duration::from_secs(4)));

        policy.next_delay("e1", 2);
        assert_eq!(policy.current_delay("e1"), Some(Duration::from_secs(16)));
    }

    #[test]
    fn test_attempt_zero_returns_jittered_base() {
        let policy = RetryPolicy::new();
        let delay = policy.next_delay("e1", 0);
        assert!(delay >= Duration::from_secs_f64(0.8));
        assert!(delay <= Duration::from_secs_f64(1.2));
        assert_eq!(policy.current_delay("e1"), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_delay_capped_at_max_with_jitter() {
        let policy = RetryPolicy::new();
        for attempt in 0..20 {
            let delay = policy.next_delay("e1", attempt);
            assert!(delay <= Duration::from_secs_f64(300.0 * 1.2));
        }
        assert_eq!(policy.current_delay("e1"), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_attempt_counter_and_reset() {
        let policy = RetryPolicy::new();
        assert_eq!(policy.record_attempt("e1"), 1);
        assert_eq!(policy.record_attempt("e1"), 2);
        assert_eq!(policy.attempts("e1"), 2);
        policy.next_delay("e1", 3);

        policy.reset("e1");
        assert_eq!(policy.attempts("e1"), 0);
        assert!(policy.current_delay("e1").is_none());

        // Fresh start after reset
        policy.next_delay("e1", 1);
        assert_eq!(policy.current_delay("e1"), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_error_ids_are_isolated() {
        let policy = RetryPolicy::new();
        policy.next_delay("e1", 4);
        policy.next_delay("e2", 1);
        assert_eq!(policy.current_delay("e1"), Some(Duration::from_secs(16)));
        assert_eq!(policy.current_delay("e2"), Some(Duration::from_secs(2)));
    }
}

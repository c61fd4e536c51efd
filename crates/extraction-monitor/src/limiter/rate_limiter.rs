//! Fixed-window rate limiter for remote API endpoints.
//!
//! Each endpoint gets its own call window with a configurable limit and
//! duration. Provider throttle signals (HTTP 429) override the counter for the
//! requested time, either for one endpoint or globally.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::RateLimitConfig;

/// Maximum number of calls kept for recent-activity reporting.
const HISTORY_CAPACITY: usize = 1000;

/// Look-back used by the snapshot's recent call count.
const RECENT_ACTIVITY_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Call window for a single endpoint.
#[derive(Debug)]
struct RateWindow {
    /// Calls made since `window_start`.
    calls_made: u32,
    /// Calls admitted per window.
    limit: u32,
    window_start: Instant,
    window_duration: Duration,
    /// Provider-imposed throttle expiry.
    throttled_until: Option<Instant>,
}

impl RateWindow {
    fn new(limit: u32, window_duration: Duration) -> Self {
        Self {
            calls_made: 0,
            limit,
            window_start: Instant::now(),
            window_duration,
            throttled_until: None,
        }
    }

    /// Start a fresh window if the current one has elapsed.
    fn roll(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= self.window_duration {
            self.calls_made = 0;
            self.window_start = now;
        }
    }

    fn throttle_remaining(&self, now: Instant) -> Duration {
        self.throttled_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    fn is_throttled(&self, now: Instant) -> bool {
        self.throttle_remaining(now) > Duration::ZERO
    }

    fn admits(&self, now: Instant) -> bool {
        !self.is_throttled(now) && self.calls_made < self.limit
    }

    /// Time until the counter resets, or zero when calls are still available.
    fn window_remaining(&self, now: Instant) -> Duration {
        if self.calls_made < self.limit {
            return Duration::ZERO;
        }
        self.window_duration
            .saturating_sub(now.duration_since(self.window_start))
    }
}

/// Per-endpoint limit override.
#[derive(Clone, Debug, PartialEq)]
pub struct EndpointLimit {
    pub limit: u32,
    pub window: Duration,
}

/// A single recorded call, kept for recent-activity reporting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub success: bool,
}

/// Observability view of one endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSnapshot {
    pub calls_made: u32,
    pub limit: u32,
    pub window_elapsed_secs: f64,
    pub throttled: bool,
    pub can_call: bool,
}

/// Observability view of the whole limiter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterSnapshot {
    pub endpoints: BTreeMap<String, EndpointSnapshot>,
    pub global_throttled: bool,
    /// Calls recorded in the last five minutes.
    pub recent_calls: usize,
}

/// Rate limiter for multiple endpoints.
///
/// Thread-safe limiter that maintains per-endpoint call windows. Windows are
/// created on demand from the default configuration, or can be pre-configured
/// with custom limits. The limiter never sleeps: callers ask [`can_call`]
/// before each request and use [`wait_time`] to decide how long to back off.
///
/// [`can_call`]: RateLimiter::can_call
/// [`wait_time`]: RateLimiter::wait_time
pub struct RateLimiter {
    config: RateLimitConfig,
    /// Per-endpoint call windows.
    windows: Mutex<HashMap<String, RateWindow>>,
    /// Per-endpoint configuration overrides.
    overrides: Mutex<HashMap<String, EndpointLimit>>,
    /// Global throttle expiry, checked before any endpoint state.
    global_throttle: Mutex<Option<Instant>>,
    history: Mutex<VecDeque<CallRecord>>,
}

impl RateLimiter {
    /// Create a new rate limiter with default settings.
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
            overrides: Mutex::new(HashMap::new()),
            global_throttle: Mutex::new(None),
            history: Mutex::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
        }
    }

    /// Lock the windows mutex, recovering from poison if necessary.
    ///
    /// A poisoned window map only risks a slightly wrong admission decision,
    /// which is preferable to panicking in every reporting worker.
    fn lock_windows(&self) -> MutexGuard<'_, HashMap<String, RateWindow>> {
        self.windows.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter windows mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_overrides(&self) -> MutexGuard<'_, HashMap<String, EndpointLimit>> {
        self.overrides.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter overrides mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_global(&self) -> MutexGuard<'_, Option<Instant>> {
        self.global_throttle.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter global throttle mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_history(&self) -> MutexGuard<'_, VecDeque<CallRecord>> {
        self.history.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter history mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Configure the limit for a specific endpoint.
    pub fn configure(&self, endpoint: &str, limit: u32, window: Duration) {
        let mut overrides = self.lock_overrides();
        overrides.insert(endpoint.to_string(), EndpointLimit { limit, window });
        drop(overrides); // Release overrides lock before acquiring windows lock

        // Drop the existing window so the next call picks up the new limit
        let mut windows = self.lock_windows();
        windows.remove(endpoint);
    }

    /// Check whether a call to `endpoint` is currently admitted.
    ///
    /// The global throttle is checked first and cleared once expired. Then the
    /// endpoint's window is reset if elapsed; an active endpoint throttle
    /// denies regardless of the counter.
    pub fn can_call(&self, endpoint: &str) -> bool {
        let now = Instant::now();

        if self.global_throttle_active(now) {
            debug!("Rate limiter: global throttle active, denying '{}'", endpoint);
            return false;
        }

        let mut windows = self.lock_windows();
        let window = windows
            .entry(endpoint.to_string())
            .or_insert_with(|| self.create_window(endpoint));

        window.roll(now);
        window.admits(now)
    }

    /// Record a call made to `endpoint`.
    pub fn record_call(&self, endpoint: &str, success: bool) {
        let now = Instant::now();
        {
            let mut windows = self.lock_windows();
            let window = windows
                .entry(endpoint.to_string())
                .or_insert_with(|| self.create_window(endpoint));
            window.roll(now);
            window.calls_made += 1;
            debug!(
                "Rate limiter: '{}' at {}/{} calls",
                endpoint, window.calls_made, window.limit
            );
        }

        let mut history = self.lock_history();
        if history.len() >= HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(CallRecord {
            timestamp: Utc::now(),
            endpoint: endpoint.to_string(),
            success,
        });
    }

    /// Absorb a provider throttle response (HTTP 429) for one endpoint.
    ///
    /// Without a retry-after hint the configured default throttle is applied.
    pub fn on_provider_throttle_signal(&self, endpoint: &str, retry_after: Option<Duration>) {
        let duration = retry_after.unwrap_or_else(|| self.config.default_throttle());
        let mut windows = self.lock_windows();
        let window = windows
            .entry(endpoint.to_string())
            .or_insert_with(|| self.create_window(endpoint));
        window.throttled_until = Some(Instant::now() + duration);
        info!(
            "Rate limiter: provider throttled '{}' for {:?}",
            endpoint, duration
        );
    }

    /// Throttle every endpoint for the given duration.
    pub fn on_global_throttle_signal(&self, retry_after: Option<Duration>) {
        let duration = retry_after.unwrap_or_else(|| self.config.default_throttle());
        *self.lock_global() = Some(Instant::now() + duration);
        info!("Rate limiter: global throttle engaged for {:?}", duration);
    }

    /// Lift a provider throttle from an endpoint before it expires.
    pub fn clear_throttle(&self, endpoint: &str) {
        if let Some(window) = self.lock_windows().get_mut(endpoint) {
            window.throttled_until = None;
            debug!("Rate limiter: throttle cleared for '{}'", endpoint);
        }
    }

    /// How long the caller should wait before calling `endpoint`.
    ///
    /// Zero when a call is admitted now; otherwise the largest of the
    /// remaining global throttle, endpoint throttle and window time.
    pub fn wait_time(&self, endpoint: &str) -> Duration {
        let now = Instant::now();

        let global_until = *self.lock_global();
        let global = global_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO);

        let mut windows = self.lock_windows();
        let window = windows
            .entry(endpoint.to_string())
            .or_insert_with(|| self.create_window(endpoint));
        window.roll(now);

        global
            .max(window.throttle_remaining(now))
            .max(window.window_remaining(now))
    }

    /// Snapshot of every tracked endpoint, for observability only.
    pub fn snapshot(&self) -> RateLimiterSnapshot {
        let now = Instant::now();
        let global_until = *self.lock_global();
        let global_throttled = global_until.is_some_and(|until| until > now);

        let endpoints = self
            .lock_windows()
            .iter()
            .map(|(endpoint, window)| {
                let elapsed = now.duration_since(window.window_start);
                let expired = elapsed >= window.window_duration;
                let calls_made = if expired { 0 } else { window.calls_made };
                let throttled = window.is_throttled(now);
                let snapshot = EndpointSnapshot {
                    calls_made,
                    limit: window.limit,
                    window_elapsed_secs: if expired { 0.0 } else { elapsed.as_secs_f64() },
                    throttled,
                    can_call: !global_throttled && !throttled && calls_made < window.limit,
                };
                (endpoint.clone(), snapshot)
            })
            .collect();

        RateLimiterSnapshot {
            endpoints,
            global_throttled,
            recent_calls: self.calls_since(RECENT_ACTIVITY_WINDOW),
        }
    }

    /// The most recent calls, oldest first.
    pub fn recent_activity(&self, limit: usize) -> Vec<CallRecord> {
        let history = self.lock_history();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    /// Forget an endpoint's window and throttle.
    pub fn reset(&self, endpoint: &str) {
        self.lock_windows().remove(endpoint);
    }

    fn calls_since(&self, look_back: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(look_back).unwrap_or_else(|_| chrono::Duration::zero());
        self.lock_history()
            .iter()
            .filter(|record| record.timestamp >= cutoff)
            .count()
    }

    /// Checks the global throttle, clearing it once expired.
    fn global_throttle_active(&self, now: Instant) -> bool {
        let mut global = self.lock_global();
        match *global {
            Some(until) if until > now => true,
            Some(_) => {
                info!("Rate limiter: global throttle expired");
                *global = None;
                false
            }
            None => false,
        }
    }

    /// Create a window for an endpoint, using its override if available.
    fn create_window(&self, endpoint: &str) -> RateWindow {
        let overrides = self.lock_overrides();

        if let Some(limit) = overrides.get(endpoint) {
            RateWindow::new(limit.limit, limit.window)
        } else {
            RateWindow::new(self.config.default_limit, self.config.window())
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_limiter(limit: u32) -> RateLimiter {
        RateLimiter::with_config(RateLimitConfig {
            default_limit: limit,
            window_secs: 60,
            default_throttle_secs: 60,
        })
    }

    fn exhaust(limiter: &RateLimiter, endpoint: &str) {
        while limiter.can_call(endpoint) {
            limiter.record_call(endpoint, true);
        }
    }

    #[test]
    fn test_window_admits_up_to_limit() {
        let limiter = small_limiter(3);

        for _ in 0..3 {
            assert!(limiter.can_call("matches"));
            limiter.record_call("matches", true);
        }

        // Next call should be denied (window full)
        assert!(!limiter.can_call("matches"));
        assert!(limiter.wait_time("matches") > Duration::ZERO);
    }

    #[test]
    fn test_window_resets_after_elapsing() {
        let limiter = small_limiter(1);
        limiter.record_call("matches", true);
        assert!(!limiter.can_call("matches"));

        // Simulate the window having elapsed
        {
            let mut windows = limiter.lock_windows();
            let window = windows.get_mut("matches").unwrap();
            window.window_start = Instant::now() - Duration::from_secs(61);
        }

        assert!(limiter.can_call("matches"));
        assert_eq!(limiter.wait_time("matches"), Duration::ZERO);
    }

    #[test]
    fn test_endpoint_isolation() {
        let limiter = small_limiter(2);
        exhaust(&limiter, "matches");
        assert!(!limiter.can_call("matches"));

        // Other endpoint should still admit calls
        assert!(limiter.can_call("accounts"));
    }

    #[test]
    fn test_custom_endpoint_limit() {
        let limiter = small_limiter(100);
        limiter.configure("timeline", 2, Duration::from_secs(10));

        limiter.record_call("timeline", true);
        limiter.record_call("timeline", true);
        assert!(!limiter.can_call("timeline"));

        let snapshot = limiter.snapshot();
        assert_eq!(snapshot.endpoints["timeline"].limit, 2);
    }

    #[test]
    fn test_throttle_signal_denies_regardless_of_counter() {
        let limiter = small_limiter(100);
        limiter.on_provider_throttle_signal("matches", Some(Duration::from_secs(30)));

        assert!(!limiter.can_call("matches"));

        let first = limiter.wait_time("matches");
        assert!(first <= Duration::from_secs(30));
        assert!(first > Duration::from_secs(29));

        std::thread::sleep(Duration::from_millis(20));
        let second = limiter.wait_time("matches");
        assert!(second <= first);
    }

    #[test]
    fn test_throttle_without_hint_uses_default() {
        let limiter = small_limiter(100);
        limiter.on_provider_throttle_signal("matches", None);

        let wait = limiter.wait_time("matches");
        assert!(wait > Duration::from_secs(59));
        assert!(wait <= Duration::from_secs(60));
    }

    #[test]
    fn test_expired_throttle_admits_again() {
        let limiter = small_limiter(100);
        limiter.on_provider_throttle_signal("matches", Some(Duration::from_millis(10)));
        assert!(!limiter.can_call("matches"));

        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.can_call("matches"));
    }

    #[test]
    fn test_clear_throttle() {
        let limiter = small_limiter(100);
        limiter.on_provider_throttle_signal("matches", Some(Duration::from_secs(30)));
        assert!(!limiter.can_call("matches"));

        limiter.clear_throttle("matches");
        assert!(limiter.can_call("matches"));
    }

    #[test]
    fn test_global_throttle_checked_first_and_cleared() {
        let limiter = small_limiter(100);
        limiter.on_global_throttle_signal(Some(Duration::from_secs(30)));

        assert!(!limiter.can_call("matches"));
        assert!(!limiter.can_call("accounts"));
        assert!(limiter.wait_time("accounts") > Duration::from_secs(29));

        // Simulate expiry
        *limiter.lock_global() = Some(Instant::now() - Duration::from_secs(1));

        assert!(limiter.can_call("matches"));
        assert!(limiter.lock_global().is_none());
    }

    #[test]
    fn test_history_is_bounded() {
        let limiter = small_limiter(u32::MAX);
        for i in 0..(HISTORY_CAPACITY + 50) {
            limiter.record_call("matches", i % 2 == 0);
        }

        assert_eq!(limiter.lock_history().len(), HISTORY_CAPACITY);
        assert_eq!(limiter.recent_activity(5).len(), 5);
    }

    #[test]
    fn test_snapshot_reports_endpoints_and_recent_calls() {
        let limiter = small_limiter(2);
        limiter.record_call("matches", true);
        limiter.record_call("matches", false);
        limiter.record_call("accounts", true);

        let snapshot = limiter.snapshot();
        assert_eq!(snapshot.recent_calls, 3);
        assert!(!snapshot.global_throttled);

        let matches = &snapshot.endpoints["matches"];
        assert_eq!(matches.calls_made, 2);
        assert!(!matches.can_call);
        assert!(!matches.throttled);

        assert!(snapshot.endpoints["accounts"].can_call);
    }

    #[test]
    fn test_reset_restores_capacity() {
        let limiter = small_limiter(1);
        limiter.record_call("matches", true);
        assert!(!limiter.can_call("matches"));

        limiter.reset("matches");
        assert!(limiter.can_call("matches"));
    }
}

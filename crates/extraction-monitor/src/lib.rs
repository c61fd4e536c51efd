//! Extraction Monitor Crate
//!
//! Coordination layer for long-running, multi-entity batch extraction jobs
//! against a rate-limited remote API. The crate never performs network I/O:
//! workers ask it for admission, report outcomes, and poll for cancellation.
//!
//! # Overview
//!
//! - Per-endpoint call windows with provider and global throttle signals
//! - Exponential backoff with jitter for transient failures
//! - Rulebook validation and severity-weighted quality scores for records
//! - Live and historical operation metrics with tuning suggestions
//! - A per-entity state machine reconciled by a background task
//!
//! # Architecture
//!
//! ```text
//!   worker                                  ops tooling
//!     |  can_call / record_call / wait_time      |  status / request_cancel
//!     v                                          v
//! +-------------+     +-------------------------------------------+
//! | RateLimiter | <-- |                 Monitor                   |
//! +-------------+     |  operations -> entities -> EntityProgress |
//!                     |  operations -> [RetryableError]           |
//!                     +-------------------------------------------+
//!                        |              |                 |
//!                        v              v                 v
//!                 +-------------+ +------------------+ +------------------+
//!                 | RetryPolicy | | QualityValidator | | MetricsCollector |
//!                 +-------------+ +------------------+ +------------------+
//! ```
//!
//! The background task ([`Monitor::start_monitoring`]) recomputes rates and
//! ETAs, flags stalled entities, re-arms retries and finalizes operations
//! whose entities are all terminal.
//!
//! # Core Types
//!
//! - [`Monitor`] - Orchestrator and entry point for workers and tooling
//! - [`EntityProgress`] / [`ProgressUpdate`] - Entity state and partial reports
//! - [`RetryableError`] - A reported failure with retry bookkeeping
//! - [`OperationMetrics`] - Live or finalized performance record
//! - [`MonitorConfig`] - Tunables, loadable from partial JSON

pub mod config;
pub mod errors;
pub mod limiter;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod quality;
pub mod retry;

pub use config::{MonitorConfig, RateLimitConfig, RetryConfig};
pub use errors::{MonitorError, Result, RetryClass};
pub use limiter::{RateLimiter, RateLimiterSnapshot};
pub use metrics::MetricsCollector;
pub use models::{
    kinds, EntityProgress, EntityStatus, OperationMetrics, ProgressUpdate, QualityCheck,
    RecordKind, RetryableError, Severity,
};
pub use monitor::{Monitor, OperationStatus, StatusCounts};
pub use quality::{QualitySummary, QualityValidator};
pub use retry::RetryPolicy;

//! Operation orchestration.
//!
//! [`Monitor`] owns the operation registry and composes the rate limiter,
//! retry policy, quality validator and metrics collector. Workers report
//! through it; a background task started with
//! [`Monitor::start_monitoring`] reconciles derived state.

mod reconcile;
mod service;
mod state;
mod status;
mod task;

pub use service::Monitor;
pub use status::{OperationStatus, StatusCounts};

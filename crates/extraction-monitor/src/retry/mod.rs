//! Retry eligibility and backoff.

mod policy;

pub use policy::{is_non_retryable_kind, RetryPolicy};

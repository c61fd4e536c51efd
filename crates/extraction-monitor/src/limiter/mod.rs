//! Call admission control.

mod rate_limiter;

pub use rate_limiter::{
    CallRecord, EndpointLimit, EndpointSnapshot, RateLimiter, RateLimiterSnapshot,
};

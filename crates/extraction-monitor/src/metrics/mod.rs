//! Operation metrics collection and tuning suggestions.

mod collector;
mod suggestions;

pub use collector::MetricsCollector;
pub use suggestions::optimization_suggestions;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::OperationId;

/// Aggregated performance of an operation.
///
/// Produced live by [`MetricsCollector::live_snapshot`] and frozen into the
/// history by [`MetricsCollector::finalize`].
///
/// [`MetricsCollector::live_snapshot`]: crate::metrics::MetricsCollector::live_snapshot
/// [`MetricsCollector::finalize`]: crate::metrics::MetricsCollector::finalize
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMetrics {
    pub operation_id: OperationId,
    pub total_entities: u32,
    pub completed: u32,
    pub failed: u32,
    pub total_units: u64,
    pub total_calls: u64,
    pub total_errors: u64,
    /// Mean of sampled entity rates (units per minute).
    pub avg_rate: f64,
    pub peak_rate: f64,
    pub duration_secs: f64,
    pub efficiency_score: f64,
    /// Mean quality score of validated records; 0 when nothing was validated.
    pub quality_score: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl OperationMetrics {
    /// Errors per call, with calls floored at one.
    pub fn error_rate(&self) -> f64 {
        self.total_errors as f64 / self.total_calls.max(1) as f64
    }

    /// Share of entities that ended in failure; 0 for an empty operation.
    pub fn failure_rate(&self) -> f64 {
        if self.total_entities == 0 {
            0.0
        } else {
            f64::from(self.failed) / f64::from(self.total_entities)
        }
    }
}

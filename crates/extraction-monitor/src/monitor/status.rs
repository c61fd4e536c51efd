use serde::{Deserialize, Serialize};

use crate::limiter::RateLimiterSnapshot;
use crate::models::{EntityProgress, EntityStatus, OperationId, OperationMetrics, RetryableError};

/// Number of entities in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub not_started: usize,
    pub initializing: usize,
    pub running: usize,
    pub paused: usize,
    pub retrying: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    pub fn tally<'a>(entities: impl IntoIterator<Item = &'a EntityProgress>) -> Self {
        let mut counts = Self::default();
        for progress in entities {
            let slot = match progress.status {
                EntityStatus::NotStarted => &mut counts.not_started,
                EntityStatus::Initializing => &mut counts.initializing,
                EntityStatus::Running => &mut counts.running,
                EntityStatus::Paused => &mut counts.paused,
                EntityStatus::Retrying => &mut counts.retrying,
                EntityStatus::Completed => &mut counts.completed,
                EntityStatus::Failed => &mut counts.failed,
                EntityStatus::Cancelled => &mut counts.cancelled,
            };
            *slot += 1;
        }
        counts
    }

    pub fn terminal(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }
}

/// Point-in-time view of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    pub operation_id: OperationId,
    pub total_entities: usize,
    pub counts: StatusCounts,
    /// Completed entities as a percentage of all entities.
    pub progress_percentage: f64,
    pub total_units_completed: u64,
    pub total_errors: usize,
    pub cancel_requested: bool,
    /// Entities ordered by name.
    pub entities: Vec<EntityProgress>,
    /// Most recent errors, oldest first.
    pub recent_errors: Vec<RetryableError>,
    pub rate_limiter: RateLimiterSnapshot,
    pub metrics: Option<OperationMetrics>,
}

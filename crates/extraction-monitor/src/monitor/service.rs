use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::Value;

use super::state::OperationState;
use super::status::{OperationStatus, StatusCounts};
use super::task::MonitorTask;
use crate::config::MonitorConfig;
use crate::errors::{MonitorError, Result};
use crate::limiter::RateLimiter;
use crate::metrics::{optimization_suggestions, MetricsCollector};
use crate::models::{
    EntityName, EntityProgress, EntityStatus, OperationId, ProgressUpdate, RecordKind,
    RetryableError, Severity,
};
use crate::quality::QualityValidator;
use crate::retry::RetryPolicy;

/// Orchestrates extraction operations.
///
/// Workers report progress and errors; ops tooling reads status and requests
/// cancellation. A single registry lock guards every operation: reports are
/// short critical sections and operation counts stay small, so contention
/// across operations is cheap compared to the I/O the workers do. The lock is
/// always taken before any component lock (limiter, retry, metrics).
pub struct Monitor {
    pub(super) config: MonitorConfig,
    pub(super) rate_limiter: Arc<RateLimiter>,
    pub(super) retry: RetryPolicy,
    pub(super) validator: QualityValidator,
    pub(super) metrics: MetricsCollector,
    pub(super) operations: Mutex<HashMap<OperationId, OperationState>>,
    /// Cancelled operations that were already reaped.
    pub(super) reaped_cancelled: Mutex<HashSet<OperationId>>,
    pub(super) task: Mutex<Option<MonitorTask>>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::build(MonitorConfig::default())
    }

    /// Create a monitor with custom configuration.
    pub fn with_config(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: MonitorConfig) -> Self {
        Self {
            rate_limiter: Arc::new(RateLimiter::with_config(config.rate_limit.clone())),
            retry: RetryPolicy::with_config(config.retry.clone()),
            validator: QualityValidator::new(),
            metrics: MetricsCollector::new(),
            operations: Mutex::new(HashMap::new()),
            reaped_cancelled: Mutex::new(HashSet::new()),
            task: Mutex::new(None),
            config,
        }
    }

    pub(super) fn lock_operations(&self) -> MutexGuard<'_, HashMap<OperationId, OperationState>> {
        self.operations.lock().unwrap_or_else(|poisoned| {
            warn!("Monitor registry mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub(super) fn lock_reaped_cancelled(&self) -> MutexGuard<'_, HashSet<OperationId>> {
        self.reaped_cancelled.lock().unwrap_or_else(|poisoned| {
            warn!("Monitor cancellation mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Shared limiter handle for workers.
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.rate_limiter)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Register an operation. Recreating an existing id overwrites it.
    pub fn create_operation<I, S>(&self, operation_id: &str, entities: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<EntityName>,
    {
        let state = OperationState::new(entities.into_iter().map(Into::into));
        let total = u32::try_from(state.entities.len()).unwrap_or(u32::MAX);

        let mut operations = self.lock_operations();
        let previous = operations.insert(operation_id.to_string(), state);
        // Metrics restart under the registry lock.
        self.metrics.start_operation(operation_id, total);
        self.lock_reaped_cancelled().remove(operation_id);
        drop(operations);

        if let Some(previous) = previous {
            for error in &previous.errors {
                self.retry.reset(&error.id);
            }
            warn!("Monitor: operation {} recreated, previous state dropped", operation_id);
        }
        info!("Monitor: created operation {} with {} entities", operation_id, total);
    }

    /// Merge a worker's progress report into an entity.
    ///
    /// Unknown operations or entities are ignored, as are updates to entities
    /// that already reached a terminal status.
    pub fn update_entity_progress(&self, operation_id: &str, entity: &str, update: &ProgressUpdate) {
        let mut operations = self.lock_operations();
        let Some(state) = operations.get_mut(operation_id) else {
            debug!("Monitor: progress for unknown operation {} ignored", operation_id);
            return;
        };
        let Some(progress) = state.entities.get_mut(entity) else {
            debug!(
                "Monitor: progress for unknown entity {} in {} ignored",
                entity, operation_id
            );
            return;
        };
        if progress.status.is_terminal() {
            debug!(
                "Monitor: {} in {} is {}, update ignored",
                entity, operation_id, progress.status
            );
            return;
        }

        let previous_status = progress.status;
        let previous_units = progress.units_completed;
        update.apply_to(progress, Utc::now());
        let snapshot = progress.clone();

        // Leaving Retrying, or making progress while in it, means the retry ran.
        let resumed = previous_status == EntityStatus::Retrying
            && (snapshot.status == EntityStatus::Running
                || snapshot.units_completed > previous_units);
        let settled = if snapshot.status == EntityStatus::Completed {
            state.resolve_errors(entity)
        } else if resumed {
            state.resolve_rearmed(entity)
        } else {
            Vec::new()
        };
        for error_id in settled {
            self.retry.reset(&error_id);
        }
        self.metrics.record_entity_update(operation_id, &snapshot);
    }

    /// Log an error against an entity, returning the new error id.
    ///
    /// For an unknown operation the error is not stored, but an id is still
    /// returned.
    pub fn record_error(
        &self,
        operation_id: &str,
        entity: &str,
        kind: &str,
        message: &str,
        severity: Severity,
    ) -> String {
        let error = RetryableError::new(
            operation_id,
            entity,
            kind,
            message,
            severity,
            self.retry.config().max_attempts,
        );
        let error_id = error.id.clone();

        let mut operations = self.lock_operations();
        match operations.get_mut(operation_id) {
            Some(state) => {
                debug!(
                    "Monitor: {} error on {} in {}: {}",
                    severity, entity, operation_id, error.summary()
                );
                state.push_error(error);
                if let Some(progress) = state.entities.get(entity) {
                    self.metrics.record_entity_update(operation_id, progress);
                }
            }
            None => {
                debug!("Monitor: error for unknown operation {} dropped", operation_id);
            }
        }
        error_id
    }

    /// Cancel an operation. Returns false if it is unknown.
    ///
    /// Every non-terminal entity is forced to Cancelled immediately, so the
    /// operation is reaped on the next pass. Workers observe the flag through
    /// [`Monitor::should_cancel`].
    pub fn request_cancel(&self, operation_id: &str) -> bool {
        let mut operations = self.lock_operations();
        let Some(state) = operations.get_mut(operation_id) else {
            return false;
        };

        state.cancelled = true;
        let now = Utc::now();
        let mut cancelled = 0;
        for progress in state
            .entities
            .values_mut()
            .filter(|p| !p.status.is_terminal())
        {
            progress.status = EntityStatus::Cancelled;
            progress.end_time = Some(now);
            self.metrics.record_entity_update(operation_id, progress);
            cancelled += 1;
        }
        info!(
            "Monitor: cancellation requested for {} ({} entities cancelled)",
            operation_id, cancelled
        );
        true
    }

    /// True once the operation was cancelled, including after it was reaped.
    pub fn should_cancel(&self, operation_id: &str) -> bool {
        let operations = self.lock_operations();
        match operations.get(operation_id) {
            Some(state) => state.cancelled,
            None => self.lock_reaped_cancelled().contains(operation_id),
        }
    }

    /// Aggregated snapshot of an operation.
    pub fn status(&self, operation_id: &str) -> Result<OperationStatus> {
        let operations = self.lock_operations();
        let state = operations
            .get(operation_id)
            .ok_or_else(|| MonitorError::OperationNotFound(operation_id.to_string()))?;

        let entities: Vec<EntityProgress> = state.entities.values().cloned().collect();
        let counts = StatusCounts::tally(&entities);
        let progress_percentage = if entities.is_empty() {
            0.0
        } else {
            100.0 * counts.completed as f64 / entities.len() as f64
        };
        let skip = state
            .errors
            .len()
            .saturating_sub(self.config.recent_error_limit);

        Ok(OperationStatus {
            operation_id: operation_id.to_string(),
            total_entities: entities.len(),
            counts,
            progress_percentage,
            total_units_completed: entities.iter().map(|p| u64::from(p.units_completed)).sum(),
            total_errors: state.errors.len(),
            cancel_requested: state.cancelled,
            recent_errors: state.errors[skip..].to_vec(),
            entities,
            rate_limiter: self.rate_limiter.snapshot(),
            metrics: self.metrics.live_snapshot(operation_id),
        })
    }

    /// Progress of a single entity.
    pub fn entity(&self, operation_id: &str, entity: &str) -> Result<EntityProgress> {
        let operations = self.lock_operations();
        let state = operations
            .get(operation_id)
            .ok_or_else(|| MonitorError::OperationNotFound(operation_id.to_string()))?;
        state
            .entities
            .get(entity)
            .cloned()
            .ok_or_else(|| MonitorError::entity_not_found(operation_id, entity))
    }

    /// Error log of an operation, oldest first.
    pub fn errors(&self, operation_id: &str) -> Result<Vec<RetryableError>> {
        self.lock_operations()
            .get(operation_id)
            .map(|state| state.errors.clone())
            .ok_or_else(|| MonitorError::OperationNotFound(operation_id.to_string()))
    }

    /// Validate a fetched record and feed its quality score into the
    /// operation's metrics. Returns `None` for unknown operations or entities.
    pub fn record_payload(
        &self,
        operation_id: &str,
        entity: &str,
        kind: RecordKind,
        record: &Value,
    ) -> Option<f64> {
        let known = self
            .lock_operations()
            .get(operation_id)
            .is_some_and(|state| state.entities.contains_key(entity));
        if !known {
            return None;
        }

        let checks = self.validator.validate_record(kind, record);
        let score = QualityValidator::score(&checks);
        let failed: Vec<&str> = checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.as_str())
            .collect();
        if !failed.is_empty() {
            debug!(
                "Monitor: {} record for {} scored {:.1}, failed [{}]",
                kind,
                entity,
                score,
                failed.join(", ")
            );
        }

        self.metrics.record_quality_score(operation_id, score);
        Some(score)
    }

    /// Efficiency of a live or finalized operation; 0 when unknown.
    pub fn efficiency_score(&self, operation_id: &str) -> f64 {
        self.metrics.efficiency_score(operation_id)
    }

    /// Tuning hints for an operation, preferring its finalized record.
    pub fn suggestions(&self, operation_id: &str) -> Vec<String> {
        self.metrics
            .historical(operation_id)
            .or_else(|| self.metrics.live_snapshot(operation_id))
            .map(|metrics| optimization_suggestions(&metrics))
            .unwrap_or_default()
    }

    /// Ids of live operations, sorted.
    pub fn operation_ids(&self) -> Vec<OperationId> {
        let mut ids: Vec<OperationId> = self.lock_operations().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::kinds;
    use serde_json::json;

    fn monitor_with(entities: &[&str]) -> Monitor {
        let monitor = Monitor::new();
        monitor.create_operation("op", entities.iter().copied());
        monitor
    }

    #[test]
    fn test_create_operation_registers_entities() {
        let monitor = monitor_with(&["a", "b"]);

        let status = monitor.status("op").unwrap();
        assert_eq!(status.total_entities, 2);
        assert_eq!(status.counts.not_started, 2);
        assert_eq!(status.progress_percentage, 0.0);
        assert!(status.metrics.is_some());
        assert_eq!(monitor.operation_ids(), vec!["op".to_string()]);
    }

    #[test]
    fn test_recreate_overwrites() {
        let monitor = monitor_with(&["a", "b"]);
        monitor.update_entity_progress("op", "a", &ProgressUpdate::new().status(EntityStatus::Running));

        monitor.create_operation("op", ["c"]);
        let status = monitor.status("op").unwrap();
        assert_eq!(status.total_entities, 1);
        assert_eq!(status.entities[0].entity_name, "c");
    }

    #[test]
    fn test_recreate_restarts_metrics_with_registry() {
        let monitor = monitor_with(&["a"]);
        monitor.update_entity_progress(
            "op",
            "a",
            &ProgressUpdate::new()
                .status(EntityStatus::Completed)
                .units_completed(5),
        );
        monitor.create_operation("op", ["b", "c"]);

        let live = monitor.metrics().live_snapshot("op").unwrap();
        assert_eq!(live.total_entities, 2);
        assert_eq!(live.completed, 0);

        // The recreated operation is not finished, so nothing is reaped.
        monitor.reconcile().unwrap();
        assert_eq!(monitor.operation_ids(), vec!["op".to_string()]);
        assert!(monitor.metrics().history().is_empty());
    }

    #[test]
    fn test_recreate_clears_reaped_cancellation() {
        let monitor = monitor_with(&["a"]);
        monitor.request_cancel("op");
        monitor.reconcile().unwrap();
        assert!(monitor.should_cancel("op"));

        monitor.create_operation("op", ["a"]);
        assert!(!monitor.should_cancel("op"));
    }

    #[test]
    fn test_unknown_ids_are_no_ops() {
        let monitor = monitor_with(&["a"]);
        let update = ProgressUpdate::new().status(EntityStatus::Running);

        monitor.update_entity_progress("missing", "a", &update);
        monitor.update_entity_progress("op", "missing", &update);
        assert_eq!(monitor.entity("op", "a").unwrap().status, EntityStatus::NotStarted);

        assert!(!monitor.request_cancel("missing"));
        assert!(!monitor.should_cancel("missing"));
        assert!(!monitor.record_error("missing", "a", kinds::TIMEOUT, "t", Severity::Low).is_empty());
    }

    #[test]
    fn test_lookup_surfaces_not_found() {
        let monitor = monitor_with(&["a"]);
        assert_eq!(
            monitor.status("missing").unwrap_err(),
            MonitorError::OperationNotFound("missing".to_string())
        );
        assert_eq!(
            monitor.entity("op", "ghost").unwrap_err(),
            MonitorError::entity_not_found("op", "ghost")
        );
        assert!(monitor.errors("missing").is_err());
    }

    #[test]
    fn test_progress_merges_fields() {
        let monitor = monitor_with(&["a"]);
        monitor.update_entity_progress(
            "op",
            "a",
            &ProgressUpdate::new()
                .status(EntityStatus::Running)
                .units_requested(50)
                .current_step("fetching"),
        );
        monitor.update_entity_progress("op", "a", &ProgressUpdate::new().units_completed(10));

        let progress = monitor.entity("op", "a").unwrap();
        assert_eq!(progress.status, EntityStatus::Running);
        assert_eq!(progress.units_requested, 50);
        assert_eq!(progress.units_completed, 10);
        assert_eq!(progress.current_step, "fetching");
        assert!(progress.start_time.is_some());
    }

    #[test]
    fn test_terminal_entities_are_immutable() {
        let monitor = monitor_with(&["a"]);
        monitor.update_entity_progress("op", "a", &ProgressUpdate::new().status(EntityStatus::Failed));
        monitor.update_entity_progress(
            "op",
            "a",
            &ProgressUpdate::new()
                .status(EntityStatus::Running)
                .units_completed(5),
        );

        let progress = monitor.entity("op", "a").unwrap();
        assert_eq!(progress.status, EntityStatus::Failed);
        assert_eq!(progress.units_completed, 0);
        assert!(progress.end_time.is_some());
    }

    #[test]
    fn test_record_error_updates_entity() {
        let monitor = monitor_with(&["a"]);
        let id = monitor.record_error("op", "a", kinds::TIMEOUT, "read timed out", Severity::Medium);

        let progress = monitor.entity("op", "a").unwrap();
        assert_eq!(progress.error_count, 1);
        assert_eq!(progress.last_error.as_deref(), Some("timeout: read timed out"));

        let errors = monitor.errors("op").unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].id, id);
        assert_eq!(errors[0].max_attempts, monitor.config().retry.max_attempts);
        assert!(!errors[0].resolved);
    }

    #[test]
    fn test_completion_resolves_open_errors() {
        let monitor = monitor_with(&["a"]);
        monitor.update_entity_progress("op", "a", &ProgressUpdate::new().status(EntityStatus::Running));
        let id = monitor.record_error("op", "a", kinds::SERVER_ERROR, "503", Severity::Medium);
        monitor.retry_policy().record_attempt(&id);

        monitor.update_entity_progress("op", "a", &ProgressUpdate::new().status(EntityStatus::Completed));

        let errors = monitor.errors("op").unwrap();
        assert!(errors[0].resolved);
        assert_eq!(monitor.retry_policy().attempts(&id), 0);
    }

    #[test]
    fn test_resumed_entity_resolves_rearmed_errors() {
        let monitor = monitor_with(&["a"]);
        monitor.update_entity_progress("op", "a", &ProgressUpdate::new().status(EntityStatus::Running));
        let armed = monitor.record_error("op", "a", kinds::TIMEOUT, "slow", Severity::Low);
        let pending = monitor.record_error("op", "a", kinds::SERVER_ERROR, "503", Severity::Low);
        monitor.retry_policy().record_attempt(&armed);
        {
            let mut operations = monitor.lock_operations();
            let state = operations.get_mut("op").unwrap();
            state.rearmed_at.insert(armed.clone(), Utc::now());
            state.entities.get_mut("a").unwrap().status = EntityStatus::Retrying;
        }

        // Progress alone while still retrying counts as resuming.
        monitor.update_entity_progress("op", "a", &ProgressUpdate::new().units_completed(3));

        let errors = monitor.errors("op").unwrap();
        assert!(errors.iter().find(|e| e.id == armed).unwrap().resolved);
        assert!(!errors.iter().find(|e| e.id == pending).unwrap().resolved);
        assert_eq!(monitor.retry_policy().attempts(&armed), 0);
    }

    #[test]
    fn test_cancel_forces_non_terminal_entities() {
        let monitor = monitor_with(&["run", "retry", "idle", "done"]);
        monitor.update_entity_progress("op", "run", &ProgressUpdate::new().status(EntityStatus::Running));
        monitor.update_entity_progress("op", "retry", &ProgressUpdate::new().status(EntityStatus::Retrying));
        monitor.update_entity_progress("op", "done", &ProgressUpdate::new().status(EntityStatus::Completed));

        assert!(monitor.request_cancel("op"));
        assert!(monitor.should_cancel("op"));

        let status = monitor.status("op").unwrap();
        assert!(status.cancel_requested);
        assert_eq!(status.counts.cancelled, 3);
        assert_eq!(status.counts.not_started, 0);
        assert_eq!(status.counts.completed, 1);
        for name in ["run", "retry", "idle"] {
            let progress = monitor.entity("op", name).unwrap();
            assert_eq!(progress.status, EntityStatus::Cancelled);
            assert!(progress.end_time.is_some());
        }
    }

    #[test]
    fn test_status_keeps_recent_errors() {
        let monitor = monitor_with(&["a"]);
        let ids: Vec<String> = (0..15)
            .map(|i| monitor.record_error("op", "a", kinds::TIMEOUT, &format!("t{}", i), Severity::Low))
            .collect();

        let status = monitor.status("op").unwrap();
        assert_eq!(status.total_errors, 15);
        assert_eq!(status.recent_errors.len(), 10);
        assert_eq!(status.recent_errors[0].id, ids[5]);
        assert_eq!(status.recent_errors[9].id, ids[14]);
    }

    #[test]
    fn test_record_payload_scores_quality() {
        let monitor = monitor_with(&["a"]);
        let participant = json!({
            "puuid": "p",
            "championId": 1,
            "kills": 3,
            "deaths": 2,
            "assists": 7,
            "goldEarned": 9000,
            "win": false
        });

        let score = monitor.record_payload("op", "a", RecordKind::Participant, &participant);
        assert_eq!(score, Some(100.0));
        assert_eq!(monitor.status("op").unwrap().metrics.unwrap().quality_score, 100.0);

        assert_eq!(
            monitor.record_payload("op", "ghost", RecordKind::Participant, &participant),
            None
        );
    }

    #[test]
    fn test_with_config_validates() {
        let mut config = MonitorConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(
            Monitor::with_config(config),
            Err(MonitorError::InvalidConfig(_))
        ));
    }
}

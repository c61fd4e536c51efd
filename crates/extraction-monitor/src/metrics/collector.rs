//! Live and historical operation metrics.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::suggestions::optimization_suggestions;
use crate::errors::{MonitorError, Result};
use crate::models::{EntityProgress, EntityStatus, OperationMetrics};

/// Samples kept per ring buffer.
const SAMPLE_CAPACITY: usize = 100;

/// Rate (units per minute) at which the rate component of efficiency saturates.
const RATE_SATURATION: f64 = 10.0;

const SUCCESS_WEIGHT: f64 = 0.4;
const ERROR_WEIGHT: f64 = 0.3;
const RATE_WEIGHT: f64 = 0.3;

/// Latest reported counters for one entity.
#[derive(Debug, Clone, Copy)]
struct EntitySample {
    status: EntityStatus,
    units_completed: u32,
    calls_made: u32,
    error_count: u32,
}

/// Mutable state for an operation that is still running.
///
/// Entity counters are last-write-wins, so repeated reports for the same
/// entity never double count.
#[derive(Debug)]
struct LiveMetrics {
    total_entities: u32,
    entities: HashMap<String, EntitySample>,
    rate_samples: VecDeque<f64>,
    quality_samples: VecDeque<f64>,
    started_at: DateTime<Utc>,
}

impl LiveMetrics {
    fn new(total_entities: u32) -> Self {
        Self {
            total_entities,
            entities: HashMap::new(),
            rate_samples: VecDeque::with_capacity(SAMPLE_CAPACITY),
            quality_samples: VecDeque::with_capacity(SAMPLE_CAPACITY),
            started_at: Utc::now(),
        }
    }

    fn count_status(&self, status: EntityStatus) -> u32 {
        self.entities
            .values()
            .filter(|e| e.status == status)
            .count() as u32
    }

    fn completed(&self) -> u32 {
        self.count_status(EntityStatus::Completed)
    }

    fn failed(&self) -> u32 {
        self.count_status(EntityStatus::Failed)
    }

    /// Units delivered by entities that completed successfully.
    fn total_units(&self) -> u64 {
        self.entities
            .values()
            .filter(|e| e.status == EntityStatus::Completed)
            .map(|e| u64::from(e.units_completed))
            .sum()
    }

    fn total_calls(&self) -> u64 {
        self.entities.values().map(|e| u64::from(e.calls_made)).sum()
    }

    fn total_errors(&self) -> u64 {
        self.entities.values().map(|e| u64::from(e.error_count)).sum()
    }

    fn avg_rate(&self) -> f64 {
        mean(&self.rate_samples)
    }

    fn peak_rate(&self) -> f64 {
        self.rate_samples.iter().copied().fold(0.0, f64::max)
    }

    /// Weighted blend of success rate, inverse error rate and throughput.
    fn efficiency_score(&self) -> f64 {
        let success_rate = if self.total_entities == 0 {
            0.0
        } else {
            f64::from(self.completed()) / f64::from(self.total_entities)
        };
        let error_rate = self.total_errors() as f64 / self.total_calls().max(1) as f64;
        let inverse_error = (1.0 - error_rate).max(0.0);
        let rate_component = (self.avg_rate() / RATE_SATURATION).min(1.0);

        let blended =
            SUCCESS_WEIGHT * success_rate + ERROR_WEIGHT * inverse_error + RATE_WEIGHT * rate_component;
        (blended * 100.0).clamp(0.0, 100.0)
    }

    fn to_metrics(&self, operation_id: &str, finished_at: Option<DateTime<Utc>>) -> OperationMetrics {
        let end = finished_at.unwrap_or_else(Utc::now);
        let duration_secs = ((end - self.started_at).num_milliseconds() as f64 / 1000.0).max(0.0);

        OperationMetrics {
            operation_id: operation_id.to_string(),
            total_entities: self.total_entities,
            completed: self.completed(),
            failed: self.failed(),
            total_units: self.total_units(),
            total_calls: self.total_calls(),
            total_errors: self.total_errors(),
            avg_rate: self.avg_rate(),
            peak_rate: self.peak_rate(),
            duration_secs,
            efficiency_score: self.efficiency_score(),
            quality_score: mean(&self.quality_samples),
            started_at: self.started_at,
            finished_at,
        }
    }
}

fn mean(samples: &VecDeque<f64>) -> f64 {
    if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    }
}

fn push_bounded(buffer: &mut VecDeque<f64>, value: f64) {
    if buffer.len() >= SAMPLE_CAPACITY {
        buffer.pop_front();
    }
    buffer.push_back(value);
}

/// Accumulates per-operation counters and keeps the finalized history.
pub struct MetricsCollector {
    live: Mutex<HashMap<String, LiveMetrics>>,
    history: Mutex<Vec<OperationMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            live: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    fn lock_live(&self) -> MutexGuard<'_, HashMap<String, LiveMetrics>> {
        self.live.lock().unwrap_or_else(|poisoned| {
            warn!("Metrics collector live mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_history(&self) -> MutexGuard<'_, Vec<OperationMetrics>> {
        self.history.lock().unwrap_or_else(|poisoned| {
            warn!("Metrics collector history mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Start tracking an operation, replacing any live record with the same id.
    pub fn start_operation(&self, operation_id: &str, total_entities: u32) {
        self.lock_live()
            .insert(operation_id.to_string(), LiveMetrics::new(total_entities));
        debug!(
            "Metrics: started operation {} with {} entities",
            operation_id, total_entities
        );
    }

    /// Record the latest progress of one entity.
    ///
    /// Unknown operations are ignored.
    pub fn record_entity_update(&self, operation_id: &str, progress: &EntityProgress) {
        let mut live = self.lock_live();
        let Some(metrics) = live.get_mut(operation_id) else {
            return;
        };

        metrics.entities.insert(
            progress.entity_name.clone(),
            EntitySample {
                status: progress.status,
                units_completed: progress.units_completed,
                calls_made: progress.calls_made,
                error_count: progress.error_count,
            },
        );

        if progress.rate_per_minute > 0.0 {
            push_bounded(&mut metrics.rate_samples, progress.rate_per_minute);
        }
    }

    /// Add a record quality score sample (0-100).
    pub fn record_quality_score(&self, operation_id: &str, score: f64) {
        if let Some(metrics) = self.lock_live().get_mut(operation_id) {
            push_bounded(&mut metrics.quality_samples, score.clamp(0.0, 100.0));
        }
    }

    /// Efficiency score (0-100) of a live operation, falling back to the
    /// finalized record. Unknown operations score 0.
    pub fn efficiency_score(&self, operation_id: &str) -> f64 {
        if let Some(metrics) = self.lock_live().get(operation_id) {
            return metrics.efficiency_score();
        }
        self.historical(operation_id)
            .map(|m| m.efficiency_score)
            .unwrap_or(0.0)
    }

    /// Current view of a live operation.
    pub fn live_snapshot(&self, operation_id: &str) -> Option<OperationMetrics> {
        self.lock_live()
            .get(operation_id)
            .map(|metrics| metrics.to_metrics(operation_id, None))
    }

    pub fn is_live(&self, operation_id: &str) -> bool {
        self.lock_live().contains_key(operation_id)
    }

    /// Freeze a live operation into the history.
    pub fn finalize(&self, operation_id: &str) -> Result<OperationMetrics> {
        let metrics = self
            .lock_live()
            .remove(operation_id)
            .ok_or_else(|| MonitorError::OperationNotFound(operation_id.to_string()))?;

        let record = metrics.to_metrics(operation_id, Some(Utc::now()));
        info!(
            "Metrics: finalized operation {} ({}/{} completed, {} failed, efficiency {:.1})",
            operation_id,
            record.completed,
            record.total_entities,
            record.failed,
            record.efficiency_score
        );
        self.lock_history().push(record.clone());
        Ok(record)
    }

    /// All finalized records, oldest first.
    pub fn history(&self) -> Vec<OperationMetrics> {
        self.lock_history().clone()
    }

    /// Most recent finalized record for an operation id.
    pub fn historical(&self, operation_id: &str) -> Option<OperationMetrics> {
        self.lock_history()
            .iter()
            .rev()
            .find(|m| m.operation_id == operation_id)
            .cloned()
    }

    pub fn suggestions(metrics: &OperationMetrics) -> Vec<String> {
        optimization_suggestions(metrics)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(
        name: &str,
        status: EntityStatus,
        units: u32,
        calls: u32,
        errors: u32,
        rate: f64,
    ) -> EntityProgress {
        let mut p = EntityProgress::new(name);
        p.status = status;
        p.units_completed = units;
        p.calls_made = calls;
        p.error_count = errors;
        p.rate_per_minute = rate;
        p
    }

    #[test]
    fn test_entity_updates_aggregate() {
        let collector = MetricsCollector::new();
        collector.start_operation("op", 3);

        collector.record_entity_update("op", &progress("a", EntityStatus::Completed, 50, 10, 1, 0.0));
        collector.record_entity_update("op", &progress("b", EntityStatus::Failed, 5, 4, 2, 0.0));
        collector.record_entity_update("op", &progress("c", EntityStatus::Running, 10, 6, 0, 5.0));

        let snapshot = collector.live_snapshot("op").unwrap();
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.total_units, 50);
        assert_eq!(snapshot.total_calls, 20);
        assert_eq!(snapshot.total_errors, 3);
        assert_eq!(snapshot.avg_rate, 5.0);
        assert!(snapshot.finished_at.is_none());
    }

    #[test]
    fn test_repeated_updates_do_not_double_count() {
        let collector = MetricsCollector::new();
        collector.start_operation("op", 1);

        collector.record_entity_update("op", &progress("a", EntityStatus::Running, 10, 5, 1, 0.0));
        collector.record_entity_update("op", &progress("a", EntityStatus::Running, 20, 8, 1, 0.0));
        collector.record_entity_update("op", &progress("a", EntityStatus::Completed, 30, 9, 1, 0.0));
        collector.record_entity_update("op", &progress("a", EntityStatus::Completed, 30, 9, 1, 0.0));

        let snapshot = collector.live_snapshot("op").unwrap();
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.total_units, 30);
        assert_eq!(snapshot.total_calls, 9);
        assert_eq!(snapshot.total_errors, 1);
    }

    #[test]
    fn test_unknown_operation_is_ignored() {
        let collector = MetricsCollector::new();
        collector.record_entity_update(
            "missing",
            &progress("a", EntityStatus::Completed, 1, 1, 0, 1.0),
        );
        collector.record_quality_score("missing", 90.0);
        assert!(collector.live_snapshot("missing").is_none());
        assert_eq!(collector.efficiency_score("missing"), 0.0);
    }

    #[test]
    fn test_efficiency_score_blend() {
        let collector = MetricsCollector::new();
        collector.start_operation("op", 2);

        // 1/2 completed, 2 errors over 10 calls, avg rate 5/min
        collector.record_entity_update("op", &progress("a", EntityStatus::Completed, 10, 10, 2, 5.0));

        // 0.4 * 0.5 + 0.3 * 0.8 + 0.3 * 0.5 = 0.59
        let score = collector.efficiency_score("op");
        assert!((score - 59.0).abs() < 1e-9);
    }

    #[test]
    fn test_efficiency_score_clamped() {
        let collector = MetricsCollector::new();
        collector.start_operation("op", 1);
        collector.record_entity_update(
            "op",
            &progress("a", EntityStatus::Completed, 10, 10, 0, 500.0),
        );
        assert_eq!(collector.efficiency_score("op"), 100.0);

        collector.start_operation("bad", 1);
        collector.record_entity_update("bad", &progress("a", EntityStatus::Failed, 0, 1, 50, 0.0));
        let score = collector.efficiency_score("bad");
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn test_rate_buffer_is_bounded() {
        let collector = MetricsCollector::new();
        collector.start_operation("op", 1);
        for i in 0..(SAMPLE_CAPACITY + 20) {
            collector.record_entity_update(
                "op",
                &progress("a", EntityStatus::Running, 0, 0, 0, (i + 1) as f64),
            );
        }

        let live = collector.lock_live();
        let metrics = live.get("op").unwrap();
        assert_eq!(metrics.rate_samples.len(), SAMPLE_CAPACITY);
        assert_eq!(metrics.peak_rate(), (SAMPLE_CAPACITY + 20) as f64);
    }

    #[test]
    fn test_finalize_moves_to_history() {
        let collector = MetricsCollector::new();
        collector.start_operation("op", 1);
        collector.record_entity_update("op", &progress("a", EntityStatus::Completed, 5, 2, 0, 4.0));
        collector.record_quality_score("op", 80.0);
        collector.record_quality_score("op", 100.0);

        let record = collector.finalize("op").unwrap();
        assert_eq!(record.completed, 1);
        assert_eq!(record.peak_rate, 4.0);
        assert_eq!(record.quality_score, 90.0);
        assert!(record.duration_secs >= 0.0);
        assert!(record.finished_at.is_some());

        assert!(!collector.is_live("op"));
        assert_eq!(collector.history().len(), 1);
        assert_eq!(collector.historical("op"), Some(record.clone()));
        assert_eq!(collector.efficiency_score("op"), record.efficiency_score);
    }

    #[test]
    fn test_finalize_unknown_operation() {
        let collector = MetricsCollector::new();
        let result = collector.finalize("missing");
        assert_eq!(
            result,
            Err(MonitorError::OperationNotFound("missing".to_string()))
        );
    }

    #[test]
    fn test_empty_operation_defaults_to_zero() {
        let collector = MetricsCollector::new();
        collector.start_operation("op", 0);
        let record = collector.finalize("op").unwrap();

        assert_eq!(record.avg_rate, 0.0);
        assert_eq!(record.peak_rate, 0.0);
        assert_eq!(record.quality_score, 0.0);
        assert!((0.0..=100.0).contains(&record.efficiency_score));
    }
}

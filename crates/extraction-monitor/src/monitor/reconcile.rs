//! One pass of the background reconciliation loop.
//!
//! Each pass, per operation:
//! 1. Recompute rate and ETA for Running entities
//! 2. Flag Running entities with no progress past the stall threshold
//! 3. Re-arm retryable errors of active entities whose backoff elapsed, fail
//!    permanent ones and exhausted ones whose entity never resumed
//! 4. Finalize and drop operations whose entities are all terminal

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::service::Monitor;
use super::state::OperationState;
use crate::errors::{MonitorError, RetryClass};
use crate::models::{kinds, EntityStatus, RetryableError, Severity};

impl Monitor {
    /// Run one reconciliation pass.
    ///
    /// Every operation is processed even if one fails to finalize; the first
    /// failure is returned.
    pub fn reconcile(&self) -> crate::errors::Result<()> {
        let now = Utc::now();
        let mut operations = self.lock_operations();

        let mut finished = Vec::new();
        for (operation_id, state) in operations.iter_mut() {
            self.refresh_rates(operation_id, state, now);
            self.detect_stalls(operation_id, state, now);
            self.drive_retries(operation_id, state, now);
            if state.is_finished() {
                finished.push(operation_id.clone());
            }
        }

        let mut first_error: Option<MonitorError> = None;
        for operation_id in finished {
            if let Some(state) = operations.remove(&operation_id) {
                for error in &state.errors {
                    self.retry.reset(&error.id);
                }
                if state.cancelled {
                    self.lock_reaped_cancelled().insert(operation_id.clone());
                }
            }
            match self.metrics.finalize(&operation_id) {
                Ok(record) => info!(
                    "Monitor: operation {} finished in {:.1}s",
                    operation_id, record.duration_secs
                ),
                Err(e) => {
                    warn!("Monitor: failed to finalize {}: {}", operation_id, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn refresh_rates(&self, operation_id: &str, state: &mut OperationState, now: DateTime<Utc>) {
        for progress in state
            .entities
            .values_mut()
            .filter(|p| p.status == EntityStatus::Running)
        {
            let Some(start) = progress.start_time else {
                continue;
            };
            let elapsed_minutes = (now - start).num_milliseconds() as f64 / 60_000.0;
            if elapsed_minutes <= 0.0 {
                continue;
            }

            progress.rate_per_minute = f64::from(progress.units_completed) / elapsed_minutes;
            progress.eta = if progress.rate_per_minute > 0.0 {
                let minutes_left = f64::from(progress.remaining_units()) / progress.rate_per_minute;
                Some(now + chrono::Duration::milliseconds((minutes_left * 60_000.0) as i64))
            } else {
                None
            };
            self.metrics.record_entity_update(operation_id, progress);
        }
    }

    fn detect_stalls(&self, operation_id: &str, state: &mut OperationState, now: DateTime<Utc>) {
        let threshold = self.config.stall_threshold();
        let stalled: Vec<String> = state
            .entities
            .values()
            .filter(|p| p.status == EntityStatus::Running && p.units_completed == 0)
            .filter(|p| {
                p.start_time
                    .and_then(|start| (now - start).to_std().ok())
                    .is_some_and(|elapsed| elapsed > threshold)
            })
            .filter(|p| !state.has_open_error(&p.entity_name, kinds::STALLED))
            .map(|p| p.entity_name.clone())
            .collect();

        for entity in stalled {
            warn!(
                "Monitor: {} in {} made no progress for over {}s",
                entity,
                operation_id,
                threshold.as_secs()
            );
            let error = RetryableError::new(
                operation_id,
                entity.as_str(),
                kinds::STALLED,
                format!("No progress for over {}s", threshold.as_secs()),
                Severity::High,
                self.retry.config().max_attempts,
            );
            state.push_error(error);
            if let Some(progress) = state.entities.get(&entity) {
                self.metrics.record_entity_update(operation_id, progress);
            }
        }
    }

    fn drive_retries(&self, operation_id: &str, state: &mut OperationState, now: DateTime<Utc>) {
        let OperationState {
            entities,
            errors,
            cancelled,
            rearmed_at,
        } = state;

        for error in errors.iter_mut().filter(|e| !e.resolved) {
            let Some(progress) = entities.get_mut(&error.entity_name) else {
                error.resolved = true;
                continue;
            };
            if progress.status.is_terminal() {
                error.resolved = true;
                rearmed_at.remove(&error.id);
                self.retry.reset(&error.id);
                continue;
            }
            if *cancelled {
                continue;
            }

            let class = self.retry.classify(error);
            let acts = match class {
                RetryClass::WithBackoff => progress.status.is_active(),
                RetryClass::Exhausted => progress.status == EntityStatus::Retrying,
                RetryClass::Never => true,
            };
            if !acts {
                continue;
            }

            match class {
                RetryClass::WithBackoff => {
                    let since = rearmed_at.get(&error.id).copied().unwrap_or(error.timestamp);
                    let delay = self.retry.next_delay(&error.id, error.attempt_count);
                    let elapsed = (now - since).to_std().unwrap_or_default();
                    if elapsed < delay {
                        continue;
                    }

                    error.attempt_count += 1;
                    self.retry.record_attempt(&error.id);
                    rearmed_at.insert(error.id.clone(), now);
                    progress.status = EntityStatus::Retrying;
                    info!(
                        "Monitor: retrying {} in {} (attempt {}/{}, {})",
                        error.entity_name,
                        operation_id,
                        error.attempt_count,
                        error.max_attempts,
                        error.kind
                    );
                }
                class @ (RetryClass::Never | RetryClass::Exhausted) => {
                    error.resolved = true;
                    rearmed_at.remove(&error.id);
                    self.retry.reset(&error.id);
                    progress.status = EntityStatus::Failed;
                    progress.end_time = Some(now);
                    progress.last_error = Some(error.summary());
                    warn!(
                        "Monitor: {} in {} failed ({:?}): {}",
                        error.entity_name,
                        operation_id,
                        class,
                        error.summary()
                    );
                }
            }
            debug!(
                "Monitor: {} in {} is now {}",
                progress.entity_name, operation_id, progress.status
            );
            self.metrics.record_entity_update(operation_id, progress);
        }
    }
}

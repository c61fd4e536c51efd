use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::EntityName;

/// Lifecycle of a single entity within an operation.
///
/// ```text
/// NotStarted -> Initializing -> Running -> {Paused, Retrying} -> Running
///                                       -> {Completed | Failed | Cancelled}
/// ```
///
/// Terminal states are never left once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    NotStarted,
    Initializing,
    Running,
    Paused,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl EntityStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Running and Retrying are the only actively processed states.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Retrying)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one entity, owned by the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityProgress {
    pub entity_name: EntityName,
    pub status: EntityStatus,
    pub units_requested: u32,
    pub units_completed: u32,
    pub units_failed: u32,
    pub calls_made: u32,
    pub calls_failed: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub current_step: String,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub rate_per_minute: f64,
    pub eta: Option<DateTime<Utc>>,
}

impl EntityProgress {
    pub fn new(entity_name: impl Into<EntityName>) -> Self {
        Self {
            entity_name: entity_name.into(),
            status: EntityStatus::NotStarted,
            units_requested: 0,
            units_completed: 0,
            units_failed: 0,
            calls_made: 0,
            calls_failed: 0,
            start_time: None,
            end_time: None,
            current_step: String::new(),
            error_count: 0,
            last_error: None,
            rate_per_minute: 0.0,
            eta: None,
        }
    }

    /// Units still outstanding.
    pub fn remaining_units(&self) -> u32 {
        self.units_requested.saturating_sub(self.units_completed)
    }
}

/// Partial update reported by a worker.
///
/// Only fields that are `Some` are applied; everything else keeps its current
/// value. Derived fields (`rate_per_minute`, `eta`, `error_count`,
/// `last_error`) are owned by the monitor and cannot be patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub status: Option<EntityStatus>,
    pub units_requested: Option<u32>,
    pub units_completed: Option<u32>,
    pub units_failed: Option<u32>,
    pub calls_made: Option<u32>,
    pub calls_failed: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub current_step: Option<String>,
}

impl ProgressUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: EntityStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn units_requested(mut self, units: u32) -> Self {
        self.units_requested = Some(units);
        self
    }

    pub fn units_completed(mut self, units: u32) -> Self {
        self.units_completed = Some(units);
        self
    }

    pub fn units_failed(mut self, units: u32) -> Self {
        self.units_failed = Some(units);
        self
    }

    pub fn calls_made(mut self, calls: u32) -> Self {
        self.calls_made = Some(calls);
        self
    }

    pub fn calls_failed(mut self, calls: u32) -> Self {
        self.calls_failed = Some(calls);
        self
    }

    pub fn start_time(mut self, at: DateTime<Utc>) -> Self {
        self.start_time = Some(at);
        self
    }

    pub fn end_time(mut self, at: DateTime<Utc>) -> Self {
        self.end_time = Some(at);
        self
    }

    pub fn current_step(mut self, step: impl Into<String>) -> Self {
        self.current_step = Some(step.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merges the supplied fields into `progress`.
    ///
    /// Entering `Initializing`/`Running` stamps `start_time` and entering a
    /// terminal status stamps `end_time` when the caller did not supply them.
    pub fn apply_to(&self, progress: &mut EntityProgress, now: DateTime<Utc>) {
        if let Some(units) = self.units_requested {
            progress.units_requested = units;
        }
        if let Some(units) = self.units_completed {
            progress.units_completed = units;
        }
        if let Some(units) = self.units_failed {
            progress.units_failed = units;
        }
        if let Some(calls) = self.calls_made {
            progress.calls_made = calls;
        }
        if let Some(calls) = self.calls_failed {
            progress.calls_failed = calls;
        }
        if let Some(at) = self.start_time {
            progress.start_time = Some(at);
        }
        if let Some(at) = self.end_time {
            progress.end_time = Some(at);
        }
        if let Some(step) = &self.current_step {
            progress.current_step.clone_from(step);
        }
        if let Some(status) = self.status {
            progress.status = status;
            match status {
                EntityStatus::Initializing | EntityStatus::Running
                    if progress.start_time.is_none() =>
                {
                    progress.start_time = Some(now);
                }
                s if s.is_terminal() && progress.end_time.is_none() => {
                    progress.end_time = Some(now);
                }
                _ => {}
            }
        }
    }
}

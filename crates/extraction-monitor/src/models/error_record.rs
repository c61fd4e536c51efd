use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{EntityName, OperationId, Severity};

/// Well-known error kinds reported by workers and by the monitor itself.
///
/// Kinds are free-form strings; these are the ones this crate produces or
/// classifies specially.
pub mod kinds {
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const TIMEOUT: &str = "timeout";
    pub const SERVER_ERROR: &str = "server_error";
    pub const STALLED: &str = "stalled";
    pub const INVALID_CREDENTIALS: &str = "invalid_credentials";
    pub const FORBIDDEN: &str = "forbidden";
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_IDENTIFIER: &str = "invalid_identifier";
}

/// A reported failure, tracked until it is resolved or becomes terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryableError {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub operation_id: OperationId,
    pub entity_name: EntityName,
    pub kind: String,
    pub message: String,
    pub severity: Severity,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub resolved: bool,
}

impl RetryableError {
    pub fn new(
        operation_id: impl Into<OperationId>,
        entity_name: impl Into<EntityName>,
        kind: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        max_attempts: u32,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            timestamp: Utc::now(),
            operation_id: operation_id.into(),
            entity_name: entity_name.into(),
            kind: kind.into(),
            message: message.into(),
            severity,
            attempt_count: 0,
            max_attempts,
            resolved: false,
        }
    }

    /// One-line description used for `EntityProgress::last_error`.
    pub fn summary(&self) -> String {
        format!("{}: {}", self.kind, self.message)
    }
}

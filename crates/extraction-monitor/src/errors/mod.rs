//! Error types and retry classification for the extraction monitor.
//!
//! This module provides:
//! - [`MonitorError`]: The error enum for lookups and configuration
//! - [`RetryClass`]: Classification for determining retry behavior
//!
//! Admission denials from the rate limiter are not errors; they surface as
//! `false` or a wait duration. Failures of the remote calls themselves are
//! reported as [`RetryableError`](crate::models::RetryableError) records, not
//! as `MonitorError`.

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

/// Errors that can occur during monitor operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// No live operation is tracked under this id.
    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    /// The operation exists but does not contain this entity.
    #[error("Entity '{entity}' not found in operation {operation_id}")]
    EntityNotFound {
        /// The operation that was searched
        operation_id: String,
        /// The entity that was requested
        entity: String,
    },

    /// The supplied configuration is unusable.
    #[error("Invalid monitor configuration: {0}")]
    InvalidConfig(String),

    /// `start_monitoring` was called while the background loop is active.
    #[error("Background monitoring is already running")]
    TaskAlreadyRunning,
}

impl MonitorError {
    /// Creates an EntityNotFound error.
    pub fn entity_not_found(operation_id: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::EntityNotFound {
            operation_id: operation_id.into(),
            entity: entity.into(),
        }
    }
}

/// Result type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

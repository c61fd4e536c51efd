//! Extraction monitor models
//!
//! This module contains the data types shared by the monitor components:
//! - `types` - Identifier aliases and the shared `Severity` scale
//! - `progress` - Per-entity state machine (`EntityStatus`, `EntityProgress`, `ProgressUpdate`)
//! - `error_record` - Reported failures (`RetryableError`) and well-known error kinds
//! - `metrics` - Aggregated operation performance (`OperationMetrics`)
//! - `quality` - Record kinds and quality check outcomes (`QualityCheck`)

mod error_record;
mod metrics;
mod progress;
mod quality;
mod types;

pub use error_record::{kinds, RetryableError};
pub use metrics::OperationMetrics;
pub use progress::{EntityProgress, EntityStatus, ProgressUpdate};
pub use quality::{QualityCheck, RecordKind};
pub use types::{Endpoint, EntityName, OperationId, Severity};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::Severity;

/// Kind of fetched record, selecting the rule set it is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Top-level record (one match with its participants).
    Match,
    /// Sub-record (one participant's line within a match).
    Participant,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Match => "match",
            Self::Participant => "participant",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single rule evaluated against a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityCheck {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub severity: Severity,
    /// Offending value, when there is one to show.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<Value>,
}

impl QualityCheck {
    pub fn pass(name: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            severity,
            sample: None,
        }
    }

    pub fn fail(
        name: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        sample: Option<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            severity,
            sample,
        }
    }
}

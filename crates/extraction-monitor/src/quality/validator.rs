//! Record quality validation.
//!
//! Runs the fixed rulebook over fetched records:
//! - Required field presence
//! - Numeric range bounds (e.g. match duration)
//! - Exact cardinality (e.g. participants per match)
//!
//! Each evaluated aspect yields one [`QualityCheck`]; the checks are folded
//! into a severity-weighted score by [`QualityValidator::score`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::rules::{rules_for, Rule, RuleCheck};
use crate::models::{QualityCheck, RecordKind};

/// Aggregate view of a set of checks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualitySummary {
    pub total: usize,
    pub passed: usize,
    /// Names of failed checks, in evaluation order.
    pub failed: Vec<String>,
    pub score: f64,
}

/// Record quality validator.
///
/// Stateless; the rulebook is compiled in.
#[derive(Clone, Copy, Debug, Default)]
pub struct QualityValidator;

impl QualityValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a single record against the rules for `kind`.
    pub fn validate_record(&self, kind: RecordKind, record: &Value) -> Vec<QualityCheck> {
        rules_for(kind)
            .iter()
            .map(|rule| evaluate(rule, record))
            .collect()
    }

    /// Validate a page of records, returning every check in order.
    pub fn validate_batch(&self, kind: RecordKind, records: &[Value]) -> Vec<QualityCheck> {
        records
            .iter()
            .flat_map(|record| self.validate_record(kind, record))
            .collect()
    }

    /// Severity-weighted pass ratio in `[0, 100]`; 0 when no checks ran.
    pub fn score(checks: &[QualityCheck]) -> f64 {
        let total: f64 = checks.iter().map(|c| c.severity.weight()).sum();
        if total <= 0.0 {
            return 0.0;
        }
        let passed: f64 = checks
            .iter()
            .filter(|c| c.passed)
            .map(|c| c.severity.weight())
            .sum();
        100.0 * passed / total
    }

    pub fn summarize(checks: &[QualityCheck]) -> QualitySummary {
        QualitySummary {
            total: checks.len(),
            passed: checks.iter().filter(|c| c.passed).count(),
            failed: checks
                .iter()
                .filter(|c| !c.passed)
                .map(|c| c.name.clone())
                .collect(),
            score: Self::score(checks),
        }
    }
}

fn field<'a>(record: &'a Value, name: &str) -> Option<&'a Value> {
    record.get(name).filter(|v| !v.is_null())
}

fn evaluate(rule: &Rule, record: &Value) -> QualityCheck {
    match rule.check {
        RuleCheck::RequiredFields(fields) => {
            let missing: Vec<&str> = fields
                .iter()
                .copied()
                .filter(|name| field(record, name).is_none())
                .collect();
            if missing.is_empty() {
                QualityCheck::pass(rule.name, rule.severity, "All required fields present")
            } else {
                QualityCheck::fail(
                    rule.name,
                    rule.severity,
                    format!("Missing required fields: {}", missing.join(", ")),
                    Some(Value::from(missing)),
                )
            }
        }
        RuleCheck::Range {
            field: name,
            min,
            max,
        } => match field(record, name) {
            None => QualityCheck::fail(
                rule.name,
                rule.severity,
                format!("Field '{}' is missing", name),
                None,
            ),
            Some(value) => match value.as_f64() {
                Some(n) if (min..=max).contains(&n) => QualityCheck::pass(
                    rule.name,
                    rule.severity,
                    format!("{} = {} within [{}, {}]", name, n, min, max),
                ),
                Some(n) => QualityCheck::fail(
                    rule.name,
                    rule.severity,
                    format!("{} = {} outside [{}, {}]", name, n, min, max),
                    Some(value.clone()),
                ),
                None => QualityCheck::fail(
                    rule.name,
                    rule.severity,
                    format!("Field '{}' is not numeric", name),
                    Some(value.clone()),
                ),
            },
        },
        RuleCheck::ExactCount {
            field: name,
            expected,
        } => match field(record, name).and_then(Value::as_array) {
            Some(items) if items.len() == expected => QualityCheck::pass(
                rule.name,
                rule.severity,
                format!("{} has {} items", name, expected),
            ),
            Some(items) => QualityCheck::fail(
                rule.name,
                rule.severity,
                format!("{} has {} items, expected {}", name, items.len(), expected),
                Some(Value::from(items.len())),
            ),
            None => QualityCheck::fail(
                rule.name,
                rule.severity,
                format!("Field '{}' is missing or not a list", name),
                None,
            ),
        },
    }
}

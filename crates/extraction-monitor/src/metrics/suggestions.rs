//! Rule-based tuning hints derived from finalized metrics.

use crate::models::OperationMetrics;

const MIN_EFFICIENCY: f64 = 70.0;
const MAX_ERROR_RATE: f64 = 0.10;
const MIN_AVG_RATE: f64 = 5.0;
const MIN_QUALITY: f64 = 80.0;
const MAX_FAILURE_RATE: f64 = 0.20;

/// Deterministic list of suggestions, in a fixed order.
pub fn optimization_suggestions(metrics: &OperationMetrics) -> Vec<String> {
    let mut suggestions = Vec::new();

    if metrics.efficiency_score < MIN_EFFICIENCY {
        suggestions.push(format!(
            "Efficiency is {:.1}/100; consider processing entities in smaller batches",
            metrics.efficiency_score
        ));
    }

    let error_rate = metrics.error_rate();
    if error_rate > MAX_ERROR_RATE {
        suggestions.push(format!(
            "Error rate is {:.1}%; check network connectivity and API credentials",
            error_rate * 100.0
        ));
    }

    if metrics.avg_rate < MIN_AVG_RATE {
        suggestions.push(format!(
            "Average rate is {:.1} units/min; consider relaxing the rate limiter delay",
            metrics.avg_rate
        ));
    }

    if metrics.quality_score < MIN_QUALITY {
        suggestions.push(format!(
            "Data quality is {:.1}/100; consider stricter validation of fetched records",
            metrics.quality_score
        ));
    }

    let failure_rate = metrics.failure_rate();
    if failure_rate > MAX_FAILURE_RATE {
        suggestions.push(format!(
            "{:.1}% of entities failed; check that entity names are valid",
            failure_rate * 100.0
        ));
    }

    suggestions
}

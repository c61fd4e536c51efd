//! Record quality validation and scoring.

mod rules;
mod validator;

pub use validator::{QualitySummary, QualityValidator};

//! Evaluation results: rubric breakdown, violations, and bounds checks.

pub mod types;

pub use types::{Evaluation, MAX_CATEGORY_SCORE, MAX_SCORE_TOTAL, ScoreBreakdown, Severity, Violation};

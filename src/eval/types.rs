use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const MAX_SCORE_TOTAL: f64 = 100.0;
pub const MAX_CATEGORY_SCORE: f64 = 5.0;
const CATEGORY_COUNT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub severity: Severity,
}

/// Five rubric categories, each scored 0-5.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub constraint_coverage: f64,
    pub clarity_structure: f64,
    pub tone: f64,
    pub safety: f64,
    pub tool_correctness: f64,
}

impl ScoreBreakdown {
    pub fn categories(&self) -> [(&'static str, f64); 5] {
        [
            ("constraint_coverage", self.constraint_coverage),
            ("clarity_structure", self.clarity_structure),
            ("tone", self.tone),
            ("safety", self.safety),
            ("tool_correctness", self.tool_correctness),
        ]
    }

    pub fn sum(&self) -> f64 {
        self.categories().iter().map(|(_, score)| score).sum()
    }

    /// The total the rubric implies: round(sum / 25 * 100). Shown beside the
    /// model's own total; the loop never compares against it.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn rubric_total(&self) -> u32 {
        let max_sum = MAX_CATEGORY_SCORE * CATEGORY_COUNT;
        (self.sum() / max_sum * MAX_SCORE_TOTAL)
            .round()
            .clamp(0.0, MAX_SCORE_TOTAL) as u32
    }
}

impl fmt::Display for ScoreBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .categories()
            .iter()
            .map(|(name, score)| format!("{name}={score}"))
            .collect();
        f.write_str(&parts.join(" "))
    }
}

/// Scoring result for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score_total: f64,
    pub score_breakdown: ScoreBreakdown,
    #[serde(default)]
    pub violations: Vec<Violation>,
    #[serde(default)]
    pub notes: String,
}

impl Evaluation {
    /// Parse an untyped JSON value and enforce the score bounds.
    pub fn from_json(value: Value) -> Result<Self> {
        let evaluation: Self = serde_json::from_value(value)?;
        evaluation.validate()?;
        Ok(evaluation)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.score_total.is_finite() || !(0.0..=MAX_SCORE_TOTAL).contains(&self.score_total) {
            bail!(
                "score_total {} outside [0, {MAX_SCORE_TOTAL}]",
                self.score_total
            );
        }
        for (name, score) in self.score_breakdown.categories() {
            if !score.is_finite() || !(0.0..=MAX_CATEGORY_SCORE).contains(&score) {
                bail!("score_breakdown.{name} {score} outside [0, {MAX_CATEGORY_SCORE}]");
            }
        }
        Ok(())
    }

    /// `score_total` rounded to the nearest integer, as the run loop compares it.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn rounded_total(&self) -> u32 {
        self.score_total.round().clamp(0.0, MAX_SCORE_TOTAL) as u32
    }

    pub fn has_high_severity(&self) -> bool {
        self.violations
            .iter()
            .any(|violation| violation.severity == Severity::High)
    }
}

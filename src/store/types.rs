use crate::eval::{ScoreBreakdown, Violation};
use crate::policy::Policy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title given to runs created without one.
pub const DEFAULT_RUN_TITLE: &str = "Untitled Run";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    pub title: String,
    pub task_text: String,
    pub max_attempts: u32,
    pub target_score: u32,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for [`super::RunStore::create_run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRun {
    pub title: String,
    pub task_text: String,
    pub max_attempts: u32,
    pub target_score: u32,
}

impl NewRun {
    /// Build with defaults filled in and values clamped to their valid
    /// ranges: at least one attempt, target score within 1..=100.
    pub fn new(
        title: Option<&str>,
        task_text: &str,
        max_attempts: u32,
        target_score: u32,
    ) -> Self {
        let title = title
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(DEFAULT_RUN_TITLE);

        Self {
            title: title.to_string(),
            task_text: task_text.trim().to_string(),
            max_attempts: max_attempts.max(1),
            target_score: target_score.clamp(1, 100),
        }
    }
}

/// One persisted generate + evaluate cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub id: String,
    pub run_id: String,
    pub index: u32,
    pub output_text: String,
    pub score_total: u32,
    pub score_breakdown: ScoreBreakdown,
    pub violations: Vec<Violation>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyVersion {
    pub id: String,
    pub run_id: String,
    pub version: u32,
    pub policy: Policy,
    pub created_at: DateTime<Utc>,
}

/// A run with its attempts (by index) and policy versions (by version).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: Run,
    pub attempts: Vec<AttemptRecord>,
    pub policy_versions: Vec<PolicyVersion>,
}

impl RunDetail {
    pub fn best_score(&self) -> Option<u32> {
        self.attempts.iter().map(|attempt| attempt.score_total).max()
    }

    pub fn latest_policy(&self) -> Option<&PolicyVersion> {
        self.policy_versions.last()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub id: String,
    pub title: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub best_score: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_through_strings() {
        assert_eq!(RunStatus::Running.to_string(), "running");
        assert_eq!(RunStatus::from_str("failed").unwrap(), RunStatus::Failed);
        assert!(RunStatus::from_str("paused").is_err());
    }

    #[test]
    fn new_run_fills_defaults_and_clamps() {
        let run = NewRun::new(Some("   "), "  Do the thing.  ", 0, 250);
        assert_eq!(run.title, DEFAULT_RUN_TITLE);
        assert_eq!(run.task_text, "Do the thing.");
        assert_eq!(run.max_attempts, 1);
        assert_eq!(run.target_score, 100);

        let run = NewRun::new(Some("Refund reply"), "task", 5, 0);
        assert_eq!(run.title, "Refund reply");
        assert_eq!(run.target_score, 1);
    }

    #[test]
    fn run_detail_serializes_camel_case_and_flattens_run() {
        let detail = RunDetail {
            run: Run {
                id: "r1".into(),
                title: "t".into(),
                task_text: "task".into(),
                max_attempts: 5,
                target_score: 90,
                status: RunStatus::Pending,
                created_at: Utc::now(),
            },
            attempts: Vec::new(),
            policy_versions: Vec::new(),
        };
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["taskText"], "task");
        assert_eq!(value["maxAttempts"], 5);
        assert_eq!(value["status"], "pending");
        assert!(value["policyVersions"].as_array().unwrap().is_empty());
        assert_eq!(detail.best_score(), None);
    }
}

//! Plain-text rendering of runs for the terminal.

use crate::store::{RunDetail, RunSummary};
use crate::utils::text::{one_line_preview, word_count};

const PREVIEW_CHARS: usize = 48;

pub fn render_run_list(runs: &[RunSummary]) -> String {
    if runs.is_empty() {
        return "No runs yet. Create one with `rulesmith create --task ...`.".to_string();
    }

    let mut lines = vec![format!(
        "{:<36}  {:<10}  {:>8}  {:>4}  {}",
        "ID", "STATUS", "ATTEMPTS", "BEST", "TITLE"
    )];
    for run in runs {
        let best = run
            .best_score
            .map_or_else(|| "-".to_string(), |score| score.to_string());
        lines.push(format!(
            "{:<36}  {:<10}  {:>8}  {:>4}  {}",
            run.id,
            run.status.to_string(),
            run.attempt_count,
            best,
            run.title
        ));
    }
    lines.join("\n")
}

pub fn render_run_detail(detail: &RunDetail) -> String {
    let run = &detail.run;
    let mut lines = vec![
        format!("◆ {} ({})", run.title, run.id),
        format!(
            "  status={}  target={}  max_attempts={}  created={}",
            run.status,
            run.target_score,
            run.max_attempts,
            run.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        String::new(),
    ];

    if detail.attempts.is_empty() {
        lines.push("  No attempts recorded.".to_string());
    } else {
        lines.push(format!(
            "  {:>2}  {:>5}  {:>6}  {:>5}  {:>10}  {}",
            "#", "SCORE", "RUBRIC", "WORDS", "VIOLATIONS", "OUTPUT"
        ));
        for attempt in &detail.attempts {
            let marker = if attempt.score_total >= run.target_score {
                "✓"
            } else {
                " "
            };
            lines.push(format!(
                "  {:>2}  {:>5}  {:>6}  {:>5}  {:>10}  {} {}",
                attempt.index,
                attempt.score_total,
                attempt.score_breakdown.rubric_total(),
                word_count(&attempt.output_text),
                attempt.violations.len(),
                marker,
                one_line_preview(&attempt.output_text, PREVIEW_CHARS)
            ));
        }
    }

    if !detail.policy_versions.is_empty() {
        lines.push(String::new());
        lines.push("  Policy versions".to_string());
        for version in &detail.policy_versions {
            let policy = &version.policy;
            let max_words = policy
                .style
                .max_words_default()
                .map_or_else(|| "-".to_string(), |limit| limit.to_string());
            lines.push(format!(
                "    v{:<3} rules={:<3} checklist={:<3} max_words={max_words}",
                policy.version,
                policy.rules.len(),
                policy.checklist.len()
            ));
        }
    }

    if let Some(latest) = detail.latest_policy() {
        lines.push(String::new());
        lines.push(format!("  Rules in v{}", latest.version));
        for rule in &latest.policy.rules {
            lines.push(format!("    - {rule}"));
        }
    }

    lines.join("\n")
}

use crate::run_harness::Harness;
use rulesmith::RunStatus;

#[tokio::test]
async fn scripted_run_stops_at_attempt_four() {
    let harness = Harness::simulated().await;
    let run_id = harness.create_run(5, 90).await;

    let detail = harness.runner.execute_run(&run_id).await.unwrap();

    assert_eq!(detail.run.status, RunStatus::Completed);
    let scores: Vec<u32> = detail.attempts.iter().map(|a| a.score_total).collect();
    assert_eq!(scores, vec![52, 72, 84, 92]);
    let indices: Vec<u32> = detail.attempts.iter().map(|a| a.index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4]);
    let versions: Vec<u32> = detail.policy_versions.iter().map(|p| p.version).collect();
    assert_eq!(versions, vec![1, 2, 3, 4]);
    assert_eq!(detail.best_score(), Some(92));
}

#[tokio::test]
async fn scripted_policy_evolves_as_patched() {
    let harness = Harness::simulated().await;
    let run_id = harness.create_run(5, 90).await;

    let detail = harness.runner.execute_run(&run_id).await.unwrap();
    let limits: Vec<Option<i64>> = detail
        .policy_versions
        .iter()
        .map(|v| v.policy.style.max_words_default())
        .collect();
    assert_eq!(limits, vec![Some(120), Some(90), Some(90), Some(85)]);

    let latest = &detail.latest_policy().unwrap().policy;
    assert_eq!(latest.version, 4);
    // 2 seeded, 5 + 1 added, then the counting rule swapped for draft-then-trim.
    assert_eq!(latest.rules.len(), 8);
    assert!(latest.rules.iter().any(|r| r.starts_with("Draft response")));
    let mut unique = latest.rules.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), latest.rules.len());
}

#[tokio::test]
async fn first_attempt_carries_violations_and_notes() {
    let harness = Harness::simulated().await;
    let run_id = harness.create_run(5, 90).await;

    let detail = harness.runner.execute_run(&run_id).await.unwrap();
    let first = &detail.attempts[0];
    assert_eq!(first.violations.len(), 5);
    assert!(first.notes.contains("Major safety violation"));
    assert!(first.output_text.contains("full credit card number"));
    assert!(detail.attempts[3].violations.is_empty());
}

#[tokio::test]
async fn unreachable_target_exhausts_budget_and_completes() {
    let harness = Harness::simulated().await;
    let run_id = harness.create_run(5, 100).await;

    let detail = harness.runner.execute_run(&run_id).await.unwrap();

    assert_eq!(detail.run.status, RunStatus::Completed);
    assert_eq!(detail.attempts.len(), 5);
    assert_eq!(detail.attempts[4].score_total, 96);
    // No patch follows the final attempt.
    assert_eq!(detail.policy_versions.len(), 5);
    // The empty scripted patch still advances the version.
    assert_eq!(detail.policy_versions[4].version, 5);
    assert_eq!(
        detail.policy_versions[4].policy.rules,
        detail.policy_versions[3].policy.rules
    );
}

#[tokio::test]
async fn single_attempt_budget_never_patches() {
    let harness = Harness::simulated().await;
    let run_id = harness.create_run(1, 90).await;

    let detail = harness.runner.execute_run(&run_id).await.unwrap();
    assert_eq!(detail.run.status, RunStatus::Completed);
    assert_eq!(detail.attempts.len(), 1);
    assert_eq!(detail.policy_versions.len(), 1);
}

#[tokio::test]
async fn listing_reports_best_score() {
    let harness = Harness::simulated().await;
    let run_id = harness.create_run(5, 90).await;
    harness.runner.execute_run(&run_id).await.unwrap();

    let runs = harness.store.list_runs().await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].best_score, Some(92));
    assert_eq!(runs[0].attempt_count, 4);
    assert_eq!(runs[0].status, RunStatus::Completed);
}

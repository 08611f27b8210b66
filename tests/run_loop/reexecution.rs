use crate::run_harness::Harness;
use rulesmith::RunStatus;

#[tokio::test]
async fn re_execution_starts_from_policy_one() {
    let harness = Harness::simulated().await;
    let run_id = harness.create_run(5, 90).await;

    let first = harness.runner.execute_run(&run_id).await.unwrap();
    let second = harness.runner.execute_run(&run_id).await.unwrap();

    assert_eq!(second.run.status, RunStatus::Completed);
    assert_eq!(second.attempts.len(), 4);
    assert_eq!(second.policy_versions.len(), 4);
    assert_eq!(second.policy_versions[0].version, 1);
    assert_eq!(
        second.policy_versions[0].policy,
        first.policy_versions[0].policy
    );

    let first_ids: Vec<&str> = first.attempts.iter().map(|a| a.id.as_str()).collect();
    assert!(
        second
            .attempts
            .iter()
            .all(|a| !first_ids.contains(&a.id.as_str()))
    );
}

#[tokio::test]
async fn failed_run_can_be_executed_again() {
    let harness = Harness::simulated().await;
    let run_id = harness.create_run(5, 100).await;
    harness
        .store
        .update_run_status(&run_id, RunStatus::Failed)
        .await
        .unwrap();

    let detail = harness.runner.execute_run(&run_id).await.unwrap();
    assert_eq!(detail.run.status, RunStatus::Completed);
    let indices: Vec<u32> = detail.attempts.iter().map(|a| a.index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn independent_runs_execute_concurrently() {
    let harness = Harness::simulated().await;
    let first = harness.create_run(5, 90).await;
    let second = harness.create_run(3, 100).await;

    let (a, b) = tokio::join!(
        harness.runner.execute_run(&first),
        harness.runner.execute_run(&second)
    );

    assert_eq!(a.unwrap().attempts.len(), 4);
    assert_eq!(b.unwrap().attempts.len(), 3);
}

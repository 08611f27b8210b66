use crate::run_harness::Harness;
use rulesmith::backends::{BackendFuture, Generator, SimulatedBackend};
use rulesmith::config::{BackendMode, SimulationConfig};
use rulesmith::{Backends, LoopError, Policy, RunStatus};
use std::sync::Arc;

/// Fails every attempt from the given index onwards.
struct FailingFrom(u32);

impl Generator for FailingFrom {
    fn generate<'a>(
        &'a self,
        attempt: u32,
        _task: &'a str,
        _policy: &'a Policy,
    ) -> BackendFuture<'a, String> {
        let fail = attempt >= self.0;
        Box::pin(async move {
            if fail {
                Err(LoopError::Generation("LLM returned empty response".into()))
            } else {
                Ok("Dear Customer, we apologize.".into())
            }
        })
    }
}

fn backends_failing_from(attempt: u32) -> Backends {
    let sim = Arc::new(SimulatedBackend::new(SimulationConfig::instant()));
    Backends::new(
        BackendMode::Simulation,
        Arc::new(FailingFrom(attempt)),
        sim.clone(),
        sim,
    )
}

#[tokio::test]
async fn generation_failure_marks_run_failed() {
    let harness = Harness::with_backends(backends_failing_from(3)).await;
    let run_id = harness.create_run(5, 90).await;

    let err = harness.runner.execute_run(&run_id).await.unwrap_err();
    assert!(matches!(err, LoopError::Generation(_)));

    let detail = harness
        .store
        .load_run_detail(&run_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.run.status, RunStatus::Failed);
    // Work persisted before the failure stays.
    assert_eq!(detail.attempts.len(), 2);
    assert_eq!(detail.policy_versions.len(), 3);
}

#[tokio::test]
async fn unknown_run_leaves_store_untouched() {
    let harness = Harness::simulated().await;
    let err = harness.runner.execute_run("no-such-run").await.unwrap_err();
    assert!(matches!(err, LoopError::RunNotFound(ref id) if id == "no-such-run"));
    assert!(harness.store.list_runs().await.unwrap().is_empty());
}

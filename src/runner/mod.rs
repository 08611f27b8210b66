//! The generate → evaluate → patch loop.

use crate::backends::Backends;
use crate::error::LoopError;
use crate::policy::{Policy, apply_patch};
use crate::store::{RunDetail, RunStatus, RunStore};
use std::sync::Arc;

/// Drives one run at a time against a store and a set of backends.
#[derive(Clone)]
pub struct RunLoop {
    store: Arc<dyn RunStore>,
    backends: Backends,
}

impl RunLoop {
    pub fn new(store: Arc<dyn RunStore>, backends: Backends) -> Self {
        Self { store, backends }
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// Execute a run from a clean slate and return its final detail.
    ///
    /// Prior attempts and policy versions are discarded first; re-executing
    /// a run restarts it from the default policy. Reaching `max_attempts`
    /// without hitting the target still completes the run. Any backend or
    /// storage failure after the run is marked `running` marks it `failed`
    /// and is returned unchanged.
    ///
    /// Callers must not execute the same run id concurrently.
    pub async fn execute_run(&self, run_id: &str) -> Result<RunDetail, LoopError> {
        let run = self
            .store
            .get_run(run_id)
            .await
            .map_err(LoopError::storage)?
            .ok_or_else(|| LoopError::RunNotFound(run_id.to_string()))?;

        self.set_status(run_id, RunStatus::Running).await?;
        tracing::info!(
            run_id,
            max_attempts = run.max_attempts,
            target_score = run.target_score,
            backend = %self.backends.mode(),
            "run started"
        );

        let outcome = self
            .drive(run_id, &run.task_text, run.max_attempts, run.target_score)
            .await;

        match outcome {
            Ok(()) => {
                self.set_status(run_id, RunStatus::Completed).await?;
                self.load_detail(run_id).await
            }
            Err(err) => {
                tracing::warn!(run_id, kind = err.kind(), error = %err, "run failed");
                if let Err(status_err) = self.set_status(run_id, RunStatus::Failed).await {
                    tracing::warn!(run_id, error = %status_err, "could not mark run failed");
                }
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        run_id: &str,
        task: &str,
        max_attempts: u32,
        target_score: u32,
    ) -> Result<(), LoopError> {
        let cleared_attempts = self
            .store
            .delete_attempts(run_id)
            .await
            .map_err(LoopError::storage)?;
        let cleared_versions = self
            .store
            .delete_policy_versions(run_id)
            .await
            .map_err(LoopError::storage)?;
        if cleared_attempts + cleared_versions > 0 {
            tracing::debug!(
                run_id,
                cleared_attempts,
                cleared_versions,
                "cleared previous execution"
            );
        }

        let mut policy = Policy::default();
        self.store
            .insert_policy_version(run_id, &policy)
            .await
            .map_err(LoopError::storage)?;

        for attempt in 1..=max_attempts {
            let output = self
                .backends
                .generator
                .generate(attempt, task, &policy)
                .await?;

            let evaluation = self
                .backends
                .evaluator
                .evaluate(attempt, task, &output, &policy)
                .await?;

            let record = self
                .store
                .insert_attempt(run_id, attempt, &output, &evaluation)
                .await
                .map_err(LoopError::storage)?;

            tracing::info!(
                run_id,
                attempt,
                score = record.score_total,
                violations = record.violations.len(),
                high_severity = evaluation.has_high_severity(),
                version = policy.version,
                "attempt scored"
            );

            if record.score_total >= target_score {
                tracing::info!(run_id, attempt, score = record.score_total, "target reached");
                return Ok(());
            }

            if attempt < max_attempts {
                let patch = self
                    .backends
                    .patcher
                    .derive_patch(attempt, task, &output, &evaluation, &policy)
                    .await?;

                policy = apply_patch(&policy, &patch);
                self.store
                    .insert_policy_version(run_id, &policy)
                    .await
                    .map_err(LoopError::storage)?;

                tracing::info!(
                    run_id,
                    attempt,
                    version = policy.version,
                    new_rules = patch.new_rules.len(),
                    removed_rules = patch.remove_rules.len(),
                    "policy patched"
                );
                if patch.is_noop() {
                    tracing::debug!(run_id, attempt, "patch changed nothing besides the version");
                }
            }
        }

        tracing::info!(run_id, max_attempts, "attempt budget exhausted");
        Ok(())
    }

    async fn set_status(&self, run_id: &str, status: RunStatus) -> Result<(), LoopError> {
        let updated = self
            .store
            .update_run_status(run_id, status)
            .await
            .map_err(LoopError::storage)?;
        if updated {
            Ok(())
        } else {
            Err(LoopError::RunNotFound(run_id.to_string()))
        }
    }

    async fn load_detail(&self, run_id: &str) -> Result<RunDetail, LoopError> {
        self.store
            .load_run_detail(run_id)
            .await
            .map_err(LoopError::storage)?
            .ok_or_else(|| LoopError::RunNotFound(run_id.to_string()))
    }
}

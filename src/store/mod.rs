//! Durable storage for runs, their attempts, and their policy versions.

pub mod sqlite;
pub mod types;

pub use sqlite::SqliteRunStore;
pub use types::{
    AttemptRecord, DEFAULT_RUN_TITLE, NewRun, PolicyVersion, Run, RunDetail, RunStatus,
    RunSummary,
};

use crate::eval::Evaluation;
use crate::policy::Policy;
use anyhow::Result;
use std::future::Future;
use std::pin::Pin;

/// Async run persistence contract, keyed by run id.
pub trait RunStore: Send + Sync {
    fn create_run<'a>(
        &'a self,
        new_run: &'a NewRun,
    ) -> Pin<Box<dyn Future<Output = Result<Run>> + Send + 'a>>;

    fn get_run<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Run>>> + Send + 'a>>;

    /// Newest first, with attempt counts and best scores.
    fn list_runs<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RunSummary>>> + Send + 'a>>;

    /// Returns `false` when no run has this id.
    fn update_run_status<'a>(
        &'a self,
        id: &'a str,
        status: RunStatus,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    /// Removes the run with all of its attempts and policy versions.
    fn delete_run<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;

    /// Persist an attempt. The stored score is the evaluation total rounded
    /// to the nearest integer.
    fn insert_attempt<'a>(
        &'a self,
        run_id: &'a str,
        index: u32,
        output_text: &'a str,
        evaluation: &'a Evaluation,
    ) -> Pin<Box<dyn Future<Output = Result<AttemptRecord>> + Send + 'a>>;

    fn list_attempts<'a>(
        &'a self,
        run_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<AttemptRecord>>> + Send + 'a>>;

    fn delete_attempts<'a>(
        &'a self,
        run_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + 'a>>;

    fn insert_policy_version<'a>(
        &'a self,
        run_id: &'a str,
        policy: &'a Policy,
    ) -> Pin<Box<dyn Future<Output = Result<PolicyVersion>> + Send + 'a>>;

    fn list_policy_versions<'a>(
        &'a self,
        run_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PolicyVersion>>> + Send + 'a>>;

    fn delete_policy_versions<'a>(
        &'a self,
        run_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<usize>> + Send + 'a>>;

    fn load_run_detail<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<RunDetail>>> + Send + 'a>> {
        Box::pin(async move {
            let Some(run) = self.get_run(id).await? else {
                return Ok(None);
            };
            let attempts = self.list_attempts(id).await?;
            let policy_versions = self.list_policy_versions(id).await?;
            Ok(Some(RunDetail {
                run,
                attempts,
                policy_versions,
            }))
        })
    }
}

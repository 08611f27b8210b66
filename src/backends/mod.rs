//! Generation, evaluation and patch capabilities, each with a live and a
//! simulated implementation. The run loop only sees the traits.

pub mod live;
pub mod prompts;
pub mod simulation;

pub use live::LiveBackend;
pub use simulation::SimulatedBackend;

use crate::config::{BackendMode, Config, LlmConfig, SimulationConfig};
use crate::error::LoopError;
use crate::eval::Evaluation;
use crate::policy::{Patch, Policy};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LoopError>> + Send + 'a>>;

/// Produces a candidate answer for a task under a policy.
///
/// `attempt` is the 1-based attempt index. Live implementations ignore it;
/// the simulation keys its script off it.
pub trait Generator: Send + Sync {
    fn generate<'a>(
        &'a self,
        attempt: u32,
        task: &'a str,
        policy: &'a Policy,
    ) -> BackendFuture<'a, String>;
}

/// Scores a candidate answer. Implementations return only validated
/// evaluations; bounds violations surface as `EvaluationSchema`.
pub trait Evaluator: Send + Sync {
    fn evaluate<'a>(
        &'a self,
        attempt: u32,
        task: &'a str,
        output: &'a str,
        policy: &'a Policy,
    ) -> BackendFuture<'a, Evaluation>;
}

/// Proposes a policy delta from an attempt and its evaluation.
pub trait Patcher: Send + Sync {
    fn derive_patch<'a>(
        &'a self,
        attempt: u32,
        task: &'a str,
        output: &'a str,
        evaluation: &'a Evaluation,
        policy: &'a Policy,
    ) -> BackendFuture<'a, Patch>;
}

/// The three capabilities a run loop needs, always drawn from one mode.
#[derive(Clone)]
pub struct Backends {
    mode: BackendMode,
    pub generator: Arc<dyn Generator>,
    pub evaluator: Arc<dyn Evaluator>,
    pub patcher: Arc<dyn Patcher>,
}

impl Backends {
    /// Assemble a set from arbitrary implementations.
    pub fn new(
        mode: BackendMode,
        generator: Arc<dyn Generator>,
        evaluator: Arc<dyn Evaluator>,
        patcher: Arc<dyn Patcher>,
    ) -> Self {
        Self {
            mode,
            generator,
            evaluator,
            patcher,
        }
    }

    /// Select backends from the process configuration. Live mode without a
    /// usable credential is rejected here, before any network call.
    pub fn from_config(config: &Config) -> Result<Self, LoopError> {
        match config.backend {
            BackendMode::Simulation => Ok(Self::simulation(config.simulation.clone())),
            BackendMode::Live => Self::live(&config.llm),
        }
    }

    pub fn simulation(delays: SimulationConfig) -> Self {
        let backend = Arc::new(SimulatedBackend::new(delays));
        Self::new(
            BackendMode::Simulation,
            backend.clone(),
            backend.clone(),
            backend,
        )
    }

    pub fn live(llm: &LlmConfig) -> Result<Self, LoopError> {
        let backend = Arc::new(LiveBackend::from_config(llm)?);
        Ok(Self::new(
            BackendMode::Live,
            backend.clone(),
            backend.clone(),
            backend,
        ))
    }

    pub fn mode(&self) -> BackendMode {
        self.mode
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").field("mode", &self.mode).finish()
    }
}

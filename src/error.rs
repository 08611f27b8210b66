use thiserror::Error;

// ─── Run loop error taxonomy ─────────────────────────────────────────────────

/// Every failure the run loop and its backends can surface.
///
/// Backends convert upstream problems into one of these variants at their
/// boundary; the run loop propagates them unchanged after recording a
/// `failed` status. Plumbing below the backends (HTTP, SQLite) keeps using
/// `anyhow::Result` and is folded in through [`LoopError::storage`] or a
/// `Generation` message.
#[derive(Debug, Error)]
pub enum LoopError {
    // ── Caller ──────────────────────────────────────────────────────────
    #[error("run {0} not found")]
    RunNotFound(String),

    // ── Config ──────────────────────────────────────────────────────────
    #[error("configuration: {0}")]
    Configuration(String),

    // ── Upstream generation service ─────────────────────────────────────
    #[error("generation failed: {0}")]
    Generation(String),

    #[error("LLM returned invalid JSON after {attempts} attempts. Raw: {raw_prefix}")]
    InvalidJson { attempts: u32, raw_prefix: String },

    // ── Structured output validation ────────────────────────────────────
    #[error("evaluation schema violation: {0}")]
    EvaluationSchema(String),

    #[error("patch schema violation: {0}")]
    PatchSchema(String),

    // ── Persistence ─────────────────────────────────────────────────────
    #[error("storage: {0}")]
    Storage(String),
}

impl LoopError {
    /// Wrap a store failure, keeping the full context chain in the message.
    pub fn storage(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }

    /// Stable machine-readable kind, used by the HTTP boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunNotFound(_) => "run_not_found",
            Self::Configuration(_) => "configuration",
            Self::Generation(_) => "generation",
            Self::InvalidJson { .. } => "invalid_json",
            Self::EvaluationSchema(_) => "evaluation_schema",
            Self::PatchSchema(_) => "patch_schema",
            Self::Storage(_) => "storage",
        }
    }
}

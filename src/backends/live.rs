use super::prompts::{ChatPrompt, evaluator_prompt, generator_prompt, patcher_prompt};
use super::{BackendFuture, Evaluator, Generator, Patcher};
use crate::config::LlmConfig;
use crate::error::LoopError;
use crate::eval::Evaluation;
use crate::llm::{OpenAiCompatibleProvider, Provider, chat_json};
use crate::policy::{Patch, Policy};
use std::sync::Arc;

/// Sampling temperature per backend role.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperatures {
    pub generate: f64,
    pub evaluate: f64,
    pub patch: f64,
}

impl From<&LlmConfig> for Temperatures {
    fn from(llm: &LlmConfig) -> Self {
        Self {
            generate: llm.generate_temperature,
            evaluate: llm.evaluate_temperature,
            patch: llm.patch_temperature,
        }
    }
}

/// All three capabilities backed by one chat-completion provider.
pub struct LiveBackend {
    provider: Arc<dyn Provider>,
    model: String,
    temperatures: Temperatures,
}

impl LiveBackend {
    pub fn new(provider: Arc<dyn Provider>, model: &str, temperatures: Temperatures) -> Self {
        Self {
            provider,
            model: model.to_string(),
            temperatures,
        }
    }

    /// Build against the configured OpenAI-compatible endpoint.
    pub fn from_config(llm: &LlmConfig) -> Result<Self, LoopError> {
        let api_key = llm.resolved_api_key().ok_or_else(|| {
            LoopError::Configuration(
                "API key is not set. Set OPENAI_API_KEY or llm.api_key in config.toml.".into(),
            )
        })?;

        let provider = OpenAiCompatibleProvider::new(
            "openai-compatible",
            llm.normalized_base_url(),
            Some(api_key),
            llm.timeout_secs,
            llm.max_tokens,
        );

        Ok(Self::new(
            Arc::new(provider),
            &llm.model,
            Temperatures::from(llm),
        ))
    }

    async fn structured(
        &self,
        prompt: &ChatPrompt,
        temperature: f64,
    ) -> Result<serde_json::Value, LoopError> {
        chat_json(
            self.provider.as_ref(),
            &prompt.system,
            &prompt.user,
            &self.model,
            temperature,
        )
        .await
    }
}

impl Generator for LiveBackend {
    fn generate<'a>(
        &'a self,
        attempt: u32,
        task: &'a str,
        policy: &'a Policy,
    ) -> BackendFuture<'a, String> {
        Box::pin(async move {
            let prompt = generator_prompt(task, policy);
            tracing::debug!(attempt, model = %self.model, "live generate");

            let output = self
                .provider
                .chat_with_system(
                    Some(&prompt.system),
                    &prompt.user,
                    &self.model,
                    self.temperatures.generate,
                )
                .await
                .map_err(|e| LoopError::Generation(format!("{e:#}")))?;

            if output.trim().is_empty() {
                return Err(LoopError::Generation("LLM returned empty response".into()));
            }
            Ok(output)
        })
    }
}

impl Evaluator for LiveBackend {
    fn evaluate<'a>(
        &'a self,
        attempt: u32,
        task: &'a str,
        output: &'a str,
        policy: &'a Policy,
    ) -> BackendFuture<'a, Evaluation> {
        Box::pin(async move {
            let prompt = evaluator_prompt(task, output, policy);
            tracing::debug!(attempt, model = %self.model, "live evaluate");

            let value = self.structured(&prompt, self.temperatures.evaluate).await?;
            Evaluation::from_json(value).map_err(|e| LoopError::EvaluationSchema(format!("{e:#}")))
        })
    }
}

impl Patcher for LiveBackend {
    fn derive_patch<'a>(
        &'a self,
        attempt: u32,
        task: &'a str,
        output: &'a str,
        evaluation: &'a Evaluation,
        policy: &'a Policy,
    ) -> BackendFuture<'a, Patch> {
        Box::pin(async move {
            let prompt = patcher_prompt(task, output, evaluation, policy);
            tracing::debug!(attempt, model = %self.model, "live patch");

            let value = self.structured(&prompt, self.temperatures.patch).await?;
            Patch::from_json(value).map_err(|e| LoopError::PatchSchema(e.to_string()))
        })
    }
}

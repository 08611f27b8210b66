//! Structured-output helpers: pull a JSON object out of free-form model text
//! and retry once when the model fails to produce one.

use crate::error::LoopError;
use crate::llm::scrub::scrubbed_prefix;
use crate::llm::traits::Provider;
use serde_json::Value;

/// Chat attempts made before giving up on a parseable reply.
pub const JSON_ATTEMPTS: u32 = 2;

/// Characters of the last raw reply kept in an `InvalidJson` error.
pub const RAW_PREFIX_CHARS: usize = 500;

/// Locate the JSON payload inside a model reply.
///
/// Prefers the contents of the first non-empty fenced code block (a leading
/// language tag word is skipped). Otherwise takes the span from the first `{`
/// to the last `}`. Falls back to the trimmed text itself.
pub fn extract_json(raw: &str) -> &str {
    if let Some(fenced) = fenced_block(raw).map(str::trim).filter(|b| !b.is_empty()) {
        return fenced;
    }

    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}'))
        && start < end
    {
        return &raw[start..=end];
    }

    raw.trim()
}

fn fenced_block(raw: &str) -> Option<&str> {
    let open = raw.find("```")?;
    let after_ticks = &raw[open + 3..];
    // Skip an optional language tag such as `json`.
    let body = after_ticks.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let close = body.find("```")?;
    Some(&body[..close])
}

/// Parse a model reply into a JSON value using [`extract_json`].
pub fn parse_reply(raw: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(extract_json(raw))
}

/// Ask the provider for a JSON object. A reply that fails to parse is
/// retried with the same prompts exactly once; a second failure yields
/// [`LoopError::InvalidJson`] carrying a scrubbed prefix of the last reply.
///
/// Transport and provider failures surface as [`LoopError::Generation`]
/// without a retry.
pub async fn chat_json(
    provider: &dyn Provider,
    system_prompt: &str,
    user_prompt: &str,
    model: &str,
    temperature: f64,
) -> Result<Value, LoopError> {
    let mut last_raw = String::new();

    for attempt in 1..=JSON_ATTEMPTS {
        let raw = provider
            .chat_with_system(Some(system_prompt), user_prompt, model, temperature)
            .await
            .map_err(|e| LoopError::Generation(format!("{e:#}")))?;

        match parse_reply(&raw) {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(
                    provider = provider.name(),
                    attempt,
                    error = %e,
                    "model reply was not valid JSON"
                );
                last_raw = raw;
            }
        }
    }

    Err(LoopError::InvalidJson {
        attempts: JSON_ATTEMPTS,
        raw_prefix: scrubbed_prefix(&last_raw, RAW_PREFIX_CHARS),
    })
}

mod types;

use crate::llm::http_client::build_provider_client_with_timeout;
use crate::llm::traits::Provider;
use crate::llm::{api_error, scrub_secret_patterns};
use anyhow::Context;
use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use types::{ChatRequest, ChatResponse, Message, extract_chat_text};

/// Any endpoint speaking the OpenAI `/chat/completions` protocol: OpenAI
/// itself, Azure, a proxy in front of Anthropic, or a local model server.
pub struct OpenAiCompatibleProvider {
    name: String,
    base_url: String,
    /// Pre-computed `"Bearer <key>"` header value (avoids `format!` per request).
    cached_auth_header: Option<String>,
    max_tokens: u32,
    client: Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: &str,
        base_url: &str,
        api_key: Option<&str>,
        timeout_secs: u64,
        max_tokens: u32,
    ) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            cached_auth_header: api_key.map(|k| format!("Bearer {k}")),
            max_tokens,
            client: build_provider_client_with_timeout(timeout_secs),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request(
        &self,
        system_prompt: Option<&str>,
        message: &str,
        model: &str,
        temperature: f64,
    ) -> ChatRequest {
        let capacity = if system_prompt.is_some() { 2 } else { 1 };
        let mut messages = Vec::with_capacity(capacity);

        if let Some(sys) = system_prompt {
            messages.push(Message {
                role: "system",
                content: sys.to_string(),
            });
        }

        messages.push(Message {
            role: "user",
            content: message.to_string(),
        });

        ChatRequest {
            model: model.to_string(),
            messages,
            temperature,
            max_tokens: self.max_tokens,
        }
    }

    async fn call_api(&self, request: &ChatRequest) -> anyhow::Result<ChatResponse> {
        let auth_header = self.cached_auth_header.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "{} API key not set. Set OPENAI_API_KEY or edit config.toml.",
                self.name
            )
        })?;

        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", auth_header)
            .json(request)
            .send()
            .await
            .with_context(|| format!("{} request failed", self.name))?;

        if !response.status().is_success() {
            return Err(api_error(&self.name, response).await);
        }

        response
            .json()
            .await
            .with_context(|| format!("{} response JSON decode failed", self.name))
    }
}

impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn chat_with_system<'a>(
        &'a self,
        system_prompt: Option<&'a str>,
        message: &'a str,
        model: &'a str,
        temperature: f64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            tracing::debug!(
                provider = %self.name,
                model,
                request = %describe_request(system_prompt, message),
                "sending chat completion"
            );
            let request = self.build_request(system_prompt, message, model, temperature);
            let chat_response = self.call_api(&request).await?;

            if let Some(usage) = &chat_response.usage {
                tracing::debug!(
                    provider = %self.name,
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "chat completion usage"
                );
            }

            extract_chat_text(&chat_response)
                .ok_or_else(|| anyhow::anyhow!("LLM returned empty response"))
        })
    }
}

/// Redacted view of a request body, for debug logging.
fn describe_request(system_prompt: Option<&str>, message: &str) -> String {
    let system = system_prompt.map_or(0, str::len);
    format!(
        "system={system}B user={}B preview={}",
        message.len(),
        scrub_secret_patterns(&message.chars().take(80).collect::<String>())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str, key: Option<&str>) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new("openai", base_url, key, 5, 256)
    }

    #[test]
    fn creates_with_key() {
        let p = provider("https://api.openai.com/v1/", Some("sk-proj-abc123"));
        assert_eq!(
            p.cached_auth_header.as_deref(),
            Some("Bearer sk-proj-abc123")
        );
        assert_eq!(
            p.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn request_serializes_with_system_message() {
        let p = provider("http://localhost", Some("k"));
        let req = p.build_request(Some("You are strict"), "hello", "gpt-4o-mini", 0.1);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["max_tokens"], 256);
    }

    #[test]
    fn request_serializes_without_system() {
        let p = provider("http://localhost", Some("k"));
        let req = p.build_request(None, "hello", "m", 0.0);
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("system"));
        assert!(json.contains("\"temperature\":0.0"));
    }

    #[tokio::test]
    async fn chat_fails_without_key() {
        let p = provider("http://127.0.0.1:9", None);
        let err = p.chat("hello", "m", 0.7).await.unwrap_err();
        assert!(err.to_string().contains("API key not set"));
    }

    #[tokio::test]
    async fn chat_returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "Hi there"}}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 2}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let p = provider(&server.uri(), Some("sk-test"));
        let reply = p
            .chat_with_system(Some("sys"), "hello", "gpt-4o-mini", 0.4)
            .await
            .unwrap();
        assert_eq!(reply, "Hi there");
    }

    #[tokio::test]
    async fn empty_content_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "   "}}]
            })))
            .mount(&server)
            .await;

        let p = provider(&server.uri(), Some("sk-test"));
        let err = p.chat("hello", "m", 0.4).await.unwrap_err();
        assert!(err.to_string().contains("empty response"));
    }

    #[tokio::test]
    async fn non_success_status_is_sanitized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_string("Incorrect API key provided: sk-live-SECRET123"),
            )
            .mount(&server)
            .await;

        let p = provider(&server.uri(), Some("sk-live-SECRET123"));
        let err = p.chat("hello", "m", 0.4).await.unwrap_err().to_string();
        assert!(err.contains("401"));
        assert!(!err.contains("SECRET123"));
        assert!(err.contains("[REDACTED]"));
    }

    #[test]
    fn describe_request_scrubs_preview() {
        let text = describe_request(Some("sys"), "my key is sk-abc123 ok");
        assert!(text.contains("system=3B"));
        assert!(!text.contains("sk-abc123"));
    }
}

//! LLM client for structured enhancement calls.
//!
//! The enhancement engine needs one narrow contract: send a prompt with
//! a JSON response schema, get back a schema-shaped JSON value plus
//! token usage. Transient failures are the provider's concern; what
//! escapes here is surfaced as an external error and never mutates the
//! dataset.

use crate::error::{EnhanceError, Result, ServerError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Token usage of one completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A structured completion: JSON content plus usage.
#[derive(Debug, Clone)]
pub struct StructuredResponse {
    pub content: Value,
    pub usage: TokenUsage,
}

/// The structured-output contract enhancement tools depend on.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Runs one completion constrained to the given JSON schema and
    /// returns the parsed object.
    async fn complete_structured(
        &self,
        system: &str,
        user: &str,
        response_schema: &Value,
    ) -> Result<StructuredResponse>;

    /// Provider name for cost attribution.
    fn provider(&self) -> &str;

    /// Model name for cost attribution.
    fn model(&self) -> &str;
}

/// Chat-completions client for OpenAI and API-compatible servers.
pub struct OpenAiChatClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiChatClient {
    #[must_use]
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn complete_structured(
        &self,
        system: &str,
        user: &str,
        response_schema: &Value,
    ) -> Result<StructuredResponse> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "enhancement",
                    "schema": response_schema,
                    "strict": true,
                },
            },
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServerError::Enhance(EnhanceError::Provider(e.to_string())))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ServerError::Enhance(EnhanceError::Provider(format!(
                "completion failed with {status}: {text}"
            ))));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| ServerError::Enhance(EnhanceError::Provider(e.to_string())))?;

        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                ServerError::Enhance(EnhanceError::Provider(
                    "completion response had no message content".to_string(),
                ))
            })?;
        let content: Value = serde_json::from_str(content).map_err(|e| {
            ServerError::Enhance(EnhanceError::Provider(format!(
                "completion content was not valid JSON: {e}"
            )))
        })?;

        Ok(StructuredResponse {
            content,
            usage: TokenUsage {
                input_tokens: parsed["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
                output_tokens: parsed["usage"]["completion_tokens"].as_u64().unwrap_or(0),
            },
        })
    }

    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Builds the default LLM client from the environment, or `None` when no
/// credential is present (enhancement tools degrade gracefully).
#[must_use]
pub fn from_env(enhance_model: &str) -> Option<Arc<dyn LlmClient>> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let model = enhance_model
        .split_once(':')
        .map_or(enhance_model, |(_, model)| model);
    tracing::info!(model, "Using OpenAI enhancement client");
    Some(Arc::new(OpenAiChatClient::new(api_key, model.to_string())))
}

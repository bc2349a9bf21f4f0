//! Scripted LLM client for tests.

use crate::error::Result;
use crate::llm::{LlmClient, StructuredResponse, TokenUsage};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Pops canned responses in order and records the prompts it saw.
/// Panics when the script runs dry, which flags missing expectations.
pub struct ScriptedClient {
    responses: Mutex<Vec<Result<Value>>>,
    prompts: Mutex<Vec<String>>,
    usage: TokenUsage,
}

impl ScriptedClient {
    #[must_use]
    pub fn new(mut responses: Vec<Result<Value>>) -> Arc<Self> {
        responses.reverse();
        Arc::new(Self {
            responses: Mutex::new(responses),
            prompts: Mutex::new(Vec::new()),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
        })
    }

    /// Same, with explicit token usage on every response.
    #[must_use]
    pub fn with_usage(mut responses: Vec<Result<Value>>, usage: TokenUsage) -> Arc<Self> {
        responses.reverse();
        Arc::new(Self {
            responses: Mutex::new(responses),
            prompts: Mutex::new(Vec::new()),
            usage,
        })
    }

    /// User prompts seen so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete_structured(
        &self,
        _system: &str,
        user: &str,
        _response_schema: &Value,
    ) -> Result<StructuredResponse> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(user.to_string());
        let next = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()
            .expect("scripted client ran out of responses");
        next.map(|content| StructuredResponse {
            content,
            usage: self.usage,
        })
    }

    fn provider(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }
}

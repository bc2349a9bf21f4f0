//! OpenAI-compatible embedding provider.

use super::{EmbeddingProvider, EmbeddingResult, EmbeddingUsage, ProviderInfo};
use crate::error::{EnhanceError, Result, ServerError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
/// text-embedding-3-* token cap.
const MAX_INPUT_TOKENS: usize = 8191;

/// Embeddings through the OpenAI `/embeddings` endpoint (or any
/// API-compatible server via `with_base_url`).
pub struct OpenAiEmbeddings {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
}

impl OpenAiEmbeddings {
    #[must_use]
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL.to_string())
    }

    #[must_use]
    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "input": texts,
            }))
            .send()
            .await
            .map_err(|e| ServerError::Enhance(EnhanceError::Provider(e.to_string())))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServerError::Enhance(EnhanceError::Provider(format!(
                "embedding request failed with {status}: {body}"
            ))));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ServerError::Enhance(EnhanceError::Provider(e.to_string())))?;

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        let dimension = vectors.first().map_or(0, Vec::len);
        Ok(EmbeddingResult {
            vectors,
            model: self.model.clone(),
            dimension,
            usage: EmbeddingUsage {
                input_tokens: parsed.usage.map_or(0, |u| u.prompt_tokens),
            },
        })
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "openai",
            model: self.model.clone(),
            dimension: None,
            max_input_length: Some(MAX_INPUT_TOKENS),
        }
    }
}

//! Cohere embedding provider.

use super::{EmbeddingProvider, EmbeddingResult, EmbeddingUsage, ProviderInfo};
use crate::error::{EnhanceError, Result, ServerError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

const BASE_URL: &str = "https://api.cohere.ai/v1";
/// embed-v3 models accept up to 512 tokens per input.
const MAX_INPUT_TOKENS: usize = 512;
/// embed-english-v3.0 output width.
const DIMENSION: usize = 1024;

/// Embeddings through the Cohere `/embed` endpoint.
pub struct CohereEmbeddings {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
    meta: Option<Meta>,
}

#[derive(Deserialize)]
struct Meta {
    billed_units: Option<BilledUnits>,
}

#[derive(Deserialize)]
struct BilledUnits {
    input_tokens: Option<u64>,
}

impl CohereEmbeddings {
    #[must_use]
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CohereEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let response = self
            .client
            .post(format!("{BASE_URL}/embed"))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "texts": texts,
                "input_type": "search_document",
                "truncate": "END",
            }))
            .send()
            .await
            .map_err(|e| ServerError::Enhance(EnhanceError::Provider(e.to_string())))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServerError::Enhance(EnhanceError::Provider(format!(
                "Cohere embed request failed with {status}: {body}"
            ))));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| ServerError::Enhance(EnhanceError::Provider(e.to_string())))?;

        let dimension = parsed.embeddings.first().map_or(0, Vec::len);
        let input_tokens = parsed
            .meta
            .and_then(|m| m.billed_units)
            .and_then(|b| b.input_tokens)
            .unwrap_or(0);
        Ok(EmbeddingResult {
            vectors: parsed.embeddings,
            model: self.model.clone(),
            dimension,
            usage: EmbeddingUsage { input_tokens },
        })
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "cohere",
            model: self.model.clone(),
            dimension: Some(DIMENSION),
            max_input_length: Some(MAX_INPUT_TOKENS),
        }
    }
}

//! Voyage AI embedding provider (OpenAI-compatible response shape).

use super::{EmbeddingProvider, EmbeddingResult, EmbeddingUsage, ProviderInfo};
use crate::error::{EnhanceError, Result, ServerError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

const BASE_URL: &str = "https://api.voyageai.com/v1";
/// voyage-2 context window.
const MAX_INPUT_TOKENS: usize = 4000;

/// Embeddings through the Voyage `/embeddings` endpoint.
pub struct VoyageEmbeddings {
    client: reqwest::Client,
    api_key: String,
    model: String,
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
    total_tokens: u64,
}

impl VoyageEmbeddings {
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
impl EmbeddingProvider for VoyageEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let response = self
            .client
            .post(format!("{BASE_URL}/embeddings"))
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
                "Voyage embed request failed with {status}: {body}"
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
                input_tokens: parsed.usage.map_or(0, |u| u.total_tokens),
            },
        })
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "voyage",
            model: self.model.clone(),
            dimension: None,
            max_input_length: Some(MAX_INPUT_TOKENS),
        }
    }
}

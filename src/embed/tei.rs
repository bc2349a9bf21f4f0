//! Text-Embeddings-Inference (TEI) provider.
//!
//! Talks to a self-hosted TEI server's `/embed` endpoint. The vector
//! dimension is learned from the first response; the input cap is the
//! server's sequence length, not the dimension.

use super::{EmbeddingProvider, EmbeddingResult, EmbeddingUsage, ProviderInfo};
use crate::error::{EnhanceError, Result, ServerError};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

/// TEI's default max sequence length.
const DEFAULT_MAX_INPUT_LENGTH: usize = 512;

/// Embeddings through a TEI deployment.
pub struct TeiEmbeddings {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    /// 0 until the first successful call reveals the width.
    dimension: AtomicUsize,
}

impl TeiEmbeddings {
    #[must_use]
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            dimension: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for TeiEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let mut request = self
            .client
            .post(format!("{}/embed", self.base_url))
            .json(&json!({"inputs": texts, "truncate": true}));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ServerError::Enhance(EnhanceError::Provider(e.to_string())))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServerError::Enhance(EnhanceError::Provider(format!(
                "TEI request failed with {status}: {body}"
            ))));
        }

        let vectors: Vec<Vec<f32>> = response
            .json()
            .await
            .map_err(|e| ServerError::Enhance(EnhanceError::Provider(e.to_string())))?;

        let dimension = vectors.first().map_or(0, Vec::len);
        if dimension > 0 {
            self.dimension.store(dimension, Ordering::Relaxed);
        }

        // TEI does not report token usage; approximate at 4 bytes/token
        let input_tokens = texts.iter().map(|t| t.len() as u64 / 4).sum();

        Ok(EmbeddingResult {
            vectors,
            model: "tei".to_string(),
            dimension,
            usage: EmbeddingUsage { input_tokens },
        })
    }

    fn info(&self) -> ProviderInfo {
        let dimension = self.dimension.load(Ordering::Relaxed);
        ProviderInfo {
            name: "tei",
            model: "tei".to_string(),
            dimension: (dimension > 0).then_some(dimension),
            max_input_length: Some(DEFAULT_MAX_INPUT_LENGTH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_and_input_cap_are_distinct() {
        let provider = TeiEmbeddings::new("http://localhost:8080".into(), None);
        let info = provider.info();
        // Dimension unknown before the first call; the input cap is not
        // used as a stand-in for it.
        assert_eq!(info.dimension, None);
        assert_eq!(info.max_input_length, Some(DEFAULT_MAX_INPUT_LENGTH));

        provider.dimension.store(768, Ordering::Relaxed);
        let info = provider.info();
        assert_eq!(info.dimension, Some(768));
        assert_eq!(info.max_input_length, Some(DEFAULT_MAX_INPUT_LENGTH));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let provider = TeiEmbeddings::new("http://tei:8080/".into(), None);
        assert_eq!(provider.base_url, "http://tei:8080");
    }
}

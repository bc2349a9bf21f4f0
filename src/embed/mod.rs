//! Embedding providers.
//!
//! The core only needs `embed(texts) -> vectors + usage`. Providers are
//! selected at startup from the environment; a missing credential means
//! no provider, and the tools that need one are withheld from the
//! catalog rather than failing at call time.

mod cohere;
mod openai;
mod tei;
mod voyage;

pub use cohere::CohereEmbeddings;
pub use openai::OpenAiEmbeddings;
pub use tei::TeiEmbeddings;
pub use voyage::VoyageEmbeddings;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddingUsage {
    pub input_tokens: u64,
}

/// A batch embedding response.
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub vectors: Vec<Vec<f32>>,
    pub model: String,
    pub dimension: usize,
    pub usage: EmbeddingUsage,
}

/// Static description of a provider. `dimension` is the output vector
/// width; `max_input_length` is the provider's input token cap. The two
/// are unrelated quantities and are reported separately.
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: &'static str,
    pub model: String,
    pub dimension: Option<usize>,
    pub max_input_length: Option<usize>,
}

/// The narrow embedding contract the server depends on.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a batch of texts, one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Provider description for logging and the dataset-info resource.
    fn info(&self) -> ProviderInfo;
}

/// Default model per provider when the configured model belongs to a
/// different provider family.
const COHERE_DEFAULT_MODEL: &str = "embed-english-v3.0";
const VOYAGE_DEFAULT_MODEL: &str = "voyage-2";

/// Selects a provider from the environment.
///
/// Priority: `OPENAI_API_KEY`, then `COHERE_API_KEY`, then
/// `VOYAGE_API_KEY`, then `TEI_API_BASE` (self-hosted
/// text-embeddings-inference). Returns `None` when nothing is
/// configured.
#[must_use]
pub fn from_env(model: &str) -> Option<Arc<dyn EmbeddingProvider>> {
    if let Ok(api_key) = std::env::var("OPENAI_API_KEY") {
        tracing::info!(model, "Using OpenAI embeddings");
        return Some(Arc::new(OpenAiEmbeddings::new(api_key, model.to_string())));
    }
    if let Ok(api_key) = std::env::var("COHERE_API_KEY") {
        let model = if model.starts_with("embed-") { model } else { COHERE_DEFAULT_MODEL };
        tracing::info!(model, "Using Cohere embeddings");
        return Some(Arc::new(CohereEmbeddings::new(api_key, model.to_string())));
    }
    if let Ok(api_key) = std::env::var("VOYAGE_API_KEY") {
        let model = if model.starts_with("voyage") { model } else { VOYAGE_DEFAULT_MODEL };
        tracing::info!(model, "Using Voyage embeddings");
        return Some(Arc::new(VoyageEmbeddings::new(api_key, model.to_string())));
    }
    if let Ok(base) = std::env::var("TEI_API_BASE") {
        let api_key = std::env::var("TEI_API_KEY").ok();
        tracing::info!(base, "Using TEI embeddings");
        return Some(Arc::new(TeiEmbeddings::new(base, api_key)));
    }
    None
}

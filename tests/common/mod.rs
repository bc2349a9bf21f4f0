//! Common test utilities for contextframe-mcp integration tests.
//!
//! Provides `TestEnv` for setting up an isolated in-memory dataset with
//! server, monitoring, and deterministic collaborators wired together.

#![allow(dead_code)] // Test utilities may not all be used in every test file

use async_trait::async_trait;
use contextframe_mcp::config::ServerConfig;
use contextframe_mcp::dataset::{Dataset, MemoryDataset};
use contextframe_mcp::embed::{EmbeddingProvider, EmbeddingResult, EmbeddingUsage, ProviderInfo};
use contextframe_mcp::enhance::testing::ScriptedClient;
use contextframe_mcp::error::Result;
use contextframe_mcp::server::ContextFrameServer;
use contextframe_mcp::types::FrameRecord;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Deterministic embedder: returns the vector registered for a text, or
/// a fallback vector for anything unregistered.
pub struct MapEmbedder {
    map: HashMap<String, Vec<f32>>,
    dimension: usize,
}

impl MapEmbedder {
    pub fn new(entries: &[(&str, Vec<f32>)]) -> Arc<Self> {
        let dimension = entries.first().map_or(3, |(_, v)| v.len());
        Arc::new(Self {
            map: entries
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for MapEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingResult> {
        let vectors = texts
            .iter()
            .map(|t| {
                self.map
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; self.dimension])
            })
            .collect();
        Ok(EmbeddingResult {
            vectors,
            model: "map".to_string(),
            dimension: self.dimension,
            usage: EmbeddingUsage { input_tokens: 1 },
        })
    }

    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "map",
            model: "map".to_string(),
            dimension: Some(self.dimension),
            max_input_length: Some(8192),
        }
    }
}

/// A complete test environment: concrete in-memory dataset plus the
/// server built over it.
pub struct TestEnv {
    pub memory: Arc<MemoryDataset>,
    pub dataset: Arc<dyn Dataset>,
    pub server: ContextFrameServer,
}

impl TestEnv {
    /// Environment with default configuration and no collaborators.
    pub fn new() -> Self {
        Self::build(MemoryDataset::new(), ServerConfig::default(), None, None)
    }

    /// Environment with a custom fragment size for storage accounting
    /// tests.
    pub fn with_fragment_rows(rows: usize) -> Self {
        Self::build(
            MemoryDataset::with_rows_per_fragment(rows),
            ServerConfig::default(),
            None,
            None,
        )
    }

    /// Environment with a scripted LLM client.
    pub fn with_llm(responses: Vec<Result<Value>>) -> Self {
        Self::build(
            MemoryDataset::new(),
            ServerConfig::default(),
            Some(responses),
            None,
        )
    }

    /// Environment with a deterministic embedder.
    pub fn with_embedder(embedder: Arc<MapEmbedder>) -> Self {
        Self::build(MemoryDataset::new(), ServerConfig::default(), None, Some(embedder))
    }

    pub fn build(
        memory: MemoryDataset,
        config: ServerConfig,
        llm: Option<Vec<Result<Value>>>,
        embedder: Option<Arc<MapEmbedder>>,
    ) -> Self {
        let memory = Arc::new(memory);
        let dataset: Arc<dyn Dataset> = Arc::clone(&memory) as Arc<dyn Dataset>;
        let server = ContextFrameServer::with_collaborators(
            Arc::clone(&dataset),
            config,
            llm.map(|responses| ScriptedClient::new(responses) as Arc<dyn contextframe_mcp::llm::LlmClient>),
            embedder.map(|e| e as Arc<dyn EmbeddingProvider>),
        );
        Self {
            memory,
            dataset,
            server,
        }
    }

    /// Adds a plain document and returns its id.
    pub async fn add_doc(&self, content: &str, title: &str) -> Uuid {
        let record = FrameRecord::new(content).with_title(title);
        let id = record.uuid;
        self.dataset.add(record).await.expect("add failed");
        id
    }

    /// Adds a document with an embedding and returns its id.
    pub async fn add_doc_with_vector(&self, content: &str, title: &str, vector: Vec<f32>) -> Uuid {
        let record = FrameRecord::new(content)
            .with_title(title)
            .with_embedding(vector);
        let id = record.uuid;
        self.dataset.add(record).await.expect("add failed");
        id
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

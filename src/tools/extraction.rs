//! File extraction tools.

use crate::dataset::Dataset;
use crate::embed::EmbeddingProvider;
use crate::error::Result;
use crate::extract;
use crate::security;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

fn default_true() -> bool {
    true
}

fn default_patterns() -> Vec<String> {
    ["*.md", "*.txt", "*.json", "*.yaml", "*.yml"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

// ─── extract_from_file ───────────────────────────────────────────────────────

/// Input for the `extract_from_file` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExtractFromFileInput {
    /// Absolute path of the file to extract
    pub file_path: String,
    /// Add the extracted document to the dataset (default: true)
    #[serde(default = "default_true")]
    pub add_to_dataset: bool,
    /// Generate an embedding for the extracted content (default: true)
    #[serde(default = "default_true")]
    pub generate_embedding: bool,
    /// Collection to file the document under
    pub collection: Option<String>,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `extract_from_file` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct ExtractFromFileOutput {
    /// Path that was extracted
    pub file_path: String,
    /// UUID of the stored document, when added to the dataset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Uuid>,
    /// Length of the extracted content in bytes
    pub content_length: usize,
    /// Title recovered from the file, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Flat metadata recovered from the file
    pub metadata: BTreeMap<String, String>,
    /// Extracted content, when not added to the dataset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Executes the `extract_from_file` tool.
pub async fn execute_extract_from_file(
    dataset: &Arc<dyn Dataset>,
    embedder: Option<&Arc<dyn EmbeddingProvider>>,
    input: ExtractFromFileInput,
) -> Result<ExtractFromFileOutput> {
    let path = security::validate_extraction_path(&input.file_path)
        .map_err(crate::error::ExtractError::Security)
        .map_err(crate::error::ServerError::Extract)?;
    let extracted = extract::extract_file(&path)?;

    let content_length = extracted.content.len();
    let title = extracted.title.clone();
    let metadata = extracted.metadata.clone();

    if !input.add_to_dataset {
        return Ok(ExtractFromFileOutput {
            file_path: input.file_path,
            document_id: None,
            content_length,
            title,
            metadata,
            content: Some(extracted.content),
        });
    }

    let mut record = extracted.into_record(&path, input.collection.as_deref());
    if input.generate_embedding {
        if let Some(embedder) = embedder {
            let texts = [record.content.clone()];
            let result = embedder.embed(&texts).await?;
            record.embedding = result.vectors.into_iter().next();
        }
    }
    let document_id = record.uuid;
    dataset.add(record).await?;

    Ok(ExtractFromFileOutput {
        file_path: input.file_path,
        document_id: Some(document_id),
        content_length,
        title,
        metadata,
        content: None,
    })
}

// ─── batch_extract ───────────────────────────────────────────────────────────

/// Input for the `batch_extract` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BatchExtractInput {
    /// Absolute path of the directory to process
    pub directory: String,
    /// Glob patterns matched against file names (default: common text formats)
    #[serde(default = "default_patterns")]
    pub patterns: Vec<String>,
    /// Descend into subdirectories (default: true)
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Add extracted documents to the dataset (default: true)
    #[serde(default = "default_true")]
    pub add_to_dataset: bool,
    /// Generate embeddings for extracted content (default: true)
    #[serde(default = "default_true")]
    pub generate_embedding: bool,
    /// Collection to file the documents under
    pub collection: Option<String>,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// A failed file within a batch extraction.
#[derive(Debug, Serialize, JsonSchema)]
pub struct BatchExtractError {
    /// Path that failed
    pub file_path: String,
    /// Why it failed
    pub error: String,
}

/// Output of the `batch_extract` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct BatchExtractOutput {
    /// Directory that was processed
    pub directory: String,
    /// Files matched by the patterns
    pub files_processed: usize,
    /// Documents written to the dataset
    pub documents_added: usize,
    /// UUIDs of added documents, in walk order
    pub document_ids: Vec<Uuid>,
    /// Patterns that were applied
    pub patterns: Vec<String>,
    /// Per-file failures; the rest of the batch continued
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BatchExtractError>,
}

/// Executes the `batch_extract` tool. One record per matched file;
/// per-file failures are reported without aborting the batch.
pub async fn execute_batch_extract(
    dataset: &Arc<dyn Dataset>,
    embedder: Option<&Arc<dyn EmbeddingProvider>>,
    input: BatchExtractInput,
) -> Result<BatchExtractOutput> {
    let dir = security::validate_extraction_path(&input.directory)
        .map_err(crate::error::ExtractError::Security)
        .map_err(crate::error::ServerError::Extract)?;
    let results = extract::extract_directory(&dir, &input.patterns, input.recursive)?;

    let files_processed = results.len();
    let mut document_ids = Vec::new();
    let mut errors = Vec::new();

    for (path, extracted) in results {
        let extracted = match extracted {
            Ok(extracted) => extracted,
            Err(error) => {
                tracing::warn!("batch_extract failed for {}: {}", path.display(), error);
                errors.push(BatchExtractError {
                    file_path: path.to_string_lossy().to_string(),
                    error: error.to_string(),
                });
                continue;
            }
        };

        if !input.add_to_dataset {
            continue;
        }

        let mut record = extracted.into_record(&path, input.collection.as_deref());
        if input.generate_embedding {
            if let Some(embedder) = embedder {
                match embed_one(embedder, &record.content).await {
                    Ok(vector) => record.embedding = vector,
                    Err(error) => {
                        tracing::warn!("embedding failed for {}: {}", path.display(), error);
                    }
                }
            }
        }
        let id = record.uuid;
        match dataset.add(record).await {
            Ok(()) => document_ids.push(id),
            Err(error) => errors.push(BatchExtractError {
                file_path: path.to_string_lossy().to_string(),
                error: error.to_string(),
            }),
        }
    }

    Ok(BatchExtractOutput {
        directory: input.directory,
        files_processed,
        documents_added: document_ids.len(),
        document_ids,
        patterns: input.patterns,
        errors,
    })
}

async fn embed_one(
    embedder: &Arc<dyn EmbeddingProvider>,
    content: &str,
) -> Result<Option<Vec<f32>>> {
    let texts = [content.to_string()];
    let result = embedder.embed(&texts).await?;
    Ok(result.vectors.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MemoryDataset;
    use tempfile::TempDir;

    fn dataset() -> Arc<dyn Dataset> {
        Arc::new(MemoryDataset::new())
    }

    #[tokio::test]
    async fn test_extract_and_add() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.md");
        std::fs::write(&path, "# Note\n\nSome text.\n").unwrap();

        let ds = dataset();
        let output = execute_extract_from_file(
            &ds,
            None,
            ExtractFromFileInput {
                file_path: path.to_string_lossy().to_string(),
                add_to_dataset: true,
                generate_embedding: false,
                collection: Some("notes".into()),
                agent_id: None,
            },
        )
        .await
        .unwrap();

        let id = output.document_id.unwrap();
        let stored = ds.get_by_uuid(id).await.unwrap().unwrap();
        assert_eq!(stored.metadata.title.as_deref(), Some("Note"));
        assert_eq!(stored.metadata.collection.as_deref(), Some("notes"));
        assert_eq!(stored.metadata.source_type.as_deref(), Some("markdown"));
    }

    #[tokio::test]
    async fn test_extract_without_adding_returns_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.txt");
        std::fs::write(&path, "just text").unwrap();

        let ds = dataset();
        let output = execute_extract_from_file(
            &ds,
            None,
            ExtractFromFileInput {
                file_path: path.to_string_lossy().to_string(),
                add_to_dataset: false,
                generate_embedding: false,
                collection: None,
                agent_id: None,
            },
        )
        .await
        .unwrap();

        assert!(output.document_id.is_none());
        assert_eq!(output.content.as_deref(), Some("just text"));
        assert_eq!(ds.count_rows(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_relative_path_rejected() {
        let ds = dataset();
        let err = execute_extract_from_file(
            &ds,
            None,
            ExtractFromFileInput {
                file_path: "relative/path.md".into(),
                add_to_dataset: true,
                generate_embedding: false,
                collection: None,
                agent_id: None,
            },
        )
        .await
        .unwrap_err();
        assert!(err.is_client_fixable());
        assert!(err.to_string().contains("absolute"));
    }

    #[tokio::test]
    async fn test_batch_extract_counts_and_patterns() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.md"), "# A\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("skip.rs"), "fn main() {}").unwrap();

        let ds = dataset();
        let output = execute_batch_extract(
            &ds,
            None,
            BatchExtractInput {
                directory: dir.path().to_string_lossy().to_string(),
                patterns: vec!["*.md".into(), "*.txt".into()],
                recursive: true,
                add_to_dataset: true,
                generate_embedding: false,
                collection: None,
                agent_id: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(output.files_processed, 2);
        assert_eq!(output.documents_added, 2);
        assert!(output.errors.is_empty());
        assert_eq!(ds.count_rows(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_batch_extract_collects_per_file_errors() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("good.json"), r#"{"ok": true}"#).unwrap();
        std::fs::write(dir.path().join("bad.json"), "{broken").unwrap();

        let ds = dataset();
        let output = execute_batch_extract(
            &ds,
            None,
            BatchExtractInput {
                directory: dir.path().to_string_lossy().to_string(),
                patterns: vec!["*.json".into()],
                recursive: false,
                add_to_dataset: true,
                generate_embedding: false,
                collection: None,
                agent_id: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(output.files_processed, 2);
        assert_eq!(output.documents_added, 1);
        assert_eq!(output.errors.len(), 1);
        assert!(output.errors[0].file_path.ends_with("bad.json"));
    }
}

//! Document CRUD and search tools.

use crate::analytics::{IndexAdvisor, QueryAnalyzer, QueryExecution, QueryType};
use crate::dataset::{Dataset, IndexType, Projection, ScanRequest};
use crate::embed::EmbeddingProvider;
use crate::error::{Result, ServerError};
use crate::types::{FrameRecord, Metadata, Relationship};
use crate::validation::{self, Validator};
use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Weight of the vector score when merging hybrid results.
const HYBRID_VECTOR_WEIGHT: f64 = 0.6;

fn default_true() -> bool {
    true
}

const fn default_search_limit() -> usize {
    10
}

const fn default_list_limit() -> usize {
    50
}

/// Raw metadata as supplied by the agent. Loosely-typed fields are
/// validated into [`Metadata`] with field-path diagnostics.
#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MetadataInput {
    /// Document title
    pub title: Option<String>,
    /// Author name
    pub author: Option<String>,
    /// Tags to attach
    #[serde(default)]
    pub tags: Vec<String>,
    /// Lifecycle status: draft, review, published, or archived
    pub status: Option<String>,
    /// Context description
    pub context: Option<String>,
    /// Collection label
    pub collection: Option<String>,
    /// Source type tag
    pub source_type: Option<String>,
    /// Free-form metadata; all values must be strings
    #[serde(default)]
    pub custom_metadata: serde_json::Map<String, Value>,
}

impl MetadataInput {
    /// Validates into typed metadata, collecting every violation.
    fn validate_into(self, validator: &mut Validator) -> Metadata {
        let mut metadata = Metadata {
            title: self.title,
            author: self.author,
            tags: self.tags,
            context: self.context,
            collection: self.collection,
            source_type: self.source_type,
            ..Metadata::default()
        };
        if let Some(raw) = &self.status {
            validation::check_status(validator, "status", raw);
            metadata.status = raw.parse().ok();
        }
        validation::check_custom_metadata(
            validator,
            "custom_metadata",
            &Value::Object(self.custom_metadata.clone()),
        );
        metadata.custom_metadata = self
            .custom_metadata
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();
        metadata
    }

    fn is_empty_object(&self) -> bool {
        self.title.is_none()
            && self.author.is_none()
            && self.tags.is_empty()
            && self.status.is_none()
            && self.context.is_none()
            && self.collection.is_none()
            && self.source_type.is_none()
            && self.custom_metadata.is_empty()
    }
}

/// A relationship as supplied by the agent.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RelationshipInput {
    /// Relationship type: parent, child, related, reference, contains, member_of
    #[serde(rename = "type")]
    pub relationship_type: String,
    /// UUID of the target record
    pub target_uuid: Option<String>,
    /// URI of an external target
    pub target_uri: Option<String>,
    /// Filesystem path of the target
    pub target_path: Option<String>,
    /// Content identifier of the target
    pub target_cid: Option<String>,
    /// Title of the target
    pub title: Option<String>,
    /// Description of the relationship
    pub description: Option<String>,
}

impl RelationshipInput {
    fn validate_into(self, prefix: &str, validator: &mut Validator) -> Option<Relationship> {
        validation::check_relationship_type(
            validator,
            &format!("{prefix}.type"),
            &self.relationship_type,
        );
        if let Some(raw) = &self.target_uuid {
            validation::check_uuid(validator, &format!("{prefix}.target_uuid"), raw);
        }
        let relationship = Relationship {
            relationship_type: self.relationship_type.parse().ok()?,
            target_uuid: self.target_uuid.and_then(|raw| raw.parse().ok()),
            target_uri: self.target_uri,
            target_path: self.target_path,
            target_cid: self.target_cid,
            title: self.title,
            description: self.description,
        };
        validation::check_relationship(validator, prefix, &relationship);
        Some(relationship)
    }
}

// ─── add_document ────────────────────────────────────────────────────────────

/// Input for the `add_document` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AddDocumentInput {
    /// Free-text content of the document
    pub content: String,
    /// Structured metadata
    #[serde(default)]
    pub metadata: Option<MetadataInput>,
    /// Relationships to other records
    #[serde(default)]
    pub relationships: Vec<RelationshipInput>,
    /// Pre-computed embedding vector
    pub embedding: Option<Vec<f32>>,
    /// Generate an embedding with the configured provider (default: false)
    #[serde(default)]
    pub generate_embedding: bool,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `add_document` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct AddDocumentOutput {
    /// UUID of the created document
    pub document_id: Uuid,
    /// Creation timestamp
    pub created_at: String,
}

/// Executes the `add_document` tool.
pub async fn execute_add_document(
    dataset: &Arc<dyn Dataset>,
    embedder: Option<&Arc<dyn EmbeddingProvider>>,
    input: AddDocumentInput,
) -> Result<AddDocumentOutput> {
    let mut validator = Validator::new();
    let metadata = input
        .metadata
        .map(|m| m.validate_into(&mut validator))
        .unwrap_or_default();
    let relationships: Vec<Relationship> = input
        .relationships
        .into_iter()
        .enumerate()
        .filter_map(|(i, rel)| rel.validate_into(&format!("relationships[{i}]"), &mut validator))
        .collect();
    validator.finish()?;

    let mut record = FrameRecord::new(input.content);
    record.metadata = Metadata {
        created_at: Some(Utc::now()),
        ..metadata
    };
    record.relationships = relationships;
    record.embedding = input.embedding;

    if record.embedding.is_none() && input.generate_embedding {
        if let Some(embedder) = embedder {
            let result = embedder.embed(std::slice::from_ref(&record.content)).await?;
            record.embedding = result.vectors.into_iter().next();
        }
    }

    let document_id = record.uuid;
    let created_at = record
        .metadata
        .created_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    dataset.add(record).await?;

    Ok(AddDocumentOutput {
        document_id,
        created_at,
    })
}

// ─── get_document ────────────────────────────────────────────────────────────

/// Input for the `get_document` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GetDocumentInput {
    /// UUID of the document
    pub document_id: String,
    /// Include full content (default: true)
    #[serde(default = "default_true")]
    pub include_content: bool,
    /// Include the embedding vector (default: false)
    #[serde(default)]
    pub include_embedding: bool,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `get_document` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct GetDocumentOutput {
    /// The requested document
    pub document: FrameRecord,
}

/// Executes the `get_document` tool.
pub async fn execute_get_document(
    dataset: &Arc<dyn Dataset>,
    input: GetDocumentInput,
) -> Result<GetDocumentOutput> {
    let id = parse_document_id(&input.document_id)?;
    let mut document = dataset
        .get_by_uuid(id)
        .await?
        .ok_or(ServerError::DocumentNotFound(id))?;
    if !input.include_content {
        document.content = String::new();
    }
    if !input.include_embedding {
        document.embedding = None;
    }
    Ok(GetDocumentOutput { document })
}

// ─── update_document ─────────────────────────────────────────────────────────

/// Input for the `update_document` tool. Only supplied fields change.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateDocumentInput {
    /// UUID of the document
    pub document_id: String,
    /// Replacement content
    pub content: Option<String>,
    /// Metadata fields to change; omitted fields keep their value
    pub metadata: Option<MetadataInput>,
    /// Replacement relationship list
    pub relationships: Option<Vec<RelationshipInput>>,
    /// Replacement embedding vector
    pub embedding: Option<Vec<f32>>,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `update_document` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct UpdateDocumentOutput {
    /// UUID of the updated document
    pub document_id: Uuid,
    /// New update timestamp
    pub updated_at: String,
}

/// Executes the `update_document` tool.
pub async fn execute_update_document(
    dataset: &Arc<dyn Dataset>,
    input: UpdateDocumentInput,
) -> Result<UpdateDocumentOutput> {
    let id = parse_document_id(&input.document_id)?;
    let mut record = dataset
        .get_by_uuid(id)
        .await?
        .ok_or(ServerError::DocumentNotFound(id))?;

    let mut validator = Validator::new();
    if let Some(patch) = input.metadata {
        apply_metadata_patch(&mut record.metadata, patch, &mut validator);
    }
    if let Some(relationships) = input.relationships {
        record.relationships = relationships
            .into_iter()
            .enumerate()
            .filter_map(|(i, rel)| {
                rel.validate_into(&format!("relationships[{i}]"), &mut validator)
            })
            .collect();
    }
    validator.finish()?;

    if let Some(content) = input.content {
        record.content = content;
    }
    if let Some(embedding) = input.embedding {
        record.embedding = Some(embedding);
    }
    record.touch();

    let updated_at = record
        .metadata
        .updated_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    dataset.update_record(record).await?;

    Ok(UpdateDocumentOutput {
        document_id: id,
        updated_at,
    })
}

/// Applies a partial metadata patch: only supplied fields are touched,
/// custom metadata deep-merges.
fn apply_metadata_patch(metadata: &mut Metadata, patch: MetadataInput, validator: &mut Validator) {
    if patch.is_empty_object() {
        return;
    }
    if let Some(title) = patch.title {
        metadata.title = Some(title);
    }
    if let Some(author) = patch.author {
        metadata.author = Some(author);
    }
    if !patch.tags.is_empty() {
        metadata.tags = patch.tags;
    }
    if let Some(raw) = &patch.status {
        validation::check_status(validator, "status", raw);
        if let Ok(status) = raw.parse() {
            metadata.status = Some(status);
        }
    }
    if let Some(context) = patch.context {
        metadata.context = Some(context);
    }
    if let Some(collection) = patch.collection {
        metadata.collection = Some(collection);
    }
    if let Some(source_type) = patch.source_type {
        metadata.source_type = Some(source_type);
    }
    if !patch.custom_metadata.is_empty() {
        validation::check_custom_metadata(
            validator,
            "custom_metadata",
            &Value::Object(patch.custom_metadata.clone()),
        );
        let new: BTreeMap<String, String> = patch
            .custom_metadata
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();
        metadata.custom_metadata.extend(new);
    }
}

// ─── delete_document ─────────────────────────────────────────────────────────

/// Input for the `delete_document` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DeleteDocumentInput {
    /// UUID of the document
    pub document_id: String,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `delete_document` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct DeleteDocumentOutput {
    /// UUID of the deleted document
    pub document_id: Uuid,
    /// Whether the delete happened
    pub deleted: bool,
}

/// Executes the `delete_document` tool.
pub async fn execute_delete_document(
    dataset: &Arc<dyn Dataset>,
    input: DeleteDocumentInput,
) -> Result<DeleteDocumentOutput> {
    let id = parse_document_id(&input.document_id)?;
    dataset.delete_record(id).await?;
    Ok(DeleteDocumentOutput {
        document_id: id,
        deleted: true,
    })
}

// ─── list_documents ──────────────────────────────────────────────────────────

/// Input for the `list_documents` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ListDocumentsInput {
    /// Maximum documents to return (default: 50)
    #[serde(default = "default_list_limit")]
    pub limit: usize,
    /// SQL-like filter expression, e.g. `record_type = 'document'`
    pub filter: Option<String>,
    /// Include full content (default: false)
    #[serde(default)]
    pub include_content: bool,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// A listed document.
#[derive(Debug, Serialize, JsonSchema)]
pub struct ListedDocument {
    /// Document UUID
    pub uuid: Uuid,
    /// Title if set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Collection if set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Record type
    pub record_type: String,
    /// Content, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Output of the `list_documents` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct ListDocumentsOutput {
    /// Matching documents
    pub documents: Vec<ListedDocument>,
    /// Total matching rows (before the limit)
    pub total: u64,
    /// Whether more documents exist beyond the limit
    pub has_more: bool,
}

/// Executes the `list_documents` tool.
pub async fn execute_list_documents(
    dataset: &Arc<dyn Dataset>,
    input: ListDocumentsInput,
) -> Result<ListDocumentsOutput> {
    let total = dataset.count_rows(input.filter.as_deref()).await?;
    let batches = dataset
        .scan(ScanRequest {
            columns: Projection::ids_only(),
            filter: input.filter.clone(),
            limit: Some(input.limit),
            ..ScanRequest::default()
        })
        .await?;

    let mut documents = Vec::new();
    for batch in batches {
        for id in batch.ids {
            let Some(record) = dataset.get_by_uuid(id).await? else {
                continue;
            };
            documents.push(ListedDocument {
                uuid: record.uuid,
                title: record.metadata.title,
                collection: record.metadata.collection,
                record_type: record.record_type.to_string(),
                content: input.include_content.then_some(record.content),
            });
        }
    }

    let has_more = total > documents.len() as u64;
    Ok(ListDocumentsOutput {
        documents,
        total,
        has_more,
    })
}

// ─── search_documents ────────────────────────────────────────────────────────

/// Search mode for `search_documents`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// Similarity search over embeddings
    Vector,
    /// Full-text search over content
    #[default]
    Text,
    /// Weighted merge of vector and text scores
    Hybrid,
}

/// Input for the `search_documents` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SearchDocumentsInput {
    /// Search query
    pub query: String,
    /// Search mode: vector, text, or hybrid (default: text)
    #[serde(default)]
    pub search_type: SearchType,
    /// Maximum results (default: 10)
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    /// SQL-like filter expression applied before scoring
    pub filter: Option<String>,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// One search hit.
#[derive(Debug, Serialize, JsonSchema)]
pub struct SearchHit {
    /// Document UUID
    pub uuid: Uuid,
    /// Title if set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Relevance score, best first
    pub score: f64,
    /// Leading content snippet
    pub snippet: String,
}

/// Output of the `search_documents` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct SearchDocumentsOutput {
    /// Hits in relevance order
    pub documents: Vec<SearchHit>,
    /// Search mode that produced the hits
    pub search_type: SearchType,
    /// Whether more hits exist beyond the limit
    pub has_more: bool,
}

/// Executes the `search_documents` tool, recording the execution for
/// the query analyzer and index advisor.
pub async fn execute_search_documents(
    dataset: &Arc<dyn Dataset>,
    embedder: Option<&Arc<dyn EmbeddingProvider>>,
    queries: &QueryAnalyzer,
    advisor: &IndexAdvisor,
    input: SearchDocumentsInput,
) -> Result<SearchDocumentsOutput> {
    let started = Instant::now();
    // Overcollect by one to detect whether more hits exist
    let request_limit = input.limit + 1;

    let hits = match input.search_type {
        SearchType::Vector => {
            let vector = embed_query(embedder, &input.query).await?;
            dataset
                .knn_search(&vector, request_limit, input.filter.as_deref())
                .await?
        }
        SearchType::Text => {
            dataset
                .full_text_search(&input.query, request_limit, input.filter.as_deref())
                .await?
        }
        SearchType::Hybrid => {
            let vector = embed_query(embedder, &input.query).await?;
            let vector_hits = dataset
                .knn_search(&vector, request_limit, input.filter.as_deref())
                .await?;
            let text_hits = dataset
                .full_text_search(&input.query, request_limit, input.filter.as_deref())
                .await?;
            merge_hybrid(vector_hits, text_hits, request_limit)
        }
    };

    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    let rows_scanned = dataset.count_rows(input.filter.as_deref()).await?;
    let index_used = has_search_index(dataset, input.search_type).await?;

    queries.record(QueryExecution {
        query_type: match input.search_type {
            SearchType::Vector => QueryType::Vector,
            SearchType::Text => QueryType::Text,
            SearchType::Hybrid => QueryType::Hybrid,
        },
        query_text: Some(input.query.clone()),
        filter_expression: input.filter.clone(),
        duration_ms,
        rows_scanned,
        rows_returned: hits.len().min(input.limit) as u64,
        index_used,
        timestamp: Utc::now(),
    });
    if let Some(filter) = &input.filter {
        if let Some((field, _)) = filter.split_once('=') {
            advisor.record_query_pattern(&[field.trim().to_string()]);
        }
    }

    let has_more = hits.len() > input.limit;
    let documents = hits
        .into_iter()
        .take(input.limit)
        .map(|hit| SearchHit {
            uuid: hit.record.uuid,
            title: hit.record.metadata.title.clone(),
            score: (hit.score * 1000.0).round() / 1000.0,
            snippet: snippet(&hit.record.content),
        })
        .collect();

    Ok(SearchDocumentsOutput {
        documents,
        search_type: input.search_type,
        has_more,
    })
}

async fn embed_query(
    embedder: Option<&Arc<dyn EmbeddingProvider>>,
    query: &str,
) -> Result<Vec<f32>> {
    let Some(embedder) = embedder else {
        return Err(ServerError::Tool(
            "Vector search requires an embedding provider. Configure one (e.g. OPENAI_API_KEY) \
             or use search_type 'text'."
                .to_string(),
        ));
    };
    let texts = [query.to_string()];
    let result = embedder.embed(&texts).await?;
    result
        .vectors
        .into_iter()
        .next()
        .ok_or_else(|| ServerError::Tool("Embedding provider returned no vector".to_string()))
}

/// Weighted merge of vector and text hits by document id.
fn merge_hybrid(
    vector_hits: Vec<crate::dataset::ScoredRecord>,
    text_hits: Vec<crate::dataset::ScoredRecord>,
    limit: usize,
) -> Vec<crate::dataset::ScoredRecord> {
    let mut merged: ahash::AHashMap<Uuid, crate::dataset::ScoredRecord> = ahash::AHashMap::new();
    for mut hit in vector_hits {
        hit.score *= HYBRID_VECTOR_WEIGHT;
        merged.insert(hit.record.uuid, hit);
    }
    for hit in text_hits {
        let weighted = hit.score * (1.0 - HYBRID_VECTOR_WEIGHT);
        merged
            .entry(hit.record.uuid)
            .and_modify(|existing| existing.score += weighted)
            .or_insert_with(|| crate::dataset::ScoredRecord {
                record: hit.record,
                score: weighted,
            });
    }
    let mut hits: Vec<_> = merged.into_values().collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);
    hits
}

async fn has_search_index(dataset: &Arc<dyn Dataset>, search_type: SearchType) -> Result<bool> {
    let indices = dataset.list_indices().await?;
    Ok(match search_type {
        SearchType::Vector => indices.iter().any(|i| i.index_type == IndexType::Vector),
        SearchType::Text => indices.iter().any(|i| i.index_type == IndexType::Fts),
        SearchType::Hybrid => indices.iter().any(|i| {
            i.index_type == IndexType::Vector || i.index_type == IndexType::Fts
        }),
    })
}

fn snippet(content: &str) -> String {
    const SNIPPET_LEN: usize = 200;
    if content.len() <= SNIPPET_LEN {
        return content.to_string();
    }
    let mut end = SNIPPET_LEN;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &content[..end])
}

fn parse_document_id(raw: &str) -> Result<Uuid> {
    let mut validator = Validator::new();
    validation::check_uuid(&mut validator, "document_id", raw);
    validator.finish()?;
    Ok(raw.parse().unwrap_or(Uuid::nil()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MemoryDataset;
    use serde_json::json;

    fn dataset() -> Arc<dyn Dataset> {
        Arc::new(MemoryDataset::new())
    }

    #[tokio::test]
    async fn test_add_then_get_roundtrip() {
        let ds = dataset();
        let input: AddDocumentInput = serde_json::from_value(json!({
            "content": "hello world",
            "metadata": {
                "title": "Hello",
                "tags": ["a", "b"],
                "custom_metadata": {"priority": "1"},
            },
        }))
        .unwrap();
        let output = execute_add_document(&ds, None, input).await.unwrap();

        let fetched = execute_get_document(
            &ds,
            GetDocumentInput {
                document_id: output.document_id.to_string(),
                include_content: true,
                include_embedding: false,
                agent_id: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(fetched.document.content, "hello world");
        assert_eq!(fetched.document.metadata.title.as_deref(), Some("Hello"));
        assert_eq!(fetched.document.metadata.custom_metadata["priority"], "1");
    }

    #[tokio::test]
    async fn test_add_rejects_non_string_custom_metadata() {
        let ds = dataset();
        let input: AddDocumentInput = serde_json::from_value(json!({
            "content": "x",
            "metadata": {"custom_metadata": {"priority": 1}},
        }))
        .unwrap();
        let err = execute_add_document(&ds, None, input).await.unwrap_err();
        let ServerError::Validation(report) = &err else {
            panic!("expected validation error, got {err}");
        };
        assert_eq!(report.diagnostics()[0].field, "custom_metadata.priority");
        assert!(report.diagnostics()[0].hint.contains("string"));
    }

    #[tokio::test]
    async fn test_add_rejects_bad_status_and_relationship_together() {
        let ds = dataset();
        let input: AddDocumentInput = serde_json::from_value(json!({
            "content": "x",
            "metadata": {"status": "live"},
            "relationships": [{"type": "related", "title": "no target"}],
        }))
        .unwrap();
        let err = execute_add_document(&ds, None, input).await.unwrap_err();
        let ServerError::Validation(report) = &err else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = report
            .diagnostics()
            .iter()
            .map(|d| d.field.as_str())
            .collect();
        assert_eq!(fields, vec!["status", "relationships[0]"]);
    }

    #[tokio::test]
    async fn test_update_touches_only_given_paths() {
        let ds = dataset();
        let added = execute_add_document(
            &ds,
            None,
            serde_json::from_value(json!({
                "content": "original",
                "metadata": {
                    "title": "Original",
                    "author": "ada",
                    "custom_metadata": {"keep": "yes"},
                },
            }))
            .unwrap(),
        )
        .await
        .unwrap();

        execute_update_document(
            &ds,
            serde_json::from_value(json!({
                "document_id": added.document_id.to_string(),
                "metadata": {
                    "title": "Updated",
                    "custom_metadata": {"extra": "new"},
                },
            }))
            .unwrap(),
        )
        .await
        .unwrap();

        let fetched = ds.get_by_uuid(added.document_id).await.unwrap().unwrap();
        assert_eq!(fetched.metadata.title.as_deref(), Some("Updated"));
        // Untouched paths keep their values
        assert_eq!(fetched.metadata.author.as_deref(), Some("ada"));
        assert_eq!(fetched.content, "original");
        // Custom metadata deep-merges
        assert_eq!(fetched.metadata.custom_metadata["keep"], "yes");
        assert_eq!(fetched.metadata.custom_metadata["extra"], "new");
        assert!(fetched.metadata.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_get_malformed_uuid_diagnostic() {
        let ds = dataset();
        let err = execute_get_document(
            &ds,
            GetDocumentInput {
                document_id: "not-a-uuid".into(),
                include_content: true,
                include_embedding: false,
                agent_id: None,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("xxxxxxxx-xxxx"));
    }

    #[tokio::test]
    async fn test_delete_missing_document() {
        let ds = dataset();
        let err = execute_delete_document(
            &ds,
            DeleteDocumentInput {
                document_id: Uuid::new_v4().to_string(),
                agent_id: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServerError::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn test_text_search_and_query_recording() {
        let ds = dataset();
        for (content, title) in [
            ("rust ownership and borrowing", "Rust"),
            ("python garbage collection", "Python"),
        ] {
            execute_add_document(
                &ds,
                None,
                serde_json::from_value(json!({
                    "content": content,
                    "metadata": {"title": title},
                }))
                .unwrap(),
            )
            .await
            .unwrap();
        }

        let queries = QueryAnalyzer::default();
        let advisor = IndexAdvisor::new(Arc::clone(&ds));
        let output = execute_search_documents(
            &ds,
            None,
            &queries,
            &advisor,
            serde_json::from_value(json!({"query": "rust ownership", "limit": 5})).unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(output.documents.len(), 1);
        assert_eq!(output.documents[0].title.as_deref(), Some("Rust"));
        assert!(!output.has_more);
        assert_eq!(queries.len(), 1);
    }

    #[tokio::test]
    async fn test_vector_search_without_embedder_is_actionable() {
        let ds = dataset();
        let queries = QueryAnalyzer::default();
        let advisor = IndexAdvisor::new(Arc::clone(&ds));
        let err = execute_search_documents(
            &ds,
            None,
            &queries,
            &advisor,
            serde_json::from_value(json!({"query": "q", "search_type": "vector"})).unwrap(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("text"));
    }

    #[tokio::test]
    async fn test_list_documents_with_filter() {
        let ds = dataset();
        for i in 0..3 {
            execute_add_document(
                &ds,
                None,
                serde_json::from_value(json!({
                    "content": format!("doc {i}"),
                    "metadata": {"collection": if i == 0 { "a" } else { "b" }},
                }))
                .unwrap(),
            )
            .await
            .unwrap();
        }
        let output = execute_list_documents(
            &ds,
            serde_json::from_value(json!({"filter": "collection = 'b'", "limit": 1})).unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(output.documents.len(), 1);
        assert_eq!(output.total, 2);
        assert!(output.has_more);
    }
}

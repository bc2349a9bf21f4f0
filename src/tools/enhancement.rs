//! LLM enhancement tools.
//!
//! Shared shape: look up the document (missing id is the caller's
//! error), run the field-specific LLM call, validate, merge, bump
//! `updated_at`, write back. A failed LLM call reports the failure and
//! leaves the record unchanged.

use crate::dataset::{Dataset, Projection, ScanRequest};
use crate::enhance::{apply_enhancement, EnhanceField, Enhancer, EnhancementResult};
use crate::error::{Result, ServerError};
use crate::types::FrameRecord;
use crate::validation::{self, Validator};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

const fn default_max_tags() -> usize {
    5
}

fn default_tag_types() -> String {
    "topics, technologies, concepts".to_string()
}

fn default_title_style() -> String {
    "descriptive".to_string()
}

fn default_purpose_fields() -> Vec<EnhanceField> {
    vec![
        EnhanceField::Context,
        EnhanceField::Tags,
        EnhanceField::CustomMetadata,
    ]
}

async fn fetch_document(dataset: &Arc<dyn Dataset>, raw_id: &str) -> Result<FrameRecord> {
    let mut validator = Validator::new();
    validation::check_uuid(&mut validator, "document_id", raw_id);
    validator.finish()?;
    let id: Uuid = raw_id.parse().unwrap_or(Uuid::nil());
    dataset
        .get_by_uuid(id)
        .await?
        .ok_or(ServerError::DocumentNotFound(id))
}

// ─── enhance_context ─────────────────────────────────────────────────────────

/// Input for the `enhance_context` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EnhanceContextInput {
    /// UUID of the document to enhance
    pub document_id: String,
    /// What the context should focus on
    pub purpose: String,
    /// Existing context to refine, if any
    pub current_context: Option<String>,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `enhance_context` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct EnhanceContextOutput {
    /// UUID of the enhanced document
    pub document_id: Uuid,
    /// The new context description
    pub context: String,
}

/// Executes the `enhance_context` tool.
pub async fn execute_enhance_context(
    dataset: &Arc<dyn Dataset>,
    enhancer: &Enhancer,
    input: EnhanceContextInput,
) -> Result<EnhanceContextOutput> {
    let mut record = fetch_document(dataset, &input.document_id).await?;
    let current = input
        .current_context
        .or_else(|| record.metadata.context.clone());
    let context = enhancer
        .enhance_context(&record.content, Some(&input.purpose), current.as_deref())
        .await?;

    apply_enhancement(&mut record, EnhanceField::Context, &json!(context));
    let document_id = record.uuid;
    dataset.update_record(record).await?;

    Ok(EnhanceContextOutput {
        document_id,
        context,
    })
}

// ─── extract_metadata ────────────────────────────────────────────────────────

/// Input for the `extract_metadata` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExtractMetadataInput {
    /// UUID of the document
    pub document_id: String,
    /// What metadata to extract, as a prompt
    pub schema: String,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `extract_metadata` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct ExtractMetadataOutput {
    /// UUID of the enhanced document
    pub document_id: Uuid,
    /// The extracted metadata (merged into custom_metadata)
    pub metadata: std::collections::BTreeMap<String, String>,
}

/// Executes the `extract_metadata` tool.
pub async fn execute_extract_metadata(
    dataset: &Arc<dyn Dataset>,
    enhancer: &Enhancer,
    input: ExtractMetadataInput,
) -> Result<ExtractMetadataOutput> {
    let mut record = fetch_document(dataset, &input.document_id).await?;
    let metadata = enhancer
        .extract_custom_metadata(&record.content, &input.schema)
        .await?;

    apply_enhancement(&mut record, EnhanceField::CustomMetadata, &json!(metadata));
    let document_id = record.uuid;
    dataset.update_record(record).await?;

    Ok(ExtractMetadataOutput {
        document_id,
        metadata,
    })
}

// ─── generate_tags ───────────────────────────────────────────────────────────

/// Input for the `generate_tags` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GenerateTagsInput {
    /// UUID of the document
    pub document_id: String,
    /// Kinds of tags to generate (default: topics, technologies, concepts)
    #[serde(default = "default_tag_types")]
    pub tag_types: String,
    /// Maximum number of tags (default: 5)
    #[serde(default = "default_max_tags")]
    pub max_tags: usize,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `generate_tags` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct GenerateTagsOutput {
    /// UUID of the enhanced document
    pub document_id: Uuid,
    /// The document's tags after the merge
    pub tags: Vec<String>,
}

/// Executes the `generate_tags` tool.
pub async fn execute_generate_tags(
    dataset: &Arc<dyn Dataset>,
    enhancer: &Enhancer,
    input: GenerateTagsInput,
) -> Result<GenerateTagsOutput> {
    let mut record = fetch_document(dataset, &input.document_id).await?;
    let tags = enhancer
        .generate_tags(&record.content, &input.tag_types, input.max_tags)
        .await?;

    apply_enhancement(&mut record, EnhanceField::Tags, &json!(tags));
    let document_id = record.uuid;
    let merged = record.metadata.tags.clone();
    dataset.update_record(record).await?;

    Ok(GenerateTagsOutput {
        document_id,
        tags: merged,
    })
}

// ─── improve_title ───────────────────────────────────────────────────────────

/// Input for the `improve_title` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ImproveTitleInput {
    /// UUID of the document
    pub document_id: String,
    /// Title style: descriptive, technical, or concise (default: descriptive)
    #[serde(default = "default_title_style")]
    pub style: String,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `improve_title` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct ImproveTitleOutput {
    /// UUID of the enhanced document
    pub document_id: Uuid,
    /// The new title
    pub title: String,
}

/// Executes the `improve_title` tool.
pub async fn execute_improve_title(
    dataset: &Arc<dyn Dataset>,
    enhancer: &Enhancer,
    input: ImproveTitleInput,
) -> Result<ImproveTitleOutput> {
    let mut record = fetch_document(dataset, &input.document_id).await?;
    let title = enhancer
        .improve_title(
            &record.content,
            record.metadata.title.as_deref(),
            &input.style,
        )
        .await?;

    apply_enhancement(&mut record, EnhanceField::Title, &json!(title));
    let document_id = record.uuid;
    dataset.update_record(record).await?;

    Ok(ImproveTitleOutput { document_id, title })
}

// ─── enhance_for_purpose ─────────────────────────────────────────────────────

/// Input for the `enhance_for_purpose` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EnhanceForPurposeInput {
    /// UUID of the document
    pub document_id: String,
    /// Purpose or use case driving the enhancement
    pub purpose: String,
    /// Fields to enhance (default: context, tags, custom_metadata)
    #[serde(default = "default_purpose_fields")]
    pub fields: Vec<EnhanceField>,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `enhance_for_purpose` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct EnhanceForPurposeOutput {
    /// UUID of the enhanced document
    pub document_id: Uuid,
    /// Per-field outcomes
    pub enhancements: Vec<EnhancementResult>,
}

/// Executes the `enhance_for_purpose` tool. Successful fields are
/// merged; failed fields are reported and skipped.
pub async fn execute_enhance_for_purpose(
    dataset: &Arc<dyn Dataset>,
    enhancer: &Enhancer,
    input: EnhanceForPurposeInput,
) -> Result<EnhanceForPurposeOutput> {
    let mut record = fetch_document(dataset, &input.document_id).await?;
    let results = enhancer
        .enhance_for_purpose(&record.content, &input.purpose, &input.fields)
        .await;

    let mut any_applied = false;
    for (field, result) in input.fields.iter().zip(results.iter()) {
        if let (true, Some(value)) = (result.success, result.value.as_ref()) {
            apply_enhancement(&mut record, *field, value);
            any_applied = true;
        }
    }

    let document_id = record.uuid;
    if any_applied {
        dataset.update_record(record).await?;
    }

    Ok(EnhanceForPurposeOutput {
        document_id,
        enhancements: results,
    })
}

// ─── batch_enhance ───────────────────────────────────────────────────────────

/// Input for the `batch_enhance` tool. Documents are selected either by
/// explicit ids or by a filter expression.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BatchEnhanceInput {
    /// Explicit document UUIDs to enhance
    pub document_ids: Option<Vec<String>>,
    /// SQL-like filter selecting documents when no ids are given
    pub filter: Option<String>,
    /// Field to enhance across the selection
    pub field: EnhanceField,
    /// Purpose guiding the enhancement
    pub purpose: Option<String>,
    /// Maximum documents to process (default: 50)
    #[serde(default = "default_batch_limit")]
    pub limit: usize,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

const fn default_batch_limit() -> usize {
    50
}

/// Per-document outcome of a batch enhancement.
#[derive(Debug, Serialize, JsonSchema)]
pub struct BatchEnhanceEntry {
    /// Document UUID
    pub document_id: Uuid,
    /// Enhanced field
    pub field: String,
    /// New value on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Whether this document succeeded
    pub success: bool,
    /// Error message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Output of the `batch_enhance` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct BatchEnhanceOutput {
    /// Per-document outcomes, in selection order
    pub results: Vec<BatchEnhanceEntry>,
    /// Number of successful enhancements
    pub succeeded: usize,
    /// Number of failed enhancements
    pub failed: usize,
}

/// Executes the `batch_enhance` tool. Per-record failures are logged
/// and the remaining records continue.
pub async fn execute_batch_enhance(
    dataset: &Arc<dyn Dataset>,
    enhancer: &Enhancer,
    input: BatchEnhanceInput,
) -> Result<BatchEnhanceOutput> {
    let ids = select_ids(dataset, &input).await?;
    let purpose = input.purpose.as_deref().unwrap_or("general enrichment");

    let mut results = Vec::with_capacity(ids.len());
    for id in ids {
        let entry = enhance_one(dataset, enhancer, id, input.field, purpose).await;
        match entry {
            Ok(value) => results.push(BatchEnhanceEntry {
                document_id: id,
                field: input.field.to_string(),
                value: Some(value),
                success: true,
                error: None,
            }),
            Err(error) => {
                tracing::warn!("batch_enhance failed for {}: {}", id, error);
                results.push(BatchEnhanceEntry {
                    document_id: id,
                    field: input.field.to_string(),
                    value: None,
                    success: false,
                    error: Some(error.to_string()),
                });
            }
        }
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    let failed = results.len() - succeeded;
    Ok(BatchEnhanceOutput {
        results,
        succeeded,
        failed,
    })
}

async fn select_ids(dataset: &Arc<dyn Dataset>, input: &BatchEnhanceInput) -> Result<Vec<Uuid>> {
    if let Some(raw_ids) = &input.document_ids {
        let mut validator = Validator::new();
        for (i, raw) in raw_ids.iter().enumerate() {
            validation::check_uuid(&mut validator, &format!("document_ids[{i}]"), raw);
        }
        validator.finish()?;
        return Ok(raw_ids
            .iter()
            .filter_map(|raw| raw.parse().ok())
            .take(input.limit)
            .collect());
    }

    let batches = dataset
        .scan(ScanRequest {
            columns: Projection::ids_only(),
            filter: input.filter.clone(),
            limit: Some(input.limit),
            ..ScanRequest::default()
        })
        .await?;
    Ok(batches.into_iter().flat_map(|b| b.ids).collect())
}

async fn enhance_one(
    dataset: &Arc<dyn Dataset>,
    enhancer: &Enhancer,
    id: Uuid,
    field: EnhanceField,
    purpose: &str,
) -> Result<Value> {
    let mut record = dataset
        .get_by_uuid(id)
        .await?
        .ok_or(ServerError::DocumentNotFound(id))?;

    let value = match field {
        EnhanceField::Context => {
            json!(enhancer
                .enhance_context(&record.content, Some(purpose), record.metadata.context.as_deref())
                .await?)
        }
        EnhanceField::Tags => json!(enhancer.generate_tags(&record.content, purpose, 5).await?),
        EnhanceField::Title => json!(
            enhancer
                .improve_title(&record.content, record.metadata.title.as_deref(), "descriptive")
                .await?
        ),
        EnhanceField::Status => json!(enhancer.classify_status(&record.content).await?.to_string()),
        EnhanceField::CustomMetadata => json!(
            enhancer
                .extract_custom_metadata(&record.content, purpose)
                .await?
        ),
    };

    apply_enhancement(&mut record, field, &value);
    dataset.update_record(record).await?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MemoryDataset;
    use crate::enhance::testing::ScriptedClient;
    use crate::error::EnhanceError;

    async fn setup(responses: Vec<Result<Value>>) -> (Arc<dyn Dataset>, Enhancer, Uuid) {
        let ds: Arc<dyn Dataset> = Arc::new(MemoryDataset::new());
        let record = FrameRecord::new("A document about distributed tracing.");
        let id = record.uuid;
        ds.add(record).await.unwrap();
        (ds, Enhancer::new(ScriptedClient::new(responses)), id)
    }

    #[tokio::test]
    async fn test_enhance_context_writes_back() {
        let (ds, enhancer, id) = setup(vec![Ok(json!({"context": "Tracing primer."}))]).await;
        let output = execute_enhance_context(
            &ds,
            &enhancer,
            EnhanceContextInput {
                document_id: id.to_string(),
                purpose: "observability docs".into(),
                current_context: None,
                agent_id: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(output.context, "Tracing primer.");

        let stored = ds.get_by_uuid(id).await.unwrap().unwrap();
        assert_eq!(stored.metadata.context.as_deref(), Some("Tracing primer."));
        assert!(stored.metadata.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_missing_document_is_invalid_params() {
        let (ds, enhancer, _) = setup(vec![]).await;
        let err = execute_enhance_context(
            &ds,
            &enhancer,
            EnhanceContextInput {
                document_id: Uuid::new_v4().to_string(),
                purpose: "p".into(),
                current_context: None,
                agent_id: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServerError::DocumentNotFound(_)));
        assert!(err.is_client_fixable());
    }

    #[tokio::test]
    async fn test_llm_failure_leaves_record_untouched() {
        let (ds, enhancer, id) = setup(vec![Err(ServerError::Enhance(
            EnhanceError::Provider("rate limited".into()),
        ))])
        .await;
        let before = ds.get_by_uuid(id).await.unwrap().unwrap();
        let err = execute_generate_tags(
            &ds,
            &enhancer,
            GenerateTagsInput {
                document_id: id.to_string(),
                tag_types: default_tag_types(),
                max_tags: 5,
                agent_id: None,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("rate limited"));

        let after = ds.get_by_uuid(id).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_generate_tags_merges_with_existing() {
        let ds: Arc<dyn Dataset> = Arc::new(MemoryDataset::new());
        let mut record = FrameRecord::new("content");
        record.metadata.tags = vec!["existing".into()];
        let id = record.uuid;
        ds.add(record).await.unwrap();

        let enhancer = Enhancer::new(ScriptedClient::new(vec![Ok(
            json!({"tags": ["new", "existing"]}),
        )]));
        let output = execute_generate_tags(
            &ds,
            &enhancer,
            GenerateTagsInput {
                document_id: id.to_string(),
                tag_types: default_tag_types(),
                max_tags: 5,
                agent_id: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(output.tags, vec!["existing", "new"]);
    }

    #[tokio::test]
    async fn test_batch_enhance_continues_past_failures() {
        let ds: Arc<dyn Dataset> = Arc::new(MemoryDataset::new());
        let mut ids = Vec::new();
        for i in 0..3 {
            let record = FrameRecord::new(format!("doc {i}"));
            ids.push(record.uuid);
            ds.add(record).await.unwrap();
        }

        let enhancer = Enhancer::new(ScriptedClient::new(vec![
            Ok(json!({"title": "First"})),
            Err(ServerError::Enhance(EnhanceError::Provider("boom".into()))),
            Ok(json!({"title": "Third"})),
        ]));

        let output = execute_batch_enhance(
            &ds,
            &enhancer,
            BatchEnhanceInput {
                document_ids: Some(ids.iter().map(Uuid::to_string).collect()),
                filter: None,
                field: EnhanceField::Title,
                purpose: None,
                limit: 50,
                agent_id: None,
            },
        )
        .await
        .unwrap();

        assert_eq!(output.succeeded, 2);
        assert_eq!(output.failed, 1);
        assert!(!output.results[1].success);
        assert_eq!(output.results[2].value, Some(json!("Third")));

        // The failed record kept its original title
        let second = ds.get_by_uuid(ids[1]).await.unwrap().unwrap();
        assert!(second.metadata.title.is_none());
        let third = ds.get_by_uuid(ids[2]).await.unwrap().unwrap();
        assert_eq!(third.metadata.title.as_deref(), Some("Third"));
    }

    #[tokio::test]
    async fn test_enhance_for_purpose_partial_application() {
        let (ds, enhancer, id) = setup(vec![
            Ok(json!({"context": "ctx"})),
            Err(ServerError::Enhance(EnhanceError::Provider("down".into()))),
        ])
        .await;

        let output = execute_enhance_for_purpose(
            &ds,
            &enhancer,
            EnhanceForPurposeInput {
                document_id: id.to_string(),
                purpose: "search".into(),
                fields: vec![EnhanceField::Context, EnhanceField::Tags],
                agent_id: None,
            },
        )
        .await
        .unwrap();

        assert!(output.enhancements[0].success);
        assert!(!output.enhancements[1].success);
        let stored = ds.get_by_uuid(id).await.unwrap().unwrap();
        assert_eq!(stored.metadata.context.as_deref(), Some("ctx"));
        assert!(stored.metadata.tags.is_empty());
    }
}

//! LLM-powered document enhancement.
//!
//! One prompt and one response schema per enhanceable field. Responses
//! are validated against the field's constraints before anything is
//! merged into a record; a failed call reports the failure and leaves
//! the record untouched. Merge rules: tags de-duplicate while keeping
//! order, custom metadata deep-merges with values stringified.

#[doc(hidden)]
pub mod testing;

use crate::error::{EnhanceError, Result, ServerError};
use crate::llm::{LlmClient, StructuredResponse, TokenUsage};
use crate::types::{DocumentStatus, FrameRecord};
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Fields the enhancer can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EnhanceField {
    Context,
    Tags,
    Title,
    Status,
    CustomMetadata,
}

impl fmt::Display for EnhanceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context => write!(f, "context"),
            Self::Tags => write!(f, "tags"),
            Self::Title => write!(f, "title"),
            Self::Status => write!(f, "status"),
            Self::CustomMetadata => write!(f, "custom_metadata"),
        }
    }
}

/// Outcome of one field enhancement.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct EnhancementResult {
    /// Field that was enhanced
    pub field: String,
    /// New value when the enhancement succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Whether the enhancement succeeded
    pub success: bool,
    /// Error message when it did not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EnhancementResult {
    fn ok(field: EnhanceField, value: Value) -> Self {
        Self {
            field: field.to_string(),
            value: Some(value),
            success: true,
            error: None,
        }
    }

    fn failed(field: EnhanceField, error: &ServerError) -> Self {
        Self {
            field: field.to_string(),
            value: None,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

const SYSTEM_PROMPT: &str =
    "You are a careful assistant that enriches documents in a content-addressed \
     document store. Answer with JSON matching the requested schema exactly.";

/// Runs field-specific enhancement calls against the LLM client.
pub struct Enhancer {
    client: Arc<dyn LlmClient>,
    last_usage: std::sync::Mutex<TokenUsage>,
}

impl Enhancer {
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            client,
            last_usage: std::sync::Mutex::new(TokenUsage::default()),
        }
    }

    /// Provider/model pair for cost attribution.
    #[must_use]
    pub fn provider_model(&self) -> (String, String) {
        (
            self.client.provider().to_string(),
            self.client.model().to_string(),
        )
    }

    /// Token usage of the most recent call.
    #[must_use]
    pub fn last_usage(&self) -> TokenUsage {
        *self
            .last_usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    async fn call(&self, user: &str, schema: Value) -> Result<StructuredResponse> {
        let response = self
            .client
            .complete_structured(SYSTEM_PROMPT, user, &schema)
            .await?;
        *self
            .last_usage
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = response.usage;
        Ok(response)
    }

    /// Writes a 2-3 sentence context description.
    pub async fn enhance_context(
        &self,
        content: &str,
        purpose: Option<&str>,
        current_context: Option<&str>,
    ) -> Result<String> {
        let focus = match purpose {
            Some(purpose) => format!("Focus on: {purpose}"),
            None => "Explain what this document is about and why it matters.".to_string(),
        };
        let current = current_context
            .map(|c| format!("Current context: {c}\n"))
            .unwrap_or_default();
        let prompt = format!(
            "Analyze this document and write a brief context description (2-3 sentences).\n\
             {focus}\n{current}\nDocument content:\n{content}"
        );
        let schema = json!({
            "type": "object",
            "properties": {"context": {"type": "string"}},
            "required": ["context"],
            "additionalProperties": false,
        });
        let response = self.call(&prompt, schema).await?;
        field_string(&response.content, "context", EnhanceField::Context)
    }

    /// Extracts up to `max_tags` tags.
    pub async fn generate_tags(
        &self,
        content: &str,
        tag_types: &str,
        max_tags: usize,
    ) -> Result<Vec<String>> {
        let prompt = format!(
            "Extract up to {max_tags} relevant tags from this document.\n\
             Focus on: {tag_types}\n\nDocument content:\n{content}"
        );
        let schema = json!({
            "type": "object",
            "properties": {
                "tags": {"type": "array", "items": {"type": "string"}},
            },
            "required": ["tags"],
            "additionalProperties": false,
        });
        let response = self.call(&prompt, schema).await?;
        let tags = response.content["tags"]
            .as_array()
            .ok_or_else(|| bad_response(EnhanceField::Tags, "missing tags array"))?
            .iter()
            .filter_map(|t| t.as_str().map(str::to_string))
            .take(max_tags)
            .collect();
        Ok(tags)
    }

    /// Generates or improves the title in the requested style.
    pub async fn improve_title(
        &self,
        content: &str,
        current_title: Option<&str>,
        style: &str,
    ) -> Result<String> {
        let current = current_title
            .map(|t| format!("Current title: {t}\n"))
            .unwrap_or_default();
        let prompt = format!(
            "Write a {style} title for this document.\n{current}\nDocument content:\n{content}"
        );
        let schema = json!({
            "type": "object",
            "properties": {"title": {"type": "string"}},
            "required": ["title"],
            "additionalProperties": false,
        });
        let response = self.call(&prompt, schema).await?;
        field_string(&response.content, "title", EnhanceField::Title)
    }

    /// Classifies the document into the closed status set.
    pub async fn classify_status(&self, content: &str) -> Result<DocumentStatus> {
        let prompt = format!(
            "Classify the lifecycle status of this document as one of: draft, review, \
             published, archived.\n\nDocument content:\n{content}"
        );
        let schema = json!({
            "type": "object",
            "properties": {
                "status": {"type": "string", "enum": ["draft", "review", "published", "archived"]},
            },
            "required": ["status"],
            "additionalProperties": false,
        });
        let response = self.call(&prompt, schema).await?;
        let raw = field_string(&response.content, "status", EnhanceField::Status)?;
        raw.parse().map_err(|e: String| {
            ServerError::Enhance(EnhanceError::BadResponse {
                field: EnhanceField::Status.to_string(),
                reason: e,
            })
        })
    }

    /// Extracts custom metadata per a caller-provided schema prompt.
    /// Values are stringified to satisfy the metadata contract.
    pub async fn extract_custom_metadata(
        &self,
        content: &str,
        schema_prompt: &str,
    ) -> Result<BTreeMap<String, String>> {
        let prompt = format!(
            "Extract the following metadata from the document:\n{schema_prompt}\n\n\
             Document content:\n{content}"
        );
        let schema = json!({
            "type": "object",
            "properties": {
                "metadata": {"type": "object", "additionalProperties": {"type": "string"}},
            },
            "required": ["metadata"],
            "additionalProperties": false,
        });
        let response = self.call(&prompt, schema).await?;
        let map = response.content["metadata"].as_object().ok_or_else(|| {
            bad_response(EnhanceField::CustomMetadata, "missing metadata object")
        })?;
        Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), stringify(v)))
            .collect())
    }

    /// Enhances several fields toward a purpose, one call per field.
    /// Per-field failures are reported and the remaining fields continue.
    pub async fn enhance_for_purpose(
        &self,
        content: &str,
        purpose: &str,
        fields: &[EnhanceField],
    ) -> Vec<EnhancementResult> {
        let mut results = Vec::with_capacity(fields.len());
        for field in fields {
            let outcome = match field {
                EnhanceField::Context => self
                    .enhance_context(content, Some(purpose), None)
                    .await
                    .map(Value::from),
                EnhanceField::Tags => self
                    .generate_tags(content, purpose, 5)
                    .await
                    .map(|tags| json!(tags)),
                EnhanceField::Title => self
                    .improve_title(content, None, "descriptive")
                    .await
                    .map(Value::from),
                EnhanceField::Status => self
                    .classify_status(content)
                    .await
                    .map(|status| Value::from(status.to_string())),
                EnhanceField::CustomMetadata => self
                    .extract_custom_metadata(
                        content,
                        &format!("metadata useful for: {purpose}"),
                    )
                    .await
                    .map(|map| json!(map)),
            };
            results.push(match outcome {
                Ok(value) => EnhancementResult::ok(*field, value),
                Err(error) => EnhancementResult::failed(*field, &error),
            });
        }
        results
    }
}

/// Merges new tags into existing ones, de-duplicating while preserving
/// first-seen order.
#[must_use]
pub fn merge_tags(existing: &[String], new: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(existing.len() + new.len());
    for tag in existing.iter().chain(new.iter()) {
        if !merged.contains(tag) {
            merged.push(tag.clone());
        }
    }
    merged
}

/// Deep-merges custom metadata: new keys win, values already strings.
pub fn merge_custom_metadata(
    existing: &mut BTreeMap<String, String>,
    new: BTreeMap<String, String>,
) {
    existing.extend(new);
}

/// Applies one enhancement value to a record and bumps `updated_at`.
pub fn apply_enhancement(record: &mut FrameRecord, field: EnhanceField, value: &Value) {
    match field {
        EnhanceField::Context => {
            record.metadata.context = value.as_str().map(str::to_string);
        }
        EnhanceField::Title => {
            record.metadata.title = value.as_str().map(str::to_string);
        }
        EnhanceField::Status => {
            record.metadata.status = value.as_str().and_then(|s| s.parse().ok());
        }
        EnhanceField::Tags => {
            let new: Vec<String> = value
                .as_array()
                .map(|tags| {
                    tags.iter()
                        .filter_map(|t| t.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            record.metadata.tags = merge_tags(&record.metadata.tags, &new);
        }
        EnhanceField::CustomMetadata => {
            if let Some(map) = value.as_object() {
                let new = map
                    .iter()
                    .map(|(k, v)| (k.clone(), stringify(v)))
                    .collect();
                merge_custom_metadata(&mut record.metadata.custom_metadata, new);
            }
        }
    }
    record.touch();
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn field_string(content: &Value, key: &str, field: EnhanceField) -> Result<String> {
    content[key]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| bad_response(field, &format!("missing {key} string")))
}

fn bad_response(field: EnhanceField, reason: &str) -> ServerError {
    ServerError::Enhance(EnhanceError::BadResponse {
        field: field.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedClient;
    use super::*;

    #[tokio::test]
    async fn test_enhance_context() {
        let client = ScriptedClient::new(vec![Ok(json!({"context": "About Rust."}))]);
        let enhancer = Enhancer::new(client);
        let context = enhancer
            .enhance_context("Rust is fast", Some("language docs"), None)
            .await
            .unwrap();
        assert_eq!(context, "About Rust.");
        assert_eq!(enhancer.last_usage().input_tokens, 100);
    }

    #[tokio::test]
    async fn test_tags_capped_at_max() {
        let client =
            ScriptedClient::new(vec![Ok(json!({"tags": ["a", "b", "c", "d", "e", "f"]}))]);
        let enhancer = Enhancer::new(client);
        let tags = enhancer.generate_tags("text", "topics", 3).await.unwrap();
        assert_eq!(tags, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_status_outside_enum_rejected() {
        let client = ScriptedClient::new(vec![Ok(json!({"status": "live"}))]);
        let enhancer = Enhancer::new(client);
        let err = enhancer.classify_status("text").await.unwrap_err();
        assert!(err.to_string().contains("Invalid status"));
    }

    #[tokio::test]
    async fn test_custom_metadata_values_stringified() {
        let client = ScriptedClient::new(vec![Ok(json!({"metadata": {"priority": 3}}))]);
        let enhancer = Enhancer::new(client);
        let metadata = enhancer
            .extract_custom_metadata("text", "priority")
            .await
            .unwrap();
        assert_eq!(metadata["priority"], "3");
    }

    #[tokio::test]
    async fn test_enhance_for_purpose_continues_past_failures() {
        let client = ScriptedClient::new(vec![
            Ok(json!({"context": "ctx"})),
            Err(ServerError::Enhance(EnhanceError::Provider("503".into()))),
        ]);
        let enhancer = Enhancer::new(client);
        let results = enhancer
            .enhance_for_purpose("text", "search", &[EnhanceField::Context, EnhanceField::Tags])
            .await;
        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(results[1].error.as_ref().unwrap().contains("503"));
    }

    #[test]
    fn test_merge_tags_dedups_preserving_order() {
        let merged = merge_tags(
            &["rust".into(), "mcp".into()],
            &["search".into(), "rust".into()],
        );
        assert_eq!(merged, vec!["rust", "mcp", "search"]);
    }

    #[test]
    fn test_apply_enhancement_touches_record() {
        let mut record = FrameRecord::new("content");
        assert!(record.metadata.updated_at.is_none());
        apply_enhancement(&mut record, EnhanceField::Context, &json!("new context"));
        assert_eq!(record.metadata.context.as_deref(), Some("new context"));
        assert!(record.metadata.updated_at.is_some());

        apply_enhancement(
            &mut record,
            EnhanceField::CustomMetadata,
            &json!({"score": 7, "team": "docs"}),
        );
        assert_eq!(record.metadata.custom_metadata["score"], "7");
        assert_eq!(record.metadata.custom_metadata["team"], "docs");
    }
}

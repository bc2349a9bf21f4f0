//! Error types for contextframe-mcp.
//!
//! Uses thiserror for ergonomic error handling with proper
//! error chain propagation. Every error maps to a JSON-RPC code and a
//! structured `data` payload `{kind, field?, hints}` so agents can act
//! on failures programmatically.

use crate::validation::ValidationReport;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Top-level server error.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("{0}")]
    Validation(#[from] ValidationReport),

    #[error("Document not found: {0}")]
    DocumentNotFound(Uuid),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Document already exists: {0}")]
    Conflict(Uuid),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Enhancement error: {0}")]
    Enhance(#[from] EnhanceError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tool error: {0}")]
    Tool(String),
}

/// Errors surfaced by the dataset façade.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Scan failed: {0}")]
    Scan(String),

    #[error("Invalid filter expression: {0}")]
    Filter(String),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Index operation failed: {0}")]
    Index(String),

    #[error("Maintenance operation failed: {0}")]
    Maintenance(String),
}

/// Enhancement (LLM collaborator) errors.
#[derive(Error, Debug)]
pub enum EnhanceError {
    #[error("No LLM client configured")]
    NoClient,

    #[error("LLM call failed: {0}")]
    Provider(String),

    #[error("LLM response did not match the {field} schema: {reason}")]
    BadResponse { field: String, reason: String },
}

/// Extraction errors.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("Path rejected: {0}")]
    Security(#[from] crate::security::SecurityError),

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("Failed to parse {path} as {format}: {reason}")]
    Parse {
        path: String,
        format: &'static str,
        reason: String,
    },

    #[error("File read error for {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

impl ServerError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            Self::ResourceNotFound(_) => "RESOURCE_NOT_FOUND",
            Self::Conflict(_) => "DUPLICATE_DOCUMENT",
            Self::Dataset(_) => "DATASET_ERROR",
            Self::Enhance(_) => "ENHANCE_ERROR",
            Self::Extract(_) => "EXTRACT_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Tool(_) => "TOOL_ERROR",
        }
    }

    /// Returns the error kind for the structured `data` payload.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::DocumentNotFound(_) | Self::ResourceNotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Enhance(_) => "external",
            Self::Extract(ExtractError::Security(_))
            | Self::Extract(ExtractError::FileNotFound(_))
            | Self::Extract(ExtractError::DirectoryNotFound(_))
            | Self::Extract(ExtractError::Pattern { .. }) => "validation",
            Self::Extract(_) => "external",
            Self::Dataset(_) | Self::Io(_) => "io",
            Self::Timeout { .. } => "timeout",
            Self::Json(_) | Self::Config(_) | Self::Tool(_) => "internal",
        }
    }

    /// Whether the caller can fix this error by changing its input.
    ///
    /// Client-fixable errors stay on the tool result channel (visible to
    /// the LLM); server faults travel on the protocol error channel.
    #[must_use]
    pub fn is_client_fixable(&self) -> bool {
        matches!(self.kind(), "validation" | "not_found" | "conflict")
    }

    /// Builds the structured `data` payload for a JSON-RPC error.
    #[must_use]
    pub fn to_error_data(&self) -> serde_json::Value {
        match self {
            Self::Validation(report) => json!({
                "kind": self.kind(),
                "code": self.code(),
                "errors": report.to_entries(),
            }),
            Self::Timeout { seconds } => json!({
                "kind": "timeout",
                "code": self.code(),
                "timeout": true,
                "deadline_seconds": seconds,
            }),
            _ => json!({
                "kind": self.kind(),
                "code": self.code(),
                "hints": self.hints(),
            }),
        }
    }

    fn hints(&self) -> Vec<String> {
        match self {
            Self::DocumentNotFound(_) => {
                vec!["Check the document_id; list_documents shows available ids.".into()]
            }
            Self::Conflict(_) => {
                vec!["Use update_document or upsert semantics to modify an existing record.".into()]
            }
            Self::Enhance(EnhanceError::NoClient) => {
                vec!["Set OPENAI_API_KEY (and optionally CONTEXTFRAME_ENHANCE_MODEL) to enable enhancement tools.".into()]
            }
            _ => Vec::new(),
        }
    }
}

// Conversion to rmcp protocol errors, preserving the JSON-RPC code space:
// Invalid Params -32602 for validation, Internal -32603 for faults,
// -32000 with a timeout marker for deadline expiry.
impl From<ServerError> for rmcp::ErrorData {
    fn from(err: ServerError) -> Self {
        let data = Some(err.to_error_data());
        match err.kind() {
            "validation" | "not_found" | "conflict" => {
                rmcp::ErrorData::invalid_params(err.to_string(), data)
            }
            "timeout" => rmcp::ErrorData::new(
                rmcp::model::ErrorCode(-32000),
                err.to_string(),
                data,
            ),
            _ => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}

//! Core document model for the ContextFrame MCP server.
//!
//! These types mirror the logical record the external columnar dataset
//! stores: a stable UUID, title, free-text content, optional dense
//! vector, optional raw bytes, structured metadata, and a relationship
//! list. The wire representation is plain JSON; the dataset engine owns
//! the physical layout.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Record type tag, a closed set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// Ordinary document row.
    #[default]
    Document,
    /// Header row describing a collection.
    CollectionHeader,
    /// Header row describing the dataset itself.
    DatasetHeader,
    /// A frameset (saved query result set).
    Frameset,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => write!(f, "document"),
            Self::CollectionHeader => write!(f, "collection_header"),
            Self::DatasetHeader => write!(f, "dataset_header"),
            Self::Frameset => write!(f, "frameset"),
        }
    }
}

impl std::str::FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(Self::Document),
            "collection_header" => Ok(Self::CollectionHeader),
            "dataset_header" => Ok(Self::DatasetHeader),
            "frameset" => Ok(Self::Frameset),
            other => Err(format!(
                "Invalid record type: '{}'. Valid types: document, collection_header, dataset_header, frameset",
                other
            )),
        }
    }
}

/// Document lifecycle status, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Review,
    Published,
    Archived,
}

impl DocumentStatus {
    /// All valid status names, for diagnostics.
    pub const VALID: [&'static str; 4] = ["draft", "review", "published", "archived"];
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Review => write!(f, "review"),
            Self::Published => write!(f, "published"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "review" => Ok(Self::Review),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            other => Err(format!(
                "Invalid status: '{}'. Valid values: {}",
                other,
                Self::VALID.join(", ")
            )),
        }
    }
}

/// Relationship type between two records, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Parent,
    Child,
    Related,
    Reference,
    Contains,
    MemberOf,
}

impl RelationshipType {
    /// All valid relationship type names, for diagnostics.
    pub const VALID: [&'static str; 6] = [
        "parent",
        "child",
        "related",
        "reference",
        "contains",
        "member_of",
    ];
}

impl std::str::FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parent" => Ok(Self::Parent),
            "child" => Ok(Self::Child),
            "related" => Ok(Self::Related),
            "reference" => Ok(Self::Reference),
            "contains" => Ok(Self::Contains),
            "member_of" => Ok(Self::MemberOf),
            other => Err(format!(
                "Invalid relationship type: '{}'. Valid types: {}",
                other,
                Self::VALID.join(", ")
            )),
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parent => write!(f, "parent"),
            Self::Child => write!(f, "child"),
            Self::Related => write!(f, "related"),
            Self::Reference => write!(f, "reference"),
            Self::Contains => write!(f, "contains"),
            Self::MemberOf => write!(f, "member_of"),
        }
    }
}

/// A directed relationship to another record.
///
/// At least one target field must be set; `target_uuid` is the preferred
/// identifier inside a dataset, the others address external or
/// content-addressed targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Relationship {
    /// Relationship kind
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    /// UUID of the target record within this dataset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_uuid: Option<Uuid>,
    /// URI of an external target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_uri: Option<String>,
    /// Filesystem path of the target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
    /// Content identifier of the target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_cid: Option<String>,
    /// Human title of the target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Free-text description of why the records are related
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Relationship {
    /// Creates a relationship to a record in the same dataset.
    #[must_use]
    pub fn to_uuid(relationship_type: RelationshipType, target: Uuid) -> Self {
        Self {
            relationship_type,
            target_uuid: Some(target),
            target_uri: None,
            target_path: None,
            target_cid: None,
            title: None,
            description: None,
        }
    }

    /// Whether any target identifier is present.
    #[must_use]
    pub fn has_target(&self) -> bool {
        self.target_uuid.is_some()
            || self.target_uri.is_some()
            || self.target_path.is_some()
            || self.target_cid.is_some()
    }

    /// The target as an opaque string key for graph construction.
    ///
    /// Prefers `target_uuid`; falls back to the first textual identifier.
    #[must_use]
    pub fn target_key(&self) -> Option<String> {
        self.target_uuid
            .map(|u| u.to_string())
            .or_else(|| self.target_uri.clone())
            .or_else(|| self.target_path.clone())
            .or_else(|| self.target_cid.clone())
    }
}

/// Structured metadata attached to every record.
///
/// Custom metadata values are strings by contract; [`crate::validation`]
/// rejects anything else with a field-path diagnostic before a record
/// reaches the dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Metadata {
    /// Document title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Author name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Tag list (order-insensitive for equality, order-preserving on the wire)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Lifecycle status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DocumentStatus>,
    /// Free-text context describing the document's relevance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Collection label this record belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Collection identifier (when the collection has a header record)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    /// Type of the collection identifier (uuid, uri, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id_type: Option<String>,
    /// Source type of extracted documents (file extension family)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    /// Source location of extracted documents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Creation timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last-update timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Free-form string-to-string metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_metadata: BTreeMap<String, String>,
}

impl Metadata {
    /// Tag equality ignoring order (tags are order-insensitive by contract).
    #[must_use]
    pub fn tags_equal(&self, other: &[String]) -> bool {
        if self.tags.len() != other.len() {
            return false;
        }
        let mut a = self.tags.clone();
        let mut b = other.to_vec();
        a.sort();
        b.sort();
        a == b
    }
}

/// A single logical row of the dataset plus its metadata and vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameRecord {
    /// Stable unique identifier
    pub uuid: Uuid,
    /// Free-text content
    #[serde(default)]
    pub content: String,
    /// Dense vector for similarity search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Raw bytes for binary payloads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<Vec<u8>>,
    /// Media type of `raw_data`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_data_type: Option<String>,
    /// Record type tag
    #[serde(default)]
    pub record_type: RecordType,
    /// Structured metadata
    #[serde(default)]
    pub metadata: Metadata,
    /// Outgoing relationships
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
}

impl FrameRecord {
    /// Creates a new document record with a fresh UUID and creation time.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            content: content.into(),
            embedding: None,
            raw_data: None,
            raw_data_type: None,
            record_type: RecordType::Document,
            metadata: Metadata {
                created_at: Some(Utc::now()),
                ..Metadata::default()
            },
            relationships: Vec::new(),
        }
    }

    /// Builder-style title setter.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = Some(title.into());
        self
    }

    /// Builder-style embedding setter.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Builder-style collection setter.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.metadata.collection = Some(collection.into());
        self
    }

    /// Approximate payload size in bytes (content + raw data).
    #[must_use]
    pub fn content_bytes(&self) -> usize {
        self.content.len() + self.raw_data.as_ref().map_or(0, Vec::len)
    }

    /// Marks the record as updated now.
    pub fn touch(&mut self) {
        self.metadata.updated_at = Some(Utc::now());
    }
}

//! Dataset façade.
//!
//! The columnar engine that stores [`FrameRecord`]s is an external
//! collaborator; this module pins down the narrow interface the server
//! needs from it. Nothing in the core may assume anything about on-disk
//! layout beyond these operations. Filters are SQL-like strings
//! (`record_type = 'document'`, `array_has_any(tags, ['x'])`) passed
//! through opaquely.

pub mod memory;

pub use memory::MemoryDataset;

use crate::error::Result;
use crate::monitoring::MetricsBatch;
use crate::types::{FrameRecord, RecordType, Relationship};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Columns a scan may project. Analytics must only request what it
/// consumes; the engine never materializes full rows for a counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Projection {
    pub record_type: bool,
    pub collection: bool,
    pub custom_metadata_keys: bool,
    pub created_at: bool,
    pub relationships: bool,
    pub embedding_dim: bool,
    pub content_bytes: bool,
}

impl Projection {
    /// Projection with only the id column.
    #[must_use]
    pub const fn ids_only() -> Self {
        Self {
            record_type: false,
            collection: false,
            custom_metadata_keys: false,
            created_at: false,
            relationships: false,
            embedding_dim: false,
            content_bytes: false,
        }
    }
}

/// A projected column scan request.
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub columns: Projection,
    pub filter: Option<String>,
    pub limit: Option<usize>,
    pub batch_size: Option<usize>,
}

/// One batch of projected columns. `ids` is always present; every other
/// column is `Some` exactly when the projection requested it, with one
/// entry per row.
#[derive(Debug, Clone, Default)]
pub struct ColumnBatch {
    pub ids: Vec<Uuid>,
    pub record_types: Option<Vec<RecordType>>,
    pub collections: Option<Vec<Option<String>>>,
    pub custom_metadata_keys: Option<Vec<Vec<String>>>,
    pub created_at: Option<Vec<Option<DateTime<Utc>>>>,
    pub relationships: Option<Vec<Vec<Relationship>>>,
    pub embedding_dims: Option<Vec<Option<usize>>>,
    pub content_bytes: Option<Vec<u64>>,
}

impl ColumnBatch {
    /// Number of rows in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the batch holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A search hit with its similarity or relevance score.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: FrameRecord,
    pub score: f64,
}

/// Dataset-level storage counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StorageStats {
    pub num_rows: u64,
    pub num_fragments: u64,
    pub num_deleted_rows: u64,
    pub num_small_files: u64,
}

/// Per-fragment row accounting. `num_rows` counts live rows,
/// `physical_rows` includes deleted ones.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FragmentStats {
    pub id: u64,
    pub num_rows: u64,
    pub physical_rows: u64,
}

/// Kind of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    Scalar,
    Vector,
    Fts,
}

/// A secondary index over one or more fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub index_type: IndexType,
    pub fields: Vec<String>,
}

/// One entry of the dataset version log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

/// Result of a file compaction pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CompactionReport {
    pub fragments_compacted: u64,
    pub files_removed: u64,
    pub files_added: u64,
}

/// Result of a version cleanup pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VacuumReport {
    pub bytes_removed: u64,
    pub old_versions_removed: u64,
}

/// Result of an index optimization pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReindexReport {
    pub indices_optimized: u64,
}

/// A field of the logical dataset schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// The operations the core requires from the external dataset engine.
///
/// Mutations are potentially blocking; callers route them through the
/// worker pool. Scans see a consistent snapshot per the engine contract.
#[async_trait]
pub trait Dataset: Send + Sync {
    /// Streams projected column batches.
    async fn scan(&self, request: ScanRequest) -> Result<Vec<ColumnBatch>>;

    /// Counts rows matching an optional filter.
    async fn count_rows(&self, filter: Option<&str>) -> Result<u64>;

    /// Point lookup by identifier.
    async fn get_by_uuid(&self, id: Uuid) -> Result<Option<FrameRecord>>;

    /// All records carrying the given collection label.
    async fn get_collection_members(&self, collection: &str) -> Result<Vec<FrameRecord>>;

    /// Records with a relationship targeting the given identifier.
    async fn find_related_to(&self, id: Uuid) -> Result<Vec<FrameRecord>>;

    /// Inserts a record; fails with a conflict on a duplicate id.
    async fn add(&self, record: FrameRecord) -> Result<()>;

    /// Inserts a batch of records.
    async fn add_many(&self, records: Vec<FrameRecord>) -> Result<()>;

    /// Replaces an existing record; fails if the id is unknown.
    async fn update_record(&self, record: FrameRecord) -> Result<()>;

    /// Inserts or replaces a record.
    async fn upsert_record(&self, record: FrameRecord) -> Result<()>;

    /// Deletes a record; fails if the id is unknown.
    async fn delete_record(&self, id: Uuid) -> Result<()>;

    /// K-nearest-neighbour search over stored vectors, best first.
    async fn knn_search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<ScoredRecord>>;

    /// Full-text search, best first.
    async fn full_text_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<ScoredRecord>>;

    /// Dataset-level storage counters.
    async fn storage_stats(&self) -> Result<StorageStats>;

    /// Per-fragment row accounting.
    async fn fragment_stats(&self) -> Result<Vec<FragmentStats>>;

    /// Secondary indices currently defined.
    async fn list_indices(&self) -> Result<Vec<IndexInfo>>;

    /// The version log, oldest first.
    async fn version_history(&self) -> Result<Vec<VersionInfo>>;

    /// The currently checked-out version.
    async fn current_version(&self) -> Result<u64>;

    /// Rewrites small fragments into larger ones.
    async fn compact_files(&self) -> Result<CompactionReport>;

    /// Drops versions older than the window, keeping the current one.
    async fn cleanup_old_versions(&self, older_than: Duration) -> Result<VacuumReport>;

    /// Re-optimizes all secondary indices.
    async fn optimize_indices(&self) -> Result<ReindexReport>;

    /// Creates a scalar index over a field.
    async fn create_scalar_index(&self, field: &str, index_type: Option<&str>) -> Result<()>;

    /// Creates the full-text index over `content`.
    async fn create_fts_index(&self) -> Result<()>;

    /// Creates a vector index over a field.
    async fn create_vector_index(
        &self,
        field: &str,
        metric: &str,
        num_partitions: u32,
    ) -> Result<()>;

    /// Fields of the logical schema, for the index advisor.
    async fn schema_fields(&self) -> Result<Vec<SchemaField>>;

    /// Appends a metric batch to the columnar metric tables.
    async fn append_metrics(&self, batch: MetricsBatch) -> Result<()>;
}

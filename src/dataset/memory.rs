//! In-memory reference implementation of the [`Dataset`] façade.
//!
//! Backs the test-suite and the CLI demo mode so the server is
//! exercisable without the external columnar engine. Search is
//! brute-force (cosine similarity, token-overlap text scoring) and
//! storage is a plain vector with positional fragments. This is a
//! reference surface, not a storage engine.

use super::{
    ColumnBatch, CompactionReport, Dataset, FragmentStats, IndexInfo, IndexType, ReindexReport,
    ScanRequest, SchemaField, ScoredRecord, StorageStats, VacuumReport, VersionInfo,
};
use crate::error::{DatasetError, Result, ServerError};
use crate::monitoring::MetricsBatch;
use crate::types::FrameRecord;
use chrono::{Duration, Utc};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Default rows per synthetic fragment.
const DEFAULT_ROWS_PER_FRAGMENT: usize = 10_000;
/// Default scan batch size.
const DEFAULT_BATCH_SIZE: usize = 1024;
/// Deterministic per-version size estimate for vacuum accounting.
const VERSION_SIZE_BYTES: u64 = 4096;

struct State {
    /// Row slots in insertion order; `None` marks a deleted row.
    rows: Vec<Option<FrameRecord>>,
    index: ahash::AHashMap<Uuid, usize>,
    indices: Vec<IndexInfo>,
    versions: Vec<VersionInfo>,
    metric_rows: (u64, u64, u64),
}

impl State {
    fn live(&self) -> impl Iterator<Item = &FrameRecord> {
        self.rows.iter().filter_map(Option::as_ref)
    }

    fn bump_version(&mut self) {
        let next = self.versions.last().map_or(0, |v| v.version) + 1;
        self.versions.push(VersionInfo {
            version: next,
            created_at: Utc::now(),
        });
    }
}

/// In-memory dataset. Cheap to clone handles via `Arc`.
pub struct MemoryDataset {
    state: Mutex<State>,
    rows_per_fragment: usize,
}

impl Default for MemoryDataset {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDataset {
    /// Creates an empty dataset.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rows_per_fragment(DEFAULT_ROWS_PER_FRAGMENT)
    }

    /// Creates an empty dataset with a custom fragment size, letting
    /// tests exercise fragment-level accounting with small row counts.
    #[must_use]
    pub fn with_rows_per_fragment(rows_per_fragment: usize) -> Self {
        Self {
            state: Mutex::new(State {
                rows: Vec::new(),
                index: ahash::AHashMap::new(),
                indices: Vec::new(),
                versions: vec![VersionInfo {
                    version: 0,
                    created_at: Utc::now(),
                }],
                metric_rows: (0, 0, 0),
            }),
            rows_per_fragment: rows_per_fragment.max(1),
        }
    }

    /// Metric rows appended so far (usage, performance, cost).
    #[must_use]
    pub fn metric_rows(&self) -> (u64, u64, u64) {
        lock(&self.state).metric_rows
    }

    fn insert(&self, state: &mut State, record: FrameRecord, replace: bool) -> Result<()> {
        if let Some(&slot) = state.index.get(&record.uuid) {
            if !replace {
                return Err(ServerError::Conflict(record.uuid));
            }
            state.rows[slot] = Some(record);
        } else {
            state.index.insert(record.uuid, state.rows.len());
            state.rows.push(Some(record));
        }
        state.bump_version();
        Ok(())
    }

    fn fragments(&self, state: &State) -> Vec<FragmentStats> {
        state
            .rows
            .chunks(self.rows_per_fragment)
            .enumerate()
            .map(|(id, chunk)| FragmentStats {
                id: id as u64,
                num_rows: chunk.iter().filter(|r| r.is_some()).count() as u64,
                physical_rows: chunk.len() as u64,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Dataset for MemoryDataset {
    async fn scan(&self, request: ScanRequest) -> Result<Vec<ColumnBatch>> {
        let filter = request.filter.as_deref().map(parse_filter).transpose()?;
        let state = lock(&self.state);

        let mut selected: Vec<&FrameRecord> = state
            .live()
            .filter(|r| filter.as_ref().is_none_or(|f| f.matches(r)))
            .collect();
        if let Some(limit) = request.limit {
            selected.truncate(limit);
        }

        let batch_size = request.batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1);
        let columns = request.columns;
        let mut batches = Vec::new();
        for chunk in selected.chunks(batch_size) {
            let mut batch = ColumnBatch {
                ids: chunk.iter().map(|r| r.uuid).collect(),
                ..ColumnBatch::default()
            };
            if columns.record_type {
                batch.record_types = Some(chunk.iter().map(|r| r.record_type).collect());
            }
            if columns.collection {
                batch.collections =
                    Some(chunk.iter().map(|r| r.metadata.collection.clone()).collect());
            }
            if columns.custom_metadata_keys {
                batch.custom_metadata_keys = Some(
                    chunk
                        .iter()
                        .map(|r| r.metadata.custom_metadata.keys().cloned().collect())
                        .collect(),
                );
            }
            if columns.created_at {
                batch.created_at = Some(chunk.iter().map(|r| r.metadata.created_at).collect());
            }
            if columns.relationships {
                batch.relationships =
                    Some(chunk.iter().map(|r| r.relationships.clone()).collect());
            }
            if columns.embedding_dim {
                batch.embedding_dims = Some(
                    chunk
                        .iter()
                        .map(|r| r.embedding.as_ref().map(Vec::len))
                        .collect(),
                );
            }
            if columns.content_bytes {
                batch.content_bytes =
                    Some(chunk.iter().map(|r| r.content_bytes() as u64).collect());
            }
            batches.push(batch);
        }
        Ok(batches)
    }

    async fn count_rows(&self, filter: Option<&str>) -> Result<u64> {
        let filter = filter.map(parse_filter).transpose()?;
        let state = lock(&self.state);
        Ok(state
            .live()
            .filter(|r| filter.as_ref().is_none_or(|f| f.matches(r)))
            .count() as u64)
    }

    async fn get_by_uuid(&self, id: Uuid) -> Result<Option<FrameRecord>> {
        let state = lock(&self.state);
        Ok(state
            .index
            .get(&id)
            .and_then(|&slot| state.rows[slot].clone()))
    }

    async fn get_collection_members(&self, collection: &str) -> Result<Vec<FrameRecord>> {
        let state = lock(&self.state);
        Ok(state
            .live()
            .filter(|r| {
                r.metadata.collection.as_deref() == Some(collection)
                    || r.metadata.collection_id.as_deref() == Some(collection)
            })
            .cloned()
            .collect())
    }

    async fn find_related_to(&self, id: Uuid) -> Result<Vec<FrameRecord>> {
        let state = lock(&self.state);
        Ok(state
            .live()
            .filter(|r| r.relationships.iter().any(|rel| rel.target_uuid == Some(id)))
            .cloned()
            .collect())
    }

    async fn add(&self, record: FrameRecord) -> Result<()> {
        let mut state = lock(&self.state);
        self.insert(&mut state, record, false)
    }

    async fn add_many(&self, records: Vec<FrameRecord>) -> Result<()> {
        let mut state = lock(&self.state);
        for record in records {
            self.insert(&mut state, record, false)?;
        }
        Ok(())
    }

    async fn update_record(&self, record: FrameRecord) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.index.contains_key(&record.uuid) {
            return Err(ServerError::DocumentNotFound(record.uuid));
        }
        self.insert(&mut state, record, true)
    }

    async fn upsert_record(&self, record: FrameRecord) -> Result<()> {
        let mut state = lock(&self.state);
        self.insert(&mut state, record, true)
    }

    async fn delete_record(&self, id: Uuid) -> Result<()> {
        let mut state = lock(&self.state);
        let Some(slot) = state.index.remove(&id) else {
            return Err(ServerError::DocumentNotFound(id));
        };
        state.rows[slot] = None;
        state.bump_version();
        Ok(())
    }

    async fn knn_search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<ScoredRecord>> {
        let filter = filter.map(parse_filter).transpose()?;
        let state = lock(&self.state);
        let mut hits: Vec<ScoredRecord> = state
            .live()
            .filter(|r| filter.as_ref().is_none_or(|f| f.matches(r)))
            .filter_map(|r| {
                let embedding = r.embedding.as_ref()?;
                if embedding.len() != vector.len() {
                    return None;
                }
                Some(ScoredRecord {
                    record: r.clone(),
                    score: cosine_similarity(vector, embedding),
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn full_text_search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&str>,
    ) -> Result<Vec<ScoredRecord>> {
        let filter = filter.map(parse_filter).transpose()?;
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }
        let state = lock(&self.state);
        let mut hits: Vec<ScoredRecord> = state
            .live()
            .filter(|r| filter.as_ref().is_none_or(|f| f.matches(r)))
            .filter_map(|r| {
                let content_tokens = tokenize(&r.content);
                let matched = query_tokens
                    .iter()
                    .filter(|t| content_tokens.contains(*t))
                    .count();
                if matched == 0 {
                    return None;
                }
                let mut score = matched as f64 / query_tokens.len() as f64;
                if let Some(title) = &r.metadata.title {
                    let title_tokens = tokenize(title);
                    if query_tokens.iter().any(|t| title_tokens.contains(t)) {
                        score += 0.25;
                    }
                }
                Some(ScoredRecord {
                    record: r.clone(),
                    score,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn storage_stats(&self) -> Result<StorageStats> {
        let state = lock(&self.state);
        let fragments = self.fragments(&state);
        Ok(StorageStats {
            num_rows: state.live().count() as u64,
            num_fragments: fragments.len() as u64,
            num_deleted_rows: state.rows.iter().filter(|r| r.is_none()).count() as u64,
            num_small_files: fragments
                .iter()
                .filter(|f| f.physical_rows < self.rows_per_fragment as u64)
                .count() as u64,
        })
    }

    async fn fragment_stats(&self) -> Result<Vec<FragmentStats>> {
        let state = lock(&self.state);
        Ok(self.fragments(&state))
    }

    async fn list_indices(&self) -> Result<Vec<IndexInfo>> {
        Ok(lock(&self.state).indices.clone())
    }

    async fn version_history(&self) -> Result<Vec<VersionInfo>> {
        Ok(lock(&self.state).versions.clone())
    }

    async fn current_version(&self) -> Result<u64> {
        Ok(lock(&self.state).versions.last().map_or(0, |v| v.version))
    }

    async fn compact_files(&self) -> Result<CompactionReport> {
        let mut state = lock(&self.state);
        let before = self.fragments(&state);
        let partial = before
            .iter()
            .filter(|f| f.num_rows < self.rows_per_fragment as u64)
            .count() as u64;

        let live: Vec<FrameRecord> = state.live().cloned().collect();
        state.rows = live.into_iter().map(Some).collect();
        state.index = state
            .rows
            .iter()
            .enumerate()
            .filter_map(|(slot, r)| r.as_ref().map(|r| (r.uuid, slot)))
            .collect();
        state.bump_version();

        let after = self.fragments(&state);
        Ok(CompactionReport {
            fragments_compacted: partial,
            files_removed: before.len() as u64,
            files_added: after.len() as u64,
        })
    }

    async fn cleanup_old_versions(&self, older_than: Duration) -> Result<VacuumReport> {
        let cutoff = Utc::now() - older_than;
        let mut state = lock(&self.state);
        let keep_from = state.versions.len().saturating_sub(1);
        let mut removed = 0u64;
        let mut kept = Vec::with_capacity(state.versions.len());
        for (i, version) in state.versions.iter().enumerate() {
            if i < keep_from && version.created_at < cutoff {
                removed += 1;
            } else {
                kept.push(*version);
            }
        }
        state.versions = kept;
        Ok(VacuumReport {
            bytes_removed: removed * VERSION_SIZE_BYTES,
            old_versions_removed: removed,
        })
    }

    async fn optimize_indices(&self) -> Result<ReindexReport> {
        Ok(ReindexReport {
            indices_optimized: lock(&self.state).indices.len() as u64,
        })
    }

    async fn create_scalar_index(&self, field: &str, index_type: Option<&str>) -> Result<()> {
        let mut state = lock(&self.state);
        state.indices.push(IndexInfo {
            name: format!("{field}_{}", index_type.unwrap_or("btree")),
            index_type: IndexType::Scalar,
            fields: vec![field.to_string()],
        });
        Ok(())
    }

    async fn create_fts_index(&self) -> Result<()> {
        let mut state = lock(&self.state);
        state.indices.push(IndexInfo {
            name: "content_fts".to_string(),
            index_type: IndexType::Fts,
            fields: vec!["content".to_string()],
        });
        Ok(())
    }

    async fn create_vector_index(
        &self,
        field: &str,
        metric: &str,
        _num_partitions: u32,
    ) -> Result<()> {
        let mut state = lock(&self.state);
        state.indices.push(IndexInfo {
            name: format!("{field}_{metric}"),
            index_type: IndexType::Vector,
            fields: vec![field.to_string()],
        });
        Ok(())
    }

    async fn schema_fields(&self) -> Result<Vec<SchemaField>> {
        let field = |name: &str, data_type: &str, nullable: bool| SchemaField {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable,
        };
        Ok(vec![
            field("id", "uuid", false),
            field("content", "string", false),
            field("embedding", "vector<float32>", true),
            field("raw_data", "binary", true),
            field("record_type", "string", false),
            field("title", "string", true),
            field("author", "string", true),
            field("tags", "list<string>", true),
            field("status", "string", true),
            field("context", "string", true),
            field("collection", "string", true),
            field("source_type", "string", true),
            field("created_at", "timestamp", true),
            field("updated_at", "timestamp", true),
            field("custom_metadata", "map<string,string>", true),
            field("relationships", "list<struct>", true),
        ])
    }

    async fn append_metrics(&self, batch: MetricsBatch) -> Result<()> {
        let mut state = lock(&self.state);
        state.metric_rows.0 += batch.usage.len() as u64;
        state.metric_rows.1 += batch.performance.len() as u64;
        state.metric_rows.2 += batch.cost.len() as u64;
        Ok(())
    }
}

// ─── Filter evaluation ───────────────────────────────────────────────────────
// A minimal evaluator for the SQL-like filter subset the core emits.
// Real engines parse these natively; here they gate the reference scans.

enum Clause {
    Equals { field: String, value: String },
    IsNotNull { field: String },
    ArrayHasAny { field: String, values: Vec<String> },
}

struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    fn matches(&self, record: &FrameRecord) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Equals { field, value } => {
                field_value(record, field).as_deref() == Some(value.as_str())
            }
            Clause::IsNotNull { field } => match field.as_str() {
                "embedding" => record.embedding.is_some(),
                "raw_data" => record.raw_data.is_some(),
                other => field_value(record, other).is_some(),
            },
            Clause::ArrayHasAny { field, values } => {
                if field == "tags" {
                    record.metadata.tags.iter().any(|t| values.contains(t))
                } else {
                    false
                }
            }
        })
    }
}

fn field_value(record: &FrameRecord, field: &str) -> Option<String> {
    match field {
        "id" | "uuid" => Some(record.uuid.to_string()),
        "record_type" => Some(record.record_type.to_string()),
        "collection" => record.metadata.collection.clone(),
        "collection_id" => record.metadata.collection_id.clone(),
        "status" => record.metadata.status.map(|s| s.to_string()),
        "source_type" => record.metadata.source_type.clone(),
        "author" => record.metadata.author.clone(),
        "title" => record.metadata.title.clone(),
        "context" => record.metadata.context.clone(),
        _ => None,
    }
}

fn parse_filter(expr: &str) -> Result<Filter> {
    let mut clauses = Vec::new();
    for raw in expr.split(" AND ") {
        let clause = raw.trim();
        if clause.is_empty() {
            continue;
        }
        if let Some(rest) = clause.strip_suffix("IS NOT NULL") {
            clauses.push(Clause::IsNotNull {
                field: rest.trim().to_string(),
            });
        } else if let Some(inner) = clause
            .strip_prefix("array_has_any(")
            .and_then(|s| s.strip_suffix(')'))
        {
            let (field, list) = inner.split_once(',').ok_or_else(|| {
                ServerError::Dataset(DatasetError::Filter(format!(
                    "malformed array_has_any clause: '{clause}'"
                )))
            })?;
            let values = list
                .trim()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .split(',')
                .map(|v| v.trim().trim_matches('\'').to_string())
                .filter(|v| !v.is_empty())
                .collect();
            clauses.push(Clause::ArrayHasAny {
                field: field.trim().to_string(),
                values,
            });
        } else if let Some((field, value)) = clause.split_once('=') {
            clauses.push(Clause::Equals {
                field: field.trim().to_string(),
                value: value.trim().trim_matches('\'').to_string(),
            });
        } else {
            return Err(ServerError::Dataset(DatasetError::Filter(format!(
                "unsupported filter expression: '{clause}'"
            ))));
        }
    }
    Ok(Filter { clauses })
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn tokenize(text: &str) -> std::collections::HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Projection;
    use crate::types::{Relationship, RelationshipType};

    fn record(content: &str, tags: &[&str]) -> FrameRecord {
        let mut r = FrameRecord::new(content);
        r.metadata.tags = tags.iter().map(|t| (*t).to_string()).collect();
        r
    }

    #[tokio::test]
    async fn test_add_get_roundtrip_and_conflict() {
        let ds = MemoryDataset::new();
        let r = record("hello", &[]);
        let id = r.uuid;
        ds.add(r.clone()).await.unwrap();
        assert_eq!(ds.get_by_uuid(id).await.unwrap().unwrap().content, "hello");
        assert!(matches!(
            ds.add(r).await.unwrap_err(),
            ServerError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_marks_row_deleted() {
        let ds = MemoryDataset::new();
        let r = record("bye", &[]);
        let id = r.uuid;
        ds.add(r).await.unwrap();
        ds.delete_record(id).await.unwrap();
        assert!(ds.get_by_uuid(id).await.unwrap().is_none());
        let stats = ds.storage_stats().await.unwrap();
        assert_eq!(stats.num_rows, 0);
        assert_eq!(stats.num_deleted_rows, 1);
        assert!(matches!(
            ds.delete_record(id).await.unwrap_err(),
            ServerError::DocumentNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_fragment_accounting() {
        let ds = MemoryDataset::with_rows_per_fragment(200);
        for i in 0..1000 {
            ds.add(record(&format!("doc {i}"), &[])).await.unwrap();
        }
        let stats = ds.storage_stats().await.unwrap();
        assert_eq!(stats.num_rows, 1000);
        assert_eq!(stats.num_fragments, 5);
        let fragments = ds.fragment_stats().await.unwrap();
        assert!(fragments.iter().all(|f| f.physical_rows == 200));
    }

    #[tokio::test]
    async fn test_compact_restores_efficiency() {
        let ds = MemoryDataset::with_rows_per_fragment(10);
        let mut ids = Vec::new();
        for i in 0..30 {
            let r = record(&format!("doc {i}"), &[]);
            ids.push(r.uuid);
            ds.add(r).await.unwrap();
        }
        for id in ids.iter().take(15) {
            ds.delete_record(*id).await.unwrap();
        }
        let report = ds.compact_files().await.unwrap();
        assert!(report.fragments_compacted > 0);
        let stats = ds.storage_stats().await.unwrap();
        assert_eq!(stats.num_deleted_rows, 0);
        assert_eq!(stats.num_rows, 15);
    }

    #[tokio::test]
    async fn test_knn_orders_by_similarity_and_handles_small_datasets() {
        let ds = MemoryDataset::new();
        let a = record("a", &[]).with_embedding(vec![1.0, 0.0]);
        let b = record("b", &[]).with_embedding(vec![0.9, 0.1]);
        let c = record("c", &[]); // no vector
        let b_id = b.uuid;
        ds.add(a).await.unwrap();
        ds.add(b).await.unwrap();
        ds.add(c).await.unwrap();

        // k greater than vector rows: returns the two that have vectors
        let hits = ds.knn_search(&[0.9, 0.1], 10, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.uuid, b_id);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_full_text_scoring() {
        let ds = MemoryDataset::new();
        ds.add(record("the quick brown fox", &[])).await.unwrap();
        ds.add(record("lazy dogs sleep", &[])).await.unwrap();
        let hits = ds.full_text_search("quick fox", 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_filter_subset() {
        let ds = MemoryDataset::new();
        let mut r1 = record("tagged", &["alpha"]);
        r1.metadata.collection = Some("docs".into());
        let r2 = record("untagged", &[]).with_embedding(vec![1.0]);
        ds.add(r1).await.unwrap();
        ds.add(r2).await.unwrap();

        assert_eq!(
            ds.count_rows(Some("record_type = 'document'")).await.unwrap(),
            2
        );
        assert_eq!(
            ds.count_rows(Some("collection = 'docs'")).await.unwrap(),
            1
        );
        assert_eq!(
            ds.count_rows(Some("embedding IS NOT NULL")).await.unwrap(),
            1
        );
        assert_eq!(
            ds.count_rows(Some("array_has_any(tags, ['alpha', 'beta'])"))
                .await
                .unwrap(),
            1
        );
        assert!(ds.count_rows(Some("content LIKE '%x%'")).await.is_err());
    }

    #[tokio::test]
    async fn test_scan_projects_only_requested_columns() {
        let ds = MemoryDataset::new();
        ds.add(record("projected", &["t"])).await.unwrap();
        let batches = ds
            .scan(ScanRequest {
                columns: Projection {
                    record_type: true,
                    ..Projection::ids_only()
                },
                ..ScanRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].record_types.is_some());
        assert!(batches[0].relationships.is_none());
        assert!(batches[0].content_bytes.is_none());
    }

    #[tokio::test]
    async fn test_related_lookup() {
        let ds = MemoryDataset::new();
        let parent = record("parent", &[]);
        let parent_id = parent.uuid;
        let mut child = record("child", &[]);
        child
            .relationships
            .push(Relationship::to_uuid(RelationshipType::Parent, parent_id));
        let child_id = child.uuid;
        ds.add(parent).await.unwrap();
        ds.add(child).await.unwrap();

        let related = ds.find_related_to(parent_id).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].uuid, child_id);
    }

    #[tokio::test]
    async fn test_version_log_and_vacuum() {
        let ds = MemoryDataset::new();
        for i in 0..5 {
            ds.add(record(&format!("v{i}"), &[])).await.unwrap();
        }
        assert_eq!(ds.current_version().await.unwrap(), 5);
        assert_eq!(ds.version_history().await.unwrap().len(), 6);

        // Nothing is old enough to vacuum
        let report = ds.cleanup_old_versions(Duration::days(7)).await.unwrap();
        assert_eq!(report.old_versions_removed, 0);

        // Everything except the current version is older than "now"
        let report = ds.cleanup_old_versions(Duration::zero()).await.unwrap();
        assert_eq!(report.old_versions_removed, 5);
        assert_eq!(ds.version_history().await.unwrap().len(), 1);
    }
}

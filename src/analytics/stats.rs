//! Dataset statistics collection.
//!
//! Builds a [`DatasetStats`] snapshot from projected scans and the
//! engine's native counters. Expensive sections are optional and can be
//! sampled; sampled counts are rescaled by `total / sample`.

use super::round2;
use crate::dataset::{Dataset, IndexInfo, Projection, ScanRequest};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

/// Estimated bytes per physical row when the engine reports no sizes.
const ESTIMATED_ROW_BYTES: u64 = 1024;

/// Options for one stats collection pass.
#[derive(Debug, Clone, Copy)]
pub struct StatsOptions {
    pub include_content: bool,
    pub include_fragments: bool,
    pub include_relationships: bool,
    pub sample_size: Option<usize>,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            include_content: true,
            include_fragments: true,
            include_relationships: true,
            sample_size: None,
        }
    }
}

/// Comprehensive dataset statistics snapshot.
#[derive(Debug, Clone, Default)]
pub struct DatasetStats {
    pub total_documents: u64,
    pub total_collections: u64,
    pub total_relationships: u64,

    pub num_fragments: u64,
    pub num_deleted_rows: u64,
    pub num_small_files: u64,
    pub storage_size_bytes: u64,

    pub current_version: u64,
    pub latest_version: u64,
    pub version_count: u64,

    pub document_types: BTreeMap<String, u64>,
    pub collection_sizes: BTreeMap<String, u64>,
    pub metadata_fields: BTreeMap<String, u64>,

    pub embedding_coverage: f64,
    pub embedding_dimensions: BTreeSet<usize>,

    pub relationship_types: BTreeMap<String, u64>,
    pub avg_relationships_per_doc: f64,
    pub orphaned_documents: u64,

    pub indices: Vec<IndexInfo>,
    pub indexed_fields: BTreeSet<String>,

    pub oldest_document: Option<DateTime<Utc>>,
    pub newest_document: Option<DateTime<Utc>>,

    pub avg_document_size_kb: f64,
    pub fragment_efficiency: f64,
    pub collection_time_seconds: f64,

    pub avg_collection_size: f64,
    pub max_collection_size: u64,
    pub min_collection_size: u64,
}

impl DatasetStats {
    /// Report shape for the `get_dataset_stats` tool.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "summary": {
                "total_documents": self.total_documents,
                "total_collections": self.total_collections,
                "total_relationships": self.total_relationships,
                "storage_size_mb": round2(self.storage_size_bytes as f64 / (1024.0 * 1024.0)),
            },
            "storage": {
                "num_fragments": self.num_fragments,
                "num_deleted_rows": self.num_deleted_rows,
                "num_small_files": self.num_small_files,
                "avg_document_size_kb": round2(self.avg_document_size_kb),
                "fragment_efficiency": (self.fragment_efficiency * 1000.0).round() / 1000.0,
            },
            "versions": {
                "current": self.current_version,
                "latest": self.latest_version,
                "total_versions": self.version_count,
            },
            "content": {
                "document_types": self.document_types,
                "collection_count": self.collection_sizes.len(),
                "collection_sizes": self.collection_sizes,
                "metadata_fields": self.metadata_fields,
            },
            "embeddings": {
                "coverage": (self.embedding_coverage * 1000.0).round() / 1000.0,
                "dimensions": self.embedding_dimensions,
            },
            "relationships": {
                "types": self.relationship_types,
                "avg_per_document": round2(self.avg_relationships_per_doc),
                "orphaned_documents": self.orphaned_documents,
            },
            "indices": {
                "count": self.indices.len(),
                "indexed_fields": self.indexed_fields,
                "details": self.indices,
            },
            "time_range": {
                "oldest": self.oldest_document.map(|t| t.to_rfc3339()),
                "newest": self.newest_document.map(|t| t.to_rfc3339()),
            },
        })
    }
}

/// Collects dataset statistics through the façade.
pub struct StatsCollector {
    dataset: Arc<dyn Dataset>,
}

impl StatsCollector {
    #[must_use]
    pub fn new(dataset: Arc<dyn Dataset>) -> Self {
        Self { dataset }
    }

    /// Runs one collection pass.
    pub async fn collect(&self, options: StatsOptions) -> Result<DatasetStats> {
        let started = Instant::now();
        let mut stats = DatasetStats::default();

        self.collect_native(&mut stats).await?;
        stats.total_collections = self
            .dataset
            .count_rows(Some("record_type = 'collection_header'"))
            .await?;

        if options.include_fragments {
            self.collect_fragments(&mut stats).await?;
        }
        if options.include_content {
            self.collect_content(&mut stats, options.sample_size).await?;
            self.collect_embeddings(&mut stats, options.sample_size).await?;
        }
        if options.include_relationships {
            self.collect_relationships(&mut stats, options.sample_size)
                .await?;
        }

        // Derived collection size statistics
        if !stats.collection_sizes.is_empty() {
            let sizes: Vec<u64> = stats.collection_sizes.values().copied().collect();
            stats.avg_collection_size =
                sizes.iter().sum::<u64>() as f64 / sizes.len() as f64;
            stats.max_collection_size = sizes.iter().copied().max().unwrap_or(0);
            stats.min_collection_size = sizes.iter().copied().min().unwrap_or(0);
        }

        stats.collection_time_seconds = started.elapsed().as_secs_f64();
        Ok(stats)
    }

    /// Engine-native counters: storage, versions, indices.
    async fn collect_native(&self, stats: &mut DatasetStats) -> Result<()> {
        let storage = self.dataset.storage_stats().await?;
        stats.total_documents = storage.num_rows;
        stats.num_fragments = storage.num_fragments;
        stats.num_deleted_rows = storage.num_deleted_rows;
        stats.num_small_files = storage.num_small_files;

        stats.current_version = self.dataset.current_version().await?;
        let history = self.dataset.version_history().await?;
        stats.latest_version = history.last().map_or(0, |v| v.version);
        stats.version_count = history.len() as u64;

        stats.indices = self.dataset.list_indices().await?;
        for idx in &stats.indices {
            stats.indexed_fields.extend(idx.fields.iter().cloned());
        }
        Ok(())
    }

    async fn collect_fragments(&self, stats: &mut DatasetStats) -> Result<()> {
        let fragments = self.dataset.fragment_stats().await?;
        if fragments.is_empty() {
            return Ok(());
        }
        let mut active_rows = 0u64;
        let mut physical_rows = 0u64;
        for fragment in &fragments {
            active_rows += fragment.num_rows;
            physical_rows += fragment.physical_rows;
        }
        stats.storage_size_bytes = physical_rows * ESTIMATED_ROW_BYTES;
        if physical_rows > 0 {
            stats.fragment_efficiency = active_rows as f64 / physical_rows as f64;
        }
        if stats.total_documents > 0 {
            stats.avg_document_size_kb =
                stats.storage_size_bytes as f64 / stats.total_documents as f64 / 1024.0;
        }
        Ok(())
    }

    async fn collect_content(
        &self,
        stats: &mut DatasetStats,
        sample_size: Option<usize>,
    ) -> Result<()> {
        let (limit, scale) = sampling(stats.total_documents, sample_size);
        let batches = self
            .dataset
            .scan(ScanRequest {
                columns: Projection {
                    record_type: true,
                    collection: true,
                    custom_metadata_keys: true,
                    created_at: true,
                    ..Projection::ids_only()
                },
                limit,
                ..ScanRequest::default()
            })
            .await?;

        for batch in batches {
            if let Some(record_types) = &batch.record_types {
                for record_type in record_types {
                    *stats
                        .document_types
                        .entry(record_type.to_string())
                        .or_default() += 1;
                }
            }
            if let Some(collections) = &batch.collections {
                for collection in collections.iter().flatten() {
                    *stats.collection_sizes.entry(collection.clone()).or_default() += 1;
                }
            }
            if let Some(keys) = &batch.custom_metadata_keys {
                for row_keys in keys {
                    for key in row_keys {
                        *stats.metadata_fields.entry(key.clone()).or_default() += 1;
                    }
                }
            }
            if let Some(timestamps) = &batch.created_at {
                for ts in timestamps.iter().flatten() {
                    if stats.oldest_document.is_none_or(|old| *ts < old) {
                        stats.oldest_document = Some(*ts);
                    }
                    if stats.newest_document.is_none_or(|new| *ts > new) {
                        stats.newest_document = Some(*ts);
                    }
                }
            }
        }

        if scale > 1.0 {
            rescale(&mut stats.document_types, scale);
            rescale(&mut stats.collection_sizes, scale);
            rescale(&mut stats.metadata_fields, scale);
        }
        Ok(())
    }

    async fn collect_embeddings(
        &self,
        stats: &mut DatasetStats,
        sample_size: Option<usize>,
    ) -> Result<()> {
        let (limit, scale) = sampling(stats.total_documents, sample_size);
        let batches = self
            .dataset
            .scan(ScanRequest {
                columns: Projection {
                    embedding_dim: true,
                    ..Projection::ids_only()
                },
                limit,
                ..ScanRequest::default()
            })
            .await?;

        let mut with_embeddings = 0u64;
        for batch in batches {
            if let Some(dims) = &batch.embedding_dims {
                for dim in dims.iter().flatten() {
                    with_embeddings += 1;
                    stats.embedding_dimensions.insert(*dim);
                }
            }
        }
        if scale > 1.0 {
            with_embeddings = (with_embeddings as f64 * scale) as u64;
        }
        if stats.total_documents > 0 {
            stats.embedding_coverage =
                (with_embeddings as f64 / stats.total_documents as f64).min(1.0);
        }
        Ok(())
    }

    async fn collect_relationships(
        &self,
        stats: &mut DatasetStats,
        sample_size: Option<usize>,
    ) -> Result<()> {
        let (limit, scale) = sampling(stats.total_documents, sample_size);
        let batches = self
            .dataset
            .scan(ScanRequest {
                columns: Projection {
                    relationships: true,
                    ..Projection::ids_only()
                },
                limit,
                ..ScanRequest::default()
            })
            .await?;

        let mut docs_with_relationships = 0u64;
        let mut total_relationships = 0u64;
        for batch in batches {
            if let Some(relationship_lists) = &batch.relationships {
                for relationships in relationship_lists {
                    if relationships.is_empty() {
                        continue;
                    }
                    docs_with_relationships += 1;
                    for rel in relationships {
                        *stats
                            .relationship_types
                            .entry(rel.relationship_type.to_string())
                            .or_default() += 1;
                        total_relationships += 1;
                    }
                }
            }
        }

        if scale > 1.0 {
            docs_with_relationships = (docs_with_relationships as f64 * scale) as u64;
            total_relationships = (total_relationships as f64 * scale) as u64;
            rescale(&mut stats.relationship_types, scale);
        }

        stats.total_relationships = total_relationships;
        if stats.total_documents > 0 {
            stats.avg_relationships_per_doc =
                total_relationships as f64 / stats.total_documents as f64;
            stats.orphaned_documents = stats
                .total_documents
                .saturating_sub(docs_with_relationships);
        }
        Ok(())
    }
}

/// Returns the scan limit and the rescale factor for a sampling request.
fn sampling(total: u64, sample_size: Option<usize>) -> (Option<usize>, f64) {
    match sample_size {
        Some(sample) if (sample as u64) < total && sample > 0 => {
            (Some(sample), total as f64 / sample as f64)
        }
        _ => (None, 1.0),
    }
}

fn rescale(histogram: &mut BTreeMap<String, u64>, scale: f64) {
    for value in histogram.values_mut() {
        *value = (*value as f64 * scale) as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MemoryDataset;
    use crate::types::{FrameRecord, RecordType, Relationship, RelationshipType};

    async fn seeded_dataset() -> Arc<dyn Dataset> {
        let ds = MemoryDataset::with_rows_per_fragment(200);
        let mut header = FrameRecord::new("collection header");
        header.record_type = RecordType::CollectionHeader;
        let header_id = header.uuid;
        ds.add(header).await.unwrap();

        for i in 0..9 {
            let mut r = FrameRecord::new(format!("doc {i}"))
                .with_collection("papers")
                .with_embedding(vec![i as f32, 1.0, 0.0]);
            r.metadata
                .custom_metadata
                .insert("team".into(), "search".into());
            if i % 2 == 0 {
                r.relationships
                    .push(Relationship::to_uuid(RelationshipType::MemberOf, header_id));
            }
            ds.add(r).await.unwrap();
        }
        Arc::new(ds)
    }

    #[tokio::test]
    async fn test_full_snapshot() {
        let dataset = seeded_dataset().await;
        let stats = StatsCollector::new(dataset)
            .collect(StatsOptions::default())
            .await
            .unwrap();

        assert_eq!(stats.total_documents, 10);
        assert_eq!(stats.total_collections, 1);
        assert_eq!(stats.document_types["document"], 9);
        assert_eq!(stats.document_types["collection_header"], 1);
        assert_eq!(stats.collection_sizes["papers"], 9);
        assert_eq!(stats.metadata_fields["team"], 9);
        assert!((stats.embedding_coverage - 0.9).abs() < 1e-9);
        assert_eq!(stats.embedding_dimensions.iter().copied().collect::<Vec<_>>(), vec![3]);
        assert_eq!(stats.relationship_types["member_of"], 5);
        assert_eq!(stats.orphaned_documents, 5);
        assert_eq!(stats.num_fragments, 1);
        assert!(stats.fragment_efficiency > 0.99);
        assert!(stats.oldest_document.is_some());
    }

    #[tokio::test]
    async fn test_report_shape() {
        let dataset = seeded_dataset().await;
        let stats = StatsCollector::new(dataset)
            .collect(StatsOptions::default())
            .await
            .unwrap();
        let value = stats.to_value();
        assert_eq!(value["summary"]["total_documents"], 10);
        assert_eq!(value["storage"]["num_fragments"], 1);
        assert_eq!(value["content"]["collection_count"], 1);
        assert!(value["time_range"]["oldest"].is_string());
    }

    #[tokio::test]
    async fn test_sampled_counts_are_rescaled() {
        let ds = MemoryDataset::new();
        for i in 0..100 {
            ds.add(FrameRecord::new(format!("doc {i}"))).await.unwrap();
        }
        let stats = StatsCollector::new(Arc::new(ds))
            .collect(StatsOptions {
                sample_size: Some(10),
                ..StatsOptions::default()
            })
            .await
            .unwrap();
        // 10 sampled document rows rescaled by 100/10
        assert_eq!(stats.document_types["document"], 100);
    }

    #[tokio::test]
    async fn test_sections_can_be_skipped() {
        let dataset = seeded_dataset().await;
        let stats = StatsCollector::new(dataset)
            .collect(StatsOptions {
                include_content: false,
                include_fragments: false,
                include_relationships: false,
                sample_size: None,
            })
            .await
            .unwrap();
        assert!(stats.document_types.is_empty());
        assert_eq!(stats.total_relationships, 0);
        assert_eq!(stats.storage_size_bytes, 0);
    }
}

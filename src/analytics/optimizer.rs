//! Storage optimization and index advice.
//!
//! [`StorageOptimizer`] drives compact/vacuum/reindex passes with a
//! dry-run mode that previews without mutating. [`IndexAdvisor`] turns
//! the schema, the current index set, and recorded query patterns into
//! prioritized recommendations.

use crate::dataset::Dataset;
use crate::error::Result;
use chrono::{Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Fragments below this row count are compaction candidates.
const SMALL_FRAGMENT_ROWS: u64 = 10_000;
/// Default vacuum window, days.
const DEFAULT_VACUUM_DAYS: i64 = 7;
/// Usage count above which a queried field becomes an index candidate.
const FIELD_USAGE_THRESHOLD: u64 = 10;
/// Usage count above which the candidate is medium rather than low priority.
const FIELD_USAGE_MEDIUM: u64 = 50;

/// One storage optimization operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OptimizeOperation {
    Compact,
    Vacuum,
    Reindex,
}

impl fmt::Display for OptimizeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compact => write!(f, "compact"),
            Self::Vacuum => write!(f, "vacuum"),
            Self::Reindex => write!(f, "reindex"),
        }
    }
}

/// Workload profile for index recommendations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadType {
    /// Query-heavy
    Search,
    /// Scan-heavy
    Analytics,
    /// Both
    #[default]
    Mixed,
}

impl WorkloadType {
    fn is_search_oriented(self) -> bool {
        matches!(self, Self::Search | Self::Mixed)
    }
}

/// Drives storage maintenance through the dataset façade.
pub struct StorageOptimizer {
    dataset: Arc<dyn Dataset>,
    history: Mutex<Vec<Value>>,
}

impl StorageOptimizer {
    #[must_use]
    pub fn new(dataset: Arc<dyn Dataset>) -> Self {
        Self {
            dataset,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Runs the requested operations in order. With `dry_run` nothing is
    /// mutated and each operation reports a preview.
    pub async fn optimize(
        &self,
        operations: &[OptimizeOperation],
        dry_run: bool,
        target_version: Option<u64>,
    ) -> Result<Value> {
        let mut results = json!({
            "operations": [],
            "total_space_saved_mb": 0.0,
            "total_duration_seconds": 0.0,
        });

        let initial_stats = self.dataset.storage_stats().await?;

        for operation in operations {
            let started = Instant::now();
            let metrics = match operation {
                OptimizeOperation::Compact => self.compact(dry_run).await,
                OptimizeOperation::Vacuum => self.vacuum(dry_run, target_version).await,
                OptimizeOperation::Reindex => self.reindex(dry_run).await,
            };
            let duration = started.elapsed().as_secs_f64();

            let metrics = match metrics {
                Ok(metrics) => metrics,
                Err(e) => json!({"success": false, "error": e.to_string()}),
            };
            let success = metrics["success"].as_bool().unwrap_or(false);

            let entry = json!({
                "operation": operation.to_string(),
                "success": success,
                "metrics": metrics,
                "duration_seconds": (duration * 100.0).round() / 100.0,
                "timestamp": Utc::now().to_rfc3339(),
            });
            lock(&self.history).push(entry.clone());

            if let Some(saved) = entry["metrics"]["space_saved_mb"].as_f64() {
                results["total_space_saved_mb"] =
                    json!(results["total_space_saved_mb"].as_f64().unwrap_or(0.0) + saved);
            }
            results["total_duration_seconds"] =
                json!(results["total_duration_seconds"].as_f64().unwrap_or(0.0) + duration);
            if let Some(operations) = results["operations"].as_array_mut() {
                operations.push(entry);
            }
        }

        if !dry_run {
            let final_stats = self.dataset.storage_stats().await?;
            results["before"] = serde_json::to_value(initial_stats)?;
            results["after"] = serde_json::to_value(final_stats)?;
        }

        Ok(results)
    }

    /// Past operation records, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Value> {
        lock(&self.history).clone()
    }

    async fn compact(&self, dry_run: bool) -> Result<Value> {
        if dry_run {
            let fragments = self.dataset.fragment_stats().await?;
            let small = fragments
                .iter()
                .filter(|f| f.num_rows < SMALL_FRAGMENT_ROWS)
                .count();
            return Ok(json!({
                "success": true,
                "preview": true,
                "fragments_to_compact": small,
                "estimated_fragments_after": (fragments.len() - small + 1).max(1),
            }));
        }
        let report = self.dataset.compact_files().await?;
        Ok(json!({
            "success": true,
            "fragments_compacted": report.fragments_compacted,
            "files_removed": report.files_removed,
            "files_added": report.files_added,
        }))
    }

    /// Cleans versions older than the window. With `target_version` the
    /// window is derived as `current - target` days, a rough estimate
    /// carried over from the engine's own tooling.
    async fn vacuum(&self, dry_run: bool, target_version: Option<u64>) -> Result<Value> {
        let older_than = match target_version {
            Some(target) => {
                let current = self.dataset.current_version().await?;
                Duration::days(current.saturating_sub(target) as i64)
            }
            None => Duration::days(DEFAULT_VACUUM_DAYS),
        };

        if dry_run {
            let history = self.dataset.version_history().await?;
            let cutoff = Utc::now() - older_than;
            let keep_from = history.len().saturating_sub(1);
            let old = history
                .iter()
                .take(keep_from)
                .filter(|v| v.created_at < cutoff)
                .count();
            return Ok(json!({
                "success": true,
                "preview": true,
                "versions_to_remove": old,
                "estimated_space_mb": old * 10,
            }));
        }

        let report = self.dataset.cleanup_old_versions(older_than).await?;
        Ok(json!({
            "success": true,
            "bytes_removed": report.bytes_removed,
            "space_saved_mb": report.bytes_removed as f64 / (1024.0 * 1024.0),
            "old_versions_removed": report.old_versions_removed,
        }))
    }

    async fn reindex(&self, dry_run: bool) -> Result<Value> {
        let indices = self.dataset.list_indices().await?;
        if dry_run {
            return Ok(json!({
                "success": true,
                "preview": true,
                "indices_to_optimize": indices.len(),
                "index_names": indices.iter().map(|i| i.name.clone()).collect::<Vec<_>>(),
            }));
        }
        let report = self.dataset.optimize_indices().await?;
        Ok(json!({
            "success": true,
            "indices_optimized": report.indices_optimized,
            "status": "completed",
        }))
    }
}

/// Recommends indices from the schema, the current index set, and
/// recorded query patterns.
pub struct IndexAdvisor {
    dataset: Arc<dyn Dataset>,
    field_usage: Mutex<ahash::AHashMap<String, u64>>,
}

impl IndexAdvisor {
    #[must_use]
    pub fn new(dataset: Arc<dyn Dataset>) -> Self {
        Self {
            dataset,
            field_usage: Mutex::new(ahash::AHashMap::new()),
        }
    }

    /// Records the fields touched by one query, for usage-driven advice.
    pub fn record_query_pattern(&self, fields: &[String]) {
        let mut usage = lock(&self.field_usage);
        for field in fields {
            *usage.entry(field.clone()).or_default() += 1;
        }
    }

    /// Produces recommendations in priority order (high, medium, low).
    pub async fn recommendations(
        &self,
        analyze_queries: bool,
        workload: WorkloadType,
    ) -> Result<Value> {
        let current_indices = self.dataset.list_indices().await?;
        let mut indexed_fields: std::collections::BTreeSet<String> =
            std::collections::BTreeSet::new();
        for idx in &current_indices {
            indexed_fields.extend(idx.fields.iter().cloned());
        }

        let schema_fields = self.dataset.schema_fields().await?;
        let schema_names: std::collections::BTreeSet<&str> =
            schema_fields.iter().map(|f| f.name.as_str()).collect();

        let mut recommendations: Vec<Value> = Vec::new();

        if workload.is_search_oriented() && !indexed_fields.contains("embedding") {
            recommendations.push(json!({
                "type": "vector",
                "field": "embedding",
                "reason": "No vector index found for embedding field",
                "priority": "high",
                "estimated_benefit": "10-100x faster similarity search",
                "command": "create_vector_index('embedding', metric='cosine', num_partitions=256)",
            }));
        }

        // Known high-value scalar fields
        let high_value: [(&str, &str, &str, u64); 5] = [
            ("id", "Primary key field", "high", 100),
            ("record_type", "Frequently filtered field", "high", 50),
            ("created_at", "Temporal queries", "medium", 20),
            ("updated_at", "Temporal queries", "medium", 20),
            ("source_type", "Content filtering", "medium", 10),
        ];
        let mut scalar_candidates: Vec<&str> = Vec::new();
        for (field, reason, priority, benefit) in high_value {
            if schema_names.contains(field) && !indexed_fields.contains(field) {
                scalar_candidates.push(field);
                recommendations.push(json!({
                    "type": "scalar",
                    "field": field,
                    "reason": reason,
                    "priority": priority,
                    "estimated_benefit": format!("{benefit}x faster filtering"),
                    "command": format!("create_scalar_index('{field}')"),
                }));
            }
        }

        // Usage-driven candidates
        if analyze_queries {
            let usage = lock(&self.field_usage).clone();
            let mut fields: Vec<(&String, &u64)> = usage.iter().collect();
            fields.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (field, count) in fields {
                if *count > FIELD_USAGE_THRESHOLD
                    && !indexed_fields.contains(field)
                    && !scalar_candidates.contains(&field.as_str())
                {
                    let priority = if *count > FIELD_USAGE_MEDIUM { "medium" } else { "low" };
                    recommendations.push(json!({
                        "type": "scalar",
                        "field": field,
                        "reason": format!("Frequently queried field ({count} times)"),
                        "priority": priority,
                        "estimated_benefit": format!("{}x faster filtering", (*count).min(50)),
                        "command": format!("create_scalar_index('{field}')"),
                    }));
                }
            }
        }

        if workload.is_search_oriented() && !indexed_fields.contains("content") {
            recommendations.push(json!({
                "type": "fts",
                "field": "content",
                "reason": "No full-text search index for content field",
                "priority": "medium",
                "estimated_benefit": "Enable text search capabilities",
                "command": "create_fts_index()",
            }));
        }

        recommendations.sort_by_key(|r| match r["priority"].as_str() {
            Some("high") => 0,
            Some("medium") => 1,
            Some("low") => 2,
            _ => 3,
        });

        let redundant = find_redundant(&current_indices);

        Ok(json!({
            "current_indices": current_indices,
            "recommendations": recommendations,
            "redundant_indices": redundant,
            "index_coverage": {
                "total_fields": schema_fields.len(),
                "indexed_fields": indexed_fields.len(),
                "coverage_percent": if schema_fields.is_empty() {
                    0.0
                } else {
                    (indexed_fields.len() as f64 / schema_fields.len() as f64 * 1000.0).round() / 10.0
                },
            },
        }))
    }
}

/// Two indices over the same sorted field set: the later one is
/// flagged as redundant.
fn find_redundant(indices: &[crate::dataset::IndexInfo]) -> Vec<Value> {
    let mut seen: ahash::AHashMap<Vec<String>, &str> = ahash::AHashMap::new();
    let mut redundant = Vec::new();
    for idx in indices {
        let mut fields = idx.fields.clone();
        fields.sort();
        if let Some(original) = seen.get(&fields) {
            redundant.push(json!({
                "index": idx.name,
                "reason": format!("Duplicate of {original}"),
                "action": "Consider removing",
            }));
        } else {
            seen.insert(fields, idx.name.as_str());
        }
    }
    redundant
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

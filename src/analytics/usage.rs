//! Dataset usage pattern analysis.
//!
//! Records document accesses and derives hot documents, access
//! distributions, temporal buckets, per-collection activity, and
//! recommendations. Collection attribution joins the access log against
//! projected dataset metadata.

use super::{mean, percentile, round2};
use crate::dataset::{Dataset, Projection, ScanRequest};
use crate::error::Result;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex, MutexGuard};

/// Hot documents and collections reported per analysis.
const TOP_LIMIT: usize = 10;

#[derive(Default)]
struct UsageLog {
    access_log: ahash::AHashMap<String, Vec<DateTime<Utc>>>,
    operation_counts: ahash::AHashMap<String, u64>,
}

/// Analyzes recorded document accesses against the dataset.
pub struct UsageAnalyzer {
    dataset: Arc<dyn Dataset>,
    log: Mutex<UsageLog>,
}

impl UsageAnalyzer {
    #[must_use]
    pub fn new(dataset: Arc<dyn Dataset>) -> Self {
        Self {
            dataset,
            log: Mutex::new(UsageLog::default()),
        }
    }

    /// Records one document access.
    pub fn record_access(&self, document_id: &str, operation: &str) {
        let mut log = lock(&self.log);
        log.access_log
            .entry(document_id.to_string())
            .or_default()
            .push(Utc::now());
        *log.operation_counts.entry(operation.to_string()).or_default() += 1;
    }

    /// Runs one usage analysis pass.
    pub async fn analyze(
        &self,
        time_range: Option<Duration>,
        group_by: &str,
        include_patterns: bool,
    ) -> Result<Value> {
        let cutoff = time_range.map(|range| Utc::now() - range);

        let (access_stats, temporal, operations, total_accesses, unique_documents) = {
            let log = lock(&self.log);
            (
                analyze_access_patterns(&log, cutoff),
                analyze_temporal_patterns(&log, cutoff, group_by),
                log.operation_counts
                    .iter()
                    .map(|(k, v)| (k.clone(), json!(v)))
                    .collect::<Map<String, Value>>(),
                log.access_log.values().map(Vec::len).sum::<usize>(),
                log.access_log.len(),
            )
        };

        let collection_stats = self.analyze_collection_usage(cutoff).await?;

        let mut results = json!({
            "summary": {
                "total_accesses": total_accesses,
                "unique_documents": unique_documents,
                "operations": operations,
            },
            "access_patterns": access_stats,
            "temporal_patterns": temporal,
            "collection_usage": collection_stats,
        });

        if include_patterns {
            results["recommendations"] = json!(recommendations(
                &results["access_patterns"],
                &results["collection_usage"],
            ));
        }

        Ok(results)
    }

    /// Joins accessed documents to their collection labels through a
    /// projected scan and aggregates per-collection activity.
    async fn analyze_collection_usage(&self, cutoff: Option<DateTime<Utc>>) -> Result<Value> {
        let accessed: ahash::AHashMap<String, usize> = {
            let log = lock(&self.log);
            log.access_log
                .iter()
                .map(|(id, accesses)| {
                    let count = match cutoff {
                        Some(c) => accesses.iter().filter(|a| **a >= c).count(),
                        None => accesses.len(),
                    };
                    (id.clone(), count)
                })
                .filter(|(_, count)| *count > 0)
                .collect()
        };
        if accessed.is_empty() {
            return Ok(json!({}));
        }

        let batches = self
            .dataset
            .scan(ScanRequest {
                columns: Projection {
                    collection: true,
                    ..Projection::ids_only()
                },
                ..ScanRequest::default()
            })
            .await?;

        let mut collection_accesses: ahash::AHashMap<String, usize> = ahash::AHashMap::new();
        let mut collection_docs: ahash::AHashMap<String, usize> = ahash::AHashMap::new();
        for batch in batches {
            let Some(collections) = &batch.collections else {
                continue;
            };
            for (id, collection) in batch.ids.iter().zip(collections.iter()) {
                let (Some(count), Some(collection)) =
                    (accessed.get(&id.to_string()), collection.as_ref())
                else {
                    continue;
                };
                *collection_accesses.entry(collection.clone()).or_default() += count;
                *collection_docs.entry(collection.clone()).or_default() += 1;
            }
        }
        if collection_accesses.is_empty() {
            return Ok(json!({}));
        }

        let mut sorted: Vec<(String, usize)> = collection_accesses.into_iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(json!({
            "most_accessed": sorted
                .iter()
                .take(TOP_LIMIT)
                .map(|(collection, count)| json!({
                    "collection": collection,
                    "access_count": count,
                    "unique_documents": collection_docs.get(collection).copied().unwrap_or(0),
                }))
                .collect::<Vec<_>>(),
            "total_collections": sorted.len(),
        }))
    }
}

fn analyze_access_patterns(log: &UsageLog, cutoff: Option<DateTime<Utc>>) -> Value {
    let mut access_counts: Vec<(String, usize)> = log
        .access_log
        .iter()
        .map(|(id, accesses)| {
            let count = match cutoff {
                Some(c) => accesses.iter().filter(|a| **a >= c).count(),
                None => accesses.len(),
            };
            (id.clone(), count)
        })
        .filter(|(_, count)| *count > 0)
        .collect();

    if access_counts.is_empty() {
        return json!({});
    }

    access_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let counts: Vec<f64> = access_counts.iter().map(|(_, c)| *c as f64).collect();

    json!({
        "hot_documents": access_counts
            .iter()
            .take(TOP_LIMIT)
            .map(|(id, count)| json!({"id": id, "access_count": count}))
            .collect::<Vec<_>>(),
        "access_distribution": {
            "mean": round2(mean(&counts)),
            "median": round2(percentile(&counts, 0.5)),
            "p90": round2(percentile(&counts, 0.9)),
            "max": counts.iter().copied().fold(0.0, f64::max) as u64,
        },
        "total_accessed": access_counts.len(),
    })
}

fn analyze_temporal_patterns(
    log: &UsageLog,
    cutoff: Option<DateTime<Utc>>,
    group_by: &str,
) -> Value {
    let mut buckets: std::collections::BTreeMap<DateTime<Utc>, u64> =
        std::collections::BTreeMap::new();
    for accesses in log.access_log.values() {
        for access in accesses {
            if cutoff.is_some_and(|c| *access < c) {
                continue;
            }
            buckets
                .entry(bucket_start(*access, group_by))
                .and_modify(|c| *c += 1)
                .or_insert(1);
        }
    }

    if buckets.is_empty() {
        return json!({});
    }

    let peak = buckets
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(time, _)| time.to_rfc3339());

    json!({
        "time_series": buckets
            .iter()
            .map(|(time, count)| json!({"time": time.to_rfc3339(), "count": count}))
            .collect::<Vec<_>>(),
        "peak_period": peak,
        "total_periods": buckets.len(),
    })
}

fn bucket_start(at: DateTime<Utc>, group_by: &str) -> DateTime<Utc> {
    let truncated = at
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at);
    match group_by {
        "day" => truncated.with_hour(0).unwrap_or(truncated),
        "week" => {
            let day = truncated.with_hour(0).unwrap_or(truncated);
            day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
        }
        _ => truncated,
    }
}

fn recommendations(access_stats: &Value, collection_stats: &Value) -> Vec<String> {
    let mut recommendations = Vec::new();

    if let Some(top) = access_stats["hot_documents"].get(0) {
        let count = top["access_count"].as_u64().unwrap_or(0);
        if count > 100 {
            recommendations.push(format!(
                "Consider caching frequently accessed documents (top document accessed {count} times)"
            ));
        }
    }

    let distribution = &access_stats["access_distribution"];
    if let (Some(max), Some(mean)) = (
        distribution["max"].as_u64(),
        distribution["mean"].as_f64(),
    ) {
        if mean > 0.0 && max as f64 > mean * 10.0 {
            recommendations.push(
                "Highly skewed access pattern detected - consider optimizing for hot path"
                    .to_string(),
            );
        }
    }

    if let Some(top) = collection_stats["most_accessed"].get(0) {
        if let Some(collection) = top["collection"].as_str() {
            recommendations.push(format!(
                "Collection '{collection}' is most active - ensure it has appropriate indices"
            ));
        }
    }

    recommendations
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MemoryDataset;
    use crate::types::FrameRecord;

    async fn analyzer_with_docs() -> (UsageAnalyzer, Vec<String>) {
        let ds = MemoryDataset::new();
        let mut ids = Vec::new();
        for i in 0..3 {
            let r = FrameRecord::new(format!("doc {i}")).with_collection("kb");
            ids.push(r.uuid.to_string());
            ds.add(r).await.unwrap();
        }
        (UsageAnalyzer::new(Arc::new(ds)), ids)
    }

    #[tokio::test]
    async fn test_hot_documents_and_distribution() {
        let (analyzer, ids) = analyzer_with_docs().await;
        for _ in 0..5 {
            analyzer.record_access(&ids[0], "read");
        }
        analyzer.record_access(&ids[1], "read");

        let result = analyzer.analyze(None, "hour", false).await.unwrap();
        assert_eq!(result["summary"]["total_accesses"], 6);
        assert_eq!(result["summary"]["unique_documents"], 2);
        assert_eq!(result["summary"]["operations"]["read"], 6);
        assert_eq!(result["access_patterns"]["hot_documents"][0]["id"], ids[0]);
        assert_eq!(
            result["access_patterns"]["hot_documents"][0]["access_count"],
            5
        );
        assert_eq!(result["access_patterns"]["access_distribution"]["max"], 5);
    }

    #[tokio::test]
    async fn test_collection_join() {
        let (analyzer, ids) = analyzer_with_docs().await;
        analyzer.record_access(&ids[0], "read");
        analyzer.record_access(&ids[1], "search");

        let result = analyzer.analyze(None, "hour", true).await.unwrap();
        let top = &result["collection_usage"]["most_accessed"][0];
        assert_eq!(top["collection"], "kb");
        assert_eq!(top["access_count"], 2);
        assert_eq!(top["unique_documents"], 2);
        // The collection recommendation fires
        assert!(result["recommendations"]
            .as_array()
            .unwrap()
            .iter()
            .any(|r| r.as_str().unwrap().contains("'kb'")));
    }

    #[tokio::test]
    async fn test_empty_log_yields_empty_sections() {
        let (analyzer, _) = analyzer_with_docs().await;
        let result = analyzer.analyze(None, "hour", true).await.unwrap();
        assert_eq!(result["summary"]["total_accesses"], 0);
        assert!(result["access_patterns"].as_object().unwrap().is_empty());
        assert!(result["temporal_patterns"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_temporal_bucketing() {
        let (analyzer, ids) = analyzer_with_docs().await;
        analyzer.record_access(&ids[0], "read");
        analyzer.record_access(&ids[0], "read");
        let result = analyzer.analyze(None, "day", false).await.unwrap();
        assert_eq!(result["temporal_patterns"]["total_periods"], 1);
        assert_eq!(result["temporal_patterns"]["time_series"][0]["count"], 2);
    }
}

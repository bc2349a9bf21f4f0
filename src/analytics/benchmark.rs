//! Operation benchmarks.
//!
//! Search and scan run against the real dataset; insert and update are
//! simulated with normal-distributed latencies around documented
//! baselines so benchmarking never mutates the dataset.

use super::{mean, percentile, round2, std_dev};
use crate::dataset::{Dataset, Projection, ScanRequest};
use crate::error::Result;
use chrono::Utc;
use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Vectors sampled for the search benchmark.
const SEARCH_SAMPLE_DOCS: usize = 10;
/// Simulated insert latency baseline (mean ms, std ms).
const INSERT_BASELINE: (f64, f64) = (10.0, 5.0);
/// Simulated update latency baseline (mean ms, std ms).
const UPDATE_BASELINE: (f64, f64) = (15.0, 7.0);
/// Floor for simulated latencies, ms.
const MIN_SIMULATED_MS: f64 = 0.1;
/// Row limits exercised by the scan benchmark.
const SCAN_SIZES: [usize; 3] = [10, 100, 1000];

/// One benchmarkable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BenchOperation {
    Search,
    Insert,
    Update,
    Scan,
}

impl fmt::Display for BenchOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Search => write!(f, "search"),
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Scan => write!(f, "scan"),
        }
    }
}

/// Benchmarks dataset operations.
pub struct PerformanceBenchmark {
    dataset: Arc<dyn Dataset>,
}

impl PerformanceBenchmark {
    #[must_use]
    pub fn new(dataset: Arc<dyn Dataset>) -> Self {
        Self { dataset }
    }

    /// Runs the requested benchmarks.
    pub async fn run(
        &self,
        operations: &[BenchOperation],
        sample_size: usize,
        concurrency: usize,
    ) -> Result<Value> {
        let mut op_results: Map<String, Value> = Map::new();

        for operation in operations {
            let result = match operation {
                BenchOperation::Search => self.benchmark_search(sample_size, concurrency).await?,
                BenchOperation::Insert => {
                    simulate_latencies(sample_size, INSERT_BASELINE, "insert (simulated)")
                }
                BenchOperation::Update => {
                    simulate_latencies(sample_size, UPDATE_BASELINE, "update (simulated)")
                }
                BenchOperation::Scan => self.benchmark_scan(sample_size).await?,
            };
            op_results.insert(operation.to_string(), result);
        }

        let summary = summarize(&op_results);

        Ok(json!({
            "configuration": {
                "sample_size": sample_size,
                "concurrency": concurrency,
                "timestamp": Utc::now().to_rfc3339(),
            },
            "operations": op_results,
            "summary": summary,
        }))
    }

    /// Real KNN searches over vectors sampled from the dataset.
    async fn benchmark_search(&self, sample_size: usize, concurrency: usize) -> Result<Value> {
        // Sample documents that carry a vector
        let batches = self
            .dataset
            .scan(ScanRequest {
                columns: Projection::ids_only(),
                filter: Some("embedding IS NOT NULL".to_string()),
                limit: Some(SEARCH_SAMPLE_DOCS),
                ..ScanRequest::default()
            })
            .await?;
        let mut vectors: Vec<Vec<f32>> = Vec::new();
        for batch in &batches {
            for id in &batch.ids {
                if let Some(record) = self.dataset.get_by_uuid(*id).await? {
                    if let Some(embedding) = record.embedding {
                        vectors.push(embedding);
                    }
                }
            }
        }
        if vectors.is_empty() {
            return Ok(json!({"error": "No documents with embeddings found"}));
        }

        let concurrency = concurrency.max(1);
        let mut latencies: Vec<f64> = Vec::with_capacity(sample_size);
        let mut remaining = sample_size;
        while remaining > 0 {
            let wave = remaining.min(concurrency);
            let mut joinset = tokio::task::JoinSet::new();
            for _ in 0..wave {
                let index = rand::rng().random_range(0..vectors.len());
                let vector = vectors[index].clone();
                let dataset = Arc::clone(&self.dataset);
                joinset.spawn(async move {
                    let start = Instant::now();
                    let result = dataset.knn_search(&vector, 10, None).await;
                    result.map(|_| start.elapsed().as_secs_f64() * 1000.0)
                });
            }
            while let Some(outcome) = joinset.join_next().await {
                if let Ok(Ok(latency)) = outcome {
                    latencies.push(latency);
                }
            }
            remaining -= wave;
        }

        if latencies.is_empty() {
            return Ok(json!({"error": "No successful search operations"}));
        }
        Ok(latency_stats(&latencies, "search"))
    }

    /// Timed projected scans at the fixed size ladder.
    async fn benchmark_scan(&self, sample_size: usize) -> Result<Value> {
        let per_size = (sample_size / SCAN_SIZES.len()).max(1);
        let mut latencies = Vec::new();
        for size in SCAN_SIZES {
            for _ in 0..per_size {
                let start = Instant::now();
                let batches = self
                    .dataset
                    .scan(ScanRequest {
                        columns: Projection::ids_only(),
                        limit: Some(size),
                        ..ScanRequest::default()
                    })
                    .await?;
                let _rows: usize = batches.iter().map(crate::dataset::ColumnBatch::len).sum();
                latencies.push(start.elapsed().as_secs_f64() * 1000.0);
            }
        }
        Ok(latency_stats(&latencies, "scan"))
    }
}

/// Normal deviates around a documented baseline, floored at
/// [`MIN_SIMULATED_MS`]. Box-Muller transform over the thread RNG.
fn simulate_latencies(sample_size: usize, baseline: (f64, f64), label: &str) -> Value {
    let (base, variance) = baseline;
    let mut rng = rand::rng();
    let latencies: Vec<f64> = (0..sample_size)
        .map(|_| {
            let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
            let u2: f64 = rng.random();
            let gauss = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
            (base + variance * gauss).max(MIN_SIMULATED_MS)
        })
        .collect();
    latency_stats(&latencies, label)
}

fn latency_stats(latencies: &[f64], operation: &str) -> Value {
    let mean_ms = mean(latencies);
    json!({
        "operation": operation,
        "sample_count": latencies.len(),
        "latency_ms": {
            "min": round2(latencies.iter().copied().fold(f64::INFINITY, f64::min)),
            "p50": round2(percentile(latencies, 0.50)),
            "p90": round2(percentile(latencies, 0.90)),
            "p99": round2(percentile(latencies, 0.99)),
            "max": round2(latencies.iter().copied().fold(0.0, f64::max)),
            "mean": round2(mean_ms),
            "std": round2(std_dev(latencies)),
        },
        "throughput_ops_per_sec": if mean_ms > 0.0 { (1000.0 / mean_ms * 10.0).round() / 10.0 } else { 0.0 },
    })
}

fn summarize(operations: &Map<String, Value>) -> Value {
    let mut means: Vec<(&str, f64)> = operations
        .iter()
        .filter_map(|(name, result)| {
            result["latency_ms"]["mean"]
                .as_f64()
                .map(|mean| (name.as_str(), mean))
        })
        .collect();
    if means.is_empty() {
        return json!({
            "fastest_operation": null,
            "slowest_operation": null,
            "performance_score": 0.0,
        });
    }
    means.sort_by(|a, b| a.1.total_cmp(&b.1));
    let score = means.iter().map(|(_, m)| m).sum::<f64>() / means.len() as f64;
    json!({
        "fastest_operation": [means[0].0, means[0].1],
        "slowest_operation": [means[means.len() - 1].0, means[means.len() - 1].1],
        "performance_score": round2(score),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MemoryDataset;
    use crate::types::FrameRecord;

    async fn dataset_with_vectors(rows: usize) -> Arc<dyn Dataset> {
        let ds = MemoryDataset::new();
        for i in 0..rows {
            ds.add(
                FrameRecord::new(format!("doc {i}"))
                    .with_embedding(vec![i as f32, 1.0, 2.0]),
            )
            .await
            .unwrap();
        }
        Arc::new(ds)
    }

    #[tokio::test]
    async fn test_search_benchmark_shape() {
        let benchmark = PerformanceBenchmark::new(dataset_with_vectors(20).await);
        let result = benchmark
            .run(&[BenchOperation::Search], 12, 4)
            .await
            .unwrap();
        let search = &result["operations"]["search"];
        assert_eq!(search["sample_count"], 12);
        for key in ["min", "p50", "p90", "p99", "max", "mean", "std"] {
            assert!(search["latency_ms"][key].is_number(), "missing {key}");
        }
        assert!(search["throughput_ops_per_sec"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_search_without_vectors_reports_error() {
        let ds = MemoryDataset::new();
        ds.add(FrameRecord::new("no vector")).await.unwrap();
        let benchmark = PerformanceBenchmark::new(Arc::new(ds));
        let result = benchmark.run(&[BenchOperation::Search], 5, 1).await.unwrap();
        assert!(result["operations"]["search"]["error"]
            .as_str()
            .unwrap()
            .contains("embeddings"));
    }

    #[tokio::test]
    async fn test_simulated_ops_do_not_mutate() {
        let dataset = dataset_with_vectors(5).await;
        let rows_before = dataset.count_rows(None).await.unwrap();
        let version_before = dataset.current_version().await.unwrap();

        let benchmark = PerformanceBenchmark::new(Arc::clone(&dataset));
        let result = benchmark
            .run(&[BenchOperation::Insert, BenchOperation::Update], 50, 1)
            .await
            .unwrap();

        assert_eq!(dataset.count_rows(None).await.unwrap(), rows_before);
        assert_eq!(dataset.current_version().await.unwrap(), version_before);

        // Simulated latencies respect the floor
        let min = result["operations"]["insert"]["latency_ms"]["min"]
            .as_f64()
            .unwrap();
        assert!(min >= MIN_SIMULATED_MS);
        assert_eq!(result["operations"]["update"]["operation"], "update (simulated)");
    }

    #[tokio::test]
    async fn test_summary_orders_operations() {
        let benchmark = PerformanceBenchmark::new(dataset_with_vectors(10).await);
        let result = benchmark
            .run(&[BenchOperation::Scan, BenchOperation::Update], 9, 1)
            .await
            .unwrap();
        let summary = &result["summary"];
        assert!(summary["fastest_operation"].is_array());
        assert!(summary["slowest_operation"].is_array());
        let fastest = summary["fastest_operation"][1].as_f64().unwrap();
        let slowest = summary["slowest_operation"][1].as_f64().unwrap();
        assert!(fastest <= slowest);
    }
}

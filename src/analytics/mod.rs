//! Analytics subsystem: dataset statistics, query/usage/relationship
//! analysis, storage optimization, index advice, and benchmarks.
//!
//! Everything here is computed on demand from the dataset façade and the
//! recorded event logs; derived results have no persistent identity.

pub mod benchmark;
pub mod optimizer;
pub mod queries;
pub mod relationships;
pub mod stats;
pub mod usage;

pub use benchmark::{BenchOperation, PerformanceBenchmark};
pub use optimizer::{IndexAdvisor, OptimizeOperation, StorageOptimizer, WorkloadType};
pub use queries::{QueryAnalyzer, QueryExecution, QueryType};
pub use relationships::RelationshipAnalyzer;
pub use stats::{DatasetStats, StatsCollector, StatsOptions};
pub use usage::UsageAnalyzer;

use crate::dataset::Dataset;
use std::sync::Arc;

/// The analytics components, bundled for the server.
pub struct Analytics {
    pub stats: StatsCollector,
    pub queries: QueryAnalyzer,
    pub usage: UsageAnalyzer,
    pub relationships: RelationshipAnalyzer,
    pub optimizer: StorageOptimizer,
    pub advisor: IndexAdvisor,
    pub benchmark: PerformanceBenchmark,
}

impl Analytics {
    /// Wires every analytics component to the same dataset.
    #[must_use]
    pub fn new(dataset: Arc<dyn Dataset>) -> Self {
        Self {
            stats: StatsCollector::new(Arc::clone(&dataset)),
            queries: QueryAnalyzer::default(),
            usage: UsageAnalyzer::new(Arc::clone(&dataset)),
            relationships: RelationshipAnalyzer::new(Arc::clone(&dataset)),
            optimizer: StorageOptimizer::new(Arc::clone(&dataset)),
            advisor: IndexAdvisor::new(Arc::clone(&dataset)),
            benchmark: PerformanceBenchmark::new(dataset),
        }
    }
}

/// Nearest-rank percentile over an unsorted sample. `p` in [0, 1].
#[must_use]
pub(crate) fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let index = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[index]
}

#[must_use]
pub(crate) fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

#[must_use]
pub(crate) fn std_dev(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let m = mean(samples);
    let variance = samples.iter().map(|s| (s - m).powi(2)).sum::<f64>() / samples.len() as f64;
    variance.sqrt()
}

/// Rounds to two decimal places for report output.
#[must_use]
pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

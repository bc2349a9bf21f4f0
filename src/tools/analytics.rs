//! Analytics tools: statistics, analyzers, optimizer, advisor, benchmarks.

use crate::analytics::{
    BenchOperation, IndexAdvisor, OptimizeOperation, PerformanceBenchmark, QueryAnalyzer,
    QueryType, RelationshipAnalyzer, StatsCollector, StatsOptions, StorageOptimizer, UsageAnalyzer,
    WorkloadType,
};
use crate::error::Result;
use crate::validation::ValidationReport;
use chrono::{Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_true() -> bool {
    true
}

fn default_time_range() -> String {
    "7d".to_string()
}

fn default_group_by() -> String {
    "hour".to_string()
}

const fn default_max_depth() -> usize {
    3
}

fn default_optimize_ops() -> Vec<OptimizeOperation> {
    vec![OptimizeOperation::Compact, OptimizeOperation::Vacuum]
}

fn default_bench_ops() -> Vec<BenchOperation> {
    vec![BenchOperation::Search, BenchOperation::Scan]
}

const fn default_bench_sample_size() -> usize {
    100
}

const fn default_bench_concurrency() -> usize {
    1
}

/// Parses a `"7d"` / `"24h"` / `"2w"` period string.
fn parse_time_range(raw: &str) -> Result<Duration> {
    let (digits, unit) = raw.split_at(raw.len().saturating_sub(1));
    let count: i64 = digits.parse().map_err(|_| {
        ValidationReport::single(
            "time_range",
            format!("'{raw}' is not a valid period"),
            "Use <count><unit> with unit h, d, or w, e.g. '24h' or '7d'.",
        )
    })?;
    match unit {
        "h" => Ok(Duration::hours(count)),
        "d" => Ok(Duration::days(count)),
        "w" => Ok(Duration::weeks(count)),
        _ => Err(ValidationReport::single(
            "time_range",
            format!("'{raw}' has an unknown unit"),
            "Use <count><unit> with unit h, d, or w, e.g. '24h' or '7d'.",
        )
        .into()),
    }
}

// ─── get_dataset_stats ───────────────────────────────────────────────────────

/// Input for the `get_dataset_stats` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DatasetStatsInput {
    /// Include content and relationship analysis (default: true)
    #[serde(default = "default_true")]
    pub include_details: bool,
    /// Include fragment-level statistics (default: true)
    #[serde(default = "default_true")]
    pub include_fragments: bool,
    /// Sample size for expensive scans; omitted means full scan
    pub sample_size: Option<usize>,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `get_dataset_stats` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct DatasetStatsOutput {
    /// The statistics snapshot
    pub stats: Value,
    /// When the snapshot was taken
    pub timestamp: String,
}

/// Executes the `get_dataset_stats` tool.
pub async fn execute_dataset_stats(
    collector: &StatsCollector,
    input: DatasetStatsInput,
) -> Result<DatasetStatsOutput> {
    let stats = collector
        .collect(StatsOptions {
            include_content: input.include_details,
            include_fragments: input.include_fragments,
            include_relationships: input.include_details,
            sample_size: input.sample_size,
        })
        .await?;
    Ok(DatasetStatsOutput {
        stats: stats.to_value(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

// ─── analyze_usage ───────────────────────────────────────────────────────────

/// Input for the `analyze_usage` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AnalyzeUsageInput {
    /// Analysis period, e.g. '7d', '24h', '2w' (default: 7d)
    #[serde(default = "default_time_range")]
    pub time_range: String,
    /// Temporal bucketing: hour, day, or week (default: hour)
    #[serde(default = "default_group_by")]
    pub group_by: String,
    /// Include pattern analysis and recommendations (default: true)
    #[serde(default = "default_true")]
    pub include_patterns: bool,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `analyze_usage` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct AnalyzeUsageOutput {
    /// The usage analysis
    pub analysis: Value,
    /// Period that was analyzed
    pub period: String,
    /// When the analysis ran
    pub timestamp: String,
}

/// Executes the `analyze_usage` tool.
pub async fn execute_analyze_usage(
    analyzer: &UsageAnalyzer,
    input: AnalyzeUsageInput,
) -> Result<AnalyzeUsageOutput> {
    let time_range = parse_time_range(&input.time_range)?;
    let analysis = analyzer
        .analyze(Some(time_range), &input.group_by, input.include_patterns)
        .await?;
    Ok(AnalyzeUsageOutput {
        analysis,
        period: input.time_range,
        timestamp: Utc::now().to_rfc3339(),
    })
}

// ─── query_performance ───────────────────────────────────────────────────────

/// Input for the `query_performance` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QueryPerformanceInput {
    /// Analysis period, e.g. '7d', '24h' (default: 7d)
    #[serde(default = "default_time_range")]
    pub time_range: String,
    /// Restrict to one query type
    pub query_type: Option<QueryType>,
    /// Only include queries at least this slow, in ms (default: 0)
    #[serde(default)]
    pub min_duration_ms: f64,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `query_performance` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct QueryPerformanceOutput {
    /// The performance analysis
    pub performance: Value,
    /// Period that was analyzed
    pub period: String,
    /// When the analysis ran
    pub timestamp: String,
}

/// Executes the `query_performance` tool.
pub fn execute_query_performance(
    analyzer: &QueryAnalyzer,
    input: QueryPerformanceInput,
) -> Result<QueryPerformanceOutput> {
    let time_range = parse_time_range(&input.time_range)?;
    let performance = analyzer.analyze(Some(time_range), input.query_type, input.min_duration_ms);
    Ok(QueryPerformanceOutput {
        performance,
        period: input.time_range,
        timestamp: Utc::now().to_rfc3339(),
    })
}

// ─── relationship_analysis ───────────────────────────────────────────────────

/// Input for the `relationship_analysis` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RelationshipAnalysisInput {
    /// Maximum traversal depth for cycle search (default: 3, max: 10)
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Relationship types to include (default: all)
    pub relationship_types: Option<Vec<String>>,
    /// Include orphaned documents (default: true)
    #[serde(default = "default_true")]
    pub include_orphans: bool,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `relationship_analysis` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct RelationshipAnalysisOutput {
    /// The graph analysis
    pub analysis: Value,
    /// When the analysis ran
    pub timestamp: String,
}

/// Executes the `relationship_analysis` tool.
pub async fn execute_relationship_analysis(
    analyzer: &RelationshipAnalyzer,
    input: RelationshipAnalysisInput,
) -> Result<RelationshipAnalysisOutput> {
    if input.max_depth == 0 || input.max_depth > 10 {
        return Err(ValidationReport::single(
            "max_depth",
            format!("{} is out of range", input.max_depth),
            "max_depth must be between 1 and 10.",
        )
        .into());
    }
    let analysis = analyzer
        .analyze(
            input.max_depth,
            input.relationship_types.as_deref(),
            input.include_orphans,
        )
        .await?;
    Ok(RelationshipAnalysisOutput {
        analysis,
        timestamp: Utc::now().to_rfc3339(),
    })
}

// ─── optimize_storage ────────────────────────────────────────────────────────

/// Input for the `optimize_storage` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct OptimizeStorageInput {
    /// Operations to run, in order (default: compact, vacuum)
    #[serde(default = "default_optimize_ops")]
    pub operations: Vec<OptimizeOperation>,
    /// Preview changes without applying them (default: true)
    #[serde(default = "default_true")]
    pub dry_run: bool,
    /// Version to vacuum back to; omitted uses the 7-day window
    pub target_version: Option<u64>,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `optimize_storage` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct OptimizeStorageOutput {
    /// Per-operation results plus totals
    pub results: Value,
    /// Whether this was a preview
    pub dry_run: bool,
    /// When the optimization ran
    pub timestamp: String,
}

/// Executes the `optimize_storage` tool.
pub async fn execute_optimize_storage(
    optimizer: &StorageOptimizer,
    input: OptimizeStorageInput,
) -> Result<OptimizeStorageOutput> {
    let results = optimizer
        .optimize(&input.operations, input.dry_run, input.target_version)
        .await?;
    Ok(OptimizeStorageOutput {
        results,
        dry_run: input.dry_run,
        timestamp: Utc::now().to_rfc3339(),
    })
}

// ─── index_recommendations ───────────────────────────────────────────────────

/// Input for the `index_recommendations` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct IndexRecommendationsInput {
    /// Fold recorded query patterns into the advice (default: true)
    #[serde(default = "default_true")]
    pub analyze_queries: bool,
    /// Workload profile: search, analytics, or mixed (default: mixed)
    #[serde(default)]
    pub workload_type: WorkloadType,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `index_recommendations` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct IndexRecommendationsOutput {
    /// Current indices, recommendations, redundancies, coverage
    pub recommendations: Value,
    /// Workload the advice targets
    pub workload_type: WorkloadType,
    /// When the advice was computed
    pub timestamp: String,
}

/// Executes the `index_recommendations` tool.
pub async fn execute_index_recommendations(
    advisor: &IndexAdvisor,
    input: IndexRecommendationsInput,
) -> Result<IndexRecommendationsOutput> {
    let recommendations = advisor
        .recommendations(input.analyze_queries, input.workload_type)
        .await?;
    Ok(IndexRecommendationsOutput {
        recommendations,
        workload_type: input.workload_type,
        timestamp: Utc::now().to_rfc3339(),
    })
}

// ─── benchmark_operations ────────────────────────────────────────────────────

/// Input for the `benchmark_operations` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkOperationsInput {
    /// Operations to benchmark (default: search, scan)
    #[serde(default = "default_bench_ops")]
    pub operations: Vec<BenchOperation>,
    /// Measurements per operation, 1..=10000 (default: 100)
    #[serde(default = "default_bench_sample_size")]
    pub sample_size: usize,
    /// Concurrent operations per wave, 1..=100 (default: 1)
    #[serde(default = "default_bench_concurrency")]
    pub concurrency: usize,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `benchmark_operations` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct BenchmarkOperationsOutput {
    /// Per-operation latency statistics and summary
    pub benchmarks: Value,
    /// When the benchmarks ran
    pub timestamp: String,
}

/// Executes the `benchmark_operations` tool.
pub async fn execute_benchmark_operations(
    benchmark: &PerformanceBenchmark,
    input: BenchmarkOperationsInput,
) -> Result<BenchmarkOperationsOutput> {
    if input.sample_size == 0 || input.sample_size > 10_000 {
        return Err(ValidationReport::single(
            "sample_size",
            format!("{} is out of range", input.sample_size),
            "sample_size must be between 1 and 10000.",
        )
        .into());
    }
    if input.concurrency == 0 || input.concurrency > 100 {
        return Err(ValidationReport::single(
            "concurrency",
            format!("{} is out of range", input.concurrency),
            "concurrency must be between 1 and 100.",
        )
        .into());
    }

    let benchmarks = benchmark
        .run(&input.operations, input.sample_size, input.concurrency)
        .await?;
    Ok(BenchmarkOperationsOutput {
        benchmarks,
        timestamp: Utc::now().to_rfc3339(),
    })
}

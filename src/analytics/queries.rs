//! Query pattern and performance analysis.
//!
//! Keeps a bounded ring of recent query executions and derives duration
//! percentiles, per-type statistics, slow-query hints, and filter-field
//! frequency on demand.

use super::{mean, percentile, round2};
use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Default query-history ring capacity.
const DEFAULT_MAX_HISTORY: usize = 10_000;
/// Slow queries reported per analysis.
const SLOW_QUERY_LIMIT: usize = 10;

/// Kind of a recorded query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Vector,
    Text,
    Hybrid,
    Filter,
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vector => write!(f, "vector"),
            Self::Text => write!(f, "text"),
            Self::Hybrid => write!(f, "hybrid"),
            Self::Filter => write!(f, "filter"),
        }
    }
}

/// One recorded query execution.
#[derive(Debug, Clone)]
pub struct QueryExecution {
    pub query_type: QueryType,
    pub query_text: Option<String>,
    pub filter_expression: Option<String>,
    pub duration_ms: f64,
    pub rows_scanned: u64,
    pub rows_returned: u64,
    pub index_used: bool,
    pub timestamp: DateTime<Utc>,
}

impl QueryExecution {
    fn to_value(&self) -> Value {
        json!({
            "type": self.query_type.to_string(),
            "query": self.query_text,
            "filter": self.filter_expression,
            "duration_ms": round2(self.duration_ms),
            "rows_scanned": self.rows_scanned,
            "rows_returned": self.rows_returned,
            "index_used": self.index_used,
            "timestamp": self.timestamp.to_rfc3339(),
        })
    }
}

/// Analyzes recorded query executions.
pub struct QueryAnalyzer {
    history: Mutex<VecDeque<QueryExecution>>,
    max_history: usize,
}

impl Default for QueryAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl QueryAnalyzer {
    #[must_use]
    pub fn new(max_history: usize) -> Self {
        Self {
            history: Mutex::new(VecDeque::new()),
            max_history: max_history.max(1),
        }
    }

    /// Records one execution, dropping the oldest past capacity.
    pub fn record(&self, execution: QueryExecution) {
        let mut history = lock(&self.history);
        if history.len() >= self.max_history {
            history.pop_front();
        }
        history.push_back(execution);
    }

    /// Number of recorded executions.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.history).len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.history).is_empty()
    }

    /// Analyzes recorded executions within the given constraints.
    #[must_use]
    pub fn analyze(
        &self,
        time_range: Option<Duration>,
        query_type: Option<QueryType>,
        min_duration_ms: f64,
    ) -> Value {
        let history = lock(&self.history);
        let cutoff = time_range.map(|range| Utc::now() - range);
        let queries: Vec<&QueryExecution> = history
            .iter()
            .filter(|q| cutoff.is_none_or(|c| q.timestamp >= c))
            .filter(|q| query_type.is_none_or(|t| q.query_type == t))
            .filter(|q| q.duration_ms >= min_duration_ms)
            .collect();

        if queries.is_empty() {
            return json!({"message": "No queries match the criteria"});
        }

        let durations: Vec<f64> = queries.iter().map(|q| q.duration_ms).collect();
        let rows_scanned: Vec<f64> = queries.iter().map(|q| q.rows_scanned as f64).collect();

        // Per-type breakdown
        let mut by_type: Map<String, Value> = Map::new();
        for type_name in ["vector", "text", "hybrid", "filter"] {
            let of_type: Vec<&&QueryExecution> = queries
                .iter()
                .filter(|q| q.query_type.to_string() == type_name)
                .collect();
            if of_type.is_empty() {
                continue;
            }
            let type_durations: Vec<f64> = of_type.iter().map(|q| q.duration_ms).collect();
            let index_used = of_type.iter().filter(|q| q.index_used).count();
            by_type.insert(
                type_name.to_string(),
                json!({
                    "count": of_type.len(),
                    "avg_duration_ms": round2(mean(&type_durations)),
                    "index_usage_rate": index_used as f64 / of_type.len() as f64,
                }),
            );
        }

        // Slowest queries with hints
        let mut slowest: Vec<&QueryExecution> = queries.clone();
        slowest.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
        let slow_queries: Vec<Value> = slowest
            .iter()
            .take(SLOW_QUERY_LIMIT)
            .map(|q| {
                json!({
                    "query": q.to_value(),
                    "optimization_hints": optimization_hints(q),
                })
            })
            .collect();

        // Filter field frequency from `field = ...` patterns
        let mut filter_patterns: Map<String, Value> = Map::new();
        for q in &queries {
            if let Some(filter) = &q.filter_expression {
                if let Some((field, _)) = filter.split_once('=') {
                    let field = field.trim().to_string();
                    let count = filter_patterns
                        .get(&field)
                        .and_then(Value::as_u64)
                        .unwrap_or(0);
                    filter_patterns.insert(field, json!(count + 1));
                }
            }
        }

        json!({
            "summary": {
                "total_queries": queries.len(),
                "avg_duration_ms": round2(mean(&durations)),
                "p50_duration_ms": round2(percentile(&durations, 0.50)),
                "p90_duration_ms": round2(percentile(&durations, 0.90)),
                "p99_duration_ms": round2(percentile(&durations, 0.99)),
                "max_duration_ms": round2(durations.iter().copied().fold(0.0, f64::max)),
                "avg_rows_scanned": mean(&rows_scanned).round(),
            },
            "by_type": by_type,
            "slow_queries": slow_queries,
            "filter_patterns": filter_patterns,
        })
    }
}

/// The four slow-query heuristics.
fn optimization_hints(query: &QueryExecution) -> Vec<String> {
    let mut hints = Vec::new();

    if !query.index_used && matches!(query.query_type, QueryType::Vector | QueryType::Text) {
        hints.push(format!("Consider creating a {} index", query.query_type));
    }

    if query.rows_scanned > 0 && query.rows_returned > 0 {
        let selectivity = query.rows_returned as f64 / query.rows_scanned as f64;
        if selectivity < 0.01 {
            hints.push("Very low selectivity - consider more specific filters".to_string());
        }
    }

    if query.duration_ms > 1000.0 {
        hints.push("Query taking over 1 second - review query complexity".to_string());
    }

    if query
        .filter_expression
        .as_deref()
        .is_some_and(|f| f.contains("OR"))
    {
        hints.push("OR conditions can be slow - consider using IN operator".to_string());
    }

    hints
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

//! Usage tracking for documents and queries.
//!
//! Keeps O(1)-update caches keyed by document id and by
//! `(query_type, truncated query)`. Entries carry no TTL; they fall out
//! of a report when their last-touch timestamp predates the window.

use super::collector::MetricsCollector;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Queries are truncated to this many bytes for cache keys and reports.
const QUERY_KEY_LEN: usize = 100;

/// Statistics for one recurring query.
#[derive(Debug, Clone)]
pub struct QueryStats {
    pub query: String,
    pub query_type: String,
    pub count: u64,
    pub total_results: u64,
    pub avg_execution_time_ms: f64,
    pub success_rate: f64,
}

/// Statistics for one document's accesses.
#[derive(Debug, Clone)]
pub struct DocumentStats {
    pub document_id: String,
    pub access_count: u64,
    pub search_appearances: u64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub access_by_operation: HashMap<String, u64>,
}

/// Aggregated usage over a reporting window.
#[derive(Debug, Clone)]
pub struct UsageStats {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_queries: u64,
    pub total_document_accesses: u64,
    pub unique_documents_accessed: usize,
    pub unique_agents: usize,
    pub queries_by_type: HashMap<String, u64>,
    pub top_documents: Vec<DocumentStats>,
    pub top_queries: Vec<QueryStats>,
    pub access_patterns: Value,
}

/// Counts of tracked cache entries, for the status tool.
#[derive(Debug, Clone, Copy)]
pub struct ActivityCounts {
    pub queries: usize,
    pub documents: usize,
    pub agents: usize,
}

#[derive(Default)]
struct UsageState {
    document_cache: HashMap<String, DocumentStats>,
    query_cache: HashMap<String, QueryStats>,
    agent_activity: HashMap<String, DateTime<Utc>>,
}

/// Tracks document access patterns and query statistics on top of the
/// metrics collector.
pub struct UsageTracker {
    collector: Arc<MetricsCollector>,
    state: Mutex<UsageState>,
}

impl UsageTracker {
    #[must_use]
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self {
            collector,
            state: Mutex::new(UsageState::default()),
        }
    }

    /// Records one document access event.
    pub fn track_document_access(
        &self,
        document_id: &str,
        operation: &str,
        agent_id: Option<&str>,
        metadata: Option<Value>,
    ) {
        {
            let mut state = lock(&self.state);
            let stats = state
                .document_cache
                .entry(document_id.to_string())
                .or_insert_with(|| DocumentStats {
                    document_id: document_id.to_string(),
                    access_count: 0,
                    search_appearances: 0,
                    last_accessed: None,
                    access_by_operation: HashMap::new(),
                });
            stats.access_count += 1;
            stats.last_accessed = Some(Utc::now());
            *stats
                .access_by_operation
                .entry(operation.to_string())
                .or_default() += 1;
            if operation == "search_hit" {
                stats.search_appearances += 1;
            }
            if let Some(agent) = agent_id {
                state.agent_activity.insert(agent.to_string(), Utc::now());
            }
        }

        self.collector.record_usage(
            "document_access",
            document_id,
            operation,
            1.0,
            agent_id,
            metadata,
        );
    }

    /// Records one query execution, updating the incremental mean and
    /// success rate in O(1).
    #[allow(clippy::too_many_arguments)]
    pub fn track_query(
        &self,
        query: &str,
        query_type: &str,
        result_count: u64,
        execution_time_ms: f64,
        agent_id: Option<&str>,
        success: bool,
        metadata: Option<Value>,
    ) {
        let truncated = truncate(query, QUERY_KEY_LEN);
        {
            let mut state = lock(&self.state);
            let key = format!("{query_type}:{truncated}");
            let stats = state.query_cache.entry(key).or_insert_with(|| QueryStats {
                query: truncated.clone(),
                query_type: query_type.to_string(),
                count: 0,
                total_results: 0,
                avg_execution_time_ms: 0.0,
                success_rate: 1.0,
            });
            stats.count += 1;
            stats.total_results += result_count;
            let prev_total = stats.avg_execution_time_ms * (stats.count - 1) as f64;
            stats.avg_execution_time_ms = (prev_total + execution_time_ms) / stats.count as f64;
            if !success {
                let prev_successes = stats.success_rate * (stats.count - 1) as f64;
                stats.success_rate = prev_successes / stats.count as f64;
            }
            if let Some(agent) = agent_id {
                state.agent_activity.insert(agent.to_string(), Utc::now());
            }
        }

        let mut meta = json!({
            "query": truncated,
            "execution_time_ms": execution_time_ms,
            "success": success,
        });
        if let (Some(obj), Some(extra)) = (meta.as_object_mut(), metadata.as_ref().and_then(Value::as_object)) {
            for (k, v) in extra {
                obj.insert(k.clone(), v.clone());
            }
        }
        self.collector.record_usage(
            "query",
            query_type,
            "execute",
            result_count as f64,
            agent_id,
            Some(meta),
        );
    }

    /// Aggregated usage for a window. `group_by` picks the temporal
    /// bucketing of `access_patterns` (hour or day).
    #[must_use]
    pub fn usage_stats(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: &str,
    ) -> UsageStats {
        let state = lock(&self.state);

        let mut total_document_accesses = 0;
        let mut accessed = 0usize;
        for stats in state.document_cache.values() {
            if let Some(last) = stats.last_accessed {
                if last >= start && last <= end {
                    accessed += 1;
                    total_document_accesses += stats.access_count;
                }
            }
        }

        let mut top_documents: Vec<DocumentStats> =
            state.document_cache.values().cloned().collect();
        top_documents.sort_by(|a, b| b.access_count.cmp(&a.access_count));
        top_documents.truncate(10);

        let mut total_queries = 0;
        let mut queries_by_type: HashMap<String, u64> = HashMap::new();
        for stats in state.query_cache.values() {
            total_queries += stats.count;
            *queries_by_type.entry(stats.query_type.clone()).or_default() += stats.count;
        }

        let mut top_queries: Vec<QueryStats> = state.query_cache.values().cloned().collect();
        top_queries.sort_by(|a, b| b.count.cmp(&a.count));
        top_queries.truncate(10);

        let unique_agents = state
            .agent_activity
            .values()
            .filter(|t| **t >= start && **t <= end)
            .count();

        let access_patterns = temporal_skeleton(start, end, group_by);

        UsageStats {
            period_start: start,
            period_end: end,
            total_queries,
            total_document_accesses,
            unique_documents_accessed: accessed,
            unique_agents,
            queries_by_type,
            top_documents,
            top_queries,
            access_patterns,
        }
    }

    /// Usage stats for a single document, if it has been accessed.
    #[must_use]
    pub fn document_usage(&self, document_id: &str) -> Option<DocumentStats> {
        lock(&self.state).document_cache.get(document_id).cloned()
    }

    /// Most-executed queries, optionally filtered by type.
    #[must_use]
    pub fn query_performance(&self, query_type: Option<&str>, limit: usize) -> Vec<QueryStats> {
        let state = lock(&self.state);
        let mut queries: Vec<QueryStats> = state
            .query_cache
            .values()
            .filter(|q| query_type.is_none_or(|t| q.query_type == t))
            .cloned()
            .collect();
        queries.sort_by(|a, b| b.count.cmp(&a.count));
        queries.truncate(limit);
        queries
    }

    /// Cache entry counts for the status tool.
    #[must_use]
    pub fn activity_counts(&self) -> ActivityCounts {
        let state = lock(&self.state);
        ActivityCounts {
            queries: state.query_cache.len(),
            documents: state.document_cache.len(),
            agents: state.agent_activity.len(),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Pre-populated temporal bucket map for the reporting window.
fn temporal_skeleton(start: DateTime<Utc>, end: DateTime<Utc>, group_by: &str) -> Value {
    let mut patterns = serde_json::Map::new();
    match group_by {
        "day" => {
            let mut current = start
                .with_hour(0)
                .and_then(|t| t.with_minute(0))
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(start);
            while current < end {
                patterns.insert(
                    current.format("%Y-%m-%d").to_string(),
                    json!({"queries": 0, "document_accesses": 0}),
                );
                current += Duration::days(1);
            }
        }
        "week" => {
            let mut current = start
                .with_hour(0)
                .and_then(|t| t.with_minute(0))
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(start);
            current -= Duration::days(i64::from(current.weekday().num_days_from_monday()));
            while current < end {
                patterns.insert(
                    format!("week of {}", current.format("%Y-%m-%d")),
                    json!({"queries": 0, "document_accesses": 0}),
                );
                current += Duration::weeks(1);
            }
        }
        _ => {
            let mut current = start
                .with_minute(0)
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(start);
            while current < end {
                patterns.insert(
                    current.format("%Y-%m-%d %H:00").to_string(),
                    json!({"queries": 0, "document_accesses": 0}),
                );
                current += Duration::hours(1);
            }
        }
    }
    Value::Object(patterns)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitoringConfig;

    fn tracker() -> UsageTracker {
        UsageTracker::new(Arc::new(MetricsCollector::new(
            None,
            MonitoringConfig::default(),
        )))
    }

    #[test]
    fn test_document_access_counts() {
        let tracker = tracker();
        tracker.track_document_access("doc-1", "read", Some("agent-a"), None);
        tracker.track_document_access("doc-1", "search_hit", None, None);
        tracker.track_document_access("doc-2", "read", None, None);

        let doc1 = tracker.document_usage("doc-1").unwrap();
        assert_eq!(doc1.access_count, 2);
        assert_eq!(doc1.search_appearances, 1);
        assert_eq!(doc1.access_by_operation["read"], 1);

        assert!(tracker.document_usage("doc-3").is_none());
    }

    #[test]
    fn test_query_incremental_mean_and_success_rate() {
        let tracker = tracker();
        tracker.track_query("find auth", "text", 5, 10.0, None, true, None);
        tracker.track_query("find auth", "text", 3, 30.0, None, true, None);
        tracker.track_query("find auth", "text", 0, 20.0, None, false, None);

        let queries = tracker.query_performance(Some("text"), 10);
        assert_eq!(queries.len(), 1);
        let q = &queries[0];
        assert_eq!(q.count, 3);
        assert!((q.avg_execution_time_ms - 20.0).abs() < 1e-9);
        assert!((q.success_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_long_query_truncated_to_key() {
        let tracker = tracker();
        let long = "x".repeat(500);
        tracker.track_query(&long, "text", 1, 1.0, None, true, None);
        let queries = tracker.query_performance(None, 10);
        assert_eq!(queries[0].query.len(), 100);
    }

    #[test]
    fn test_usage_stats_window() {
        let tracker = tracker();
        tracker.track_document_access("doc-1", "read", Some("agent-a"), None);
        tracker.track_query("q", "vector", 2, 5.0, Some("agent-b"), true, None);

        let now = Utc::now();
        let stats = tracker.usage_stats(now - Duration::hours(1), now + Duration::minutes(1), "hour");
        assert_eq!(stats.total_queries, 1);
        assert_eq!(stats.total_document_accesses, 1);
        assert_eq!(stats.unique_documents_accessed, 1);
        assert_eq!(stats.unique_agents, 2);
        assert_eq!(stats.queries_by_type["vector"], 1);
        assert!(!stats.access_patterns.as_object().unwrap().is_empty());
    }
}

//! Performance monitoring for MCP operations.
//!
//! Tracks in-flight operations in a single-owner map, folds completed
//! operations into per-type aggregates and bounded response-time sample
//! lists, and snapshots the process every minute into a 24-hour ring.

use super::collector::{MetricsCollector, OperationStatus};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Snapshot interval, seconds.
const SNAPSHOT_INTERVAL_SECS: u64 = 60;
/// 24 hours of snapshots at one per minute.
const MAX_SNAPSHOTS: usize = 1440;
/// Bounded response-time sample list per operation type.
const MAX_RESPONSE_SAMPLES: usize = 1000;

/// Aggregated metrics for one operation type.
#[derive(Debug, Clone)]
pub struct OperationMetrics {
    pub operation_type: String,
    pub count: u64,
    pub total_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub error_count: u64,
    pub timeout_count: u64,
}

impl OperationMetrics {
    fn new(operation_type: &str) -> Self {
        Self {
            operation_type: operation_type.to_string(),
            count: 0,
            total_duration_ms: 0.0,
            min_duration_ms: f64::INFINITY,
            max_duration_ms: 0.0,
            error_count: 0,
            timeout_count: 0,
        }
    }

    /// Average duration in milliseconds.
    #[must_use]
    pub fn avg_duration_ms(&self) -> f64 {
        if self.count > 0 {
            self.total_duration_ms / self.count as f64
        } else {
            0.0
        }
    }

    /// Error rate as a percentage.
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        if self.count > 0 {
            self.error_count as f64 / self.count as f64 * 100.0
        } else {
            0.0
        }
    }

    /// Success rate as a percentage.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        100.0 - self.error_rate()
    }
}

/// Point-in-time process snapshot.
#[derive(Debug, Clone)]
pub struct PerformanceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub operations_per_second: f64,
    pub avg_response_time_ms: f64,
    pub error_rate: f64,
    pub active_operations: usize,
    pub queue_depth: usize,
}

struct ActiveOperation {
    operation_type: String,
    started: Instant,
    agent_id: Option<String>,
    #[allow(dead_code)]
    metadata: Option<Value>,
}

#[derive(Default)]
struct PerfState {
    active: HashMap<String, ActiveOperation>,
    by_type: HashMap<String, OperationMetrics>,
    response_times: HashMap<String, Vec<f64>>,
    snapshots: VecDeque<PerformanceSnapshot>,
    total_at_last_snapshot: u64,
}

/// Tracks server operation performance. Operations move
/// Started → (Succeeded | Errored | TimedOut); terminal states push one
/// perf metric into the collector and one sample into the per-type list.
pub struct PerformanceMonitor {
    collector: Arc<MetricsCollector>,
    state: Mutex<PerfState>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl PerformanceMonitor {
    #[must_use]
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self {
            collector,
            state: Mutex::new(PerfState::default()),
            task: Mutex::new(None),
        }
    }

    /// Spawns the minutely snapshot task. No-op when already running.
    pub fn start(self: Arc<Self>) {
        let mut task = lock(&self.task);
        if task.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let handle = {
            let monitor = Arc::clone(&self);
            let token = token.clone();
            tokio::spawn(async move {
                let interval = std::time::Duration::from_secs(SNAPSHOT_INTERVAL_SECS);
                loop {
                    tokio::select! {
                        () = token.cancelled() => break,
                        () = tokio::time::sleep(interval) => monitor.take_snapshot(),
                    }
                }
            })
        };
        *task = Some((token, handle));
    }

    /// Cancels and drains the snapshot task. Idempotent.
    pub async fn stop(&self) {
        let task = lock(&self.task).take();
        if let Some((token, handle)) = task {
            token.cancel();
            let _ = handle.await;
        }
    }

    /// Begins tracking an operation.
    pub fn start_operation(
        &self,
        operation_id: &str,
        operation_type: &str,
        agent_id: Option<&str>,
        metadata: Option<Value>,
    ) {
        let mut state = lock(&self.state);
        state.active.insert(
            operation_id.to_string(),
            ActiveOperation {
                operation_type: operation_type.to_string(),
                started: Instant::now(),
                agent_id: agent_id.map(str::to_string),
                metadata,
            },
        );
        state
            .by_type
            .entry(operation_type.to_string())
            .or_insert_with(|| OperationMetrics::new(operation_type));
    }

    /// Completes an operation. Unmatched ids are a no-op.
    pub fn end_operation(
        &self,
        operation_id: &str,
        status: OperationStatus,
        result_size: Option<u64>,
        error: Option<String>,
    ) {
        let (operation_type, agent_id, duration_ms) = {
            let mut state = lock(&self.state);
            let Some(op) = state.active.remove(operation_id) else {
                return;
            };
            let duration_ms = op.started.elapsed().as_secs_f64() * 1000.0;

            let metrics = state
                .by_type
                .entry(op.operation_type.clone())
                .or_insert_with(|| OperationMetrics::new(&op.operation_type));
            metrics.count += 1;
            metrics.total_duration_ms += duration_ms;
            metrics.min_duration_ms = metrics.min_duration_ms.min(duration_ms);
            metrics.max_duration_ms = metrics.max_duration_ms.max(duration_ms);
            match status {
                OperationStatus::Error => metrics.error_count += 1,
                OperationStatus::Timeout => metrics.timeout_count += 1,
                OperationStatus::Success => {}
            }

            let samples = state
                .response_times
                .entry(op.operation_type.clone())
                .or_default();
            samples.push(duration_ms);
            if samples.len() > MAX_RESPONSE_SAMPLES {
                samples.remove(0);
            }

            (op.operation_type, op.agent_id, duration_ms)
        };

        self.collector.record_performance(
            operation_id,
            &operation_type,
            duration_ms,
            status,
            agent_id.as_deref(),
            error,
            result_size,
        );
    }

    /// Number of in-flight operations.
    #[must_use]
    pub fn active_operation_count(&self) -> usize {
        lock(&self.state).active.len()
    }

    /// Whether an operation id is currently tracked.
    #[must_use]
    pub fn is_active(&self, operation_id: &str) -> bool {
        lock(&self.state).active.contains_key(operation_id)
    }

    /// Per-type metrics, optionally restricted to one type.
    #[must_use]
    pub fn operation_metrics(&self, operation_type: Option<&str>) -> HashMap<String, OperationMetrics> {
        let state = lock(&self.state);
        match operation_type {
            Some(op_type) => state
                .by_type
                .get(op_type)
                .map(|m| HashMap::from([(op_type.to_string(), m.clone())]))
                .unwrap_or_default(),
            None => state.by_type.clone(),
        }
    }

    /// Nearest-rank response-time percentiles for one operation type.
    #[must_use]
    pub fn response_percentiles(&self, operation_type: &str, percentiles: &[f64]) -> Vec<(f64, f64)> {
        let state = lock(&self.state);
        let Some(samples) = state.response_times.get(operation_type) else {
            return percentiles.iter().map(|&p| (p, 0.0)).collect();
        };
        if samples.is_empty() {
            return percentiles.iter().map(|&p| (p, 0.0)).collect();
        }
        let mut sorted = samples.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        percentiles
            .iter()
            .map(|&p| {
                let index = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
                (p, sorted[index])
            })
            .collect()
    }

    /// Latest snapshot, or an empty one when none has been taken yet.
    #[must_use]
    pub fn current_snapshot(&self) -> PerformanceSnapshot {
        lock(&self.state)
            .snapshots
            .back()
            .cloned()
            .unwrap_or(PerformanceSnapshot {
                timestamp: Utc::now(),
                operations_per_second: 0.0,
                avg_response_time_ms: 0.0,
                error_rate: 0.0,
                active_operations: 0,
                queue_depth: 0,
            })
    }

    /// Snapshots from the last `minutes` minutes, oldest first.
    #[must_use]
    pub fn history(&self, minutes: i64) -> Vec<PerformanceSnapshot> {
        let cutoff = Utc::now() - chrono::Duration::minutes(minutes);
        lock(&self.state)
            .snapshots
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    /// Computes one snapshot from current aggregates and pushes it into
    /// the ring. Exposed for the snapshot task and tests.
    pub fn take_snapshot(&self) {
        let mut state = lock(&self.state);
        let timestamp = Utc::now();

        let total_ops: u64 = state.by_type.values().map(|m| m.count).sum();
        let total_duration: f64 = state.by_type.values().map(|m| m.total_duration_ms).sum();
        let total_errors: u64 = state.by_type.values().map(|m| m.error_count).sum();

        let operations_per_second = match state.snapshots.back() {
            Some(prev) => {
                let elapsed = (timestamp - prev.timestamp).num_milliseconds() as f64 / 1000.0;
                if elapsed > 0.0 {
                    (total_ops - state.total_at_last_snapshot) as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        let snapshot = PerformanceSnapshot {
            timestamp,
            operations_per_second,
            avg_response_time_ms: if total_ops > 0 {
                total_duration / total_ops as f64
            } else {
                0.0
            },
            error_rate: if total_ops > 0 {
                total_errors as f64 / total_ops as f64 * 100.0
            } else {
                0.0
            },
            active_operations: state.active.len(),
            queue_depth: 0,
        };

        state.total_at_last_snapshot = total_ops;
        if state.snapshots.len() >= MAX_SNAPSHOTS {
            state.snapshots.pop_front();
        }
        state.snapshots.push_back(snapshot);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitoringConfig;

    fn monitor() -> PerformanceMonitor {
        PerformanceMonitor::new(Arc::new(MetricsCollector::new(
            None,
            MonitoringConfig::default(),
        )))
    }

    #[test]
    fn test_start_end_pairing() {
        let monitor = monitor();
        monitor.start_operation("op-1", "tools/call", Some("agent-a"), None);
        assert!(monitor.is_active("op-1"));

        monitor.end_operation("op-1", OperationStatus::Success, Some(128), None);
        assert!(!monitor.is_active("op-1"));

        let metrics = monitor.operation_metrics(Some("tools/call"));
        let m = &metrics["tools/call"];
        assert_eq!(m.count, 1);
        assert_eq!(m.error_count, 0);

        // Exactly one perf metric appended
        assert_eq!(monitor.collector.buffer_sizes().1, 1);
    }

    #[test]
    fn test_unmatched_end_is_noop() {
        let monitor = monitor();
        monitor.end_operation("never-started", OperationStatus::Error, None, None);
        assert!(monitor.operation_metrics(None).is_empty());
        assert_eq!(monitor.collector.buffer_sizes().1, 0);
    }

    #[test]
    fn test_timeout_counts_separately() {
        let monitor = monitor();
        monitor.start_operation("op-t", "tools/call", None, None);
        monitor.end_operation("op-t", OperationStatus::Timeout, None, None);
        let metrics = monitor.operation_metrics(Some("tools/call"));
        let m = &metrics["tools/call"];
        assert_eq!(m.timeout_count, 1);
        assert_eq!(m.error_count, 0);
    }

    #[test]
    fn test_percentiles_nearest_rank() {
        let monitor = monitor();
        for i in 1..=100u32 {
            let id = format!("op-{i}");
            monitor.start_operation(&id, "scan", None, None);
            // Inject deterministic samples directly
            let mut state = monitor.state.lock().unwrap();
            state.active.remove(&id);
            let samples = state.response_times.entry("scan".into()).or_default();
            samples.push(f64::from(i));
        }
        let percentiles = monitor.response_percentiles("scan", &[0.5, 0.99]);
        assert_eq!(percentiles[0].1, 51.0);
        assert_eq!(percentiles[1].1, 100.0);
    }

    #[test]
    fn test_snapshot_ring_bounded() {
        let monitor = monitor();
        for _ in 0..(MAX_SNAPSHOTS + 5) {
            monitor.take_snapshot();
        }
        assert_eq!(monitor.state.lock().unwrap().snapshots.len(), MAX_SNAPSHOTS);
    }
}

//! Central metrics collection.
//!
//! Three bounded ring buffers (usage, performance, cost), drop-oldest,
//! owned exclusively by the collector. Recording is a cheap synchronous
//! append; two background tasks flush buffered metrics to the dataset's
//! metric tables and maintain hourly rollups. A disabled configuration
//! turns every `record_*` into a no-op.

use crate::config::MonitoringConfig;
use crate::dataset::Dataset;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Terminal status of a monitored operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Success,
    Error,
    Timeout,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Cost category of a cost metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostType {
    Llm,
    Storage,
    Bandwidth,
}

impl fmt::Display for CostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Llm => write!(f, "llm"),
            Self::Storage => write!(f, "storage"),
            Self::Bandwidth => write!(f, "bandwidth"),
        }
    }
}

/// One usage event (document access, query, custom metric).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageMetric {
    pub timestamp: DateTime<Utc>,
    pub metric_type: String,
    pub resource_id: String,
    pub operation: String,
    pub agent_id: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// One completed operation measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerfMetric {
    pub timestamp: DateTime<Utc>,
    pub operation_id: String,
    pub operation_type: String,
    pub agent_id: String,
    pub duration_ms: f64,
    pub status: OperationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_size: Option<u64>,
}

/// One attributed cost event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostMetric {
    pub timestamp: DateTime<Utc>,
    pub operation_id: String,
    pub cost_type: CostType,
    pub provider: String,
    pub amount_usd: f64,
    pub units: u64,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// A drained set of metrics bound for the dataset's metric tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsBatch {
    pub usage: Vec<UsageMetric>,
    pub performance: Vec<PerfMetric>,
    pub cost: Vec<CostMetric>,
}

impl MetricsBatch {
    /// Whether the batch carries no metrics at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.usage.is_empty() && self.performance.is_empty() && self.cost.is_empty()
    }

    /// Total number of metric rows across families.
    #[must_use]
    pub fn len(&self) -> usize {
        self.usage.len() + self.performance.len() + self.cost.len()
    }
}

/// Interval of the aggregation task, seconds.
const AGGREGATION_INTERVAL_SECS: u64 = 60;

struct Buffers {
    usage: VecDeque<UsageMetric>,
    performance: VecDeque<PerfMetric>,
    cost: VecDeque<CostMetric>,
}

struct BackgroundTasks {
    token: CancellationToken,
    flush: JoinHandle<()>,
    aggregate: JoinHandle<()>,
}

/// Central metrics collector. See module docs.
pub struct MetricsCollector {
    dataset: Option<Arc<dyn Dataset>>,
    config: MonitoringConfig,
    buffers: Mutex<Buffers>,
    aggregated: Mutex<HashMap<String, Value>>,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl MetricsCollector {
    /// Creates a stopped collector.
    #[must_use]
    pub fn new(dataset: Option<Arc<dyn Dataset>>, config: MonitoringConfig) -> Self {
        Self {
            dataset,
            config,
            buffers: Mutex::new(Buffers {
                usage: VecDeque::new(),
                performance: VecDeque::new(),
                cost: VecDeque::new(),
            }),
            aggregated: Mutex::new(HashMap::new()),
            tasks: Mutex::new(None),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &MonitoringConfig {
        &self.config
    }

    /// Spawns the flush and aggregation loops. No-op when disabled or
    /// already running.
    pub fn start(self: Arc<Self>) {
        if !self.config.enabled {
            return;
        }
        let mut tasks = lock(&self.tasks);
        if tasks.is_some() {
            return;
        }
        let token = CancellationToken::new();

        let flush = {
            let collector = Arc::clone(&self);
            let token = token.clone();
            let interval = std::time::Duration::from_secs(self.config.flush_interval_seconds);
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = token.cancelled() => break,
                        () = tokio::time::sleep(interval) => {
                            collector.flush().await;
                        }
                    }
                }
            })
        };

        let aggregate = {
            let collector = Arc::clone(&self);
            let token = token.clone();
            let interval = std::time::Duration::from_secs(AGGREGATION_INTERVAL_SECS);
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = token.cancelled() => break,
                        () = tokio::time::sleep(interval) => {
                            collector.aggregate();
                        }
                    }
                }
            })
        };

        *tasks = Some(BackgroundTasks {
            token,
            flush,
            aggregate,
        });
    }

    /// Cancels and drains the background tasks, then flushes whatever is
    /// still buffered. Safe to call repeatedly.
    pub async fn stop(&self) {
        let tasks = lock(&self.tasks).take();
        if let Some(tasks) = tasks {
            tasks.token.cancel();
            let _ = tasks.flush.await;
            let _ = tasks.aggregate.await;
        }
        self.flush().await;
    }

    /// Whether the background tasks are currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.tasks).is_some()
    }

    /// Records a usage event. Drop-oldest on a full buffer.
    pub fn record_usage(
        &self,
        metric_type: &str,
        resource_id: &str,
        operation: &str,
        value: f64,
        agent_id: Option<&str>,
        metadata: Option<Value>,
    ) {
        if !self.config.enabled {
            return;
        }
        let metric = UsageMetric {
            timestamp: Utc::now(),
            metric_type: metric_type.to_string(),
            resource_id: resource_id.to_string(),
            operation: operation.to_string(),
            agent_id: agent_id.unwrap_or("anonymous").to_string(),
            value,
            metadata,
        };
        let mut buffers = lock(&self.buffers);
        push_bounded(&mut buffers.usage, metric, self.config.max_memory_metrics);
    }

    /// Records a completed operation. Drop-oldest on a full buffer.
    #[allow(clippy::too_many_arguments)]
    pub fn record_performance(
        &self,
        operation_id: &str,
        operation_type: &str,
        duration_ms: f64,
        status: OperationStatus,
        agent_id: Option<&str>,
        error: Option<String>,
        result_size: Option<u64>,
    ) {
        if !self.config.enabled {
            return;
        }
        let metric = PerfMetric {
            timestamp: Utc::now(),
            operation_id: operation_id.to_string(),
            operation_type: operation_type.to_string(),
            agent_id: agent_id.unwrap_or("anonymous").to_string(),
            duration_ms,
            status,
            error,
            result_size,
        };
        let mut buffers = lock(&self.buffers);
        push_bounded(
            &mut buffers.performance,
            metric,
            self.config.max_memory_metrics,
        );
    }

    /// Records a cost event. Drop-oldest on a full buffer.
    #[allow(clippy::too_many_arguments)]
    pub fn record_cost(
        &self,
        operation_id: &str,
        cost_type: CostType,
        provider: &str,
        amount_usd: f64,
        units: u64,
        agent_id: Option<&str>,
        metadata: Option<Value>,
    ) {
        if !self.config.enabled {
            return;
        }
        let metric = CostMetric {
            timestamp: Utc::now(),
            operation_id: operation_id.to_string(),
            cost_type,
            provider: provider.to_string(),
            amount_usd,
            units,
            agent_id: agent_id.unwrap_or("anonymous").to_string(),
            metadata,
        };
        let mut buffers = lock(&self.buffers);
        push_bounded(&mut buffers.cost, metric, self.config.max_memory_metrics);
    }

    /// Current buffer lengths (usage, performance, cost).
    #[must_use]
    pub fn buffer_sizes(&self) -> (usize, usize, usize) {
        let buffers = lock(&self.buffers);
        (
            buffers.usage.len(),
            buffers.performance.len(),
            buffers.cost.len(),
        )
    }

    /// A copy of the currently buffered metrics, without draining.
    #[must_use]
    pub fn buffered(&self) -> MetricsBatch {
        let buffers = lock(&self.buffers);
        MetricsBatch {
            usage: buffers.usage.iter().cloned().collect(),
            performance: buffers.performance.iter().cloned().collect(),
            cost: buffers.cost.iter().cloned().collect(),
        }
    }

    /// Rollup for `category:interval:lookback`, empty object when absent.
    #[must_use]
    pub fn aggregated(&self, category: &str, interval: &str, lookback_hours: u32) -> Value {
        let key = format!("{category}:{interval}:{lookback_hours}");
        lock(&self.aggregated)
            .get(&key)
            .cloned()
            .unwrap_or_else(|| json!({}))
    }

    /// Drains the buffers into the dataset's metric tables. A failed
    /// append is logged and the drained metrics are discarded; the loop
    /// keeps going.
    pub async fn flush(&self) {
        let Some(dataset) = &self.dataset else {
            return;
        };
        let batch = {
            let mut buffers = lock(&self.buffers);
            MetricsBatch {
                usage: buffers.usage.drain(..).collect(),
                performance: buffers.performance.drain(..).collect(),
                cost: buffers.cost.drain(..).collect(),
            }
        };
        if batch.is_empty() {
            return;
        }
        let rows = batch.len();
        if let Err(e) = dataset.append_metrics(batch).await {
            tracing::warn!("Failed to flush {} metrics to dataset: {}", rows, e);
        } else {
            tracing::debug!("Flushed {} metrics to dataset", rows);
        }
    }

    /// Rebuilds the hourly rollups from the last hour of buffered data.
    pub fn aggregate(&self) {
        let now = Utc::now();
        let buffers = lock(&self.buffers);

        // Usage by (hour, metric_type)
        let mut usage_by_hour: HashMap<String, (f64, HashSet<String>)> = HashMap::new();
        for metric in &buffers.usage {
            if (now - metric.timestamp).num_seconds() < 3600 {
                let hour = metric
                    .timestamp
                    .with_minute(0)
                    .and_then(|t| t.with_second(0))
                    .and_then(|t| t.with_nanosecond(0))
                    .unwrap_or(metric.timestamp);
                let key = format!("{}|{}", hour.to_rfc3339(), metric.metric_type);
                let entry = usage_by_hour.entry(key).or_default();
                entry.0 += metric.value;
                entry.1.insert(metric.resource_id.clone());
            }
        }

        // Performance by operation type
        let mut perf_by_type: HashMap<String, (u64, f64, u64)> = HashMap::new();
        for metric in &buffers.performance {
            if (now - metric.timestamp).num_seconds() < 3600 {
                let entry = perf_by_type
                    .entry(metric.operation_type.clone())
                    .or_default();
                entry.0 += 1;
                entry.1 += metric.duration_ms;
                if metric.status == OperationStatus::Error {
                    entry.2 += 1;
                }
            }
        }

        // Cost by cost type
        let mut cost_by_type: HashMap<String, f64> = HashMap::new();
        for metric in &buffers.cost {
            if (now - metric.timestamp).num_seconds() < 3600 {
                *cost_by_type.entry(metric.cost_type.to_string()).or_default() +=
                    metric.amount_usd;
            }
        }
        drop(buffers);

        let usage_value: Value = usage_by_hour
            .into_iter()
            .map(|(k, (count, resources))| {
                (k, json!({"count": count, "unique_resources": resources.len()}))
            })
            .collect::<serde_json::Map<_, _>>()
            .into();

        let perf_value: Value = perf_by_type
            .into_iter()
            .map(|(k, (count, total_ms, errors))| {
                let avg = if count > 0 { total_ms / count as f64 } else { 0.0 };
                let error_rate = if count > 0 { errors as f64 / count as f64 } else { 0.0 };
                (
                    k,
                    json!({
                        "count": count,
                        "total_ms": total_ms,
                        "errors": errors,
                        "avg_ms": avg,
                        "error_rate": error_rate,
                    }),
                )
            })
            .collect::<serde_json::Map<_, _>>()
            .into();

        let cost_value: Value = cost_by_type
            .into_iter()
            .map(|(k, v)| (k, json!(v)))
            .collect::<serde_json::Map<_, _>>()
            .into();

        let mut aggregated = lock(&self.aggregated);
        aggregated.insert("usage:1h:1".to_string(), usage_value);
        aggregated.insert("performance:1h:1".to_string(), perf_value);
        aggregated.insert("cost:1h:1".to_string(), cost_value);
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, cap: usize) {
    if buffer.len() >= cap {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

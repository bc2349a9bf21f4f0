//! Monitoring subsystem: metrics collection, usage/performance/cost
//! tracking, and export.
//!
//! All state lives in a [`MonitoringSystem`] value owned by the server;
//! there is no process-wide mutable state. Components append through the
//! collector, which owns the bounded ring buffers and the background
//! flush/aggregation tasks.

pub mod collector;
pub mod cost;
pub mod export;
pub mod performance;
pub mod usage;

pub use collector::{
    CostMetric, CostType, MetricsBatch, MetricsCollector, OperationStatus, PerfMetric, UsageMetric,
};
pub use cost::{CostCalculator, CostReport, CostSummary};
pub use export::{ExportFormat, MetricFamily};
pub use performance::{OperationMetrics, PerformanceMonitor, PerformanceSnapshot};
pub use usage::{DocumentStats, QueryStats, UsageStats, UsageTracker};

use crate::config::{MonitoringConfig, PricingConfig};
use crate::dataset::Dataset;
use serde_json::json;
use std::sync::Arc;

/// Central monitoring handle wired into the dispatcher.
pub struct MonitoringSystem {
    pub collector: Arc<MetricsCollector>,
    pub usage: Arc<UsageTracker>,
    pub performance: Arc<PerformanceMonitor>,
    pub cost: Arc<CostCalculator>,
}

impl MonitoringSystem {
    /// Builds the monitoring stack around a flush target.
    #[must_use]
    pub fn new(
        dataset: Option<Arc<dyn Dataset>>,
        config: MonitoringConfig,
        pricing: PricingConfig,
    ) -> Self {
        let collector = Arc::new(MetricsCollector::new(dataset, config));
        let usage = Arc::new(UsageTracker::new(Arc::clone(&collector)));
        let performance = Arc::new(PerformanceMonitor::new(Arc::clone(&collector)));
        let cost = Arc::new(CostCalculator::new(Arc::clone(&collector), pricing));
        Self {
            collector,
            usage,
            performance,
            cost,
        }
    }

    /// Starts the background flush, aggregation, and snapshot tasks.
    pub fn start(&self) {
        Arc::clone(&self.collector).start();
        Arc::clone(&self.performance).start();
    }

    /// Stops background tasks, drains them, and performs a final flush.
    /// Idempotent.
    pub async fn stop(&self) {
        self.performance.stop().await;
        self.collector.stop().await;
    }

    /// Overall system status for the `get_monitoring_status` tool.
    #[must_use]
    pub fn status(&self) -> serde_json::Value {
        let config = self.collector.config();
        let (usage_len, perf_len, cost_len) = self.collector.buffer_sizes();
        let activity = self.usage.activity_counts();
        json!({
            "status": if config.enabled { "healthy" } else { "disabled" },
            "configuration": {
                "enabled": config.enabled,
                "retention_days": config.retention_days,
                "flush_interval_seconds": config.flush_interval_seconds,
                "max_memory_metrics": config.max_memory_metrics,
            },
            "buffers": {
                "usage": usage_len,
                "performance": perf_len,
                "cost": cost_len,
                "total": usage_len + perf_len + cost_len,
            },
            "activity": {
                "active_operations": self.performance.active_operation_count(),
                "tracked_queries": activity.queries,
                "tracked_documents": activity.documents,
                "tracked_agents": activity.agents,
            },
        })
    }
}

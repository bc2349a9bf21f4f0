//! Monitoring tools: usage, performance, cost, status, export.

use crate::error::Result;
use crate::monitoring::export::{
    cost_report_value, export_csv, export_json, export_prometheus, performance_report,
    usage_report_window, ExportFormat, MetricFamily,
};
use crate::monitoring::MonitoringSystem;
use crate::validation::{self, Validator};
use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_true() -> bool {
    true
}

fn default_group_by_hour() -> String {
    "hour".to_string()
}

fn default_group_by_agent() -> String {
    "agent".to_string()
}

const fn default_minutes() -> i64 {
    60
}

fn default_families() -> Vec<MetricFamily> {
    vec![MetricFamily::All]
}

/// Parses an optional RFC 3339 bound with a field diagnostic on failure.
fn parse_bound(field: &str, raw: Option<&str>, fallback: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let Some(raw) = raw else {
        return Ok(fallback);
    };
    let mut validator = Validator::new();
    validation::check_datetime(&mut validator, field, raw);
    validator.finish()?;
    Ok(DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(fallback))
}

// ─── get_usage_metrics ───────────────────────────────────────────────────────

/// Input for the `get_usage_metrics` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UsageMetricsInput {
    /// Window start (RFC 3339); default one hour ago
    pub start_time: Option<String>,
    /// Window end (RFC 3339); default now
    pub end_time: Option<String>,
    /// Temporal bucketing: hour, day, or week (default: hour)
    #[serde(default = "default_group_by_hour")]
    pub group_by: String,
    /// Include top documents and queries (default: false)
    #[serde(default)]
    pub include_details: bool,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `get_usage_metrics` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct UsageMetricsOutput {
    /// The usage report
    pub report: Value,
}

/// Executes the `get_usage_metrics` tool.
pub fn execute_usage_metrics(
    monitoring: &MonitoringSystem,
    input: UsageMetricsInput,
) -> Result<UsageMetricsOutput> {
    let end = parse_bound("end_time", input.end_time.as_deref(), Utc::now())?;
    let start = parse_bound(
        "start_time",
        input.start_time.as_deref(),
        end - Duration::hours(1),
    )?;
    Ok(UsageMetricsOutput {
        report: usage_report_window(monitoring, start, end, &input.group_by, input.include_details),
    })
}

// ─── get_performance_metrics ─────────────────────────────────────────────────

/// Input for the `get_performance_metrics` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PerformanceMetricsInput {
    /// Restrict to one operation type (e.g. tools/call)
    pub operation_type: Option<String>,
    /// Minutes of snapshot history to include (default: 60)
    #[serde(default = "default_minutes")]
    pub minutes: i64,
    /// Include response-time percentiles (default: true)
    #[serde(default = "default_true")]
    pub include_percentiles: bool,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `get_performance_metrics` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct PerformanceMetricsOutput {
    /// The performance report
    pub report: Value,
}

/// Executes the `get_performance_metrics` tool.
pub fn execute_performance_metrics(
    monitoring: &MonitoringSystem,
    input: PerformanceMetricsInput,
) -> Result<PerformanceMetricsOutput> {
    Ok(PerformanceMetricsOutput {
        report: performance_report(
            monitoring,
            input.operation_type.as_deref(),
            input.minutes,
            input.include_percentiles,
        ),
    })
}

// ─── get_cost_report ─────────────────────────────────────────────────────────

/// Input for the `get_cost_report` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CostReportInput {
    /// Window start (RFC 3339); default 24 hours ago
    pub start_time: Option<String>,
    /// Window end (RFC 3339); default now
    pub end_time: Option<String>,
    /// Grouping: agent, operation, or provider (default: agent)
    #[serde(default = "default_group_by_agent")]
    pub group_by: String,
    /// Include monthly projections (default: true)
    #[serde(default = "default_true")]
    pub include_projections: bool,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `get_cost_report` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct CostReportOutput {
    /// The cost report
    pub report: Value,
}

/// Executes the `get_cost_report` tool.
pub fn execute_cost_report(
    monitoring: &MonitoringSystem,
    input: CostReportInput,
) -> Result<CostReportOutput> {
    if !matches!(input.group_by.as_str(), "agent" | "operation" | "provider") {
        return Err(crate::validation::ValidationReport::single(
            "group_by",
            format!("'{}' is not a valid grouping", input.group_by),
            "Valid groupings are: agent, operation, provider.",
        )
        .into());
    }
    let end = parse_bound("end_time", input.end_time.as_deref(), Utc::now())?;
    let start = parse_bound(
        "start_time",
        input.start_time.as_deref(),
        end - Duration::days(1),
    )?;
    Ok(CostReportOutput {
        report: cost_report_value(monitoring, start, end, &input.group_by, input.include_projections),
    })
}

// ─── get_monitoring_status ───────────────────────────────────────────────────

/// Input for the `get_monitoring_status` tool.
#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MonitoringStatusInput {
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `get_monitoring_status` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct MonitoringStatusOutput {
    /// System status, configuration, buffers, activity
    pub status: Value,
}

/// Executes the `get_monitoring_status` tool.
#[must_use]
pub fn execute_monitoring_status(monitoring: &MonitoringSystem) -> MonitoringStatusOutput {
    MonitoringStatusOutput {
        status: monitoring.status(),
    }
}

// ─── export_metrics ──────────────────────────────────────────────────────────

/// Input for the `export_metrics` tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExportMetricsInput {
    /// Export format: json, prometheus, or csv (default: json)
    #[serde(default)]
    pub format: ExportFormat,
    /// Metric families to export (default: all)
    #[serde(default = "default_families")]
    pub metric_types: Vec<MetricFamily>,
    /// Include raw buffered metrics in JSON exports (default: false)
    #[serde(default)]
    pub include_raw: bool,
    /// Agent identifier for attribution
    pub agent_id: Option<String>,
}

/// Output of the `export_metrics` tool.
#[derive(Debug, Serialize, JsonSchema)]
pub struct ExportMetricsOutput {
    /// Format of the export
    pub format: ExportFormat,
    /// The exported payload: a JSON object, or text for prometheus/csv
    pub content: Value,
    /// MIME type of the payload
    pub content_type: String,
}

/// Executes the `export_metrics` tool.
#[must_use]
pub fn execute_export_metrics(
    monitoring: &MonitoringSystem,
    input: ExportMetricsInput,
) -> ExportMetricsOutput {
    match input.format {
        ExportFormat::Json => ExportMetricsOutput {
            format: input.format,
            content: export_json(monitoring, &input.metric_types, input.include_raw),
            content_type: "application/json".to_string(),
        },
        ExportFormat::Prometheus => ExportMetricsOutput {
            format: input.format,
            content: Value::String(export_prometheus(monitoring, &input.metric_types)),
            content_type: "text/plain".to_string(),
        },
        ExportFormat::Csv => ExportMetricsOutput {
            format: input.format,
            content: Value::String(export_csv(monitoring, &input.metric_types)),
            content_type: "text/csv".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MonitoringConfig, PricingConfig};
    use crate::monitoring::OperationStatus;

    fn system() -> MonitoringSystem {
        let system = MonitoringSystem::new(None, MonitoringConfig::default(), PricingConfig::default());
        system.usage.track_query("q", "text", 1, 5.0, Some("agent-a"), true, None);
        system.performance.start_operation("op", "tools/call", None, None);
        system
            .performance
            .end_operation("op", OperationStatus::Success, Some(10), None);
        system
            .cost
            .track_llm_usage("openai", "gpt-3.5-turbo", 1000, 500, "op", Some("agent-a"), None);
        system
    }

    #[test]
    fn test_usage_metrics_default_window() {
        let system = system();
        let output = execute_usage_metrics(
            &system,
            UsageMetricsInput {
                start_time: None,
                end_time: None,
                group_by: "hour".into(),
                include_details: true,
                agent_id: None,
            },
        )
        .unwrap();
        assert_eq!(output.report["summary"]["total_queries"], 1);
        assert!(output.report["top_queries"].is_array());
    }

    #[test]
    fn test_bad_timestamp_diagnostic() {
        let system = system();
        let err = execute_usage_metrics(
            &system,
            UsageMetricsInput {
                start_time: Some("yesterday".into()),
                end_time: None,
                group_by: "hour".into(),
                include_details: false,
                agent_id: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("ISO 8601"));
    }

    #[test]
    fn test_cost_report_total_matches_breakdown() {
        let system = system();
        let output = execute_cost_report(
            &system,
            CostReportInput {
                start_time: None,
                end_time: None,
                group_by: "provider".into(),
                include_projections: true,
                agent_id: None,
            },
        )
        .unwrap();
        let report = &output.report;
        let total = report["total_cost"].as_f64().unwrap();
        let parts = report["breakdown"]["llm"].as_f64().unwrap()
            + report["breakdown"]["storage"].as_f64().unwrap()
            + report["breakdown"]["bandwidth"].as_f64().unwrap();
        assert!((total - parts).abs() < 1e-9);
        assert!(report["costs_by_provider"]["openai"].as_f64().unwrap() > 0.0);
        assert!(report["projections"]["monthly_cost"].is_number());
    }

    #[test]
    fn test_cost_report_rejects_unknown_grouping() {
        let system = system();
        let err = execute_cost_report(
            &system,
            CostReportInput {
                start_time: None,
                end_time: None,
                group_by: "team".into(),
                include_projections: false,
                agent_id: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("agent, operation, provider"));
    }

    #[test]
    fn test_status_reports_buffers() {
        let system = system();
        let output = execute_monitoring_status(&system);
        assert_eq!(output.status["status"], "healthy");
        assert_eq!(output.status["buffers"]["performance"], 1);
        assert_eq!(output.status["activity"]["tracked_queries"], 1);
    }

    #[test]
    fn test_disabled_monitoring_status() {
        let system = MonitoringSystem::new(
            None,
            MonitoringConfig {
                enabled: false,
                ..MonitoringConfig::default()
            },
            PricingConfig::default(),
        );
        let output = execute_monitoring_status(&system);
        assert_eq!(output.status["status"], "disabled");
        assert_eq!(output.status["buffers"]["total"], 0);
    }

    #[test]
    fn test_export_formats() {
        let system = system();
        let json_export = execute_export_metrics(
            &system,
            ExportMetricsInput {
                format: ExportFormat::Json,
                metric_types: vec![MetricFamily::All],
                include_raw: false,
                agent_id: None,
            },
        );
        assert_eq!(json_export.content_type, "application/json");
        assert!(json_export.content["metrics"]["usage"].is_object());

        let prom_export = execute_export_metrics(
            &system,
            ExportMetricsInput {
                format: ExportFormat::Prometheus,
                metric_types: vec![MetricFamily::All],
                include_raw: false,
                agent_id: None,
            },
        );
        assert!(prom_export
            .content
            .as_str()
            .unwrap()
            .contains("# TYPE contextframe_queries_total counter"));

        let csv_export = execute_export_metrics(
            &system,
            ExportMetricsInput {
                format: ExportFormat::Csv,
                metric_types: vec![MetricFamily::Usage],
                include_raw: false,
                agent_id: None,
            },
        );
        assert_eq!(csv_export.content.as_str().unwrap().lines().count(), 2);
    }
}

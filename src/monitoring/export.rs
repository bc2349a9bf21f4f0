//! Metric export in JSON, Prometheus text, and CSV formats.

use super::MonitoringSystem;
use chrono::{Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Wire format of an export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Structured JSON object
    #[default]
    Json,
    /// Prometheus text exposition format
    Prometheus,
    /// Flattened dotted-key CSV (header + one data row)
    Csv,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Prometheus => write!(f, "prometheus"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Which metric family to export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MetricFamily {
    Usage,
    Performance,
    Cost,
    #[default]
    All,
}

/// Window covered by usage/cost renderings, in hours.
const EXPORT_WINDOW_HOURS: i64 = 24;

/// Usage report over an explicit window; shared by `get_usage_metrics`
/// and the JSON export.
#[must_use]
pub fn usage_report_window(
    system: &MonitoringSystem,
    start: chrono::DateTime<Utc>,
    end: chrono::DateTime<Utc>,
    group_by: &str,
    include_details: bool,
) -> Value {
    let stats = system.usage.usage_stats(start, end, group_by);
    let mut report = json!({
        "period": {
            "start": stats.period_start.to_rfc3339(),
            "end": stats.period_end.to_rfc3339(),
        },
        "summary": {
            "total_queries": stats.total_queries,
            "total_document_accesses": stats.total_document_accesses,
            "unique_documents": stats.unique_documents_accessed,
            "unique_agents": stats.unique_agents,
        },
        "queries_by_type": stats.queries_by_type,
        "access_patterns": stats.access_patterns,
    });

    if include_details {
        report["top_documents"] = stats
            .top_documents
            .iter()
            .map(|doc| {
                json!({
                    "document_id": doc.document_id,
                    "access_count": doc.access_count,
                    "search_appearances": doc.search_appearances,
                    "last_accessed": doc.last_accessed.map(|t| t.to_rfc3339()),
                    "access_by_operation": doc.access_by_operation,
                })
            })
            .collect();
        report["top_queries"] = stats
            .top_queries
            .iter()
            .map(|q| {
                json!({
                    "query": q.query,
                    "type": q.query_type,
                    "count": q.count,
                    "avg_results": if q.count > 0 { q.total_results as f64 / q.count as f64 } else { 0.0 },
                    "avg_execution_time_ms": q.avg_execution_time_ms,
                    "success_rate": q.success_rate,
                })
            })
            .collect();
    }

    report
}

/// Renders the performance report object shared by
/// `get_performance_metrics` and the JSON export.
#[must_use]
pub fn performance_report(
    system: &MonitoringSystem,
    operation_type: Option<&str>,
    minutes: i64,
    include_percentiles: bool,
) -> Value {
    let metrics = system.performance.operation_metrics(operation_type);
    let current = system.performance.current_snapshot();
    let history = system.performance.history(minutes);

    let mut operations = Map::new();
    for (op_type, m) in &metrics {
        let mut op = json!({
            "count": m.count,
            "avg_duration_ms": m.avg_duration_ms(),
            "min_duration_ms": if m.count > 0 { m.min_duration_ms } else { 0.0 },
            "max_duration_ms": m.max_duration_ms,
            "error_rate": m.error_rate(),
            "success_rate": m.success_rate(),
            "timeout_count": m.timeout_count,
        });
        if include_percentiles && m.count > 0 {
            let percentiles =
                system
                    .performance
                    .response_percentiles(op_type, &[0.5, 0.75, 0.90, 0.95, 0.99]);
            let mut percentile_map = Map::new();
            for (p, value) in percentiles {
                percentile_map.insert(format!("p{}", (p * 100.0) as u32), json!(value));
            }
            op["percentiles"] = Value::Object(percentile_map);
        }
        operations.insert(op_type.clone(), op);
    }

    let mut report = json!({
        "current_snapshot": {
            "timestamp": current.timestamp.to_rfc3339(),
            "operations_per_second": current.operations_per_second,
            "avg_response_time_ms": current.avg_response_time_ms,
            "error_rate": current.error_rate,
            "active_operations": current.active_operations,
        },
        "operations": operations,
    });

    if !history.is_empty() {
        report["history"] = history
            .iter()
            .rev()
            .take(20)
            .rev()
            .map(|snap| {
                json!({
                    "timestamp": snap.timestamp.to_rfc3339(),
                    "ops_per_second": snap.operations_per_second,
                    "avg_response_ms": snap.avg_response_time_ms,
                    "error_rate": snap.error_rate,
                })
            })
            .collect();
    }

    report
}

/// Renders the cost report object shared by `get_cost_report` and the
/// JSON export.
#[must_use]
pub fn cost_report_value(
    system: &MonitoringSystem,
    start: chrono::DateTime<Utc>,
    end: chrono::DateTime<Utc>,
    group_by: &str,
    include_projections: bool,
) -> Value {
    let report = system.cost.cost_report(start, end);
    let grouped = match group_by {
        "operation" => &report.summary.costs_by_operation,
        "provider" => &report.summary.costs_by_provider,
        _ => &report.summary.costs_by_agent,
    };

    let mut result = json!({
        "period": {
            "start": report.summary.period_start.to_rfc3339(),
            "end": report.summary.period_end.to_rfc3339(),
        },
        "total_cost": report.summary.total_cost,
        "breakdown": {
            "llm": report.summary.llm_cost,
            "storage": report.summary.storage_cost,
            "bandwidth": report.summary.bandwidth_cost,
        },
    });
    result[format!("costs_by_{group_by}")] = json!(grouped);

    if !report.daily_breakdown.is_empty() {
        result["daily_breakdown"] = report
            .daily_breakdown
            .iter()
            .rev()
            .take(7)
            .rev()
            .map(|day| {
                json!({
                    "date": day.date.to_string(),
                    "total": day.total,
                    "llm": day.llm,
                    "storage": day.storage,
                    "bandwidth": day.bandwidth,
                })
            })
            .collect();
    }

    if !report.recommendations.is_empty() {
        result["recommendations"] = json!(report.recommendations);
    }

    if include_projections {
        result["projections"] = json!({
            "monthly_cost": report.projected_monthly_cost,
            "annual_cost": report.projected_monthly_cost * 12.0,
        });
    }

    result
}

/// JSON export: `{timestamp, metrics: {usage?, performance?, cost?}}`.
#[must_use]
pub fn export_json(system: &MonitoringSystem, families: &[MetricFamily], include_raw: bool) -> Value {
    let end = Utc::now();
    let start = end - Duration::hours(EXPORT_WINDOW_HOURS);
    let mut metrics = Map::new();

    if selected(families, MetricFamily::Usage) {
        metrics.insert(
            "usage".to_string(),
            usage_report_window(system, start, end, "hour", true),
        );
    }
    if selected(families, MetricFamily::Performance) {
        metrics.insert(
            "performance".to_string(),
            performance_report(system, None, 60, true),
        );
    }
    if selected(families, MetricFamily::Cost) {
        metrics.insert(
            "cost".to_string(),
            cost_report_value(system, start, end, "agent", true),
        );
    }

    let mut export = json!({
        "timestamp": end.to_rfc3339(),
        "metrics": metrics,
    });
    if include_raw {
        export["raw"] = serde_json::to_value(system.collector.buffered()).unwrap_or_default();
    }
    export
}

/// Prometheus text exposition with `contextframe_*` metric names.
#[must_use]
pub fn export_prometheus(system: &MonitoringSystem, families: &[MetricFamily]) -> String {
    let mut lines: Vec<String> = Vec::new();

    if selected(families, MetricFamily::Usage) {
        let end = Utc::now();
        let stats = system
            .usage
            .usage_stats(end - Duration::hours(1), end, "hour");
        lines.extend([
            "# HELP contextframe_queries_total Total number of queries".to_string(),
            "# TYPE contextframe_queries_total counter".to_string(),
            format!("contextframe_queries_total {}", stats.total_queries),
            String::new(),
            "# HELP contextframe_document_accesses_total Total document accesses".to_string(),
            "# TYPE contextframe_document_accesses_total counter".to_string(),
            format!(
                "contextframe_document_accesses_total {}",
                stats.total_document_accesses
            ),
            String::new(),
        ]);
    }

    if selected(families, MetricFamily::Performance) {
        let metrics = system.performance.operation_metrics(None);
        let mut op_types: Vec<_> = metrics.keys().collect();
        op_types.sort();
        for op_type in op_types {
            let m = &metrics[op_type];
            let safe = sanitize_metric_name(op_type);
            lines.extend([
                format!(
                    "# HELP contextframe_operation_{safe}_total Total {op_type} operations"
                ),
                format!("# TYPE contextframe_operation_{safe}_total counter"),
                format!("contextframe_operation_{safe}_total {}", m.count),
                String::new(),
                format!(
                    "# HELP contextframe_operation_{safe}_duration_ms {op_type} duration"
                ),
                format!("# TYPE contextframe_operation_{safe}_duration_ms histogram"),
                format!(
                    "contextframe_operation_{safe}_duration_ms_sum {}",
                    m.total_duration_ms
                ),
                format!(
                    "contextframe_operation_{safe}_duration_ms_count {}",
                    m.count
                ),
                String::new(),
            ]);
        }
    }

    if selected(families, MetricFamily::Cost) {
        let end = Utc::now();
        let report = system
            .cost
            .cost_report(end - Duration::hours(EXPORT_WINDOW_HOURS), end);
        lines.extend([
            "# HELP contextframe_cost_total_usd Total attributed cost".to_string(),
            "# TYPE contextframe_cost_total_usd gauge".to_string(),
            format!("contextframe_cost_total_usd {}", report.summary.total_cost),
            String::new(),
            "# HELP contextframe_cost_usd Attributed cost by type".to_string(),
            "# TYPE contextframe_cost_usd gauge".to_string(),
            format!(
                "contextframe_cost_usd{{type=\"llm\"}} {}",
                report.summary.llm_cost
            ),
            format!(
                "contextframe_cost_usd{{type=\"storage\"}} {}",
                report.summary.storage_cost
            ),
            format!(
                "contextframe_cost_usd{{type=\"bandwidth\"}} {}",
                report.summary.bandwidth_cost
            ),
            String::new(),
        ]);
    }

    lines.join("\n")
}

/// CSV export: flattened dotted-key header plus one data row.
#[must_use]
pub fn export_csv(system: &MonitoringSystem, families: &[MetricFamily]) -> String {
    let export = export_json(system, families, false);
    let mut flat = Vec::new();
    flatten_value("", &export["metrics"], &mut flat);

    let header: Vec<String> = flat.iter().map(|(k, _)| csv_escape(k)).collect();
    let row: Vec<String> = flat.iter().map(|(_, v)| csv_escape(v)).collect();
    format!("{}\n{}", header.join(","), row.join(","))
}

fn selected(families: &[MetricFamily], family: MetricFamily) -> bool {
    families.contains(&MetricFamily::All) || families.contains(&family)
}

fn sanitize_metric_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Depth-first flatten: scalars keep their value, arrays flatten to
/// their length, nested objects extend the dotted path.
fn flatten_value(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_value(&path, child, out);
            }
        }
        Value::Array(items) => out.push((prefix.to_string(), items.len().to_string())),
        Value::Null => out.push((prefix.to_string(), String::new())),
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MonitoringConfig, PricingConfig};
    use crate::monitoring::OperationStatus;

    fn system() -> MonitoringSystem {
        MonitoringSystem::new(None, MonitoringConfig::default(), PricingConfig::default())
    }

    fn seeded_system() -> MonitoringSystem {
        let system = system();
        system.usage.track_query("hello", "text", 3, 12.0, None, true, None);
        system
            .usage
            .track_document_access("doc-1", "read", None, None);
        system
            .performance
            .start_operation("op-1", "tools/call", None, None);
        system
            .performance
            .end_operation("op-1", OperationStatus::Success, Some(64), None);
        system
            .cost
            .track_llm_usage("openai", "gpt-3.5-turbo", 1000, 500, "op-1", None, None);
        system
    }

    #[test]
    fn test_json_export_roundtrips() {
        let system = seeded_system();
        let export = export_json(&system, &[MetricFamily::All], false);
        let text = serde_json::to_string(&export).unwrap();
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(export, back);
        assert_eq!(back["metrics"]["usage"]["summary"]["total_queries"], 1);
        assert!(back["metrics"]["cost"]["total_cost"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_prometheus_format_shape() {
        let system = seeded_system();
        let text = export_prometheus(&system, &[MetricFamily::All]);
        assert!(text.contains("# TYPE contextframe_queries_total counter"));
        assert!(text.contains("contextframe_queries_total 1"));
        assert!(text.contains("contextframe_operation_tools_call_total 1"));
        // Every sample line is `name{labels}? value` with a float-parsable value
        for line in text.lines().filter(|l| !l.is_empty() && !l.starts_with('#')) {
            let (_, value) = line.rsplit_once(' ').unwrap();
            value.parse::<f64>().unwrap();
        }
    }

    #[test]
    fn test_csv_header_and_single_row() {
        let system = seeded_system();
        let csv = export_csv(&system, &[MetricFamily::Usage]);
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("usage.summary.total_queries"));
        assert_eq!(
            lines[0].split(',').count(),
            lines[1].split(',').count()
        );
    }

    #[test]
    fn test_family_selection() {
        let system = seeded_system();
        let export = export_json(&system, &[MetricFamily::Cost], false);
        assert!(export["metrics"].get("usage").is_none());
        assert!(export["metrics"].get("cost").is_some());
    }
}

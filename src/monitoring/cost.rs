//! Cost tracking and attribution.
//!
//! Every `track_*` call prices the event, records a cost metric, and
//! folds the amount into running totals (by type, provider, operation,
//! agent, and day) so reports are exact sums of what was recorded.

use super::collector::{CostType, MetricsCollector};
use crate::config::PricingConfig;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// Cost summary over a period. `total_cost` always equals
/// `llm_cost + storage_cost + bandwidth_cost`.
#[derive(Debug, Clone)]
pub struct CostSummary {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_cost: f64,
    pub llm_cost: f64,
    pub storage_cost: f64,
    pub bandwidth_cost: f64,
    pub costs_by_provider: HashMap<String, f64>,
    pub costs_by_operation: HashMap<String, f64>,
    pub costs_by_agent: HashMap<String, f64>,
}

/// Full cost report: summary, per-day breakdown, advice, projection.
#[derive(Debug, Clone)]
pub struct CostReport {
    pub summary: CostSummary,
    pub daily_breakdown: Vec<DailyCosts>,
    pub recommendations: Vec<String>,
    pub projected_monthly_cost: f64,
}

/// Costs attributed to one calendar day.
#[derive(Debug, Clone, Copy)]
pub struct DailyCosts {
    pub date: NaiveDate,
    pub total: f64,
    pub llm: f64,
    pub storage: f64,
    pub bandwidth: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct TypeSplit {
    llm: f64,
    storage: f64,
    bandwidth: f64,
}

impl TypeSplit {
    fn add(&mut self, cost_type: CostType, amount: f64) {
        match cost_type {
            CostType::Llm => self.llm += amount,
            CostType::Storage => self.storage += amount,
            CostType::Bandwidth => self.bandwidth += amount,
        }
    }

    fn total(&self) -> f64 {
        self.llm + self.storage + self.bandwidth
    }
}

#[derive(Default)]
struct CostState {
    totals: TypeSplit,
    by_provider: HashMap<String, f64>,
    by_operation: HashMap<String, f64>,
    by_agent: HashMap<String, f64>,
    by_day: BTreeMap<NaiveDate, TypeSplit>,
    operation_costs: HashMap<String, f64>,
    /// (input, output) token totals per `provider:model`
    token_usage: HashMap<String, (u64, u64)>,
}

impl CostState {
    fn attribute(
        &mut self,
        cost_type: CostType,
        amount: f64,
        provider: &str,
        operation_label: &str,
        agent_id: Option<&str>,
        operation_id: Option<&str>,
    ) {
        self.totals.add(cost_type, amount);
        *self.by_provider.entry(provider.to_string()).or_default() += amount;
        *self
            .by_operation
            .entry(operation_label.to_string())
            .or_default() += amount;
        *self
            .by_agent
            .entry(agent_id.unwrap_or("anonymous").to_string())
            .or_default() += amount;
        self.by_day
            .entry(Utc::now().date_naive())
            .or_default()
            .add(cost_type, amount);
        if let Some(op_id) = operation_id {
            *self.operation_costs.entry(op_id.to_string()).or_default() += amount;
        }
    }
}

/// Prices and attributes the costs of LLM, storage, and bandwidth usage.
pub struct CostCalculator {
    collector: Arc<MetricsCollector>,
    pricing: PricingConfig,
    state: Mutex<CostState>,
}

impl CostCalculator {
    #[must_use]
    pub fn new(collector: Arc<MetricsCollector>, pricing: PricingConfig) -> Self {
        Self {
            collector,
            pricing,
            state: Mutex::new(CostState::default()),
        }
    }

    /// Tracks one LLM call and returns its cost in USD.
    #[allow(clippy::too_many_arguments)]
    pub fn track_llm_usage(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        operation_id: &str,
        agent_id: Option<&str>,
        purpose: Option<&str>,
    ) -> f64 {
        let pricing = self.pricing.llm(provider, model);
        let cost = pricing.cost(input_tokens, output_tokens);

        {
            let mut state = lock(&self.state);
            state.attribute(
                CostType::Llm,
                cost,
                provider,
                purpose.unwrap_or("llm"),
                agent_id,
                Some(operation_id),
            );
            let tokens = state
                .token_usage
                .entry(format!("{provider}:{model}"))
                .or_default();
            tokens.0 += input_tokens;
            tokens.1 += output_tokens;
        }

        self.collector.record_cost(
            operation_id,
            CostType::Llm,
            provider,
            cost,
            input_tokens + output_tokens,
            agent_id,
            Some(json!({
                "model": model,
                "input_tokens": input_tokens,
                "output_tokens": output_tokens,
                "purpose": purpose,
            })),
        );

        cost
    }

    /// Tracks one storage operation and returns its cost. Deletes are free.
    pub fn track_storage_usage(
        &self,
        operation: &str,
        size_bytes: u64,
        agent_id: Option<&str>,
        operation_id: Option<&str>,
    ) -> f64 {
        let cost = self
            .pricing
            .storage_pricing
            .operation_cost(operation, size_bytes);

        lock(&self.state).attribute(
            CostType::Storage,
            cost,
            "dataset",
            operation,
            agent_id,
            operation_id,
        );

        self.collector.record_cost(
            operation_id.unwrap_or("storage"),
            CostType::Storage,
            "dataset",
            cost,
            size_bytes,
            agent_id,
            Some(json!({"operation": operation, "size_bytes": size_bytes})),
        );

        cost
    }

    /// Tracks bandwidth and returns its cost. Only egress is charged.
    pub fn track_bandwidth_usage(
        &self,
        size_bytes: u64,
        direction: &str,
        agent_id: Option<&str>,
        operation_id: Option<&str>,
    ) -> f64 {
        if direction != "egress" {
            return 0.0;
        }
        let size_gb = size_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
        let cost = size_gb * self.pricing.bandwidth_cost_per_gb;

        lock(&self.state).attribute(
            CostType::Bandwidth,
            cost,
            "network",
            "egress",
            agent_id,
            operation_id,
        );

        self.collector.record_cost(
            operation_id.unwrap_or("bandwidth"),
            CostType::Bandwidth,
            "network",
            cost,
            size_bytes,
            agent_id,
            Some(json!({"direction": direction})),
        );

        cost
    }

    /// Total cost attributed to one operation id.
    #[must_use]
    pub fn operation_cost(&self, operation_id: &str) -> f64 {
        lock(&self.state)
            .operation_costs
            .get(operation_id)
            .copied()
            .unwrap_or(0.0)
    }

    /// Builds the attribution report for a period.
    #[must_use]
    pub fn cost_report(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> CostReport {
        let state = lock(&self.state);

        let summary = CostSummary {
            period_start: start,
            period_end: end,
            total_cost: state.totals.total(),
            llm_cost: state.totals.llm,
            storage_cost: state.totals.storage,
            bandwidth_cost: state.totals.bandwidth,
            costs_by_provider: state.by_provider.clone(),
            costs_by_operation: state.by_operation.clone(),
            costs_by_agent: state.by_agent.clone(),
        };

        let daily_breakdown: Vec<DailyCosts> = state
            .by_day
            .iter()
            .filter(|(date, _)| {
                **date >= start.date_naive() && **date <= end.date_naive()
            })
            .map(|(date, split)| DailyCosts {
                date: *date,
                total: split.total(),
                llm: split.llm,
                storage: split.storage,
                bandwidth: split.bandwidth,
            })
            .collect();

        let recommendations = self.recommendations(&summary, &state);

        let days_in_period = (end - start).num_days().max(1);
        let daily_average = summary.total_cost / days_in_period as f64;
        let projected_monthly_cost = daily_average * 30.0;

        CostReport {
            summary,
            daily_breakdown,
            recommendations,
            projected_monthly_cost,
        }
    }

    fn recommendations(&self, summary: &CostSummary, state: &CostState) -> Vec<String> {
        let mut recommendations = Vec::new();

        if summary.total_cost > 0.0 && summary.llm_cost > summary.total_cost * 0.7 {
            recommendations.push(
                "LLM costs represent over 70% of total costs. Consider using cheaper models \
                 for non-critical operations."
                    .to_string(),
            );
        }

        if let Some((provider, cost)) = summary
            .costs_by_provider
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
        {
            if summary.total_cost > 0.0 && *cost > summary.total_cost * 0.5 {
                recommendations.push(format!(
                    "{provider} accounts for over 50% of costs. Consider diversifying providers \
                     or negotiating rates."
                ));
            }
        }

        let total_tokens: u64 = state
            .token_usage
            .values()
            .map(|(input, output)| input + output)
            .sum();
        if total_tokens > 1_000_000 {
            recommendations.push(
                "High token usage detected. Consider implementing caching for frequently \
                 requested enhancements."
                    .to_string(),
            );
        }

        recommendations
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitoringConfig;
    use chrono::Duration;

    fn calculator() -> CostCalculator {
        CostCalculator::new(
            Arc::new(MetricsCollector::new(None, MonitoringConfig::default())),
            PricingConfig::default(),
        )
    }

    #[test]
    fn test_llm_cost_for_known_model() {
        let calc = calculator();
        let cost = calc.track_llm_usage("openai", "gpt-3.5-turbo", 1000, 500, "op-1", None, Some("enhance_context"));
        assert!((cost - 0.00125).abs() < 1e-9);
        assert!((calc.operation_cost("op-1") - cost).abs() < 1e-12);
        // Exactly one cost metric recorded
        assert_eq!(calc.collector.buffer_sizes().2, 1);
    }

    #[test]
    fn test_total_is_sum_of_type_breakdown() {
        let calc = calculator();
        calc.track_llm_usage("openai", "gpt-4", 2000, 1000, "op-1", Some("agent-a"), None);
        calc.track_storage_usage("write", 5 * 1024 * 1024 * 1024, Some("agent-a"), Some("op-2"));
        calc.track_bandwidth_usage(1024 * 1024 * 1024, "egress", None, Some("op-3"));

        let now = Utc::now();
        let report = calc.cost_report(now - Duration::days(1), now);
        let s = &report.summary;
        assert!((s.total_cost - (s.llm_cost + s.storage_cost + s.bandwidth_cost)).abs() < 1e-9);
        assert!(s.llm_cost > 0.0 && s.storage_cost > 0.0 && s.bandwidth_cost > 0.0);
    }

    #[test]
    fn test_ingress_is_free() {
        let calc = calculator();
        assert_eq!(calc.track_bandwidth_usage(1 << 30, "ingress", None, None), 0.0);
        assert_eq!(calc.collector.buffer_sizes().2, 0);
    }

    #[test]
    fn test_llm_heavy_spend_recommendation() {
        let calc = calculator();
        calc.track_llm_usage("openai", "gpt-4", 100_000, 50_000, "op-1", None, None);
        let now = Utc::now();
        let report = calc.cost_report(now - Duration::days(1), now);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("70%")));
        // One provider carries all spend
        assert!(report.recommendations.iter().any(|r| r.contains("50%")));
    }

    #[test]
    fn test_projection_uses_daily_average() {
        let calc = calculator();
        calc.track_storage_usage("write", 10 * (1 << 30), None, None);
        let now = Utc::now();
        let report = calc.cost_report(now - Duration::days(2), now);
        let expected = report.summary.total_cost / 2.0 * 30.0;
        assert!((report.projected_monthly_cost - expected).abs() < 1e-9);
    }
}

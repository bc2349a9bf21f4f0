//! Server configuration.
//!
//! Collaborator credentials and model names come from the environment
//! (`CONTEXTFRAME_*`, `OPENAI_API_KEY`, `TEI_API_BASE`, ...); tunables
//! carry documented defaults. Pricing can be overridden from a JSON file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Environment variable naming the embedding model.
pub const EMBED_MODEL_ENV: &str = "CONTEXTFRAME_EMBED_MODEL";
/// Environment variable naming the enhancement model.
pub const ENHANCE_MODEL_ENV: &str = "CONTEXTFRAME_ENHANCE_MODEL";

/// Default per-request deadline in seconds.
pub const DEFAULT_DEADLINE_SECS: u64 = 30;

/// Top-level server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub monitoring: MonitoringConfig,
    pub pricing: PricingConfig,
    /// Default model for enhancement tools, as `provider:model`.
    pub enhance_model: String,
    /// Default model for embedding generation.
    pub embed_model: String,
    /// Per-request deadline for tool execution, in seconds.
    pub deadline_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            monitoring: MonitoringConfig::default(),
            pricing: PricingConfig::default(),
            enhance_model: "openai:gpt-4o-mini".to_string(),
            embed_model: "text-embedding-3-small".to_string(),
            deadline_secs: DEFAULT_DEADLINE_SECS,
        }
    }
}

impl ServerConfig {
    /// Reads model names from the environment, keeping defaults otherwise.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(model) = std::env::var(ENHANCE_MODEL_ENV) {
            config.enhance_model = model;
        }
        if let Ok(model) = std::env::var(EMBED_MODEL_ENV) {
            config.embed_model = model;
        }
        config
    }

    /// Splits `enhance_model` into `(provider, model)`.
    ///
    /// A bare model name is attributed to openai.
    #[must_use]
    pub fn enhance_provider_model(&self) -> (String, String) {
        match self.enhance_model.split_once(':') {
            Some((provider, model)) => (provider.to_string(), model.to_string()),
            None => ("openai".to_string(), self.enhance_model.clone()),
        }
    }
}

/// Metrics collection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Master switch; disabled short-circuits all recording to no-ops.
    pub enabled: bool,
    /// How long flushed metrics are kept in the dataset, in days.
    pub retention_days: u32,
    /// Ring buffer capacity per metric family.
    pub max_memory_metrics: usize,
    /// Seconds between background flushes to the dataset.
    pub flush_interval_seconds: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: 30,
            max_memory_metrics: 10_000,
            flush_interval_seconds: 60,
        }
    }
}

/// Pricing for one LLM model, in USD per 1k tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LlmPricing {
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
}

impl LlmPricing {
    /// Cost for a given token split.
    #[must_use]
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1000.0) * self.input_cost_per_1k
            + (output_tokens as f64 / 1000.0) * self.output_cost_per_1k
    }
}

/// Pricing for storage operations, in USD per GB.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoragePricing {
    pub read_cost_per_gb: f64,
    pub write_cost_per_gb: f64,
    pub storage_cost_per_gb_month: f64,
}

impl Default for StoragePricing {
    fn default() -> Self {
        Self {
            read_cost_per_gb: 0.01,
            write_cost_per_gb: 0.02,
            storage_cost_per_gb_month: 0.023,
        }
    }
}

impl StoragePricing {
    /// Cost for one storage operation. Deletes are free.
    #[must_use]
    pub fn operation_cost(&self, operation: &str, size_bytes: u64) -> f64 {
        let size_gb = size_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
        match operation {
            "read" | "search" => size_gb * self.read_cost_per_gb,
            "write" | "update" => size_gb * self.write_cost_per_gb,
            _ => 0.0,
        }
    }
}

/// Complete pricing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Per-model LLM pricing keyed by `provider:model`.
    pub llm_pricing: HashMap<String, LlmPricing>,
    pub storage_pricing: StoragePricing,
    /// Egress bandwidth cost in USD per GB. Ingress is free.
    pub bandwidth_cost_per_gb: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let mut llm_pricing = HashMap::new();
        llm_pricing.insert(
            "openai:gpt-4".to_string(),
            LlmPricing { input_cost_per_1k: 0.03, output_cost_per_1k: 0.06 },
        );
        llm_pricing.insert(
            "openai:gpt-3.5-turbo".to_string(),
            LlmPricing { input_cost_per_1k: 0.0005, output_cost_per_1k: 0.0015 },
        );
        llm_pricing.insert(
            "anthropic:claude-3-opus".to_string(),
            LlmPricing { input_cost_per_1k: 0.015, output_cost_per_1k: 0.075 },
        );
        llm_pricing.insert(
            "anthropic:claude-3-sonnet".to_string(),
            LlmPricing { input_cost_per_1k: 0.003, output_cost_per_1k: 0.015 },
        );
        llm_pricing.insert(
            "cohere:command".to_string(),
            LlmPricing { input_cost_per_1k: 0.0015, output_cost_per_1k: 0.002 },
        );
        Self {
            llm_pricing,
            storage_pricing: StoragePricing::default(),
            bandwidth_cost_per_gb: 0.09,
        }
    }
}

impl PricingConfig {
    /// Fallback pricing for models not in the table.
    pub const FALLBACK: LlmPricing = LlmPricing {
        input_cost_per_1k: 0.01,
        output_cost_per_1k: 0.02,
    };

    /// Looks up pricing for `provider:model`, falling back to the default.
    #[must_use]
    pub fn llm(&self, provider: &str, model: &str) -> LlmPricing {
        self.llm_pricing
            .get(&format!("{provider}:{model}"))
            .copied()
            .unwrap_or(Self::FALLBACK)
    }

    /// Loads a pricing override file (JSON, partial overrides allowed).
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        #[derive(Deserialize)]
        struct Partial {
            llm_pricing: Option<HashMap<String, LlmPricing>>,
            storage_pricing: Option<StoragePricing>,
            bandwidth_cost_per_gb: Option<f64>,
        }
        let raw = std::fs::read_to_string(path)?;
        let partial: Partial = serde_json::from_str(&raw)?;
        let mut config = Self::default();
        if let Some(llm) = partial.llm_pricing {
            config.llm_pricing = llm;
        }
        if let Some(storage) = partial.storage_pricing {
            config.storage_pricing = storage;
        }
        if let Some(bandwidth) = partial.bandwidth_cost_per_gb {
            config.bandwidth_cost_per_gb = bandwidth;
        }
        Ok(config)
    }
}

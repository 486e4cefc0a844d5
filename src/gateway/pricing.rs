//! Model pricing registry.
//!
//! Costs are in nanodollars (1e-9 USD) per token. $1 per million tokens is
//! 1,000 nanodollars per token.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Serialize;

/// Pricing information for a model.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    /// Provider name.
    pub provider: &'static str,
    /// Cost per input token in nanodollars.
    pub input_nanos_per_token: i64,
    /// Cost per output token in nanodollars.
    pub output_nanos_per_token: i64,
}

impl ModelPricing {
    const fn new(provider: &'static str, input: i64, output: i64) -> Self {
        Self {
            provider,
            input_nanos_per_token: input,
            output_nanos_per_token: output,
        }
    }

    /// Calculate cost for a request.
    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> i64 {
        (input_tokens as i64) * self.input_nanos_per_token
            + (output_tokens as i64) * self.output_nanos_per_token
    }

    /// Price per million input tokens, in USD.
    pub fn input_usd_per_million(&self) -> f64 {
        self.input_nanos_per_token as f64 / 1_000.0
    }

    /// Price per million output tokens, in USD.
    pub fn output_usd_per_million(&self) -> f64 {
        self.output_nanos_per_token as f64 / 1_000.0
    }
}

// =============================================================================
// PRICING DATA
// =============================================================================

// Claude 3 Haiku: $0.25/1M input, $1.25/1M output
const CLAUDE_3_HAIKU: ModelPricing = ModelPricing::new("openrouter", 250, 1_250);
// Claude 3.5 Haiku: $1.00/1M input, $5.00/1M output
const CLAUDE_35_HAIKU: ModelPricing = ModelPricing::new("openrouter", 1_000, 5_000);
// Claude 3.5 Sonnet: $3.00/1M input, $15.00/1M output
const CLAUDE_35_SONNET: ModelPricing = ModelPricing::new("openrouter", 3_000, 15_000);
// Claude 3 Opus: $15.00/1M input, $75.00/1M output
const CLAUDE_3_OPUS: ModelPricing = ModelPricing::new("openrouter", 15_000, 75_000);
// GPT-4o-mini: $0.15/1M input, $0.60/1M output
const GPT_4O_MINI: ModelPricing = ModelPricing::new("openrouter", 150, 600);
// GPT-5-mini: $0.25/1M input, $2.00/1M output
const GPT_5_MINI: ModelPricing = ModelPricing::new("openrouter", 250, 2_000);

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "anthropic/claude-3-haiku";

/// Unknown models are priced like the default model.
pub const DEFAULT_PRICING: ModelPricing = CLAUDE_3_HAIKU;

/// Listing order for `models`.
const MODEL_TABLE: &[(&str, ModelPricing)] = &[
    ("anthropic/claude-3-haiku", CLAUDE_3_HAIKU),
    ("anthropic/claude-3.5-haiku", CLAUDE_35_HAIKU),
    ("anthropic/claude-3.5-sonnet", CLAUDE_35_SONNET),
    ("anthropic/claude-3-opus", CLAUDE_3_OPUS),
    ("openai/gpt-4o-mini", GPT_4O_MINI),
    ("openai/gpt-5-mini", GPT_5_MINI),
];

static PRICING_MAP: OnceLock<HashMap<&'static str, ModelPricing>> = OnceLock::new();

fn init_pricing() -> HashMap<&'static str, ModelPricing> {
    let mut map: HashMap<&'static str, ModelPricing> = MODEL_TABLE.iter().copied().collect();

    // Dated aliases
    map.insert("anthropic/claude-3-haiku-20240307", CLAUDE_3_HAIKU);
    map.insert("anthropic/claude-3-5-haiku", CLAUDE_35_HAIKU);
    map.insert("anthropic/claude-3-5-haiku-20241022", CLAUDE_35_HAIKU);
    map.insert("anthropic/claude-3-5-sonnet", CLAUDE_35_SONNET);
    map.insert("anthropic/claude-3-5-sonnet-20241022", CLAUDE_35_SONNET);
    map.insert("anthropic/claude-3-opus-20240229", CLAUDE_3_OPUS);
    map.insert("openai/gpt-4o-mini-2024-07-18", GPT_4O_MINI);

    map
}

/// Get pricing for a model.
pub fn get_pricing(model_id: &str) -> Option<ModelPricing> {
    let map = PRICING_MAP.get_or_init(init_pricing);
    map.get(model_id).copied()
}

/// Get pricing for a model, falling back to the default entry.
pub fn get_pricing_or_default(model_id: &str) -> ModelPricing {
    get_pricing(model_id).unwrap_or(DEFAULT_PRICING)
}

/// Calculate chat cost in nanodollars.
pub fn chat_cost(model: &str, input_tokens: u32, output_tokens: u32) -> i64 {
    get_pricing_or_default(model).calculate_cost(input_tokens, output_tokens)
}

/// Calculate chat cost in USD.
pub fn cost_usd(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    nanos_to_usd(chat_cost(model, input_tokens, output_tokens))
}

pub fn nanos_to_usd(nanos: i64) -> f64 {
    nanos as f64 / 1_000_000_000.0
}

/// A priced model, as listed by `available_models`.
#[derive(Debug, Clone, Serialize)]
pub struct ModelListing {
    pub id: &'static str,
    pub input_per_1m: f64,
    pub output_per_1m: f64,
}

/// Known models and their per-million prices, in listing order.
pub fn available_models() -> Vec<ModelListing> {
    MODEL_TABLE
        .iter()
        .map(|(id, p)| ModelListing {
            id,
            input_per_1m: p.input_usd_per_million(),
            output_per_1m: p.output_usd_per_million(),
        })
        .collect()
}

/// A-priori cost range for a sweep.
#[derive(Debug, Clone, Serialize)]
pub struct CostEstimate {
    pub calls: u64,
    /// Per-call token sizes the range was computed from.
    pub avg_input_tokens: u32,
    pub avg_output_tokens: u32,
    pub min_usd: f64,
    pub max_usd: f64,
}

/// Default average prompt size used by the estimator.
pub const DEFAULT_AVG_INPUT_TOKENS: u32 = 300;
/// Default average completion size used by the estimator.
pub const DEFAULT_AVG_OUTPUT_TOKENS: u32 = 100;

/// Estimate the cost of `n_items x n_personas x trials` calls, with a 30%
/// band around the point estimate.
pub fn estimate_run_cost(
    model: &str,
    n_items: usize,
    n_personas: usize,
    trials: u32,
    avg_input_tokens: u32,
    avg_output_tokens: u32,
) -> CostEstimate {
    let calls = n_items as u64 * n_personas as u64 * trials as u64;
    let per_call = cost_usd(model, avg_input_tokens, avg_output_tokens);
    CostEstimate {
        calls,
        avg_input_tokens,
        avg_output_tokens,
        min_usd: calls as f64 * per_call * 0.7,
        max_usd: calls as f64 * per_call * 1.3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_cost() {
        // 1K input + 1K output for Claude 3.5 Haiku
        // Input: 1000 * 1000 = 1,000,000 nanos
        // Output: 1000 * 5000 = 5,000,000 nanos
        let cost = chat_cost("anthropic/claude-3.5-haiku", 1_000, 1_000);
        assert_eq!(cost, 6_000_000);
    }

    #[test]
    fn test_unknown_model_uses_default_entry() {
        assert_eq!(
            chat_cost("nobody/unknown-model", 1_000_000, 0),
            chat_cost(DEFAULT_MODEL, 1_000_000, 0)
        );
        assert!((cost_usd("nobody/unknown-model", 1_000_000, 0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_estimate_band() {
        let est = estimate_run_cost(DEFAULT_MODEL, 10, 5, 2, 300, 100);
        assert_eq!(est.calls, 100);
        // 300 * 250 + 100 * 1250 = 200,000 nanos = $0.0002 per call
        assert!((est.min_usd - 0.014).abs() < 1e-9);
        assert!((est.max_usd - 0.026).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_zero_calls() {
        let est = estimate_run_cost(DEFAULT_MODEL, 0, 5, 3, 300, 100);
        assert_eq!(est.calls, 0);
        assert_eq!(est.min_usd, 0.0);
        assert_eq!(est.max_usd, 0.0);
    }

    #[test]
    fn test_available_models_listing() {
        let models = available_models();
        assert_eq!(models[0].id, DEFAULT_MODEL);
        assert!((models[0].input_per_1m - 0.25).abs() < 1e-12);
        assert!((models[0].output_per_1m - 1.25).abs() < 1e-12);
        assert!(models.iter().all(|m| get_pricing(m.id).is_some()));
    }
}

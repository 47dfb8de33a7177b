//! Cost accounting for LLM API usage.
//!
//! Prices are looked up by backend model string. A model without a price
//! entry costs zero rather than failing a run that already produced output.

use crate::types::Usage;
use std::collections::HashMap;
use std::time::Duration;

/// Cost in USD for token usage.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Cost {
    /// Cost for input tokens in USD.
    pub input_cost: f64,
    /// Cost for output tokens in USD.
    pub output_cost: f64,
}

impl Cost {
    /// Total cost in USD.
    pub fn total(&self) -> f64 {
        self.input_cost + self.output_cost
    }
}

/// Pricing per 1M tokens for a model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    /// Cost per 1M input tokens.
    pub input_per_million: f64,
    /// Cost per 1M output tokens.
    pub output_per_million: f64,
}

impl ModelPricing {
    pub const fn new(input: f64, output: f64) -> Self {
        Self {
            input_per_million: input,
            output_per_million: output,
        }
    }

    /// Build from per-token prices.
    pub fn per_token(input: f64, output: f64) -> Self {
        Self::new(input * 1_000_000.0, output * 1_000_000.0)
    }

    /// Calculate cost for given usage.
    pub fn calculate(&self, usage: &Usage) -> Cost {
        Cost {
            input_cost: (usage.input_tokens as f64 / 1_000_000.0) * self.input_per_million,
            output_cost: (usage.output_tokens as f64 / 1_000_000.0) * self.output_per_million,
        }
    }
}

/// Registry of model pricing.
#[derive(Debug, Clone)]
pub struct PricingRegistry {
    prices: HashMap<String, ModelPricing>,
}

impl PricingRegistry {
    /// Create a registry with the built-in price table.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        // Anthropic
        registry.set("claude-3-haiku-20240307", ModelPricing::new(0.25, 1.25));
        registry.set("claude-3-5-sonnet-20240620", ModelPricing::new(3.00, 15.00));
        registry.set("claude-3-opus-20240229", ModelPricing::new(15.00, 75.00));

        // OpenAI
        registry.set("gpt-4o", ModelPricing::new(5.00, 15.00));
        registry.set("gpt-4o-mini", ModelPricing::new(0.15, 0.60));

        // Llama chat models
        registry.set("meta-llama/Llama-3-8b-chat-hf", ModelPricing::new(0.30, 0.30));
        registry.set("meta-llama/Llama-3-70b-chat-hf", ModelPricing::new(0.90, 0.90));

        // Gemini; prompts over 128k tokens bill at twice these rates
        registry.set("gemini-1.5-flash-latest", ModelPricing::new(0.35, 1.05));
        registry.set("gemini-1.5-pro-latest", ModelPricing::new(3.50, 10.50));

        registry
    }

    /// Create a registry with no prices.
    pub fn empty() -> Self {
        Self {
            prices: HashMap::new(),
        }
    }

    /// Get pricing for a model.
    pub fn get(&self, model: &str) -> Option<&ModelPricing> {
        self.prices.get(model)
    }

    /// Calculate cost for a model and usage, if the model is priced.
    pub fn calculate_cost(&self, model: &str, usage: &Usage) -> Option<Cost> {
        self.get(model).map(|p| p.calculate(usage))
    }

    /// Calculate cost for a model and usage; unpriced models cost zero.
    pub fn cost_or_zero(&self, model: &str, usage: &Usage) -> Cost {
        self.calculate_cost(model, usage).unwrap_or_default()
    }

    /// Add or update pricing for a model.
    pub fn set(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.prices.insert(model.into(), pricing);
    }
}

impl Default for PricingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Output tokens per second of wall-clock time.
pub fn tokens_per_second(output_tokens: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        output_tokens as f64 / secs
    } else {
        0.0
    }
}

//! Cost Tracking for Inference Usage
//!
//! Maps reported token counts to a dollar cost through a static pricing table
//! and sums usage across a run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::provider::{ReportedUsage, TokenUsage};

/// Token pricing for a specific model (dollars per 1K tokens)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Dollars per 1K prompt tokens
    pub prompt_rate: f64,
    /// Dollars per 1K completion tokens
    pub completion_rate: f64,
}

impl ModelPricing {
    pub const FREE: ModelPricing = ModelPricing::new(0.0, 0.0);

    pub const fn new(prompt_rate: f64, completion_rate: f64) -> Self {
        Self {
            prompt_rate,
            completion_rate,
        }
    }

    /// Dollar cost for the given token counts
    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 * self.prompt_rate + completion_tokens as f64 * self.completion_rate)
            / 1000.0
    }
}

/// Static model -> pricing lookup. Unknown models are free.
#[derive(Debug, Clone)]
pub struct PricingTable {
    entries: HashMap<String, ModelPricing>,
}

impl Default for PricingTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert("llama3.2-vision", ModelPricing::new(0.005, 0.015));
        table.insert("gpt-4-turbo", ModelPricing::new(0.01, 0.03));
        table.insert("gpt-4o", ModelPricing::new(0.0025, 0.01));
        table.insert("gpt-4o-mini", ModelPricing::new(0.00015, 0.0006));
        table.insert("pixtral-12b-2409", ModelPricing::new(0.00015, 0.00015));
        table.insert("gemini-2.0-flash", ModelPricing::new(0.0001, 0.0004));
        table
    }
}

impl PricingTable {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, model: &str, pricing: ModelPricing) {
        self.entries.insert(model.to_string(), pricing);
    }

    /// Exact-match lookup; cost accuracy is best-effort, never blocking.
    pub fn pricing_for(&self, model: &str) -> ModelPricing {
        self.entries.get(model).copied().unwrap_or(ModelPricing::FREE)
    }

    /// Builds the usage record for one call.
    pub fn compute(&self, prompt_tokens: u64, completion_tokens: u64, model: &str) -> TokenUsage {
        let model_pricing = self.pricing_for(model);
        TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            model_pricing,
            cost: model_pricing.cost(prompt_tokens, completion_tokens),
        }
    }

    /// Like [`Self::compute`], keeping the provider's total when it reports one
    /// (some backends count tokens outside prompt and completion).
    pub fn compute_reported(&self, reported: ReportedUsage, model: &str) -> TokenUsage {
        let mut usage = self.compute(reported.prompt_tokens, reported.completion_tokens, model);
        if reported.total_tokens > 0 {
            usage.total_tokens = reported.total_tokens;
        }
        usage
    }
}

/// Usage summed over every call in a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Dollars; sum of each call's individually computed cost
    pub total_cost: f64,
    /// Number of calls folded in
    pub calls: u32,
}

impl UsageSummary {
    pub fn add(&mut self, usage: &TokenUsage) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total_tokens;
        self.total_cost += usage.cost;
        self.calls += 1;
    }

    pub fn from_usages<'a>(usages: impl IntoIterator<Item = &'a TokenUsage>) -> Self {
        let mut summary = Self::default();
        for usage in usages {
            summary.add(usage);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_cost_invariant(usage: &TokenUsage) {
        let expected = (usage.prompt_tokens as f64 * usage.model_pricing.prompt_rate
            + usage.completion_tokens as f64 * usage.model_pricing.completion_rate)
            / 1000.0;
        assert!((usage.cost - expected).abs() < 1e-12);
    }

    #[test]
    fn known_model_cost() {
        let table = PricingTable::default();
        let usage = table.compute(1000, 500, "gpt-4o");

        assert_eq!(usage.total_tokens, 1500);
        assert_eq!(usage.model_pricing, ModelPricing::new(0.0025, 0.01));
        assert!((usage.cost - 0.0075).abs() < 1e-12);
        assert_cost_invariant(&usage);
    }

    #[test]
    fn unknown_model_is_free_not_an_error() {
        let usage = PricingTable::default().compute(1234, 567, "some-new-model");
        assert_eq!(usage.model_pricing, ModelPricing::FREE);
        assert_eq!(usage.cost, 0.0);
        assert_eq!(usage.total_tokens, 1801);
        assert_cost_invariant(&usage);
    }

    #[test]
    fn lookup_is_exact_match() {
        let table = PricingTable::default();
        assert_eq!(table.pricing_for("gpt-4o-2024-08-06"), ModelPricing::FREE);
        assert_ne!(table.pricing_for("gpt-4o-mini"), table.pricing_for("gpt-4o"));
    }

    #[test]
    fn reported_total_is_kept() {
        let usage = PricingTable::default().compute_reported(
            ReportedUsage {
                prompt_tokens: 2153,
                completion_tokens: 143,
                total_tokens: 2400,
            },
            "gemini-2.0-flash",
        );
        assert_eq!(usage.total_tokens, 2400);
        assert_cost_invariant(&usage);
    }

    #[test]
    fn summary_sums_frames_and_reconstruction() {
        let table = PricingTable::default();
        let calls = [
            table.compute(10, 5, "gpt-4o"),
            table.compute(20, 8, "gpt-4o"),
            table.compute(15, 6, "gpt-4o"),
            table.compute(30, 10, "gpt-4-turbo"),
        ];
        let summary = UsageSummary::from_usages(calls.iter());

        assert_eq!(summary.prompt_tokens, 75);
        assert_eq!(summary.completion_tokens, 29);
        assert_eq!(summary.total_tokens, 104);
        assert_eq!(summary.calls, 4);
        let expected: f64 = calls.iter().map(|u| u.cost).sum();
        assert!((summary.total_cost - expected).abs() < 1e-12);
    }
}

use std::collections::HashMap;

use crate::config::ModelPricing;
use crate::domain::llm::LlmUsage;

/// Per-model token prices in cents per thousand tokens
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
}

impl PricingTable {
    pub fn new(models: HashMap<String, ModelPricing>) -> Self {
        Self { models }
    }

    /// Cost in cents; unknown models cost nothing
    pub fn cost_cents(&self, model: &str, usage: &LlmUsage) -> f64 {
        self.models
            .get(model)
            .map(|price| {
                usage.prompt_tokens as f64 / 1000.0 * price.prompt_cents_per_1k
                    + usage.completion_tokens as f64 / 1000.0 * price.completion_cents_per_1k
            })
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_for_known_model() {
        let table = PricingTable::new(HashMap::from([(
            "gpt-4o".to_string(),
            ModelPricing {
                prompt_cents_per_1k: 0.25,
                completion_cents_per_1k: 1.0,
            },
        )]));

        let cost = table.cost_cents("gpt-4o", &LlmUsage::new(2000, 500));
        assert!((cost - 1.0).abs() < 1e-9);
        assert_eq!(table.cost_cents("unknown", &LlmUsage::new(2000, 500)), 0.0);
    }
}

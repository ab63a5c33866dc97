use std::time::Instant;

use async_trait::async_trait;

use super::pricing::PricingTable;
use crate::domain::llm::{LlmError, LlmInvocation, LlmInvoker, LlmRequest, LlmUsage};

/// Offline invoker that answers `[echo:<model>] <prompt>`.
///
/// Token counts are whitespace word counts.
#[derive(Debug, Default)]
pub struct EchoInvoker {
    pricing: PricingTable,
}

impl EchoInvoker {
    pub fn new(pricing: PricingTable) -> Self {
        Self { pricing }
    }
}

#[async_trait]
impl LlmInvoker for EchoInvoker {
    async fn invoke(&self, request: LlmRequest) -> Result<LlmInvocation, LlmError> {
        let started = Instant::now();
        let text = format!("[echo:{}] {}", request.model, request.prompt);
        let usage = LlmUsage::new(
            request.prompt.split_whitespace().count() as u64,
            text.split_whitespace().count() as u64,
        );

        Ok(LlmInvocation {
            cost_cents: self.pricing.cost_cents(&request.model, &usage),
            latency_ms: started.elapsed().as_millis() as u64,
            text,
            model: request.model,
            usage,
        })
    }
}

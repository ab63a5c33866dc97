//! LLM invokers: an OpenAI-compatible client and the offline echo fallback

mod echo;
mod openai;
mod pricing;

use std::sync::Arc;
use std::time::Duration;

pub use echo::EchoInvoker;
pub use openai::OpenAiInvoker;
pub use pricing::PricingTable;

use crate::config::LlmConfig;
use crate::domain::llm::LlmInvoker;

/// Pick the invoker for this configuration: OpenAI when a key is set, echo otherwise
pub fn create_llm_invoker(config: &LlmConfig) -> anyhow::Result<Arc<dyn LlmInvoker>> {
    let pricing = PricingTable::new(config.pricing.clone());

    match config.api_key.as_deref().filter(|key| !key.is_empty()) {
        Some(api_key) => {
            tracing::info!(base_url = %config.base_url, "Using OpenAI-compatible LLM invoker");
            let invoker = OpenAiInvoker::new(
                &config.base_url,
                api_key,
                Duration::from_secs(config.request_timeout_secs),
                pricing,
            )?;
            Ok(Arc::new(invoker))
        }
        None => {
            tracing::warn!("No LLM API key configured, prompt steps will use the echo invoker");
            Ok(Arc::new(EchoInvoker::new(pricing)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::LlmRequest;

    #[tokio::test]
    async fn test_missing_key_selects_echo() {
        let config = LlmConfig::default();
        let invoker = create_llm_invoker(&config).unwrap();

        let result = invoker
            .invoke(LlmRequest::new("gpt-4o-mini", "hello"))
            .await
            .unwrap();
        assert_eq!(result.text, "[echo:gpt-4o-mini] hello");
    }

    #[tokio::test]
    async fn test_empty_key_selects_echo() {
        let config = LlmConfig {
            api_key: Some(String::new()),
            ..LlmConfig::default()
        };
        let invoker = create_llm_invoker(&config).unwrap();

        let result = invoker.invoke(LlmRequest::new("m", "x")).await.unwrap();
        assert!(result.text.starts_with("[echo:m]"));
    }
}

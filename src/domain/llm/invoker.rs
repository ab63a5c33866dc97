//! LLM invocation contract used by prompt steps

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::chain::ChainError;

/// A single-turn completion request
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub model: String,
    pub prompt: String,

    /// Provider parameters (temperature, max_tokens, ...) passed through as-is
    pub parameters: Map<String, Value>,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            parameters: Map::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Token usage reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl LlmUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Completion text plus telemetry
#[derive(Debug, Clone, PartialEq)]
pub struct LlmInvocation {
    pub text: String,
    pub model: String,
    pub usage: LlmUsage,
    pub cost_cents: f64,
    pub latency_ms: u64,
}

/// Failure categories distinguished by callers
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LlmError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("provider error: {message}")]
    Provider {
        status: Option<u16>,
        message: String,
    },
}

impl LlmError {
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            status: None,
            message: message.into(),
        }
    }

    pub fn provider_with_status(status: u16, message: impl Into<String>) -> Self {
        Self::Provider {
            status: Some(status),
            message: message.into(),
        }
    }
}

impl From<LlmError> for ChainError {
    fn from(err: LlmError) -> Self {
        let status = match &err {
            LlmError::RateLimited(_) => Some(429),
            LlmError::Auth(_) => Some(401),
            LlmError::Provider { status, .. } => *status,
        };

        ChainError::ExternalService {
            service: "llm".to_string(),
            message: err.to_string(),
            status,
        }
    }
}

/// Invokes a language model. Implementations own credentials and transport.
#[async_trait]
pub trait LlmInvoker: Send + Sync {
    async fn invoke(&self, request: LlmRequest) -> Result<LlmInvocation, LlmError>;
}

#[cfg(test)]
pub mod mock {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Scripted invoker: returns queued results in order, then echoes the prompt
    #[derive(Debug, Default)]
    pub struct MockLlmInvoker {
        responses: Mutex<Vec<Result<String, LlmError>>>,
        prompts: Mutex<Vec<String>>,
        call_count: AtomicUsize,
    }

    impl MockLlmInvoker {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_response(self, text: impl Into<String>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push(Ok(text.into()));
            self
        }

        pub fn with_error(self, error: LlmError) -> Self {
            self.responses.lock().unwrap().push(Err(error));
            self
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LlmInvoker for MockLlmInvoker {
        async fn invoke(&self, request: LlmRequest) -> Result<LlmInvocation, LlmError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(request.prompt.clone());

            let scripted = {
                let mut responses = self.responses.lock().unwrap();
                if responses.is_empty() {
                    None
                } else {
                    Some(responses.remove(0))
                }
            };

            let text = match scripted {
                Some(result) => result?,
                None => format!("echo: {}", request.prompt),
            };

            Ok(LlmInvocation {
                text,
                model: request.model,
                usage: LlmUsage::new(10, 5),
                cost_cents: 0.0,
                latency_ms: 1,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_maps_to_external_service() {
        let err: ChainError = LlmError::RateLimited("slow down".to_string()).into();

        match err {
            ChainError::ExternalService {
                service, status, ..
            } => {
                assert_eq!(service, "llm");
                assert_eq!(status, Some(429));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_usage_total() {
        assert_eq!(LlmUsage::new(12, 30).total(), 42);
    }
}

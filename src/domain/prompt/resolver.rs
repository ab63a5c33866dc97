//! Prompt resolution contract

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::{Map, Value};

use crate::domain::chain::ChainError;

/// Prompt content and defaults as seen by a prompt step
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPrompt {
    pub content: String,
    pub default_model: Option<String>,
    pub default_parameters: Map<String, Value>,
}

impl ResolvedPrompt {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            default_model: None,
            default_parameters: Map::new(),
        }
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }
}

/// Resolves a prompt ID to its content. Unknown IDs are configuration errors.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PromptResolver: Send + Sync {
    async fn resolve(&self, prompt_id: &str) -> Result<ResolvedPrompt, ChainError>;
}

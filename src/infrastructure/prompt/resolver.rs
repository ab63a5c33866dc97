use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::chain::ChainError;
use crate::domain::prompt::{Prompt, PromptId, PromptResolver, ResolvedPrompt};
use crate::domain::storage::Storage;

/// Resolves prompt ids against the prompt library
#[derive(Debug, Clone)]
pub struct StoragePromptResolver {
    storage: Arc<dyn Storage<Prompt>>,
}

impl StoragePromptResolver {
    pub fn new(storage: Arc<dyn Storage<Prompt>>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl PromptResolver for StoragePromptResolver {
    async fn resolve(&self, prompt_id: &str) -> Result<ResolvedPrompt, ChainError> {
        let id = PromptId::new(prompt_id).map_err(|e| ChainError::configuration(e.to_string()))?;

        let prompt = self
            .storage
            .get(&id)
            .await
            .map_err(|e| ChainError::external("prompt library", e.to_string()))?
            .ok_or_else(|| ChainError::configuration(format!("prompt '{}' not found", id)))?;

        let mut resolved = ResolvedPrompt::new(prompt.content());
        resolved.default_model = prompt.default_model().map(str::to_string);
        resolved.default_parameters = prompt.default_parameters().clone();
        Ok(resolved)
    }
}

//! Prompt service - CRUD for the prompt library used by prompt steps

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;

use crate::domain::prompt::{Prompt, PromptId};
use crate::domain::storage::Storage;
use crate::domain::DomainError;

/// Request to create a new prompt
#[derive(Debug, Clone)]
pub struct CreatePromptRequest {
    pub id: String,
    pub name: String,
    pub content: String,
    pub default_model: Option<String>,
    pub default_parameters: Map<String, Value>,
}

/// Request to update an existing prompt
#[derive(Debug, Clone, Default)]
pub struct UpdatePromptRequest {
    pub name: Option<String>,
    pub content: Option<String>,
    pub default_model: Option<Option<String>>,
    pub default_parameters: Option<Map<String, Value>>,
}

/// Prompt library service
pub struct PromptService {
    storage: Arc<dyn Storage<Prompt>>,
}

impl std::fmt::Debug for PromptService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptService").finish()
    }
}

impl PromptService {
    pub fn new(storage: Arc<dyn Storage<Prompt>>) -> Self {
        Self { storage }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Prompt>, DomainError> {
        let prompt_id = self.parse_id(id)?;
        self.storage.get(&prompt_id).await
    }

    pub async fn get_required(&self, id: &str) -> Result<Prompt, DomainError> {
        self.get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Prompt '{}' not found", id)))
    }

    pub async fn list(&self) -> Result<Vec<Prompt>, DomainError> {
        self.storage.list().await
    }

    pub async fn create(&self, request: CreatePromptRequest) -> Result<Prompt, DomainError> {
        let prompt_id = self.parse_id(&request.id)?;

        if self.storage.exists(&prompt_id).await? {
            return Err(DomainError::conflict(format!(
                "Prompt '{}' already exists",
                request.id
            )));
        }
        if request.content.trim().is_empty() {
            return Err(DomainError::validation("Prompt content cannot be empty"));
        }

        let mut prompt = Prompt::new(prompt_id, request.name, request.content)
            .with_default_parameters(request.default_parameters);
        if let Some(model) = request.default_model {
            prompt = prompt.with_default_model(model);
        }

        let created = self.storage.create(prompt).await?;
        info!(prompt_id = %created.id(), "Created prompt");
        Ok(created)
    }

    pub async fn update(
        &self,
        id: &str,
        request: UpdatePromptRequest,
    ) -> Result<Prompt, DomainError> {
        let mut prompt = self.get_required(id).await?;

        if let Some(name) = request.name {
            prompt.set_name(name);
        }
        if let Some(content) = request.content {
            if content.trim().is_empty() {
                return Err(DomainError::validation("Prompt content cannot be empty"));
            }
            prompt.set_content(content);
        }
        if let Some(model) = request.default_model {
            prompt.set_default_model(model);
        }
        if let Some(parameters) = request.default_parameters {
            prompt.set_default_parameters(parameters);
        }

        self.storage.update(prompt).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), DomainError> {
        let prompt_id = self.parse_id(id)?;

        if !self.storage.delete(&prompt_id).await? {
            return Err(DomainError::not_found(format!("Prompt '{}' not found", id)));
        }
        Ok(())
    }

    fn parse_id(&self, id: &str) -> Result<PromptId, DomainError> {
        PromptId::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::infrastructure::storage::InMemoryStorage;

    fn service() -> PromptService {
        PromptService::new(Arc::new(InMemoryStorage::<Prompt>::new()))
    }

    fn create_request(id: &str, content: &str) -> CreatePromptRequest {
        CreatePromptRequest {
            id: id.to_string(),
            name: "Summary".to_string(),
            content: content.to_string(),
            default_model: Some("gpt-4o-mini".to_string()),
            default_parameters: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_create_get_update_delete() {
        let service = service();

        let created = service
            .create(create_request("summary", "Summarize {{text}}"))
            .await
            .unwrap();
        assert_eq!(created.default_model(), Some("gpt-4o-mini"));

        let updated = service
            .update(
                "summary",
                UpdatePromptRequest {
                    content: Some("Briefly summarize {{text}}".to_string()),
                    default_model: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.content(), "Briefly summarize {{text}}");
        assert!(updated.default_model().is_none());

        service.delete("summary").await.unwrap();
        assert!(service.get("summary").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_and_empty_content_rejected() {
        let service = service();
        service
            .create(create_request("summary", "Summarize {{text}}"))
            .await
            .unwrap();

        let duplicate = service
            .create(create_request("summary", "Other"))
            .await
            .unwrap_err();
        assert!(matches!(duplicate, DomainError::Conflict { .. }));

        let empty = service.create(create_request("blank", "  ")).await.unwrap_err();
        assert!(matches!(empty, DomainError::Validation { .. }));
    }
}

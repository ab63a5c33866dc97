//! Chain service - CRUD for chain definitions, validated at save time

use std::sync::Arc;

use tracing::info;

use crate::domain::chain::{validate_chain, ChainDefinition, ChainId, ChainTrigger, StepDefinition};
use crate::domain::storage::Storage;
use crate::domain::DomainError;

/// Partial update of a chain; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct UpdateChainRequest {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub steps: Option<Vec<StepDefinition>>,
    pub trigger: Option<(ChainTrigger, Option<String>)>,
    pub active: Option<bool>,
    pub max_execution_time_ms: Option<Option<u64>>,
}

impl UpdateChainRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_steps(mut self, steps: Vec<StepDefinition>) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }
}

/// Chain definition service
pub struct ChainService {
    storage: Arc<dyn Storage<ChainDefinition>>,
}

impl std::fmt::Debug for ChainService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainService").finish()
    }
}

impl ChainService {
    pub fn new(storage: Arc<dyn Storage<ChainDefinition>>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn Storage<ChainDefinition>> {
        &self.storage
    }

    pub async fn get(&self, id: &str) -> Result<Option<ChainDefinition>, DomainError> {
        let chain_id = self.parse_id(id)?;
        self.storage.get(&chain_id).await
    }

    pub async fn get_required(&self, id: &str) -> Result<ChainDefinition, DomainError> {
        self.get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Chain '{}' not found", id)))
    }

    pub async fn list(&self) -> Result<Vec<ChainDefinition>, DomainError> {
        self.storage.list().await
    }

    /// Store a new chain. Dangling references, cycles and bad configs are rejected here.
    pub async fn create(&self, chain: ChainDefinition) -> Result<ChainDefinition, DomainError> {
        if self.storage.exists(chain.id()).await? {
            return Err(DomainError::conflict(format!(
                "Chain '{}' already exists",
                chain.id()
            )));
        }

        validate_chain(&chain)?;

        let created = self.storage.create(chain).await?;
        info!(chain_id = %created.id(), steps = created.steps().len(), "Created chain");
        Ok(created)
    }

    pub async fn update(
        &self,
        id: &str,
        request: UpdateChainRequest,
    ) -> Result<ChainDefinition, DomainError> {
        let mut chain = self.get_required(id).await?;

        if let Some(name) = request.name {
            chain.set_name(name);
        }
        if let Some(description) = request.description {
            chain.set_description(description);
        }
        if let Some(steps) = request.steps {
            chain.set_steps(steps);
        }
        if let Some((trigger, schedule)) = request.trigger {
            chain.set_trigger(trigger, schedule);
        }
        if let Some(active) = request.active {
            chain.set_active(active);
        }
        if let Some(max_execution_time_ms) = request.max_execution_time_ms {
            chain.set_max_execution_time_ms(max_execution_time_ms);
        }

        validate_chain(&chain)?;

        let updated = self.storage.update(chain).await?;
        info!(chain_id = %updated.id(), version = updated.version(), "Updated chain");
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<(), DomainError> {
        let chain_id = self.parse_id(id)?;

        if !self.storage.delete(&chain_id).await? {
            return Err(DomainError::not_found(format!("Chain '{}' not found", id)));
        }

        info!(chain_id = %chain_id, "Deleted chain");
        Ok(())
    }

    fn parse_id(&self, id: &str) -> Result<ChainId, DomainError> {
        ChainId::new(id).map_err(|e| DomainError::invalid_id(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::infrastructure::storage::InMemoryStorage;

    fn service() -> ChainService {
        ChainService::new(Arc::new(InMemoryStorage::<ChainDefinition>::new()))
    }

    fn chain(steps: serde_json::Value) -> ChainDefinition {
        serde_json::from_value(json!({"id": "triage", "name": "Triage", "steps": steps})).unwrap()
    }

    fn code_step(id: &str) -> serde_json::Value {
        json!({"id": id, "type": "code", "config": {"code": "1"}})
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let service = service();

        service.create(chain(json!([code_step("a")]))).await.unwrap();

        let stored = service.get_required("triage").await.unwrap();
        assert_eq!(stored.name(), "Triage");
        assert_eq!(service.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_dangling_reference() {
        let service = service();
        let invalid = chain(json!([{
            "id": "check",
            "type": "condition",
            "config": {
                "conditionType": "exists",
                "variable": "x",
                "thenAction": "goto",
                "thenSteps": ["nowhere"]
            }
        }]));

        let err = service.create(invalid).await.unwrap_err();

        assert!(matches!(err, DomainError::Validation { .. }));
        assert!(service.get("triage").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_is_conflict() {
        let service = service();
        service.create(chain(json!([code_step("a")]))).await.unwrap();

        let err = service
            .create(chain(json!([code_step("a")])))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_revalidates() {
        let service = service();
        service.create(chain(json!([code_step("a")]))).await.unwrap();

        let updated = service
            .update("triage", UpdateChainRequest::new().with_name("Renamed"))
            .await
            .unwrap();
        assert_eq!(updated.name(), "Renamed");
        assert_eq!(updated.version(), 2);

        let err = service
            .update("triage", UpdateChainRequest::new().with_steps(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let service = service();

        let err = service.delete("ghost").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalid_id_is_rejected() {
        let service = service();

        let err = service.get("bad id").await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidId { .. }));
    }
}

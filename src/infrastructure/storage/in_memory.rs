//! In-memory storage backend

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::domain::storage::{Storage, StorageEntity, StorageKey};
use crate::domain::DomainError;

/// Process-local storage; contents are lost on restart
#[derive(Debug)]
pub struct InMemoryStorage<E>
where
    E: StorageEntity,
{
    entities: RwLock<HashMap<String, E>>,
}

impl<E> Default for InMemoryStorage<E>
where
    E: StorageEntity,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> InMemoryStorage<E>
where
    E: StorageEntity,
{
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Storage seeded with `entities`, later duplicates replacing earlier ones
    pub fn with_entities(entities: Vec<E>) -> Self {
        let map = entities
            .into_iter()
            .map(|entity| (entity.key().as_str().to_string(), entity))
            .collect();
        Self {
            entities: RwLock::new(map),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, E>>, DomainError> {
        self.entities
            .read()
            .map_err(|e| DomainError::storage(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, E>>, DomainError> {
        self.entities
            .write()
            .map_err(|e| DomainError::storage(format!("Failed to acquire write lock: {}", e)))
    }
}

#[async_trait]
impl<E> Storage<E> for InMemoryStorage<E>
where
    E: StorageEntity + 'static,
{
    async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError> {
        Ok(self.read()?.get(key.as_str()).cloned())
    }

    async fn list(&self) -> Result<Vec<E>, DomainError> {
        Ok(self.read()?.values().cloned().collect())
    }

    async fn create(&self, entity: E) -> Result<E, DomainError> {
        let key = entity.key().as_str().to_string();
        let mut entities = self.write()?;

        if entities.contains_key(&key) {
            return Err(DomainError::conflict(format!("'{}' already exists", key)));
        }

        entities.insert(key, entity.clone());
        Ok(entity)
    }

    async fn update(&self, entity: E) -> Result<E, DomainError> {
        let key = entity.key().as_str().to_string();
        let mut entities = self.write()?;

        match entities.get_mut(&key) {
            Some(slot) => {
                *slot = entity.clone();
                Ok(entity)
            }
            None => Err(DomainError::not_found(format!("'{}' not found", key))),
        }
    }

    async fn save(&self, entity: E) -> Result<E, DomainError> {
        self.write()?
            .insert(entity.key().as_str().to_string(), entity.clone());
        Ok(entity)
    }

    async fn delete(&self, key: &E::Key) -> Result<bool, DomainError> {
        Ok(self.write()?.remove(key.as_str()).is_some())
    }

    async fn exists(&self, key: &E::Key) -> Result<bool, DomainError> {
        Ok(self.read()?.contains_key(key.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::{ChainDefinition, ChainId};
    use crate::domain::execution::ExecutionRecord;
    use serde_json::Map;

    fn chain(id: &str, name: &str) -> ChainDefinition {
        ChainDefinition::new(ChainId::new(id).unwrap(), name)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let storage = InMemoryStorage::new();
        storage.create(chain("triage", "Triage")).await.unwrap();

        let found = storage.get(&ChainId::new("triage").unwrap()).await.unwrap();
        assert_eq!(found.map(|c| c.name().to_string()), Some("Triage".to_string()));
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let storage = InMemoryStorage::with_entities(vec![chain("triage", "Triage")]);

        let result = storage.create(chain("triage", "Other")).await;
        assert!(matches!(result, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_update_requires_existing() {
        let storage: InMemoryStorage<ChainDefinition> = InMemoryStorage::new();

        let result = storage.update(chain("triage", "Triage")).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_save_replaces_record() {
        let storage = InMemoryStorage::new();
        let mut record = ExecutionRecord::new(ChainId::new("c").unwrap(), 1, Map::new());
        storage.save(record.clone()).await.unwrap();

        record.start();
        storage.save(record.clone()).await.unwrap();

        let stored = storage.require(record.id()).await.unwrap();
        assert_eq!(stored.status(), record.status());
        assert_eq!(storage.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = InMemoryStorage::with_entities(vec![chain("a", "A"), chain("b", "B")]);

        assert!(storage.delete(&ChainId::new("a").unwrap()).await.unwrap());
        assert!(!storage.delete(&ChainId::new("a").unwrap()).await.unwrap());
        assert!(!storage.exists(&ChainId::new("a").unwrap()).await.unwrap());
        assert_eq!(storage.list().await.unwrap().len(), 1);
    }
}

//! Persistence contract shared by chains, executions, prompts and queries

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::DomainError;

use super::entity::{StorageEntity, StorageKey};

/// Create/read/update-by-id persistence for one entity type
#[async_trait]
pub trait Storage<E>: Send + Sync + Debug
where
    E: StorageEntity + 'static,
{
    async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError>;

    async fn list(&self) -> Result<Vec<E>, DomainError>;

    /// Fails with `Conflict` when the key is taken
    async fn create(&self, entity: E) -> Result<E, DomainError>;

    /// Fails with `NotFound` when the key is unknown
    async fn update(&self, entity: E) -> Result<E, DomainError>;

    /// Create or replace
    async fn save(&self, entity: E) -> Result<E, DomainError> {
        if self.exists(entity.key()).await? {
            self.update(entity).await
        } else {
            self.create(entity).await
        }
    }

    async fn delete(&self, key: &E::Key) -> Result<bool, DomainError>;

    async fn exists(&self, key: &E::Key) -> Result<bool, DomainError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Like `get`, but a missing entity is a `NotFound` error
    async fn require(&self, key: &E::Key) -> Result<E, DomainError> {
        self.get(key)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("'{}' not found", key.as_str())))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Storage double that can be switched into a failing mode
    #[derive(Debug)]
    pub struct MockStorage<E>
    where
        E: StorageEntity,
    {
        entities: Mutex<HashMap<String, E>>,
        failure: Mutex<Option<String>>,
        writes: Mutex<usize>,
    }

    impl<E> Default for MockStorage<E>
    where
        E: StorageEntity,
    {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<E> MockStorage<E>
    where
        E: StorageEntity,
    {
        pub fn new() -> Self {
            Self {
                entities: Mutex::new(HashMap::new()),
                failure: Mutex::new(None),
                writes: Mutex::new(0),
            }
        }

        pub fn with_entity(self, entity: E) -> Self {
            self.entities
                .lock()
                .unwrap()
                .insert(entity.key().as_str().to_string(), entity);
            self
        }

        pub fn failing(self, message: impl Into<String>) -> Self {
            *self.failure.lock().unwrap() = Some(message.into());
            self
        }

        /// Number of successful create/update calls
        pub fn write_count(&self) -> usize {
            *self.writes.lock().unwrap()
        }

        fn check(&self) -> Result<(), DomainError> {
            match self.failure.lock().unwrap().clone() {
                Some(message) => Err(DomainError::storage(message)),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl<E> Storage<E> for MockStorage<E>
    where
        E: StorageEntity + 'static,
    {
        async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError> {
            self.check()?;
            Ok(self.entities.lock().unwrap().get(key.as_str()).cloned())
        }

        async fn list(&self) -> Result<Vec<E>, DomainError> {
            self.check()?;
            Ok(self.entities.lock().unwrap().values().cloned().collect())
        }

        async fn create(&self, entity: E) -> Result<E, DomainError> {
            self.check()?;
            let key = entity.key().as_str().to_string();
            let mut entities = self.entities.lock().unwrap();
            if entities.contains_key(&key) {
                return Err(DomainError::conflict(format!("'{}' already exists", key)));
            }
            entities.insert(key, entity.clone());
            *self.writes.lock().unwrap() += 1;
            Ok(entity)
        }

        async fn update(&self, entity: E) -> Result<E, DomainError> {
            self.check()?;
            let key = entity.key().as_str().to_string();
            let mut entities = self.entities.lock().unwrap();
            if !entities.contains_key(&key) {
                return Err(DomainError::not_found(format!("'{}' not found", key)));
            }
            entities.insert(key, entity.clone());
            *self.writes.lock().unwrap() += 1;
            Ok(entity)
        }

        async fn delete(&self, key: &E::Key) -> Result<bool, DomainError> {
            self.check()?;
            Ok(self.entities.lock().unwrap().remove(key.as_str()).is_some())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::domain::query::{QueryId, StoredQuery};

        fn query(id: &str, sql: &str) -> StoredQuery {
            StoredQuery::new(QueryId::new(id).unwrap(), id, sql)
        }

        #[tokio::test]
        async fn test_create_then_conflict() {
            let storage = MockStorage::new();

            storage.create(query("q1", "SELECT 1")).await.unwrap();
            let result = storage.create(query("q1", "SELECT 2")).await;

            assert!(matches!(result, Err(DomainError::Conflict { .. })));
            assert_eq!(storage.write_count(), 1);
        }

        #[tokio::test]
        async fn test_save_creates_then_replaces() {
            let storage = MockStorage::new();

            storage.save(query("q1", "SELECT 1")).await.unwrap();
            storage.save(query("q1", "SELECT 2")).await.unwrap();

            let stored = storage.require(&QueryId::new("q1").unwrap()).await.unwrap();
            assert_eq!(stored.sql(), "SELECT 2");
            assert_eq!(storage.write_count(), 2);
        }

        #[tokio::test]
        async fn test_require_missing_is_not_found() {
            let storage: MockStorage<StoredQuery> = MockStorage::new();

            let result = storage.require(&QueryId::new("nope").unwrap()).await;
            assert!(matches!(result, Err(DomainError::NotFound { .. })));
        }

        #[tokio::test]
        async fn test_failing_storage() {
            let storage: MockStorage<StoredQuery> =
                MockStorage::new().with_entity(query("q1", "SELECT 1")).failing("disk full");

            assert!(storage.list().await.is_err());
            assert!(storage.delete(&QueryId::new("q1").unwrap()).await.is_err());
        }
    }
}

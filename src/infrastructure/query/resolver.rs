use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::chain::ChainError;
use crate::domain::query::{QueryId, QueryResolver, StoredQuery};
use crate::domain::storage::Storage;

/// Resolves query ids against the query registry
#[derive(Debug, Clone)]
pub struct StorageQueryResolver {
    storage: Arc<dyn Storage<StoredQuery>>,
}

impl StorageQueryResolver {
    pub fn new(storage: Arc<dyn Storage<StoredQuery>>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl QueryResolver for StorageQueryResolver {
    async fn resolve(&self, query_id: &str) -> Result<StoredQuery, ChainError> {
        let id = QueryId::new(query_id).map_err(|e| ChainError::configuration(e.to_string()))?;

        self.storage
            .get(&id)
            .await
            .map_err(|e| ChainError::external("query registry", e.to_string()))?
            .ok_or_else(|| ChainError::configuration(format!("query '{}' is not registered", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::InMemoryStorage;

    #[tokio::test]
    async fn test_resolve_registered_query() {
        let query = StoredQuery::new(QueryId::new("orders").unwrap(), "Orders", "SELECT 1");
        let resolver = StorageQueryResolver::new(Arc::new(InMemoryStorage::with_entities(vec![query])));

        let resolved = resolver.resolve("orders").await.unwrap();
        assert_eq!(resolved.sql(), "SELECT 1");
    }

    #[tokio::test]
    async fn test_unknown_query_is_configuration_error() {
        let resolver = StorageQueryResolver::new(Arc::new(InMemoryStorage::<StoredQuery>::new()));

        let err = resolver.resolve("missing").await.unwrap_err();
        assert!(matches!(err, ChainError::Configuration(_)));
    }
}

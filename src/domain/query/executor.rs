//! Query resolution and execution contracts

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;

use super::entity::StoredQuery;
use crate::domain::chain::ChainError;

/// Rows returned by a query, each row a JSON object keyed by column
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Value>,
    pub row_count: u64,
}

/// Looks up a registered query by ID
#[cfg_attr(test, automock)]
#[async_trait]
pub trait QueryResolver: Send + Sync {
    async fn resolve(&self, query_id: &str) -> Result<StoredQuery, ChainError>;
}

/// Runs a registered query on a named connection with positional parameters.
///
/// Connections are read-only unless configured otherwise.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(
        &self,
        connection_id: &str,
        query: &StoredQuery,
        params: Vec<Value>,
    ) -> Result<QueryResult, ChainError>;
}

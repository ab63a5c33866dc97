//! Query service - registry of vetted SQL for database steps

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::domain::chain::is_valid_identifier;
use crate::domain::query::{QueryId, StoredQuery};
use crate::domain::storage::Storage;
use crate::domain::DomainError;

static POSITIONAL_PARAMETER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\d+)").unwrap());

/// Request to register a stored query
#[derive(Debug, Clone)]
pub struct RegisterQueryRequest {
    pub id: String,
    pub name: String,
    pub sql: String,
    pub parameters: Vec<String>,
}

/// Stored query registry service
pub struct QueryService {
    storage: Arc<dyn Storage<StoredQuery>>,
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService").finish()
    }
}

impl QueryService {
    pub fn new(storage: Arc<dyn Storage<StoredQuery>>) -> Self {
        Self { storage }
    }

    pub async fn get_required(&self, id: &str) -> Result<StoredQuery, DomainError> {
        let query_id = QueryId::new(id)?;
        self.storage
            .get(&query_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Query '{}' not found", id)))
    }

    pub async fn list(&self) -> Result<Vec<StoredQuery>, DomainError> {
        self.storage.list().await
    }

    /// Register a query. Every `$n` placeholder must have a named parameter.
    pub async fn register(&self, request: RegisterQueryRequest) -> Result<StoredQuery, DomainError> {
        let query_id = QueryId::new(&request.id)?;

        if self.storage.exists(&query_id).await? {
            return Err(DomainError::conflict(format!(
                "Query '{}' already exists",
                request.id
            )));
        }
        validate_sql(&request.sql, &request.parameters)?;

        let query = StoredQuery::new(query_id, request.name, request.sql)
            .with_parameters(request.parameters);
        let created = self.storage.create(query).await?;
        info!(query_id = %created.id(), "Registered query");
        Ok(created)
    }

    pub async fn delete(&self, id: &str) -> Result<(), DomainError> {
        let query_id = QueryId::new(id)?;

        if !self.storage.delete(&query_id).await? {
            return Err(DomainError::not_found(format!("Query '{}' not found", id)));
        }
        Ok(())
    }
}

fn validate_sql(sql: &str, parameters: &[String]) -> Result<(), DomainError> {
    if sql.trim().is_empty() {
        return Err(DomainError::validation("Query SQL cannot be empty"));
    }

    if let Some(bad) = parameters.iter().find(|p| !is_valid_identifier(p)) {
        return Err(DomainError::validation(format!(
            "Invalid parameter name '{}'",
            bad
        )));
    }

    let highest = POSITIONAL_PARAMETER
        .captures_iter(sql)
        .filter_map(|caps| caps[1].parse::<usize>().ok())
        .max()
        .unwrap_or(0);

    if highest != parameters.len() {
        return Err(DomainError::validation(format!(
            "Query uses {} positional parameters but names {}",
            highest,
            parameters.len()
        )));
    }

    Ok(())
}

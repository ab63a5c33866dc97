//! Stored query entity

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::storage::{StorageEntity, StorageKey};
use crate::domain::DomainError;

static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*[a-zA-Z0-9]$|^[a-zA-Z0-9]$").unwrap()
});

/// Validated stored query identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueryId(String);

impl QueryId {
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();

        if id.len() > 64 || !ID_PATTERN.is_match(&id) {
            return Err(DomainError::invalid_id(format!(
                "Invalid query ID '{}': must be alphanumeric with hyphens or underscores",
                id
            )));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for QueryId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueryId> for String {
    fn from(id: QueryId) -> Self {
        id.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for QueryId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// A vetted SQL statement with positional parameters (`$1`, `$2`, ...).
///
/// `parameters` names the step variables bound to each position, in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredQuery {
    id: QueryId,
    name: String,
    sql: String,
    #[serde(default)]
    parameters: Vec<String>,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl StoredQuery {
    pub fn new(id: QueryId, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            sql: sql.into(),
            parameters: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn id(&self) -> &QueryId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl StorageEntity for StoredQuery {
    type Key = QueryId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}

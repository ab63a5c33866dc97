//! Prompt entity

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::storage::{StorageEntity, StorageKey};
use crate::domain::DomainError;

/// Maximum length for prompt IDs
pub const MAX_ID_LENGTH: usize = 64;

static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*[a-zA-Z0-9]$|^[a-zA-Z0-9]$").unwrap()
});

/// Validated prompt identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PromptId(String);

impl PromptId {
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();

        if id.is_empty() {
            return Err(DomainError::invalid_id("Prompt ID cannot be empty"));
        }

        if id.len() > MAX_ID_LENGTH {
            return Err(DomainError::invalid_id(format!(
                "Prompt ID exceeds maximum length of {} characters",
                MAX_ID_LENGTH
            )));
        }

        if !ID_PATTERN.is_match(&id) {
            return Err(DomainError::invalid_id(format!(
                "Invalid prompt ID '{}': must be alphanumeric with hyphens or underscores",
                id
            )));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PromptId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PromptId> for String {
    fn from(id: PromptId) -> Self {
        id.0
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for PromptId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// A reusable prompt template with its default model settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    id: PromptId,
    name: String,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_model: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    default_parameters: Map<String, Value>,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
}

impl Prompt {
    pub fn new(id: PromptId, name: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            content: content.into(),
            default_model: None,
            default_parameters: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_default_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.default_parameters = parameters;
        self
    }

    pub fn id(&self) -> &PromptId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    pub fn default_parameters(&self) -> &Map<String, Value> {
        &self.default_parameters
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.updated_at = Utc::now();
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.updated_at = Utc::now();
    }

    pub fn set_default_model(&mut self, model: Option<String>) {
        self.default_model = model;
        self.updated_at = Utc::now();
    }

    pub fn set_default_parameters(&mut self, parameters: Map<String, Value>) {
        self.default_parameters = parameters;
        self.updated_at = Utc::now();
    }
}

impl StorageEntity for Prompt {
    type Key = PromptId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_id_validation() {
        assert!(PromptId::new("summarize-ticket").is_ok());
        assert!(PromptId::new("").is_err());
        assert!(PromptId::new("no spaces").is_err());
    }

    #[test]
    fn test_prompt_deserialization_defaults() {
        let prompt: Prompt = serde_json::from_value(json!({
            "id": "greet",
            "name": "Greet",
            "content": "Say hi to {{name}}"
        }))
        .unwrap();

        assert_eq!(prompt.content(), "Say hi to {{name}}");
        assert!(prompt.default_model().is_none());
        assert!(prompt.default_parameters().is_empty());
    }

    #[test]
    fn test_set_content_updates_timestamp() {
        let mut prompt = Prompt::new(PromptId::new("p").unwrap(), "P", "v1");
        let before = prompt.updated_at();

        prompt.set_content("v2");

        assert_eq!(prompt.content(), "v2");
        assert!(prompt.updated_at() >= before);
    }
}

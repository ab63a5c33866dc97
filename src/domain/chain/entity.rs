//! Chain definition entity

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::ChainError;
use super::step_types::StepDefinition;
use crate::domain::storage::{StorageEntity, StorageKey};

/// Maximum length for chain and step IDs
pub const MAX_ID_LENGTH: usize = 64;

/// Alphanumeric with `-` and `_`, starting and ending alphanumeric
static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*[a-zA-Z0-9]$|^[a-zA-Z0-9]$").unwrap()
});

fn validate_id(kind: &str, id: &str) -> Result<(), ChainError> {
    if id.is_empty() {
        return Err(ChainError::configuration(format!("{} ID cannot be empty", kind)));
    }

    if id.len() > MAX_ID_LENGTH {
        return Err(ChainError::configuration(format!(
            "{} ID exceeds maximum length of {} characters",
            kind, MAX_ID_LENGTH
        )));
    }

    if !ID_PATTERN.is_match(id) {
        return Err(ChainError::configuration(format!(
            "Invalid {} ID '{}': must be alphanumeric with hyphens or underscores",
            kind.to_lowercase(),
            id
        )));
    }

    Ok(())
}

/// Validated chain identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChainId(String);

impl ChainId {
    pub fn new(id: impl Into<String>) -> Result<Self, ChainError> {
        let id = id.into();
        validate_id("Chain", &id)?;
        Ok(Self(id))
    }

    /// Generate a new chain ID with UUID
    pub fn generate() -> Self {
        Self(format!("chain-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ChainId {
    type Error = ChainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChainId> for String {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ChainId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl StorageKey for ChainId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifier of a step, unique within its chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Result<Self, ChainError> {
        let id = id.into();
        validate_id("Step", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StepId {
    type Error = ChainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StepId> for String {
    fn from(id: StepId) -> Self {
        id.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How runs of a chain are started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChainTrigger {
    #[default]
    Manual,
    Webhook,
    Schedule,
}

impl fmt::Display for ChainTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Webhook => write!(f, "webhook"),
            Self::Schedule => write!(f, "schedule"),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

/// An ordered list of steps plus trigger metadata.
///
/// Runs execute against a snapshot of the definition taken when they start,
/// so later edits never affect a run in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDefinition {
    id: ChainId,

    #[serde(default)]
    workspace_id: String,

    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    steps: Vec<StepDefinition>,

    #[serde(default)]
    trigger: ChainTrigger,

    /// Cron expression, required when `trigger` is `schedule`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schedule: Option<String>,

    #[serde(default = "default_true")]
    active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_execution_time_ms: Option<u64>,

    #[serde(default = "default_version")]
    version: u32,

    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
}

impl ChainDefinition {
    pub fn new(id: ChainId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            workspace_id: String::new(),
            name: name.into(),
            description: None,
            steps: Vec::new(),
            trigger: ChainTrigger::default(),
            schedule: None,
            active: true,
            max_execution_time_ms: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = workspace_id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_steps(mut self, steps: Vec<StepDefinition>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_trigger(mut self, trigger: ChainTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.trigger = ChainTrigger::Schedule;
        self.schedule = Some(schedule.into());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_max_execution_time_ms(mut self, max_execution_time_ms: u64) -> Self {
        self.max_execution_time_ms = Some(max_execution_time_ms);
        self
    }

    pub fn id(&self) -> &ChainId {
        &self.id
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn trigger(&self) -> ChainTrigger {
        self.trigger
    }

    pub fn schedule(&self) -> Option<&str> {
        self.schedule.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn max_execution_time_ms(&self) -> Option<u64> {
        self.max_execution_time_ms
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Find a step by ID
    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id.as_str() == id)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
        self.touch();
    }

    pub fn set_steps(&mut self, steps: Vec<StepDefinition>) {
        self.steps = steps;
        self.touch();
    }

    pub fn set_trigger(&mut self, trigger: ChainTrigger, schedule: Option<String>) {
        self.trigger = trigger;
        self.schedule = schedule;
        self.touch();
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        self.touch();
    }

    pub fn set_max_execution_time_ms(&mut self, max_execution_time_ms: Option<u64>) {
        self.max_execution_time_ms = max_execution_time_ms;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version += 1;
    }
}

impl StorageEntity for ChainDefinition {
    type Key = ChainId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}

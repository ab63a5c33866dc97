//! Inputs for starting a run

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::chain::StepId;

use super::entity::ExecutionId;

/// Everything a run needs besides the chain itself
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    /// Initial root-scope variables
    #[serde(default)]
    pub inputs: Map<String, Value>,

    /// Payloads delivered to webhook steps, keyed by step id
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub webhook_payloads: HashMap<StepId, Value>,

    /// Set when a condition step starts this run as a child
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<ExecutionId>,
}

impl RunRequest {
    pub fn new(inputs: Map<String, Value>) -> Self {
        Self {
            inputs,
            ..Self::default()
        }
    }

    pub fn with_webhook_payload(mut self, step_id: StepId, payload: Value) -> Self {
        self.webhook_payloads.insert(step_id, payload);
        self
    }

    pub fn with_parent(mut self, parent: ExecutionId) -> Self {
        self.parent_execution_id = Some(parent);
        self
    }
}

//! Execution record entities

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::approval::ApprovalRequest;
use crate::domain::chain::{CancelReason, ChainError, ChainId, ErrorKind, StepId, StepType};
use crate::domain::storage::{StorageEntity, StorageKey};
use crate::domain::DomainError;

/// Regex pattern for valid execution IDs: exec-{uuid}
static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^exec-[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}$").unwrap()
});

/// Validated execution identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if !ID_PATTERN.is_match(&id) {
            return Err(DomainError::invalid_id(format!(
                "Invalid execution ID '{}': must be in format exec-{{uuid}}",
                id
            )));
        }
        Ok(Self(id))
    }

    /// Generate a new execution ID with UUID
    pub fn generate() -> Self {
        Self(format!("exec-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ExecutionId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ExecutionId> for String {
    fn from(id: ExecutionId) -> Self {
        id.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl StorageKey for ExecutionId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created, not started
    #[default]
    Pending,

    Running,

    /// Waiting on an approval decision
    Paused,

    Success,
    Error,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Cancelled)
    }

    pub fn can_transition_to(&self, target: ExecutionStatus) -> bool {
        match (self, target) {
            (Self::Pending, Self::Running) => true,
            (Self::Pending, Self::Cancelled) => true,
            (Self::Pending, Self::Error) => true,

            (Self::Running, Self::Paused) => true,
            (Self::Running, Self::Success) => true,
            (Self::Running, Self::Error) => true,
            (Self::Running, Self::Cancelled) => true,

            (Self::Paused, Self::Running) => true,
            (Self::Paused, Self::Cancelled) => true,

            _ => false,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Status of one step execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Success,
    Error,

    /// Passed over by `skip` or `stop`
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Skipped)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Collaborator-reported measurements for a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTelemetry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_cents: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

impl StepTelemetry {
    pub fn http(status: u16) -> Self {
        Self {
            http_status: Some(status),
            ..Self::default()
        }
    }

    pub fn rows(row_count: u64) -> Self {
        Self {
            row_count: Some(row_count),
            ..Self::default()
        }
    }
}

/// One execution of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step_id: StepId,

    #[serde(rename = "type")]
    pub step_type: StepType,

    pub name: String,

    pub status: StepStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Attempts made, including retries
    #[serde(default)]
    pub attempts: u32,

    /// Enclosing step for loop/switch bodies and goto side trips
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_step_id: Option<StepId>,

    /// Zero-based loop iteration this execution belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<StepTelemetry>,
}

impl StepRecord {
    fn new(step_id: StepId, step_type: StepType, name: String, status: StepStatus) -> Self {
        Self {
            step_id,
            step_type,
            name,
            status,
            output: None,
            error: None,
            error_kind: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            attempts: 0,
            parent_step_id: None,
            iteration: None,
            telemetry: None,
        }
    }

    fn finish(&mut self, status: StepStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.duration_ms = self
            .started_at
            .map(|started| (now - started).num_milliseconds().max(0) as u64);
    }
}

/// Token and cost totals across every prompt step of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_cents: f64,
}

/// Observable state of one chain run.
///
/// `perStep` is append-only: an entry is pushed when a step starts running
/// and only that entry is updated afterwards. Once the status is terminal
/// the record no longer changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    id: ExecutionId,

    chain_id: ChainId,

    /// Version of the chain snapshot this run executes
    chain_version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_execution_id: Option<ExecutionId>,

    status: ExecutionStatus,

    /// `cancelled` or `timeout` for cancelled runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    terminal_reason: Option<CancelReason>,

    per_step: Vec<StepRecord>,

    #[serde(default)]
    inputs: Map<String, Value>,

    #[serde(default)]
    final_outputs: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    failed_at_step: Option<StepId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pending_approval: Option<ApprovalRequest>,

    #[serde(default)]
    totals: ExecutionTotals,

    created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    total_duration_ms: Option<u64>,
}

impl ExecutionRecord {
    /// Create a pending record for a run of `chain_id`
    pub fn new(chain_id: ChainId, chain_version: u32, inputs: Map<String, Value>) -> Self {
        Self {
            id: ExecutionId::generate(),
            chain_id,
            chain_version,
            parent_execution_id: None,
            status: ExecutionStatus::Pending,
            terminal_reason: None,
            per_step: Vec::new(),
            inputs,
            final_outputs: Map::new(),
            error: None,
            failed_at_step: None,
            pending_approval: None,
            totals: ExecutionTotals::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            total_duration_ms: None,
        }
    }

    pub fn with_parent(mut self, parent: Option<ExecutionId>) -> Self {
        self.parent_execution_id = parent;
        self
    }

    // Getters

    pub fn id(&self) -> &ExecutionId {
        &self.id
    }

    pub fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    pub fn chain_version(&self) -> u32 {
        self.chain_version
    }

    pub fn parent_execution_id(&self) -> Option<&ExecutionId> {
        self.parent_execution_id.as_ref()
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn terminal_reason(&self) -> Option<CancelReason> {
        self.terminal_reason
    }

    pub fn per_step(&self) -> &[StepRecord] {
        &self.per_step
    }

    pub fn inputs(&self) -> &Map<String, Value> {
        &self.inputs
    }

    pub fn final_outputs(&self) -> &Map<String, Value> {
        &self.final_outputs
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn failed_at_step(&self) -> Option<&StepId> {
        self.failed_at_step.as_ref()
    }

    pub fn pending_approval(&self) -> Option<&ApprovalRequest> {
        self.pending_approval.as_ref()
    }

    pub fn totals(&self) -> &ExecutionTotals {
        &self.totals
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn total_duration_ms(&self) -> Option<u64> {
        self.total_duration_ms
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Entries recorded for one step id, in execution order
    pub fn step_records(&self, step_id: &str) -> Vec<&StepRecord> {
        self.per_step
            .iter()
            .filter(|r| r.step_id.as_str() == step_id)
            .collect()
    }

    // Transitions

    fn transition(&mut self, target: ExecutionStatus) -> bool {
        if !self.status.can_transition_to(target) {
            return false;
        }
        self.status = target;
        true
    }

    /// Pending -> Running
    pub fn start(&mut self) -> bool {
        if self.transition(ExecutionStatus::Running) {
            self.started_at = Some(Utc::now());
            true
        } else {
            false
        }
    }

    /// Append a running entry and return its position
    pub fn begin_step(
        &mut self,
        step_id: StepId,
        step_type: StepType,
        name: impl Into<String>,
        parent_step_id: Option<StepId>,
        iteration: Option<u32>,
    ) -> usize {
        let mut entry = StepRecord::new(step_id, step_type, name.into(), StepStatus::Running);
        entry.started_at = Some(Utc::now());
        entry.attempts = 1;
        entry.parent_step_id = parent_step_id;
        entry.iteration = iteration;
        self.per_step.push(entry);
        self.per_step.len() - 1
    }

    pub fn record_attempt(&mut self, entry: usize, attempt: u32) {
        if let Some(record) = self.running_entry(entry) {
            record.attempts = attempt;
        }
    }

    pub fn complete_step(
        &mut self,
        entry: usize,
        output: Value,
        telemetry: Option<StepTelemetry>,
    ) {
        if let Some(telemetry) = &telemetry {
            self.totals.prompt_tokens += telemetry.prompt_tokens.unwrap_or(0);
            self.totals.completion_tokens += telemetry.completion_tokens.unwrap_or(0);
            self.totals.cost_cents += telemetry.cost_cents.unwrap_or(0.0);
        }

        if let Some(record) = self.running_entry(entry) {
            record.output = Some(output);
            record.telemetry = telemetry;
            record.finish(StepStatus::Success);
        }
    }

    /// Mark a running entry failed; `output` carries any fallback value
    pub fn fail_step(&mut self, entry: usize, error: &ChainError, output: Option<Value>) {
        if let Some(record) = self.running_entry(entry) {
            record.error = Some(error.to_string());
            record.error_kind = Some(error.kind());
            record.output = output;
            record.finish(StepStatus::Error);
        }
    }

    /// Append an entry for a step passed over by `skip` or `stop`
    pub fn skip_step(
        &mut self,
        step_id: StepId,
        step_type: StepType,
        name: impl Into<String>,
        parent_step_id: Option<StepId>,
    ) {
        let mut entry = StepRecord::new(step_id, step_type, name.into(), StepStatus::Skipped);
        entry.parent_step_id = parent_step_id;
        self.per_step.push(entry);
    }

    fn running_entry(&mut self, entry: usize) -> Option<&mut StepRecord> {
        self.per_step
            .get_mut(entry)
            .filter(|r| r.status == StepStatus::Running)
    }

    /// Running -> Paused while an approval is outstanding
    pub fn pause(&mut self, request: ApprovalRequest) -> bool {
        if self.transition(ExecutionStatus::Paused) {
            self.pending_approval = Some(request);
            true
        } else {
            false
        }
    }

    /// Paused -> Running once the approval resolves
    pub fn resume(&mut self) -> bool {
        if self.transition(ExecutionStatus::Running) {
            self.pending_approval = None;
            true
        } else {
            false
        }
    }

    /// Running -> Success
    pub fn succeed(&mut self, final_outputs: Map<String, Value>) -> bool {
        if !self.finish(ExecutionStatus::Success) {
            return false;
        }
        self.final_outputs = final_outputs;
        true
    }

    /// -> Error, keeping partial outputs
    pub fn fail(
        &mut self,
        error: &ChainError,
        failed_at_step: Option<StepId>,
        final_outputs: Map<String, Value>,
    ) -> bool {
        if !self.finish(ExecutionStatus::Error) {
            return false;
        }
        self.error = Some(error.to_string());
        self.failed_at_step = failed_at_step;
        self.final_outputs = final_outputs;
        true
    }

    /// -> Cancelled; running entries are finalized as cancelled errors
    pub fn cancel(&mut self, reason: CancelReason, final_outputs: Map<String, Value>) -> bool {
        if !self.finish(ExecutionStatus::Cancelled) {
            return false;
        }

        let error = ChainError::cancelled(reason);
        for record in self
            .per_step
            .iter_mut()
            .filter(|r| !r.status.is_terminal())
        {
            record.error = Some(error.to_string());
            record.error_kind = Some(error.kind());
            record.finish(StepStatus::Error);
        }

        self.terminal_reason = Some(reason);
        self.error = Some(error.to_string());
        self.final_outputs = final_outputs;
        true
    }

    /// Terminal transition; sets `completedAt` and `totalDurationMs` together
    fn finish(&mut self, target: ExecutionStatus) -> bool {
        if !self.transition(target) {
            return false;
        }

        let now = Utc::now();
        let started = self.started_at.unwrap_or(self.created_at);
        self.pending_approval = None;
        self.completed_at = Some(now);
        self.total_duration_ms = Some((now - started).num_milliseconds().max(0) as u64);
        true
    }
}

impl StorageEntity for ExecutionRecord {
    type Key = ExecutionId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sid(id: &str) -> StepId {
        StepId::new(id).unwrap()
    }

    fn record() -> ExecutionRecord {
        ExecutionRecord::new(ChainId::new("chain").unwrap(), 1, Map::new())
    }

    #[test]
    fn test_execution_id_format() {
        let id = ExecutionId::generate();
        assert!(id.as_str().starts_with("exec-"));
        assert!(ExecutionId::new(id.as_str()).is_ok());
        assert!(ExecutionId::new("exec-nope").is_err());
    }

    #[test]
    fn test_status_transitions() {
        assert!(ExecutionStatus::Pending.can_transition_to(ExecutionStatus::Running));
        assert!(ExecutionStatus::Running.can_transition_to(ExecutionStatus::Paused));
        assert!(ExecutionStatus::Paused.can_transition_to(ExecutionStatus::Cancelled));
        assert!(!ExecutionStatus::Paused.can_transition_to(ExecutionStatus::Success));
        assert!(!ExecutionStatus::Success.can_transition_to(ExecutionStatus::Running));
        assert!(!ExecutionStatus::Cancelled.can_transition_to(ExecutionStatus::Cancelled));
    }

    #[test]
    fn test_step_lifecycle() {
        let mut record = record();
        assert!(record.start());

        let entry = record.begin_step(sid("a"), StepType::Code, "A", None, None);
        assert_eq!(record.per_step()[entry].status, StepStatus::Running);

        record.complete_step(entry, json!(42), None);
        let step = &record.per_step()[entry];
        assert_eq!(step.status, StepStatus::Success);
        assert_eq!(step.output, Some(json!(42)));
        assert!(step.duration_ms.is_some());
    }

    #[test]
    fn test_finished_entry_is_not_rewritten() {
        let mut record = record();
        record.start();
        let entry = record.begin_step(sid("a"), StepType::Code, "A", None, None);
        record.complete_step(entry, json!(1), None);

        record.fail_step(entry, &ChainError::bounds("late"), None);

        assert_eq!(record.per_step()[entry].status, StepStatus::Success);
    }

    #[test]
    fn test_succeed_sets_completion_once() {
        let mut record = record();
        record.start();

        assert!(record.succeed(Map::new()));
        let completed_at = record.completed_at();
        assert!(completed_at.is_some());
        assert!(record.total_duration_ms().is_some());

        assert!(!record.cancel(CancelReason::Cancelled, Map::new()));
        assert_eq!(record.status(), ExecutionStatus::Success);
        assert_eq!(record.completed_at(), completed_at);
    }

    #[test]
    fn test_cancel_finalizes_running_entries() {
        let mut record = record();
        record.start();
        let done = record.begin_step(sid("a"), StepType::Code, "A", None, None);
        record.complete_step(done, json!(null), None);
        let running = record.begin_step(sid("b"), StepType::ApiCall, "B", None, None);

        assert!(record.cancel(CancelReason::Timeout, Map::new()));

        assert_eq!(record.status(), ExecutionStatus::Cancelled);
        assert_eq!(record.terminal_reason(), Some(CancelReason::Timeout));
        let step = &record.per_step()[running];
        assert_eq!(step.status, StepStatus::Error);
        assert_eq!(step.error.as_deref(), Some("cancelled: timeout"));
        assert_eq!(step.error_kind, Some(ErrorKind::Cancellation));
        assert_eq!(record.per_step()[done].status, StepStatus::Success);
    }

    #[test]
    fn test_pause_and_resume() {
        let mut record = record();
        record.start();

        let request = ApprovalRequest {
            execution_id: record.id().clone(),
            step_id: sid("review"),
            message: "Ok?".to_string(),
            approvers: vec![],
            expires_at: Utc::now(),
        };
        assert!(record.pause(request));
        assert_eq!(record.status(), ExecutionStatus::Paused);
        assert!(record.pending_approval().is_some());

        assert!(record.resume());
        assert_eq!(record.status(), ExecutionStatus::Running);
        assert!(record.pending_approval().is_none());
    }

    #[test]
    fn test_totals_accumulate_prompt_telemetry() {
        let mut record = record();
        record.start();

        for _ in 0..2 {
            let entry = record.begin_step(sid("p"), StepType::Prompt, "P", None, None);
            record.complete_step(
                entry,
                json!("text"),
                Some(StepTelemetry {
                    prompt_tokens: Some(10),
                    completion_tokens: Some(5),
                    cost_cents: Some(0.5),
                    ..StepTelemetry::default()
                }),
            );
        }

        assert_eq!(record.totals().prompt_tokens, 20);
        assert_eq!(record.totals().completion_tokens, 10);
        assert!((record.totals().cost_cents - 1.0).abs() < f64::EPSILON);
        assert_eq!(record.step_records("p").len(), 2);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let mut record = record();
        record.start();
        record.skip_step(sid("later"), StepType::Code, "Later", None);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["chainId"], json!("chain"));
        assert_eq!(value["perStep"][0]["status"], json!("skipped"));
        assert_eq!(value["perStep"][0]["type"], json!("code"));
        assert!(value.get("completedAt").is_none());
    }
}

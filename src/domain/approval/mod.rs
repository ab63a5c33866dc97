//! Human approval gate contract

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::chain::{ChainError, StepId};
use crate::domain::execution::ExecutionId;

/// What happens when nobody answers before the timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutDisposition {
    Approve,
    Reject,
}

/// An approver's answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDecision {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ApprovalDecision {
    pub fn approve(approver: impl Into<String>) -> Self {
        Self {
            approved: true,
            approver: Some(approver.into()),
            comment: None,
        }
    }

    pub fn reject(approver: impl Into<String>) -> Self {
        Self {
            approved: false,
            approver: Some(approver.into()),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// A pending request surfaced on the execution record while the run is paused
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub execution_id: ExecutionId,
    pub step_id: StepId,
    pub message: String,
    #[serde(default)]
    pub approvers: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// How the wait for a decision ended
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalOutcome {
    Decided(ApprovalDecision),
    TimedOut,
}

/// Parks a run until an approver answers or the timeout elapses.
///
/// Implementations must not block a thread while waiting; cancellation is
/// handled by the caller dropping the returned future.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn wait_for_decision(
        &self,
        request: ApprovalRequest,
        timeout: Duration,
    ) -> Result<ApprovalOutcome, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_disposition_is_required_in_json() {
        let result: Result<TimeoutDisposition, _> = serde_json::from_value(json!("maybe"));
        assert!(result.is_err());

        let parsed: TimeoutDisposition = serde_json::from_value(json!("reject")).unwrap();
        assert_eq!(parsed, TimeoutDisposition::Reject);
    }

    #[test]
    fn test_decision_builders() {
        let decision = ApprovalDecision::reject("lead").with_comment("missing data");
        assert!(!decision.approved);
        assert_eq!(decision.approver.as_deref(), Some("lead"));
        assert_eq!(decision.comment.as_deref(), Some("missing data"));
    }
}

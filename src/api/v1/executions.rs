//! Execution record endpoints: polling, cancellation, approval decisions

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::{with_status, ApiError, Json};
use crate::domain::approval::ApprovalDecision;
use crate::domain::execution::ExecutionRecord;

/// Approver's decision for a paused approval step
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDecisionRequest {
    pub approved: bool,
    #[serde(default)]
    pub approver: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl From<ApprovalDecisionRequest> for ApprovalDecision {
    fn from(request: ApprovalDecisionRequest) -> Self {
        ApprovalDecision {
            approved: request.approved,
            approver: request.approver,
            comment: request.comment,
        }
    }
}

/// GET /v1/executions/{execution_id}
pub async fn get_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<ExecutionRecord>, ApiError> {
    let record = state.execution_service.get_required(&execution_id).await?;
    Ok(Json(record))
}

/// POST /v1/executions/{execution_id}/cancel
///
/// Returns the record once the run has settled; terminal runs come back unchanged.
pub async fn cancel_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Response, ApiError> {
    debug!(execution_id = %execution_id, "Cancelling execution");

    let record = state.execution_service.cancel(&execution_id).await?;
    Ok(with_status(StatusCode::ACCEPTED, record))
}

/// POST /v1/executions/{execution_id}/approvals/{step_id}
pub async fn submit_approval(
    State(state): State<AppState>,
    Path((execution_id, step_id)): Path<(String, String)>,
    Json(request): Json<ApprovalDecisionRequest>,
) -> Result<Response, ApiError> {
    debug!(
        execution_id = %execution_id,
        step_id = %step_id,
        approved = request.approved,
        "Submitting approval decision"
    );

    let record = state
        .execution_service
        .approve(&execution_id, &step_id, request.into())
        .await?;
    Ok(with_status(StatusCode::ACCEPTED, record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_request_optional_fields() {
        let request: ApprovalDecisionRequest =
            serde_json::from_str(r#"{"approved": false, "comment": "numbers look off"}"#).unwrap();

        let decision = ApprovalDecision::from(request);
        assert!(!decision.approved);
        assert!(decision.approver.is_none());
        assert_eq!(decision.comment.as_deref(), Some("numbers look off"));
    }

    #[test]
    fn test_decision_requires_approved_flag() {
        let result: Result<ApprovalDecisionRequest, _> = serde_json::from_str(r#"{"approver": "ops"}"#);
        assert!(result.is_err());
    }
}

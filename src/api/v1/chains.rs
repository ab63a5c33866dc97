//! Chain definition endpoints, plus run/webhook entry points

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::{with_status, ApiError, Json};
use crate::domain::chain::{ChainDefinition, ChainId, ChainTrigger, StepDefinition};
use crate::domain::execution::{ExecutionRecord, ExecutionStatus, RunRequest};
use crate::infrastructure::services::UpdateChainRequest;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChainRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub trigger: ChainTrigger,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub max_execution_time_ms: Option<u64>,
}

fn default_active() -> bool {
    true
}

impl CreateChainRequest {
    fn into_chain(self) -> Result<ChainDefinition, ApiError> {
        let id = ChainId::new(&self.id).map_err(|e| ApiError::bad_request(e.to_string()).with_param("id"))?;

        let mut chain = ChainDefinition::new(id, self.name)
            .with_steps(self.steps)
            .with_trigger(self.trigger)
            .with_active(self.active);

        if let Some(workspace_id) = self.workspace_id {
            chain = chain.with_workspace(workspace_id);
        }
        if let Some(description) = self.description {
            chain = chain.with_description(description);
        }
        if let Some(schedule) = self.schedule {
            chain = chain.with_schedule(schedule);
        }
        if let Some(ms) = self.max_execution_time_ms {
            chain = chain.with_max_execution_time_ms(ms);
        }

        Ok(chain)
    }
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchChainRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub steps: Option<Vec<StepDefinition>>,
    pub trigger: Option<ChainTrigger>,
    pub schedule: Option<String>,
    pub active: Option<bool>,
    pub max_execution_time_ms: Option<u64>,
}

impl From<PatchChainRequest> for UpdateChainRequest {
    fn from(request: PatchChainRequest) -> Self {
        let trigger = match (request.trigger, request.schedule) {
            (Some(trigger), schedule) => Some((trigger, schedule)),
            (None, Some(schedule)) => Some((ChainTrigger::Schedule, Some(schedule))),
            (None, None) => None,
        };

        UpdateChainRequest {
            name: request.name,
            description: request.description.map(Some),
            steps: request.steps,
            trigger,
            active: request.active,
            max_execution_time_ms: request.max_execution_time_ms.map(Some),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChainListResponse {
    pub object: &'static str,
    pub data: Vec<ChainDefinition>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunChainRequest {
    #[serde(default)]
    pub inputs: Map<String, Value>,
}

/// Body returned when a run is accepted
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAccepted {
    pub execution_id: String,
    pub chain_id: String,
    pub status: ExecutionStatus,
}

impl From<&ExecutionRecord> for RunAccepted {
    fn from(record: &ExecutionRecord) -> Self {
        Self {
            execution_id: record.id().to_string(),
            chain_id: record.chain_id().to_string(),
            status: record.status(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExecutionListResponse {
    pub object: &'static str,
    pub data: Vec<ExecutionRecord>,
}

/// GET /v1/chains
pub async fn list_chains(
    State(state): State<AppState>,
) -> Result<Json<ChainListResponse>, ApiError> {
    let chains = state.chain_service.list().await?;

    Ok(Json(ChainListResponse {
        object: "list",
        data: chains,
    }))
}

/// GET /v1/chains/{chain_id}
pub async fn get_chain(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
) -> Result<Json<ChainDefinition>, ApiError> {
    let chain = state.chain_service.get_required(&chain_id).await?;
    Ok(Json(chain))
}

/// POST /v1/chains
pub async fn create_chain(
    State(state): State<AppState>,
    Json(request): Json<CreateChainRequest>,
) -> Result<Response, ApiError> {
    debug!(chain_id = %request.id, steps = request.steps.len(), "Creating chain");

    let chain = state.chain_service.create(request.into_chain()?).await?;
    Ok(with_status(StatusCode::CREATED, chain))
}

/// PUT /v1/chains/{chain_id}
pub async fn update_chain(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
    Json(request): Json<PatchChainRequest>,
) -> Result<Json<ChainDefinition>, ApiError> {
    debug!(chain_id = %chain_id, "Updating chain");

    let chain = state.chain_service.update(&chain_id, request.into()).await?;
    Ok(Json(chain))
}

/// DELETE /v1/chains/{chain_id}
pub async fn delete_chain(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.chain_service.delete(&chain_id).await?;

    Ok(Json(serde_json::json!({
        "deleted": true,
        "id": chain_id
    })))
}

/// POST /v1/chains/{chain_id}/run
///
/// Answers 202 once the pending record is stored; the run continues in the background.
pub async fn run_chain(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
    Json(request): Json<RunChainRequest>,
) -> Result<Response, ApiError> {
    let record = state
        .execution_service
        .start(&chain_id, RunRequest::new(request.inputs))
        .await?;

    debug!(chain_id = %chain_id, execution_id = %record.id(), "Run accepted");
    Ok(with_status(StatusCode::ACCEPTED, RunAccepted::from(&record)))
}

/// POST /v1/chains/{chain_id}/webhooks/{step_id}
///
/// The whole body becomes the webhook step's output.
pub async fn trigger_webhook(
    State(state): State<AppState>,
    Path((chain_id, step_id)): Path<(String, String)>,
    Json(payload): Json<Value>,
) -> Result<Response, ApiError> {
    let record = state
        .execution_service
        .start_from_webhook(&chain_id, &step_id, payload)
        .await?;

    Ok(with_status(StatusCode::ACCEPTED, RunAccepted::from(&record)))
}

/// GET /v1/chains/{chain_id}/executions
pub async fn list_chain_executions(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
) -> Result<Json<ExecutionListResponse>, ApiError> {
    let runs = state.execution_service.list_for_chain(&chain_id).await?;

    Ok(Json(ExecutionListResponse {
        object: "list",
        data: runs,
    }))
}

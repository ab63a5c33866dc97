//! Prompt library endpoints

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
use crate::domain::prompt::Prompt;
use crate::infrastructure::services::{CreatePromptRequest, UpdatePromptRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCreatePromptRequest {
    pub id: String,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub default_parameters: Map<String, Value>,
}

impl From<ApiCreatePromptRequest> for CreatePromptRequest {
    fn from(request: ApiCreatePromptRequest) -> Self {
        CreatePromptRequest {
            id: request.id,
            name: request.name,
            content: request.content,
            default_model: request.default_model,
            default_parameters: request.default_parameters,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUpdatePromptRequest {
    pub name: Option<String>,
    pub content: Option<String>,
    /// `null` clears the default model
    #[serde(default, with = "double_option")]
    pub default_model: Option<Option<String>>,
    pub default_parameters: Option<Map<String, Value>>,
}

impl From<ApiUpdatePromptRequest> for UpdatePromptRequest {
    fn from(request: ApiUpdatePromptRequest) -> Self {
        UpdatePromptRequest {
            name: request.name,
            content: request.content,
            default_model: request.default_model,
            default_parameters: request.default_parameters,
        }
    }
}

/// Distinguishes an absent field from an explicit `null`
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

#[derive(Debug, Serialize)]
pub struct PromptListResponse {
    pub object: &'static str,
    pub data: Vec<Prompt>,
}

/// GET /v1/prompts
pub async fn list_prompts(
    State(state): State<AppState>,
) -> Result<Json<PromptListResponse>, ApiError> {
    let prompts = state.prompt_service.list().await?;

    Ok(Json(PromptListResponse {
        object: "list",
        data: prompts,
    }))
}

/// GET /v1/prompts/{prompt_id}
pub async fn get_prompt(
    State(state): State<AppState>,
    Path(prompt_id): Path<String>,
) -> Result<Json<Prompt>, ApiError> {
    let prompt = state.prompt_service.get_required(&prompt_id).await?;
    Ok(Json(prompt))
}

/// POST /v1/prompts
pub async fn create_prompt(
    State(state): State<AppState>,
    Json(request): Json<ApiCreatePromptRequest>,
) -> Result<Response, ApiError> {
    debug!(prompt_id = %request.id, "Creating prompt");

    let prompt = state.prompt_service.create(request.into()).await?;
    Ok(with_status(StatusCode::CREATED, prompt))
}

/// PUT /v1/prompts/{prompt_id}
pub async fn update_prompt(
    State(state): State<AppState>,
    Path(prompt_id): Path<String>,
    Json(request): Json<ApiUpdatePromptRequest>,
) -> Result<Json<Prompt>, ApiError> {
    let prompt = state
        .prompt_service
        .update(&prompt_id, request.into())
        .await?;
    Ok(Json(prompt))
}

/// DELETE /v1/prompts/{prompt_id}
pub async fn delete_prompt(
    State(state): State<AppState>,
    Path(prompt_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.prompt_service.delete(&prompt_id).await?;

    Ok(Json(serde_json::json!({
        "deleted": true,
        "id": prompt_id
    })))
}

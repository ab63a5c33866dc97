//! Stored query registry endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::state::AppState;
use crate::api::types::{with_status, ApiError, Json};
use crate::domain::query::StoredQuery;
use crate::infrastructure::services::RegisterQueryRequest;

#[derive(Debug, Deserialize)]
pub struct ApiRegisterQueryRequest {
    pub id: String,
    pub name: String,
    pub sql: String,
    /// Parameter names bound to `$1..$n` in order
    #[serde(default)]
    pub parameters: Vec<String>,
}

impl From<ApiRegisterQueryRequest> for RegisterQueryRequest {
    fn from(request: ApiRegisterQueryRequest) -> Self {
        RegisterQueryRequest {
            id: request.id,
            name: request.name,
            sql: request.sql,
            parameters: request.parameters,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueryListResponse {
    pub object: &'static str,
    pub data: Vec<StoredQuery>,
}

/// GET /v1/queries
pub async fn list_queries(
    State(state): State<AppState>,
) -> Result<Json<QueryListResponse>, ApiError> {
    Ok(Json(QueryListResponse {
        object: "list",
        data: state.query_service.list().await?,
    }))
}

/// GET /v1/queries/{query_id}
pub async fn get_query(
    State(state): State<AppState>,
    Path(query_id): Path<String>,
) -> Result<Json<StoredQuery>, ApiError> {
    Ok(Json(state.query_service.get_required(&query_id).await?))
}

/// POST /v1/queries
pub async fn register_query(
    State(state): State<AppState>,
    Json(request): Json<ApiRegisterQueryRequest>,
) -> Result<Response, ApiError> {
    let query = state.query_service.register(request.into()).await?;
    Ok(with_status(StatusCode::CREATED, query))
}

/// DELETE /v1/queries/{query_id}
pub async fn delete_query(
    State(state): State<AppState>,
    Path(query_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.query_service.delete(&query_id).await?;

    Ok(Json(serde_json::json!({
        "deleted": true,
        "id": query_id
    })))
}

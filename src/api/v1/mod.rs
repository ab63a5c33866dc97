//! v1 API endpoints

pub mod chains;
pub mod executions;
pub mod prompts;
pub mod queries;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

/// Create v1 API router
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/chains", get(chains::list_chains).post(chains::create_chain))
        .route(
            "/chains/{chain_id}",
            get(chains::get_chain)
                .put(chains::update_chain)
                .delete(chains::delete_chain),
        )
        .route("/chains/{chain_id}/run", post(chains::run_chain))
        .route(
            "/chains/{chain_id}/executions",
            get(chains::list_chain_executions),
        )
        .route(
            "/chains/{chain_id}/webhooks/{step_id}",
            post(chains::trigger_webhook),
        )
        .route("/executions/{execution_id}", get(executions::get_execution))
        .route(
            "/executions/{execution_id}/cancel",
            post(executions::cancel_execution),
        )
        .route(
            "/executions/{execution_id}/approvals/{step_id}",
            post(executions::submit_approval),
        )
        .route("/prompts", get(prompts::list_prompts).post(prompts::create_prompt))
        .route(
            "/prompts/{prompt_id}",
            get(prompts::get_prompt)
                .put(prompts::update_prompt)
                .delete(prompts::delete_prompt),
        )
        .route("/queries", get(queries::list_queries).post(queries::register_query))
        .route(
            "/queries/{query_id}",
            get(queries::get_query).delete(queries::delete_query),
        )
}

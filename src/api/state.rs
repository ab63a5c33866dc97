//! Application state for shared services

use std::sync::Arc;

use crate::infrastructure::services::{
    ChainService, ExecutionService, PromptService, QueryService,
};

/// Services shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub chain_service: Arc<ChainService>,
    pub execution_service: Arc<ExecutionService>,
    pub prompt_service: Arc<PromptService>,
    pub query_service: Arc<QueryService>,
}

impl AppState {
    pub fn new(
        chain_service: Arc<ChainService>,
        execution_service: Arc<ExecutionService>,
        prompt_service: Arc<PromptService>,
        query_service: Arc<QueryService>,
    ) -> Self {
        Self {
            chain_service,
            execution_service,
            prompt_service,
            query_service,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("active_runs", &self.execution_service.active_count())
            .finish()
    }
}

//! Prompt Chain Engine
//!
//! Runs ordered chains of prompt, HTTP, database, code, approval and control
//! steps over a shared variable store, with:
//! - Branching, loops, switches and bounded goto side trips
//! - Per-step retry/continue error handling and timeouts
//! - Human approvals that pause a run
//! - Manual, webhook and cron-scheduled triggers

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use api::state::AppState;
use domain::chain::ChainDefinition;
use domain::execution::ExecutionRecord;
use domain::prompt::Prompt;
use domain::query::StoredQuery;
use domain::storage::Storage;
use infrastructure::{
    approval::ApprovalRegistry,
    chain::{ChainRunner, StepExecutor},
    http::ReqwestHttpClient,
    llm::create_llm_invoker,
    prompt::StoragePromptResolver,
    query::{PostgresQueryExecutor, StorageQueryResolver},
    sandbox::{RhaiSandbox, SandboxLimits},
    scheduler::ChainScheduler,
    services::{ChainService, ExecutionService, PromptService, QueryService},
    storage::InMemoryStorage,
};

/// Wire storages, collaborators, the runner and the services from configuration
pub fn create_app_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let chains: Arc<dyn Storage<ChainDefinition>> = Arc::new(InMemoryStorage::new());
    let records: Arc<dyn Storage<ExecutionRecord>> = Arc::new(InMemoryStorage::new());
    let prompts: Arc<dyn Storage<Prompt>> = Arc::new(InMemoryStorage::new());
    let queries: Arc<dyn Storage<StoredQuery>> = Arc::new(InMemoryStorage::new());

    let llm = create_llm_invoker(&config.llm)?;
    let query_executor = PostgresQueryExecutor::from_config(&config.database)?;
    let approvals = ApprovalRegistry::new();

    let executor = StepExecutor::new(
        Arc::new(StoragePromptResolver::new(prompts.clone())),
        llm,
        Arc::new(ReqwestHttpClient::new()),
        Arc::new(StorageQueryResolver::new(queries.clone())),
        Arc::new(query_executor),
        Arc::new(RhaiSandbox::new(SandboxLimits::default())),
        config.llm.default_model.clone(),
    )
    .with_code_timeout(config.engine.code_timeout())
    .with_http_timeout(config.engine.http_timeout());

    let runner = Arc::new(ChainRunner::new(
        executor,
        Arc::new(approvals.clone()),
        chains.clone(),
        records.clone(),
        config.engine.clone(),
    ));

    tracing::debug!(
        max_nesting_depth = config.engine.max_nesting_depth,
        "Chain runner ready"
    );

    Ok(AppState::new(
        Arc::new(ChainService::new(chains.clone())),
        Arc::new(ExecutionService::new(runner, chains, records, approvals)),
        Arc::new(PromptService::new(prompts)),
        Arc::new(QueryService::new(queries)),
    ))
}

/// Scheduler over the state's chain store, or `None` when disabled
pub fn create_scheduler(state: &AppState, config: &AppConfig) -> Option<ChainScheduler> {
    if !config.scheduler.enabled {
        tracing::info!("Chain scheduler disabled");
        return None;
    }

    Some(ChainScheduler::new(
        state.chain_service.storage().clone(),
        state.execution_service.clone(),
        Duration::from_secs(config.scheduler.tick_secs.max(1)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_config_builds_offline_state() {
        let state = create_app_state(&AppConfig::default()).unwrap();

        assert!(state.chain_service.list().await.unwrap().is_empty());
        assert_eq!(state.execution_service.active_count(), 0);
    }

    #[tokio::test]
    async fn test_scheduler_follows_config() {
        let mut config = AppConfig::default();
        let state = create_app_state(&config).unwrap();
        assert!(create_scheduler(&state, &config).is_some());

        config.scheduler.enabled = false;
        assert!(create_scheduler(&state, &config).is_none());
    }
}

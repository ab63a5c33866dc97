//! Infrastructure services

mod chain_service;
mod execution_service;
mod prompt_service;
mod query_service;

pub use chain_service::{ChainService, UpdateChainRequest};
pub use execution_service::ExecutionService;
pub use prompt_service::{CreatePromptRequest, PromptService, UpdatePromptRequest};
pub use query_service::{QueryService, RegisterQueryRequest};

//! Infrastructure layer - collaborator implementations, the chain runner and services

pub mod approval;
pub mod chain;
pub mod http;
pub mod llm;
pub mod logging;
pub mod observability;
pub mod prompt;
pub mod query;
pub mod sandbox;
pub mod scheduler;
pub mod services;
pub mod storage;

//! Domain layer - chain model, execution records and collaborator contracts

pub mod approval;
pub mod chain;
pub mod error;
pub mod execution;
pub mod http;
pub mod llm;
pub mod prompt;
pub mod query;
pub mod sandbox;
pub mod storage;

pub use approval::{ApprovalDecision, ApprovalGate, ApprovalOutcome, ApprovalRequest, TimeoutDisposition};
pub use chain::{
    CancelReason, CancellationToken, ChainDefinition, ChainError, ChainId, ChainPlan,
    ChainTrigger, StepDefinition, StepId, StepKind, StepType,
};
pub use error::DomainError;
pub use execution::{
    ExecutionId, ExecutionRecord, ExecutionStatus, RunRequest, StepRecord, StepStatus,
    StepTelemetry,
};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use llm::{LlmError, LlmInvocation, LlmInvoker, LlmRequest};
pub use prompt::{Prompt, PromptId, PromptResolver, ResolvedPrompt};
pub use query::{QueryExecutor, QueryId, QueryResolver, QueryResult, StoredQuery};
pub use sandbox::CodeSandbox;
pub use storage::{Storage, StorageEntity, StorageKey};

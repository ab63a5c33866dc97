//! Chain domain - definitions, conditions, variables and control flow

mod cancellation;
mod condition;
mod control;
mod entity;
mod error;
mod step_types;
mod validation;
mod variables;

pub use cancellation::CancellationToken;
pub use condition::{
    build_regex, compare, ComparisonMode, ComparisonOperator, Condition, ContainsCondition,
    Evaluation, ExistsCondition, RegexCondition, SimpleCondition,
};
pub use control::{next_cursor, Advance, Control, StepOutcome};
pub use entity::{ChainDefinition, ChainId, ChainTrigger, StepId, MAX_ID_LENGTH};
pub use error::{CancelReason, ChainError, ErrorKind};
pub use step_types::{
    Aggregation, ApiCallStep, ApprovalStep, BranchAction, BranchActionKind, CodeLanguage,
    CodeStep, ConditionStep, DatabaseStep, ErrorAction, ErrorHandler, ForEachLoop, LoopMode,
    LoopStep, PromptStep, StepDefinition, StepKind, StepType, SwitchCase, SwitchComparison,
    SwitchStep, TimesLoop, WebhookStep, WhileLoop, DEFAULT_API_TIMEOUT_MS, DEFAULT_MAX_ITERATIONS,
    MAX_APPROVAL_TIMEOUT_HOURS,
};
pub use validation::{parse_schedule, validate_chain, ChainPlan};
pub use variables::{is_valid_identifier, render_value, ScopeId, VariableStore};

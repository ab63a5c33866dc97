//! Step definitions: one tagged variant per step kind

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::condition::{build_regex, parse_number, Condition};
use super::entity::{ChainId, StepId};
use super::error::ChainError;
use crate::domain::approval::TimeoutDisposition;
use crate::domain::http::HttpMethod;

/// Default loop bound when `maxIterations` is omitted
pub const DEFAULT_MAX_ITERATIONS: u32 = 100;

/// Default api_call timeout
pub const DEFAULT_API_TIMEOUT_MS: u64 = 30_000;

/// Step kind discriminator (`type` in JSON)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Prompt,
    Webhook,
    ApiCall,
    Database,
    Condition,
    Loop,
    Switch,
    Code,
    Approval,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Webhook => "webhook",
            Self::ApiCall => "api_call",
            Self::Database => "database",
            Self::Condition => "condition",
            Self::Loop => "loop",
            Self::Switch => "switch",
            Self::Code => "code",
            Self::Approval => "approval",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind-specific step configuration
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    Prompt(PromptStep),
    Webhook(WebhookStep),
    ApiCall(ApiCallStep),
    Database(DatabaseStep),
    Condition(ConditionStep),
    Loop(LoopStep),
    Switch(SwitchStep),
    Code(CodeStep),
    Approval(ApprovalStep),
}

impl StepKind {
    pub fn step_type(&self) -> StepType {
        match self {
            Self::Prompt(_) => StepType::Prompt,
            Self::Webhook(_) => StepType::Webhook,
            Self::ApiCall(_) => StepType::ApiCall,
            Self::Database(_) => StepType::Database,
            Self::Condition(_) => StepType::Condition,
            Self::Loop(_) => StepType::Loop,
            Self::Switch(_) => StepType::Switch,
            Self::Code(_) => StepType::Code,
            Self::Approval(_) => StepType::Approval,
        }
    }

    fn config_value(&self) -> Value {
        let value = match self {
            Self::Prompt(c) => serde_json::to_value(c),
            Self::Webhook(c) => serde_json::to_value(c),
            Self::ApiCall(c) => serde_json::to_value(c),
            Self::Database(c) => serde_json::to_value(c),
            Self::Condition(c) => serde_json::to_value(c),
            Self::Loop(c) => serde_json::to_value(c),
            Self::Switch(c) => serde_json::to_value(c),
            Self::Code(c) => serde_json::to_value(c),
            Self::Approval(c) => serde_json::to_value(c),
        };
        value.unwrap_or_default()
    }

    fn from_config(step_type: StepType, config: Value) -> Result<Self, ChainError> {
        // A missing `config` is only meaningful for kinds without required fields
        let config = match config {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        Ok(match step_type {
            StepType::Prompt => Self::Prompt(parse_config(step_type, config)?),
            StepType::Webhook => Self::Webhook(parse_config(step_type, config)?),
            StepType::ApiCall => Self::ApiCall(parse_config(step_type, config)?),
            StepType::Database => Self::Database(parse_config(step_type, config)?),
            StepType::Condition => Self::Condition(parse_config(step_type, config)?),
            StepType::Loop => Self::Loop(parse_config(step_type, config)?),
            StepType::Switch => Self::Switch(parse_config(step_type, config)?),
            StepType::Code => Self::Code(parse_config(step_type, config)?),
            StepType::Approval => Self::Approval(parse_config(step_type, config)?),
        })
    }
}

fn parse_config<T: DeserializeOwned>(step_type: StepType, config: Value) -> Result<T, ChainError> {
    serde_json::from_value(config)
        .map_err(|e| ChainError::configuration(format!("invalid {} config: {}", step_type, e)))
}

/// A step of a chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStepDefinition", into = "RawStepDefinition")]
pub struct StepDefinition {
    pub id: StepId,
    pub name: String,
    pub kind: StepKind,

    /// Variable that receives the step output
    pub output_variable: Option<String>,

    pub error_handler: ErrorHandler,

    /// Wall-clock limit for one attempt of this step
    pub timeout_ms: Option<u64>,
}

impl StepDefinition {
    pub fn new(id: StepId, kind: StepKind) -> Self {
        Self {
            name: id.as_str().to_string(),
            id,
            kind,
            output_variable: None,
            error_handler: ErrorHandler::default(),
            timeout_ms: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_output_variable(mut self, name: impl Into<String>) -> Self {
        self.output_variable = Some(name.into());
        self
    }

    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = handler;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn step_type(&self) -> StepType {
        self.kind.step_type()
    }

    /// Step IDs this step can execute (goto targets and bodies)
    pub fn referenced_steps(&self) -> Vec<&StepId> {
        match &self.kind {
            StepKind::Condition(c) => c.then_steps.iter().chain(c.else_steps.iter()).collect(),
            StepKind::Loop(l) => l.loop_steps.iter().collect(),
            StepKind::Switch(s) => s.body_steps().collect(),
            _ => Vec::new(),
        }
    }

    /// Step IDs owned as a body (executed only inside this step)
    pub fn body_steps(&self) -> Vec<&StepId> {
        match &self.kind {
            StepKind::Loop(l) => l.loop_steps.iter().collect(),
            StepKind::Switch(s) => s.body_steps().collect(),
            _ => Vec::new(),
        }
    }
}

/// Wire shape: `{id, type, name, config, outputVariable, errorHandler, timeoutMs}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStepDefinition {
    id: StepId,
    #[serde(rename = "type")]
    step_type: StepType,
    #[serde(default)]
    name: String,
    #[serde(default)]
    config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_variable: Option<String>,
    #[serde(default, skip_serializing_if = "ErrorHandler::is_default")]
    error_handler: ErrorHandler,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
}

impl TryFrom<RawStepDefinition> for StepDefinition {
    type Error = ChainError;

    fn try_from(raw: RawStepDefinition) -> Result<Self, Self::Error> {
        let kind = StepKind::from_config(raw.step_type, raw.config)
            .map_err(|e| e.context(format!("step '{}'", raw.id)))?;
        let name = if raw.name.is_empty() {
            raw.id.as_str().to_string()
        } else {
            raw.name
        };

        Ok(Self {
            id: raw.id,
            name,
            kind,
            output_variable: raw.output_variable.filter(|v| !v.is_empty()),
            error_handler: raw.error_handler,
            timeout_ms: raw.timeout_ms,
        })
    }
}

impl From<StepDefinition> for RawStepDefinition {
    fn from(step: StepDefinition) -> Self {
        Self {
            step_type: step.kind.step_type(),
            config: step.kind.config_value(),
            id: step.id,
            name: step.name,
            output_variable: step.output_variable,
            error_handler: step.error_handler,
            timeout_ms: step.timeout_ms,
        }
    }
}

/// What to do when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAction {
    /// Halt the run
    #[default]
    Fail,

    /// Record the failure and continue with the fallback value
    Continue,

    /// Re-run the step with exponential backoff, halting on exhaustion
    Retry,
}

fn default_retry_delay_ms() -> u64 {
    1000
}

/// Per-step failure policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorHandler {
    #[serde(default)]
    pub action: ErrorAction,

    /// Extra attempts after the first when `action` is `retry`
    #[serde(default)]
    pub retry_count: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_value: Option<Value>,
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self {
            action: ErrorAction::Fail,
            retry_count: 0,
            retry_delay_ms: default_retry_delay_ms(),
            fallback_value: None,
        }
    }
}

impl ErrorHandler {
    pub fn retry(retry_count: u32, retry_delay_ms: u64) -> Self {
        Self {
            action: ErrorAction::Retry,
            retry_count,
            retry_delay_ms,
            fallback_value: None,
        }
    }

    pub fn continue_with(fallback_value: Option<Value>) -> Self {
        Self {
            action: ErrorAction::Continue,
            fallback_value,
            ..Self::default()
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        match self.action {
            ErrorAction::Retry => self.retry_count.saturating_add(1),
            _ => 1,
        }
    }

    /// Delay before attempt `attempt + 1`, doubling after each failure
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        Duration::from_millis(self.retry_delay_ms.saturating_mul(1u64 << shift))
    }
}

/// Render a prompt and invoke the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptStep {
    pub prompt_id: String,

    /// Display name only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_name: Option<String>,

    /// Overrides the prompt's default model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Merged over the prompt's default parameters
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,

    /// Step-local bindings applied before rendering (values are templates)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, String>,
}

impl PromptStep {
    pub fn new(prompt_id: impl Into<String>) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            prompt_name: None,
            model: None,
            parameters: Map::new(),
            variables: HashMap::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.variables.insert(name.into(), template.into());
        self
    }
}

/// Receives the payload delivered with the run that triggered it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Outbound HTTP request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallStep {
    pub url: String,

    #[serde(default)]
    pub method: HttpMethod,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// JSON body; strings inside are interpolated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Treat non-2xx responses as success
    #[serde(default, alias = "ignoreErrors")]
    pub tolerate_errors: bool,
}

impl ApiCallStep {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: HashMap::new(),
            body: None,
            timeout_ms: None,
            tolerate_errors: false,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_tolerate_errors(mut self, tolerate: bool) -> Self {
        self.tolerate_errors = tolerate;
        self
    }

    /// The step's own timeout, else `default`
    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(default)
    }
}

/// Run a registered query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStep {
    pub connection_id: String,
    pub query_id: String,

    /// Parameter name -> template, bound by the query's parameter order
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, String>,
}

/// Branch action selected by a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BranchActionKind {
    #[default]
    Continue,
    Goto,
    SetVariable,
    RunPrompt,
    RunChain,
    Stop,
    Skip,
}

/// A branch action with its parameters resolved
#[derive(Debug, Clone, PartialEq)]
pub enum BranchAction {
    Continue,
    Goto(Vec<StepId>),
    SetVariable { name: String, value: String },
    RunPrompt { prompt_id: String },
    RunChain { chain_id: ChainId },
    Stop,
    Skip(usize),
}

/// Evaluate a condition and branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionStep {
    #[serde(flatten)]
    pub condition: Condition,

    #[serde(default)]
    pub then_action: BranchActionKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub then_steps: Vec<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then_variable_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then_variable_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then_prompt_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then_chain_id: Option<ChainId>,

    #[serde(default)]
    pub else_action: BranchActionKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub else_steps: Vec<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub else_variable_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub else_variable_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub else_prompt_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub else_chain_id: Option<ChainId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub else_skip_steps: Option<usize>,
}

impl ConditionStep {
    pub fn new(condition: Condition) -> Self {
        Self {
            condition,
            then_action: BranchActionKind::Continue,
            then_steps: Vec::new(),
            then_variable_name: None,
            then_variable_value: None,
            then_prompt_id: None,
            then_chain_id: None,
            else_action: BranchActionKind::Continue,
            else_steps: Vec::new(),
            else_variable_name: None,
            else_variable_value: None,
            else_prompt_id: None,
            else_chain_id: None,
            else_skip_steps: None,
        }
    }

    pub fn then_goto(mut self, steps: Vec<StepId>) -> Self {
        self.then_action = BranchActionKind::Goto;
        self.then_steps = steps;
        self
    }

    pub fn then_stop(mut self) -> Self {
        self.then_action = BranchActionKind::Stop;
        self
    }

    pub fn then_set_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.then_action = BranchActionKind::SetVariable;
        self.then_variable_name = Some(name.into());
        self.then_variable_value = Some(value.into());
        self
    }

    pub fn else_goto(mut self, steps: Vec<StepId>) -> Self {
        self.else_action = BranchActionKind::Goto;
        self.else_steps = steps;
        self
    }

    pub fn else_stop(mut self) -> Self {
        self.else_action = BranchActionKind::Stop;
        self
    }

    pub fn else_skip(mut self, count: usize) -> Self {
        self.else_action = BranchActionKind::Skip;
        self.else_skip_steps = Some(count);
        self
    }

    /// Resolve the action for the branch taken
    pub fn branch(&self, matched: bool) -> Result<BranchAction, ChainError> {
        if matched {
            resolve_branch(
                "then",
                self.then_action,
                &self.then_steps,
                self.then_variable_name.as_deref(),
                self.then_variable_value.as_deref(),
                self.then_prompt_id.as_deref(),
                self.then_chain_id.as_ref(),
                None,
            )
        } else {
            resolve_branch(
                "else",
                self.else_action,
                &self.else_steps,
                self.else_variable_name.as_deref(),
                self.else_variable_value.as_deref(),
                self.else_prompt_id.as_deref(),
                self.else_chain_id.as_ref(),
                Some(self.else_skip_steps),
            )
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn resolve_branch(
    branch: &str,
    action: BranchActionKind,
    steps: &[StepId],
    variable_name: Option<&str>,
    variable_value: Option<&str>,
    prompt_id: Option<&str>,
    chain_id: Option<&ChainId>,
    skip_steps: Option<Option<usize>>,
) -> Result<BranchAction, ChainError> {
    let missing = |field: &str| {
        ChainError::configuration(format!("{} action {:?} requires {}", branch, action, field))
    };

    match action {
        BranchActionKind::Continue => Ok(BranchAction::Continue),
        BranchActionKind::Stop => Ok(BranchAction::Stop),
        BranchActionKind::Goto => {
            if steps.is_empty() {
                return Err(missing(&format!("{}Steps", branch)));
            }
            Ok(BranchAction::Goto(steps.to_vec()))
        }
        BranchActionKind::SetVariable => {
            let name = variable_name
                .filter(|n| !n.is_empty())
                .ok_or_else(|| missing(&format!("{}VariableName", branch)))?;
            Ok(BranchAction::SetVariable {
                name: name.to_string(),
                value: variable_value.unwrap_or_default().to_string(),
            })
        }
        BranchActionKind::RunPrompt => {
            let prompt_id = prompt_id
                .filter(|p| !p.is_empty())
                .ok_or_else(|| missing(&format!("{}PromptId", branch)))?;
            Ok(BranchAction::RunPrompt {
                prompt_id: prompt_id.to_string(),
            })
        }
        BranchActionKind::RunChain => {
            let chain_id = chain_id.ok_or_else(|| missing(&format!("{}ChainId", branch)))?;
            Ok(BranchAction::RunChain {
                chain_id: chain_id.clone(),
            })
        }
        BranchActionKind::Skip => match skip_steps {
            None => Err(ChainError::configuration(
                "skip is only allowed as the else action",
            )),
            Some(count) => Ok(BranchAction::Skip(count.unwrap_or(1))),
        },
    }
}

/// How a loop produces its iterations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "loopType", rename_all = "camelCase")]
pub enum LoopMode {
    /// One iteration per element of an array variable
    ForEach(ForEachLoop),

    /// Iterate while a condition holds
    While(WhileLoop),

    /// Fixed iteration count
    Times(TimesLoop),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForEachLoop {
    pub array_variable: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhileLoop {
    pub while_condition: Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesLoop {
    pub iterations: u32,
}

/// Reduction applied to per-iteration results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Concat,
    Join,
    Sum,
    Average,
    Min,
    Max,
    First,
    Last,
    Count,
    Unique,
}

fn default_item_variable() -> String {
    "item".to_string()
}

fn default_index_variable() -> String {
    "index".to_string()
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

/// Repeat a body of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopStep {
    #[serde(flatten)]
    pub mode: LoopMode,

    #[serde(default = "default_item_variable")]
    pub item_variable: String,

    #[serde(default = "default_index_variable")]
    pub index_variable: String,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    pub loop_steps: Vec<StepId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,

    /// Separator for `join` aggregation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
}

impl LoopStep {
    pub fn new(mode: LoopMode, loop_steps: Vec<StepId>) -> Self {
        Self {
            mode,
            item_variable: default_item_variable(),
            index_variable: default_index_variable(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            loop_steps,
            aggregation: None,
            separator: None,
        }
    }

    pub fn for_each(array_variable: impl Into<String>, loop_steps: Vec<StepId>) -> Self {
        Self::new(
            LoopMode::ForEach(ForEachLoop {
                array_variable: array_variable.into(),
            }),
            loop_steps,
        )
    }

    pub fn while_true(condition: Condition, loop_steps: Vec<StepId>) -> Self {
        Self::new(
            LoopMode::While(WhileLoop {
                while_condition: condition,
            }),
            loop_steps,
        )
    }

    pub fn times(iterations: u32, loop_steps: Vec<StepId>) -> Self {
        Self::new(LoopMode::Times(TimesLoop { iterations }), loop_steps)
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }
}

/// How a switch case's value is compared with the switch expression.
///
/// Both sides are interpolated strings, so `equals` and `strict_equals`
/// agree; numeric modes never match a side that is not a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SwitchComparison {
    #[default]
    Equals,
    StrictEquals,
    Contains,
    StartsWith,
    EndsWith,
    /// The case value is the pattern
    MatchesRegex,
    GreaterThan,
    LessThan,
    /// The case value is an inclusive `min-max` range
    InRange,
}

impl SwitchComparison {
    /// Whether `value` matches the rendered case value
    pub fn matches(&self, value: &str, case_value: &str) -> Result<bool, ChainError> {
        let numbers = || parse_number(value).zip(parse_number(case_value));

        Ok(match self {
            Self::Equals | Self::StrictEquals => value == case_value,
            Self::Contains => value.contains(case_value),
            Self::StartsWith => value.starts_with(case_value),
            Self::EndsWith => value.ends_with(case_value),
            Self::MatchesRegex => build_regex(case_value, "")?.is_match(value),
            Self::GreaterThan => numbers().is_some_and(|(v, c)| v > c),
            Self::LessThan => numbers().is_some_and(|(v, c)| v < c),
            Self::InRange => {
                let (min, max) = parse_range(case_value)?;
                parse_number(value).is_some_and(|v| v >= min && v <= max)
            }
        })
    }
}

/// Parse `min-max`; either bound may carry a leading minus sign
pub(crate) fn parse_range(range: &str) -> Result<(f64, f64), ChainError> {
    let trimmed = range.trim();
    let split = trimmed
        .char_indices()
        .skip(1)
        .find(|&(i, c)| c == '-' && !trimmed[..i].ends_with('-'))
        .map(|(i, _)| i);

    let bounds = split.and_then(|i| parse_number(&trimmed[..i]).zip(parse_number(&trimmed[i + 1..])));
    match bounds {
        Some((min, max)) if min <= max => Ok((min, max)),
        _ => Err(ChainError::configuration(format!(
            "invalid range '{}', expected 'min-max'",
            range
        ))),
    }
}

/// One arm of a switch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchCase {
    pub value: String,

    #[serde(default)]
    pub comparison: SwitchComparison,

    pub steps: Vec<StepId>,
}

impl SwitchCase {
    pub fn new(value: impl Into<String>, steps: Vec<StepId>) -> Self {
        Self {
            value: value.into(),
            comparison: SwitchComparison::Equals,
            steps,
        }
    }

    pub fn with_comparison(mut self, comparison: SwitchComparison) -> Self {
        self.comparison = comparison;
        self
    }
}

/// Run the steps of the case matching an interpolated expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchStep {
    #[serde(alias = "switchVariable")]
    pub expression: String,

    #[serde(default)]
    pub cases: Vec<SwitchCase>,

    #[serde(default, alias = "defaultSteps", skip_serializing_if = "Vec::is_empty")]
    pub default: Vec<StepId>,
}

impl SwitchStep {
    /// First case whose interpolated value matches `value` under its comparison
    pub fn select<'a>(
        &'a self,
        value: &str,
        render: impl Fn(&str) -> String,
    ) -> Result<(Option<&'a SwitchCase>, &'a [StepId]), ChainError> {
        for case in &self.cases {
            if case.comparison.matches(value, &render(&case.value))? {
                return Ok((Some(case), &case.steps));
            }
        }
        Ok((None, &self.default))
    }

    fn body_steps(&self) -> impl Iterator<Item = &StepId> {
        self.cases
            .iter()
            .flat_map(|case| case.steps.iter())
            .chain(self.default.iter())
    }
}

/// Sandbox language for code steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CodeLanguage {
    #[default]
    Rhai,
}

/// Run user code against a snapshot of the variables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeStep {
    pub code: String,

    #[serde(default)]
    pub language: CodeLanguage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl CodeStep {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            language: CodeLanguage::Rhai,
            timeout_ms: None,
        }
    }
}

fn default_timeout_hours() -> f64 {
    24.0
}

/// Longest approval wait a chain may configure (ten years)
pub const MAX_APPROVAL_TIMEOUT_HOURS: f64 = 87_600.0;

/// Pause until a human approves or rejects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalStep {
    pub message: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub approvers: Vec<String>,

    #[serde(default = "default_timeout_hours")]
    pub timeout_hours: f64,

    /// Required: what a timeout means
    pub timeout_disposition: TimeoutDisposition,
}

impl ApprovalStep {
    pub fn new(message: impl Into<String>, timeout_disposition: TimeoutDisposition) -> Self {
        Self {
            message: message.into(),
            approvers: Vec::new(),
            timeout_hours: default_timeout_hours(),
            timeout_disposition,
        }
    }

    pub fn with_timeout_hours(mut self, hours: f64) -> Self {
        self.timeout_hours = hours;
        self
    }

    pub fn with_approvers(mut self, approvers: Vec<String>) -> Self {
        self.approvers = approvers;
        self
    }

    /// The wait as a duration, clamped to `0..=MAX_APPROVAL_TIMEOUT_HOURS`
    pub fn timeout(&self) -> Duration {
        let hours = if self.timeout_hours.is_nan() {
            0.0
        } else {
            self.timeout_hours.clamp(0.0, MAX_APPROVAL_TIMEOUT_HOURS)
        };
        Duration::try_from_secs_f64(hours * 3600.0).unwrap_or_default()
    }
}

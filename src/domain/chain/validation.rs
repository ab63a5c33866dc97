//! Pre-run validation and the execution plan derived from a chain

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

use super::entity::{ChainDefinition, ChainTrigger, StepId};
use super::error::ChainError;
use super::condition::build_regex;
use super::step_types::{
    parse_range, LoopMode, StepDefinition, StepKind, SwitchComparison, MAX_APPROVAL_TIMEOUT_HOURS,
};
use super::variables::is_valid_identifier;

/// Parse a cron expression; five-field expressions get a leading seconds field
pub fn parse_schedule(expression: &str) -> Result<cron::Schedule, ChainError> {
    let trimmed = expression.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    };

    cron::Schedule::from_str(&normalized).map_err(|e| {
        ChainError::configuration(format!("invalid cron expression '{}': {}", expression, e))
    })
}

/// Validate a whole chain before it is saved or run
pub fn validate_chain(chain: &ChainDefinition) -> Result<(), ChainError> {
    ChainPlan::build(Arc::new(chain.clone())).map(|_| ())
}

/// A validated chain with its step index and top-level sequence.
///
/// Steps owned by a loop or switch body are excluded from the top-level
/// sequence; condition goto targets are not.
#[derive(Debug, Clone)]
pub struct ChainPlan {
    chain: Arc<ChainDefinition>,
    index: HashMap<StepId, usize>,
    sequence: Vec<usize>,
}

impl ChainPlan {
    pub fn build(chain: Arc<ChainDefinition>) -> Result<Self, ChainError> {
        if chain.steps().is_empty() {
            return Err(ChainError::configuration("chain has no steps"));
        }

        if chain.trigger() == ChainTrigger::Schedule {
            match chain.schedule() {
                Some(expression) => {
                    parse_schedule(expression)?;
                }
                None => {
                    return Err(ChainError::configuration(
                        "scheduled chain requires a cron schedule",
                    ))
                }
            }
        }

        let mut index = HashMap::with_capacity(chain.steps().len());
        for (position, step) in chain.steps().iter().enumerate() {
            if index.insert(step.id.clone(), position).is_some() {
                return Err(ChainError::configuration(format!(
                    "duplicate step id '{}'",
                    step.id
                )));
            }
        }

        let mut owned = HashSet::new();
        for step in chain.steps() {
            validate_step(step).map_err(|e| e.context(format!("step '{}'", step.id)))?;

            for target in step.referenced_steps() {
                if target == &step.id {
                    return Err(ChainError::configuration(format!(
                        "step '{}' references itself",
                        step.id
                    )));
                }
                if !index.contains_key(target) {
                    return Err(ChainError::configuration(format!(
                        "step '{}' references unknown step '{}'",
                        step.id, target
                    )));
                }
            }

            owned.extend(step.body_steps().into_iter().cloned());
        }

        detect_cycles(&chain, &index)?;

        let sequence: Vec<usize> = chain
            .steps()
            .iter()
            .enumerate()
            .filter(|(_, step)| !owned.contains(&step.id))
            .map(|(position, _)| position)
            .collect();

        if sequence.is_empty() {
            return Err(ChainError::configuration(
                "every step is owned by a loop or switch body",
            ));
        }

        Ok(Self {
            chain,
            index,
            sequence,
        })
    }

    pub fn chain(&self) -> &Arc<ChainDefinition> {
        &self.chain
    }

    pub fn step(&self, id: &StepId) -> Option<&StepDefinition> {
        self.index.get(id).map(|&position| &self.chain.steps()[position])
    }

    /// Steps reached by sequential advance, in chain order
    pub fn sequence(&self) -> Vec<&StepDefinition> {
        self.sequence
            .iter()
            .map(|&position| &self.chain.steps()[position])
            .collect()
    }

    /// Look up referenced steps in the order given
    pub fn resolve(&self, ids: &[StepId]) -> Result<Vec<&StepDefinition>, ChainError> {
        ids.iter()
            .map(|id| {
                self.step(id).ok_or_else(|| {
                    ChainError::configuration(format!("unknown step '{}'", id))
                })
            })
            .collect()
    }
}

fn validate_identifier(field: &str, name: &str) -> Result<(), ChainError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(ChainError::configuration(format!(
            "{} '{}' is not a valid variable name",
            field, name
        )))
    }
}

fn require(field: &str, value: &str) -> Result<(), ChainError> {
    if value.trim().is_empty() {
        Err(ChainError::configuration(format!("{} is required", field)))
    } else {
        Ok(())
    }
}

fn validate_step(step: &StepDefinition) -> Result<(), ChainError> {
    if let Some(output) = &step.output_variable {
        validate_identifier("outputVariable", output)?;
    }

    match &step.kind {
        StepKind::Prompt(prompt) => {
            require("promptId", &prompt.prompt_id)?;
            for name in prompt.variables.keys() {
                validate_identifier("prompt variable", name)?;
            }
        }
        StepKind::Webhook(_) => {}
        StepKind::ApiCall(api) => require("url", &api.url)?,
        StepKind::Database(database) => {
            require("connectionId", &database.connection_id)?;
            require("queryId", &database.query_id)?;
        }
        StepKind::Condition(condition) => {
            condition.condition.validate()?;
            condition.branch(true)?;
            condition.branch(false)?;
        }
        StepKind::Loop(loop_step) => {
            if loop_step.loop_steps.is_empty() {
                return Err(ChainError::configuration("loopSteps must not be empty"));
            }
            if loop_step.max_iterations == 0 {
                return Err(ChainError::configuration("maxIterations must be positive"));
            }
            validate_identifier("itemVariable", &loop_step.item_variable)?;
            validate_identifier("indexVariable", &loop_step.index_variable)?;
            match &loop_step.mode {
                LoopMode::ForEach(each) => require("arrayVariable", &each.array_variable)?,
                LoopMode::While(w) => w.while_condition.validate()?,
                LoopMode::Times(_) => {}
            }
        }
        StepKind::Switch(switch) => {
            require("expression", &switch.expression)?;
            if switch.cases.is_empty() && switch.default.is_empty() {
                return Err(ChainError::configuration(
                    "switch requires at least one case or default steps",
                ));
            }
            // Templated case values are checked when rendered
            for case in switch.cases.iter().filter(|case| !case.value.contains("{{")) {
                match case.comparison {
                    SwitchComparison::MatchesRegex => build_regex(&case.value, "").map(|_| ())?,
                    SwitchComparison::InRange => parse_range(&case.value).map(|_| ())?,
                    _ => {}
                }
            }
        }
        StepKind::Code(code) => require("code", &code.code)?,
        StepKind::Approval(approval) => {
            require("message", &approval.message)?;
            let hours = approval.timeout_hours;
            if !hours.is_finite() || hours < 0.0 {
                return Err(ChainError::configuration(
                    "timeoutHours must be a non-negative number",
                ));
            }
            if hours > MAX_APPROVAL_TIMEOUT_HOURS {
                return Err(ChainError::configuration(format!(
                    "timeoutHours must not exceed {}",
                    MAX_APPROVAL_TIMEOUT_HOURS
                )));
            }
        }
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search over goto targets and body references
fn detect_cycles(
    chain: &ChainDefinition,
    index: &HashMap<StepId, usize>,
) -> Result<(), ChainError> {
    let steps = chain.steps();
    let mut marks: Vec<Option<Mark>> = vec![None; steps.len()];

    for start in 0..steps.len() {
        if marks[start].is_some() {
            continue;
        }

        // (position, next child to visit)
        let mut stack = vec![(start, 0usize)];
        marks[start] = Some(Mark::Visiting);

        while let Some((position, child)) = stack.pop() {
            let refs = steps[position].referenced_steps();
            if child >= refs.len() {
                marks[position] = Some(Mark::Done);
                continue;
            }

            stack.push((position, child + 1));
            let next = index[refs[child]];
            match marks[next] {
                Some(Mark::Visiting) => {
                    return Err(ChainError::configuration(format!(
                        "step '{}' is part of a reference cycle through '{}'",
                        steps[position].id, steps[next].id
                    )));
                }
                Some(Mark::Done) => {}
                None => {
                    marks[next] = Some(Mark::Visiting);
                    stack.push((next, 0));
                }
            }
        }
    }

    Ok(())
}

//! Chain runner: sequencing, control flow, execution records and cancellation

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use super::aggregation::aggregate;
use super::step_executor::StepExecutor;
use crate::config::EngineConfig;
use crate::domain::approval::{
    ApprovalGate, ApprovalOutcome, ApprovalRequest, TimeoutDisposition,
};
use crate::domain::chain::{
    next_cursor, Advance, ApprovalStep, BranchAction, CancelReason, CancellationToken,
    ChainDefinition, ChainError, ChainId, ChainPlan, ConditionStep, Control, ErrorAction,
    LoopMode, LoopStep, PromptStep, ScopeId, StepDefinition, StepId, StepKind, StepOutcome,
    SwitchStep, VariableStore,
};
use crate::domain::execution::{ExecutionRecord, ExecutionStatus, RunRequest, StepStatus};
use crate::domain::storage::Storage;
use crate::infrastructure::observability::{record_run_finished, record_step_finished};

/// How a sequence of steps ended
#[derive(Debug, Clone, PartialEq)]
enum Flow {
    /// Every step ran; carries the output of the last one
    Completed { last_output: Option<Value> },

    /// A `stop` was reached somewhere inside
    Stopped,
}

/// Where a sequence executes: its variable scope and how its entries are tagged
#[derive(Debug, Clone)]
struct Frame {
    scope: ScopeId,
    parent_step: Option<StepId>,
    iteration: Option<u32>,
    depth: usize,
}

impl Frame {
    fn root(scope: ScopeId, depth: usize) -> Self {
        Self {
            scope,
            parent_step: None,
            iteration: None,
            depth,
        }
    }

    fn nested(&self, parent: &StepId, scope: ScopeId, iteration: Option<u32>) -> Self {
        Self {
            scope,
            parent_step: Some(parent.clone()),
            iteration,
            depth: self.depth + 1,
        }
    }
}

/// Mutable state owned by one run
struct RunState {
    plan: Arc<ChainPlan>,
    store: VariableStore,
    record: ExecutionRecord,
    token: CancellationToken,
    webhook_payloads: HashMap<StepId, Value>,
    failed_at: Option<StepId>,
}

/// Drives chain runs to a terminal `ExecutionRecord`.
///
/// The runner is the only writer of a run's record. The record is saved at
/// start, on pause and at the end, and after every step transition unless
/// `persist_every_transition` is off.
pub struct ChainRunner {
    executor: StepExecutor,
    approvals: Arc<dyn ApprovalGate>,
    chains: Arc<dyn Storage<ChainDefinition>>,
    records: Arc<dyn Storage<ExecutionRecord>>,
    config: EngineConfig,
}

impl std::fmt::Debug for ChainRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainRunner")
            .field("executor", &self.executor)
            .field("config", &self.config)
            .finish()
    }
}

impl ChainRunner {
    pub fn new(
        executor: StepExecutor,
        approvals: Arc<dyn ApprovalGate>,
        chains: Arc<dyn Storage<ChainDefinition>>,
        records: Arc<dyn Storage<ExecutionRecord>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            executor,
            approvals,
            chains,
            records,
            config,
        }
    }

    pub fn records(&self) -> &Arc<dyn Storage<ExecutionRecord>> {
        &self.records
    }

    /// Validate a chain and create its pending record, persisted so it can be polled
    pub async fn prepare(
        &self,
        chain: ChainDefinition,
        request: &RunRequest,
    ) -> Result<(ChainPlan, ExecutionRecord), ChainError> {
        let plan = ChainPlan::build(Arc::new(chain))?;
        let record = ExecutionRecord::new(
            plan.chain().id().clone(),
            plan.chain().version(),
            request.inputs.clone(),
        )
        .with_parent(request.parent_execution_id.clone());

        self.save(&record).await;
        Ok((plan, record))
    }

    /// Validate and run a chain to completion on the current task
    pub async fn run(
        &self,
        chain: ChainDefinition,
        request: RunRequest,
    ) -> Result<ExecutionRecord, ChainError> {
        let (plan, record) = self.prepare(chain, &request).await?;
        Ok(self
            .execute(plan, record, request, CancellationToken::new())
            .await)
    }

    /// Run a prepared chain until its record is terminal.
    ///
    /// The chain's `maxExecutionTimeMs` (or the engine default) cancels the
    /// token with reason `timeout` when it elapses.
    pub async fn execute(
        &self,
        plan: ChainPlan,
        record: ExecutionRecord,
        request: RunRequest,
        token: CancellationToken,
    ) -> ExecutionRecord {
        let deadline = plan
            .chain()
            .max_execution_time_ms()
            .or(self.config.default_max_execution_time_ms)
            .map(|ms| spawn_deadline(token.clone(), Duration::from_millis(ms)));

        let record = self
            .drive(Arc::new(plan), record, request, token, 0)
            .await;

        if let Some(deadline) = deadline {
            deadline.abort();
        }
        record
    }

    fn drive<'a>(
        &'a self,
        plan: Arc<ChainPlan>,
        record: ExecutionRecord,
        request: RunRequest,
        token: CancellationToken,
        depth: usize,
    ) -> BoxFuture<'a, ExecutionRecord> {
        let span = info_span!(
            "chain_run",
            execution_id = %record.id(),
            chain_id = %record.chain_id()
        );

        async move {
            let started = Instant::now();
            let sequence: Vec<StepId> = plan.sequence().iter().map(|s| s.id.clone()).collect();

            let mut state = RunState {
                plan,
                store: VariableStore::with_inputs(request.inputs),
                record,
                token,
                webhook_payloads: request.webhook_payloads,
                failed_at: None,
            };

            state.record.start();
            self.save(&state.record).await;
            info!(steps = sequence.len(), "Run started");

            let frame = Frame::root(state.store.root(), depth);
            let result = self.run_sequence(&mut state, sequence, frame).await;
            let outputs = state.store.snapshot(state.store.root());

            match result {
                Ok(_) => {
                    state.record.succeed(outputs);
                }
                Err(error) => match error.cancel_reason() {
                    Some(reason) => {
                        state.record.cancel(reason, outputs);
                    }
                    None => {
                        let failed_at = state.failed_at.take();
                        state.record.fail(&error, failed_at, outputs);
                    }
                },
            }

            self.save(&state.record).await;
            record_run_finished(state.record.status(), started.elapsed());
            info!(
                status = %state.record.status(),
                duration_ms = state.record.total_duration_ms().unwrap_or_default(),
                "Run finished"
            );

            state.record
        }
        .instrument(span)
        .boxed()
    }

    fn run_sequence<'a>(
        &'a self,
        state: &'a mut RunState,
        ids: Vec<StepId>,
        frame: Frame,
    ) -> BoxFuture<'a, Result<Flow, ChainError>> {
        async move {
            if frame.depth > self.config.max_nesting_depth {
                return Err(ChainError::bounds(format!(
                    "nesting deeper than {} levels",
                    self.config.max_nesting_depth
                )));
            }

            let plan = state.plan.clone();
            let steps = plan.resolve(&ids)?;
            let mut cursor = 0;
            let mut last_output = None;

            while cursor < steps.len() {
                let step = steps[cursor];
                let outcome = self.run_step(state, step, &frame).await?;
                last_output = Some(outcome.output);

                if let Control::Goto { target_step_ids } = &outcome.control {
                    debug!(step_id = %step.id, targets = ?target_step_ids, "Goto side trip");
                    let side_trip = frame.nested(&step.id, frame.scope, frame.iteration);
                    let flow = self
                        .run_sequence(state, target_step_ids.clone(), side_trip)
                        .await?;

                    if flow == Flow::Stopped {
                        self.skip_steps(state, &steps[cursor + 1..], &frame).await;
                        return Ok(Flow::Stopped);
                    }
                }

                match next_cursor(cursor, &outcome.control, steps.len()) {
                    Advance::To(next) => cursor = next,
                    Advance::Skip { skipped, next } => {
                        self.skip_steps(state, &steps[skipped], &frame).await;
                        cursor = next;
                    }
                    Advance::Halt => {
                        self.skip_steps(state, &steps[cursor + 1..], &frame).await;
                        return Ok(Flow::Stopped);
                    }
                }
            }

            Ok(Flow::Completed { last_output })
        }
        .boxed()
    }

    /// One step including retries, output binding and its record entry
    async fn run_step(
        &self,
        state: &mut RunState,
        step: &StepDefinition,
        frame: &Frame,
    ) -> Result<StepOutcome, ChainError> {
        state.token.check()?;

        let step_type = step.step_type();
        let entry = state.record.begin_step(
            step.id.clone(),
            step_type,
            step.name.clone(),
            frame.parent_step.clone(),
            frame.iteration,
        );
        self.persist(&state.record).await;
        debug!(step_id = %step.id, step_type = %step_type, "Step started");

        let started = Instant::now();
        let handler = &step.error_handler;
        let max_attempts = handler.max_attempts();
        let mut attempt = 1;

        let result = loop {
            match self.attempt(state, step, frame, entry).await {
                Err(error) if error.cancel_reason().is_none() && attempt < max_attempts => {
                    let delay = handler.retry_delay(attempt);
                    warn!(
                        step_id = %step.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Step failed, retrying"
                    );

                    let wait = state
                        .token
                        .run(async {
                            tokio::time::sleep(delay).await;
                            Ok(())
                        })
                        .await;
                    if let Err(cancelled) = wait {
                        break Err(cancelled);
                    }

                    attempt += 1;
                    state.record.record_attempt(entry, attempt);
                }
                other => break other,
            }
        };

        let elapsed = started.elapsed();

        match result {
            Ok(outcome) => {
                if let Some(name) = &step.output_variable {
                    state
                        .store
                        .set(frame.scope, name.clone(), outcome.output.clone());
                }
                state.record.complete_step(
                    entry,
                    outcome.output.clone(),
                    outcome.telemetry.clone(),
                );
                self.persist(&state.record).await;
                record_step_finished(step_type, StepStatus::Success, elapsed);
                debug!(
                    step_id = %step.id,
                    duration_ms = elapsed.as_millis() as u64,
                    "Step succeeded"
                );
                Ok(outcome)
            }
            // Left running; the cancelled record finalizes it
            Err(error) if error.cancel_reason().is_some() => Err(error),
            Err(error) => {
                record_step_finished(step_type, StepStatus::Error, elapsed);

                if handler.action == ErrorAction::Continue {
                    let fallback = handler.fallback_value.clone();
                    if let (Some(name), Some(value)) = (&step.output_variable, &fallback) {
                        state.store.set(frame.scope, name.clone(), value.clone());
                    }
                    state.record.fail_step(entry, &error, fallback.clone());
                    self.persist(&state.record).await;
                    state.failed_at = None;

                    warn!(step_id = %step.id, error = %error, "Step failed, continuing");
                    return Ok(StepOutcome::new(fallback.unwrap_or(Value::Null)));
                }

                state.record.fail_step(entry, &error, None);
                self.persist(&state.record).await;
                if state.failed_at.is_none() {
                    state.failed_at = Some(step.id.clone());
                }

                warn!(step_id = %step.id, error = %error, "Step failed");
                Err(error)
            }
        }
    }

    /// A single attempt, bounded by the step's `timeoutMs`.
    ///
    /// The attempt runs under a child token. When the limit passes the child
    /// is cancelled and the attempt still runs to completion, so nested
    /// scopes are popped and child runs reach a terminal record.
    async fn attempt(
        &self,
        state: &mut RunState,
        step: &StepDefinition,
        frame: &Frame,
        entry: usize,
    ) -> Result<StepOutcome, ChainError> {
        let Some(limit) = step.timeout_ms else {
            return self.execute_kind(state, step, frame).await;
        };

        let limit = Duration::from_millis(limit);
        let run_token = state.token.clone();
        let step_token = run_token.child();
        state.token = step_token.clone();

        let mut timed_out = false;
        let result = {
            let work = self.execute_kind(state, step, frame);
            tokio::pin!(work);

            tokio::select! {
                result = &mut work => result,
                _ = tokio::time::sleep(limit) => {
                    timed_out = step_token.cancel(CancelReason::Timeout);
                    work.await
                }
            }
        };
        state.token = run_token;

        if !timed_out || state.token.is_cancelled() {
            return result;
        }

        let error = ChainError::bounds(format!(
            "step exceeded its {}ms timeout",
            limit.as_millis()
        ));

        // Nested entries interrupted by the timeout
        for nested in entry + 1..state.record.per_step().len() {
            state.record.fail_step(nested, &error, None);
        }
        state.record.resume();

        Err(error)
    }

    async fn execute_kind(
        &self,
        state: &mut RunState,
        step: &StepDefinition,
        frame: &Frame,
    ) -> Result<StepOutcome, ChainError> {
        let token = state.token.clone();

        match &step.kind {
            StepKind::Prompt(config) => {
                self.executor
                    .prompt(config, &mut state.store, frame.scope, &token)
                    .await
            }
            StepKind::Webhook(_) => self.executor.webhook(&step.id, &state.webhook_payloads),
            StepKind::ApiCall(config) => {
                self.executor
                    .api_call(config, &state.store, frame.scope, &token)
                    .await
            }
            StepKind::Database(config) => {
                self.executor
                    .database(config, &state.store, frame.scope, &token)
                    .await
            }
            StepKind::Code(config) => {
                self.executor
                    .code(config, &state.store, frame.scope, &token)
                    .await
            }
            StepKind::Condition(config) => self.condition(state, step, config, frame).await,
            StepKind::Loop(config) => self.run_loop(state, step, config, frame).await,
            StepKind::Switch(config) => self.switch(state, step, config, frame).await,
            StepKind::Approval(config) => self.approval(state, step, config, frame).await,
        }
    }

    async fn condition(
        &self,
        state: &mut RunState,
        step: &StepDefinition,
        config: &ConditionStep,
        frame: &Frame,
    ) -> Result<StepOutcome, ChainError> {
        let evaluation = config.condition.evaluate(&state.store, frame.scope)?;
        state.store.set(
            frame.scope,
            format!("{}_result", step.id),
            Value::Bool(evaluation.result),
        );

        let action_kind = if evaluation.result {
            config.then_action
        } else {
            config.else_action
        };
        let action = config.branch(evaluation.result)?;

        let mut output = Map::new();
        output.insert("result".to_string(), json!(evaluation.result));
        output.insert(
            "branch".to_string(),
            json!(if evaluation.result { "then" } else { "else" }),
        );
        output.insert("action".to_string(), json!(action_kind));
        output.insert("details".to_string(), evaluation.details);

        let mut telemetry = None;
        let control = match action {
            BranchAction::Continue => Control::Continue,
            BranchAction::Goto(target_step_ids) => Control::Goto { target_step_ids },
            BranchAction::SetVariable { name, value } => {
                let value = state.store.interpolate(frame.scope, &value);
                state
                    .store
                    .set(frame.scope, name.clone(), Value::String(value.clone()));
                output.insert("variable".to_string(), json!({"name": name, "value": value}));
                Control::Continue
            }
            BranchAction::RunPrompt { prompt_id } => {
                let token = state.token.clone();
                let prompt = self
                    .executor
                    .prompt(
                        &PromptStep::new(prompt_id),
                        &mut state.store,
                        frame.scope,
                        &token,
                    )
                    .await?;
                output.insert("promptOutput".to_string(), prompt.output);
                telemetry = prompt.telemetry;
                Control::Continue
            }
            BranchAction::RunChain { chain_id } => {
                let outputs = self.run_child(state, &chain_id, frame).await?;
                output.insert("chainOutput".to_string(), outputs);
                Control::RunChain { chain_id }
            }
            BranchAction::Stop => Control::Stop,
            BranchAction::Skip(count) => Control::Skip { count },
        };

        let mut outcome = StepOutcome::new(Value::Object(output)).with_control(control);
        outcome.telemetry = telemetry;
        Ok(outcome)
    }

    /// Run another chain as a child with its own record, seeded with the
    /// variables visible here. Its final outputs become this step's result.
    async fn run_child(
        &self,
        state: &mut RunState,
        chain_id: &ChainId,
        frame: &Frame,
    ) -> Result<Value, ChainError> {
        let chain = self
            .chains
            .get(chain_id)
            .await
            .map_err(|e| ChainError::external("storage", e.to_string()))?
            .ok_or_else(|| ChainError::configuration(format!("chain '{}' not found", chain_id)))?;

        let plan = ChainPlan::build(Arc::new(chain))
            .map_err(|e| e.context(format!("chain '{}'", chain_id)))?;

        let inputs = state.store.snapshot(frame.scope);
        let request = RunRequest::new(inputs).with_parent(state.record.id().clone());
        let record = ExecutionRecord::new(
            chain_id.clone(),
            plan.chain().version(),
            request.inputs.clone(),
        )
        .with_parent(request.parent_execution_id.clone());

        info!(child_execution_id = %record.id(), child_chain_id = %chain_id, "Starting child run");

        let child = self
            .drive(
                Arc::new(plan),
                record,
                request,
                state.token.clone(),
                frame.depth + 1,
            )
            .await;

        match child.status() {
            ExecutionStatus::Success => Ok(Value::Object(child.final_outputs().clone())),
            ExecutionStatus::Cancelled => Err(ChainError::cancelled(
                child.terminal_reason().unwrap_or(CancelReason::Cancelled),
            )),
            _ => Err(ChainError::external(
                "chain",
                format!(
                    "child run {} failed: {}",
                    child.id(),
                    child.error().unwrap_or("unknown error")
                ),
            )),
        }
    }

    async fn run_loop(
        &self,
        state: &mut RunState,
        step: &StepDefinition,
        config: &LoopStep,
        frame: &Frame,
    ) -> Result<StepOutcome, ChainError> {
        let max = config.max_iterations;

        let (items, total) = match &config.mode {
            LoopMode::ForEach(each) => {
                let items = loop_items(&state.store, frame.scope, &each.array_variable)?;
                if items.len() > max as usize {
                    return Err(ChainError::bounds(format!(
                        "forEach over {} items exceeds maxIterations {}",
                        items.len(),
                        max
                    )));
                }
                let total = items.len();
                (Some(items), Some(total))
            }
            LoopMode::Times(times) => {
                if times.iterations > max {
                    return Err(ChainError::bounds(format!(
                        "{} iterations exceed maxIterations {}",
                        times.iterations, max
                    )));
                }
                (None, Some(times.iterations as usize))
            }
            LoopMode::While(_) => (None, None),
        };

        let mut results = Vec::new();
        let mut iterations: u32 = 0;
        let mut stopped = false;

        loop {
            state.token.check()?;

            if let LoopMode::While(w) = &config.mode {
                if !w.while_condition.evaluate(&state.store, frame.scope)?.result {
                    break;
                }
                if iterations >= max {
                    return Err(ChainError::bounds(format!(
                        "while condition still true after maxIterations {}",
                        max
                    )));
                }
            } else if total.is_some_and(|total| iterations as usize >= total) {
                break;
            }

            let index = iterations;
            let scope = state.store.push_scope(frame.scope);
            state
                .store
                .bind(scope, config.index_variable.clone(), json!(index));
            if let Some(item) = items.as_ref().and_then(|items| items.get(index as usize)) {
                state
                    .store
                    .bind(scope, config.item_variable.clone(), item.clone());
            }

            let body = frame.nested(&step.id, scope, Some(index));
            let flow = self
                .run_sequence(state, config.loop_steps.clone(), body)
                .await;
            state.store.pop_scope(scope);
            iterations += 1;

            match flow.map_err(|e| e.context(format!("iteration {}", index)))? {
                Flow::Completed { last_output } => {
                    results.push(last_output.unwrap_or(Value::Null));
                }
                Flow::Stopped => {
                    stopped = true;
                    break;
                }
            }
        }

        let aggregated = aggregate(config.aggregation, &results, config.separator.as_deref());
        state.store.set(
            frame.scope,
            format!("{}_results", step.id),
            aggregated.clone(),
        );
        state
            .store
            .set(frame.scope, format!("{}_count", step.id), json!(iterations));

        let output = json!({
            "iterations": iterations,
            "results": results,
            "aggregated": aggregated,
        });
        let control = if stopped { Control::Stop } else { Control::Continue };

        Ok(StepOutcome::new(output).with_control(control))
    }

    async fn switch(
        &self,
        state: &mut RunState,
        step: &StepDefinition,
        config: &SwitchStep,
        frame: &Frame,
    ) -> Result<StepOutcome, ChainError> {
        let value = state.store.interpolate(frame.scope, &config.expression);
        let (matched, body) = {
            let store = &state.store;
            let (case, steps) =
                config.select(&value, |candidate| store.interpolate(frame.scope, candidate))?;
            (case.map(|c| c.value.clone()), steps.to_vec())
        };

        state.store.set(
            frame.scope,
            format!("{}_matched", step.id),
            matched.clone().map(Value::String).unwrap_or(Value::Null),
        );
        debug!(step_id = %step.id, value = %value, matched = ?matched, "Switch evaluated");

        let nested = frame.nested(&step.id, frame.scope, frame.iteration);
        let flow = self
            .run_sequence(state, body, nested)
            .await
            .map_err(|e| {
                e.context(format!(
                    "case '{}'",
                    matched.as_deref().unwrap_or("default")
                ))
            })?;

        let (last_output, control) = match flow {
            Flow::Completed { last_output } => (last_output, Control::Continue),
            Flow::Stopped => (None, Control::Stop),
        };

        let output = json!({
            "evaluatedValue": value,
            "matchedCase": matched,
            "output": last_output,
        });
        Ok(StepOutcome::new(output).with_control(control))
    }

    /// Pause the run until an approver answers or the timeout disposition applies
    async fn approval(
        &self,
        state: &mut RunState,
        step: &StepDefinition,
        config: &ApprovalStep,
        frame: &Frame,
    ) -> Result<StepOutcome, ChainError> {
        let timeout = config.timeout();
        let request = ApprovalRequest {
            execution_id: state.record.id().clone(),
            step_id: step.id.clone(),
            message: state.store.interpolate(frame.scope, &config.message),
            approvers: config.approvers.clone(),
            expires_at: expiry(timeout),
        };

        state.record.pause(request.clone());
        self.save(&state.record).await;
        info!(step_id = %step.id, "Run paused for approval");

        let outcome = state
            .token
            .run(self.approvals.wait_for_decision(request, timeout))
            .await;

        state.record.resume();
        self.persist(&state.record).await;

        match outcome? {
            ApprovalOutcome::Decided(decision) => {
                let approver = decision.approver.clone();
                let output = json!({
                    "approved": decision.approved,
                    "approver": decision.approver,
                    "comment": decision.comment,
                    "timedOut": false,
                });

                if decision.approved {
                    Ok(StepOutcome::new(output))
                } else {
                    Err(ChainError::rejected(format!(
                        "rejected by {}",
                        approver.as_deref().unwrap_or("an approver")
                    )))
                }
            }
            ApprovalOutcome::TimedOut => match config.timeout_disposition {
                TimeoutDisposition::Approve => {
                    info!(step_id = %step.id, "Approval timed out, approving by disposition");
                    Ok(StepOutcome::new(json!({"approved": true, "timedOut": true})))
                }
                TimeoutDisposition::Reject => Err(ChainError::rejected(format!(
                    "no decision within {} hours",
                    config.timeout_hours
                ))),
            },
        }
    }

    async fn skip_steps(&self, state: &mut RunState, steps: &[&StepDefinition], frame: &Frame) {
        if steps.is_empty() {
            return;
        }

        for step in steps {
            state.record.skip_step(
                step.id.clone(),
                step.step_type(),
                step.name.clone(),
                frame.parent_step.clone(),
            );
        }
        self.persist(&state.record).await;
    }

    async fn persist(&self, record: &ExecutionRecord) {
        if self.config.persist_every_transition {
            self.save(record).await;
        }
    }

    async fn save(&self, record: &ExecutionRecord) {
        if let Err(e) = self.records.save(record.clone()).await {
            warn!(execution_id = %record.id(), error = %e, "Failed to persist execution record");
        }
    }
}

/// The array a forEach loop iterates; JSON text holding an array is accepted
fn loop_items(store: &VariableStore, scope: ScopeId, name: &str) -> Result<Vec<Value>, ChainError> {
    match store.get(scope, name) {
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(Value::String(text)) => match serde_json::from_str(text) {
            Ok(Value::Array(items)) => Ok(items),
            _ => Err(ChainError::configuration(format!(
                "variable '{}' is not an array",
                name
            ))),
        },
        Some(_) => Err(ChainError::configuration(format!(
            "variable '{}' is not an array",
            name
        ))),
        None => Err(ChainError::configuration(format!(
            "array variable '{}' is not defined",
            name
        ))),
    }
}

fn expiry(timeout: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(timeout)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Cancel `token` with reason `timeout` once `after` elapses
fn spawn_deadline(token: CancellationToken, after: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(after) => {
                if token.cancel(CancelReason::Timeout) {
                    warn!(limit_ms = after.as_millis() as u64, "Run exceeded its maximum execution time");
                }
            }
            _ = token.cancelled() => {}
        }
    })
}

//! Execution service - starts runs in the background and exposes the polling API

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::domain::approval::ApprovalDecision;
use crate::domain::chain::{
    CancelReason, CancellationToken, ChainDefinition, ChainError, ChainId, StepId, StepType,
};
use crate::domain::execution::{ExecutionId, ExecutionRecord, RunRequest};
use crate::domain::storage::Storage;
use crate::domain::DomainError;
use crate::infrastructure::approval::ApprovalRegistry;
use crate::infrastructure::chain::ChainRunner;

/// Handle to a run executing on a background task
#[derive(Debug, Clone)]
struct ActiveRun {
    token: CancellationToken,
    done: watch::Receiver<bool>,
}

/// Starts, observes, cancels and approves chain runs
pub struct ExecutionService {
    runner: Arc<ChainRunner>,
    chains: Arc<dyn Storage<ChainDefinition>>,
    records: Arc<dyn Storage<ExecutionRecord>>,
    approvals: ApprovalRegistry,
    active: Arc<Mutex<HashMap<ExecutionId, ActiveRun>>>,
}

impl std::fmt::Debug for ExecutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionService")
            .field("active_runs", &self.active_count())
            .field("pending_approvals", &self.approvals.pending_count())
            .finish()
    }
}

impl ExecutionService {
    pub fn new(
        runner: Arc<ChainRunner>,
        chains: Arc<dyn Storage<ChainDefinition>>,
        records: Arc<dyn Storage<ExecutionRecord>>,
        approvals: ApprovalRegistry,
    ) -> Self {
        Self {
            runner,
            chains,
            records,
            approvals,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of runs currently executing in this process
    pub fn active_count(&self) -> usize {
        self.active.lock().map(|active| active.len()).unwrap_or_default()
    }

    /// Validate the chain, persist a pending record and run it in the background.
    ///
    /// Returns as soon as the record exists; callers poll `get` for progress.
    #[instrument(skip(self, request), fields(chain_id = %chain_id))]
    pub async fn start(
        &self,
        chain_id: &str,
        request: RunRequest,
    ) -> Result<ExecutionRecord, DomainError> {
        let chain = self.load_chain(chain_id).await?;
        if !chain.is_active() {
            return Err(DomainError::validation(format!(
                "Chain '{}' is not active",
                chain_id
            )));
        }

        let (plan, record) = self.runner.prepare(chain, &request).await?;
        let execution_id = record.id().clone();
        let token = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        self.lock_active()?.insert(
            execution_id.clone(),
            ActiveRun {
                token: token.clone(),
                done: done_rx,
            },
        );

        let runner = self.runner.clone();
        let records = self.records.clone();
        let active = self.active.clone();
        let pending = record.clone();

        tokio::spawn(async move {
            let id = record.id().clone();
            let run = AssertUnwindSafe(runner.execute(plan, record, request, token));
            if run.catch_unwind().await.is_err() {
                fail_abandoned(records.as_ref(), &id).await;
            }

            if let Ok(mut active) = active.lock() {
                active.remove(&id);
            }
            let _ = done_tx.send(true);
        });

        info!(execution_id = %execution_id, "Run scheduled");
        Ok(pending)
    }

    /// Start a run and wait for it to settle (or pause on an approval nobody can answer)
    pub async fn run_to_completion(
        &self,
        chain_id: &str,
        request: RunRequest,
    ) -> Result<ExecutionRecord, DomainError> {
        let pending = self.start(chain_id, request).await?;
        let done = self
            .lock_active()?
            .get(pending.id())
            .map(|run| run.done.clone());

        // Absent entry: the task already finished and removed itself
        if let Some(mut done) = done {
            let _ = done.wait_for(|finished| *finished).await;
        }

        self.get_required(pending.id().as_str()).await
    }

    /// Start a run with `payload` delivered to the webhook step `step_id`
    pub async fn start_from_webhook(
        &self,
        chain_id: &str,
        step_id: &str,
        payload: Value,
    ) -> Result<ExecutionRecord, DomainError> {
        let chain = self.load_chain(chain_id).await?;
        let step = chain.step(step_id).ok_or_else(|| {
            DomainError::not_found(format!("Step '{}' not found in chain '{}'", step_id, chain_id))
        })?;

        if step.step_type() != StepType::Webhook {
            return Err(DomainError::validation(format!(
                "Step '{}' is a {} step, not a webhook",
                step_id,
                step.step_type()
            )));
        }

        let request = RunRequest::default().with_webhook_payload(step.id.clone(), payload);
        self.start(chain_id, request).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<ExecutionRecord>, DomainError> {
        let execution_id = self.parse_id(id)?;
        self.records.get(&execution_id).await
    }

    pub async fn get_required(&self, id: &str) -> Result<ExecutionRecord, DomainError> {
        self.get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Execution '{}' not found", id)))
    }

    /// Runs of one chain, newest first
    pub async fn list_for_chain(&self, chain_id: &str) -> Result<Vec<ExecutionRecord>, DomainError> {
        let chain_id = ChainId::new(chain_id).map_err(|e| DomainError::invalid_id(e.to_string()))?;

        let mut runs: Vec<ExecutionRecord> = self
            .records
            .list()
            .await?
            .into_iter()
            .filter(|record| record.chain_id() == &chain_id)
            .collect();
        runs.sort_by_key(|record| std::cmp::Reverse(record.created_at()));
        Ok(runs)
    }

    /// Cancel a run and wait for its terminal record.
    ///
    /// Cancelling a terminal run returns it unchanged.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: &str) -> Result<ExecutionRecord, DomainError> {
        let record = self.get_required(id).await?;
        if record.is_terminal() {
            return Ok(record);
        }

        let active = self.lock_active()?.get(record.id()).cloned();
        match active {
            Some(ActiveRun { token, mut done }) => {
                if token.cancel(CancelReason::Cancelled) {
                    info!(execution_id = %id, "Cancellation requested");
                }
                // The sender is dropped once the run task finishes
                let _ = done.wait_for(|finished| *finished).await;
                self.get_required(id).await
            }
            None => {
                // The task may have finished between the first read and the lookup
                let record = self.get_required(id).await?;
                if record.is_terminal() {
                    return Ok(record);
                }

                // No task owns this record (e.g. the process restarted mid-run)
                warn!(execution_id = %id, status = %record.status(), "Cancelling orphaned run");
                let mut record = record;
                let outputs = record.final_outputs().clone();
                record.cancel(CancelReason::Cancelled, outputs);
                self.records.save(record).await
            }
        }
    }

    /// Deliver an approver's decision to a paused run
    #[instrument(skip(self, decision), fields(approved = decision.approved))]
    pub async fn approve(
        &self,
        id: &str,
        step_id: &str,
        decision: ApprovalDecision,
    ) -> Result<ExecutionRecord, DomainError> {
        let record = self.get_required(id).await?;
        let step_id = StepId::new(step_id).map_err(|e| DomainError::invalid_id(e.to_string()))?;

        self.approvals.submit(record.id(), &step_id, decision)?;
        info!(execution_id = %id, step_id = %step_id, "Approval decision delivered");

        Ok(record)
    }

    async fn load_chain(&self, chain_id: &str) -> Result<ChainDefinition, DomainError> {
        let id = ChainId::new(chain_id).map_err(|e| DomainError::invalid_id(e.to_string()))?;

        self.chains
            .get(&id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Chain '{}' not found", chain_id)))
    }

    fn parse_id(&self, id: &str) -> Result<ExecutionId, DomainError> {
        ExecutionId::new(id)
    }

    fn lock_active(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<ExecutionId, ActiveRun>>, DomainError> {
        self.active
            .lock()
            .map_err(|e| DomainError::internal(format!("Active run registry poisoned: {}", e)))
    }
}

/// Close out a record whose run task panicked so it does not stay `running`
async fn fail_abandoned(records: &dyn Storage<ExecutionRecord>, id: &ExecutionId) {
    error!(execution_id = %id, "Run task panicked");

    let Ok(Some(mut record)) = records.get(id).await else {
        return;
    };
    if record.is_terminal() {
        return;
    }

    let error = ChainError::external("engine", "run aborted unexpectedly");
    let outputs = record.final_outputs().clone();
    record.resume();
    record.fail(&error, None, outputs);
    if let Err(e) = records.save(record).await {
        warn!(execution_id = %id, error = %e, "Failed to save abandoned run");
    }
}

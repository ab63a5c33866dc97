use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::domain::approval::{ApprovalDecision, ApprovalGate, ApprovalOutcome, ApprovalRequest};
use crate::domain::chain::{ChainError, StepId};
use crate::domain::execution::ExecutionId;
use crate::domain::DomainError;

type PendingKey = (ExecutionId, StepId);

struct Pending {
    approvers: Vec<String>,
    sender: oneshot::Sender<ApprovalDecision>,
}

/// Parked approval waits, answered through `submit`.
///
/// Each wait owns its slot: the slot is removed when the wait ends,
/// whether by decision, timeout or the waiting run being cancelled.
#[derive(Clone, Default)]
pub struct ApprovalRegistry {
    pending: Arc<Mutex<HashMap<PendingKey, Pending>>>,
}

impl std::fmt::Debug for ApprovalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalRegistry")
            .field("pending", &self.pending_count())
            .finish()
    }
}

struct SlotGuard {
    pending: Arc<Mutex<HashMap<PendingKey, Pending>>>,
    key: PendingKey,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.key);
        }
    }
}

impl ApprovalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_pending(&self, execution_id: &ExecutionId, step_id: &StepId) -> bool {
        self.pending
            .lock()
            .map(|p| p.contains_key(&(execution_id.clone(), step_id.clone())))
            .unwrap_or(false)
    }

    /// Deliver a decision to a waiting run
    pub fn submit(
        &self,
        execution_id: &ExecutionId,
        step_id: &StepId,
        decision: ApprovalDecision,
    ) -> Result<(), DomainError> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|e| DomainError::internal(format!("approval registry poisoned: {}", e)))?;

        let key = (execution_id.clone(), step_id.clone());
        let slot = pending.get(&key).ok_or_else(|| {
            DomainError::not_found(format!(
                "no approval pending for step '{}' of execution '{}'",
                step_id, execution_id
            ))
        })?;

        if !slot.approvers.is_empty() {
            let allowed = decision
                .approver
                .as_ref()
                .is_some_and(|approver| slot.approvers.contains(approver));
            if !allowed {
                return Err(DomainError::validation(format!(
                    "'{}' is not an approver for step '{}'",
                    decision.approver.as_deref().unwrap_or("anonymous"),
                    step_id
                )));
            }
        }

        if let Some(slot) = pending.remove(&key) {
            // A closed receiver means the wait just ended; the decision is moot.
            let _ = slot.sender.send(decision);
        }
        Ok(())
    }
}

#[async_trait]
impl ApprovalGate for ApprovalRegistry {
    async fn wait_for_decision(
        &self,
        request: ApprovalRequest,
        timeout: Duration,
    ) -> Result<ApprovalOutcome, ChainError> {
        let key = (request.execution_id.clone(), request.step_id.clone());
        let (sender, receiver) = oneshot::channel();

        {
            let mut pending = self
                .pending
                .lock()
                .map_err(|e| ChainError::external("approval", e.to_string()))?;
            pending.insert(
                key.clone(),
                Pending {
                    approvers: request.approvers.clone(),
                    sender,
                },
            );
        }
        let _guard = SlotGuard {
            pending: self.pending.clone(),
            key,
        };

        tracing::info!(
            execution_id = %request.execution_id,
            step_id = %request.step_id,
            expires_at = %request.expires_at,
            "Waiting for approval"
        );

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(decision)) => Ok(ApprovalOutcome::Decided(decision)),
            Ok(Err(_)) => Err(ChainError::external("approval", "approval channel closed")),
            Err(_) => Ok(ApprovalOutcome::TimedOut),
        }
    }
}

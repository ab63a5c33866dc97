//! Cooperative cancellation for chain runs

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use super::error::{CancelReason, ChainError};

/// Shared cancellation flag observed at every suspension point of a run.
///
/// The first reason wins: cancelling an already cancelled token is a no-op,
/// so a timeout racing a client cancel records exactly one reason.
///
/// A [`child`](Self::child) token is cancelled with its parent but can also be
/// cancelled on its own, which bounds one step without touching the run.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<Option<CancelReason>>>,
    parent: Option<Arc<CancellationToken>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
            parent: None,
        }
    }

    /// A token observing this one; cancelling the child leaves `self` untouched
    pub fn child(&self) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Request cancellation. Returns `true` only for the call that flipped the flag.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn reason(&self) -> Option<CancelReason> {
        let own = *self.sender.borrow();
        own.or_else(|| self.parent.as_ref().and_then(|parent| parent.reason()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolves once the token or one of its ancestors is cancelled
    pub async fn cancelled(&self) -> CancelReason {
        let mut receivers: Vec<_> = self.lineage().map(|t| t.sender.subscribe()).collect();

        loop {
            if let Some(reason) = self.reason() {
                return reason;
            }

            let changes = receivers.iter_mut().map(|r| Box::pin(r.changed()));
            // Senders live as long as `self`, so this only fails on shutdown
            let (changed, _, _) = futures::future::select_all(changes).await;
            if changed.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    fn lineage(&self) -> impl Iterator<Item = &CancellationToken> {
        std::iter::successors(Some(self), |token| token.parent.as_deref())
    }

    /// Fail fast if the run was already cancelled
    pub fn check(&self) -> Result<(), ChainError> {
        match self.reason() {
            Some(reason) => Err(ChainError::cancelled(reason)),
            None => Ok(()),
        }
    }

    /// Drive `future` unless cancellation arrives first, in which case the
    /// future is dropped (aborting any in-flight I/O it owns).
    pub async fn run<F, T>(&self, future: F) -> Result<T, ChainError>
    where
        F: Future<Output = Result<T, ChainError>>,
    {
        tokio::select! {
            biased;
            reason = self.cancelled() => Err(ChainError::cancelled(reason)),
            result = future => result,
        }
    }
}

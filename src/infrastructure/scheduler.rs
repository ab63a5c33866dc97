//! Cron scheduler for chains with `trigger = schedule`

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Map};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::chain::{parse_schedule, ChainDefinition, ChainTrigger};
use crate::domain::execution::RunRequest;
use crate::domain::storage::Storage;
use crate::infrastructure::services::ExecutionService;

/// Starts scheduled chains when their cron expression comes due.
///
/// Each tick looks at the window since the previous tick; a chain whose
/// schedule fired one or more times inside the window gets a single run.
pub struct ChainScheduler {
    chains: Arc<dyn Storage<ChainDefinition>>,
    executions: Arc<ExecutionService>,
    tick: Duration,
}

impl ChainScheduler {
    pub fn new(
        chains: Arc<dyn Storage<ChainDefinition>>,
        executions: Arc<ExecutionService>,
        tick: Duration,
    ) -> Self {
        Self {
            chains,
            executions,
            tick,
        }
    }

    /// Run the tick loop on a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(tick_secs = self.tick.as_secs(), "Scheduler started");
            let mut interval = tokio::time::interval(self.tick);
            let mut since = Utc::now();

            loop {
                interval.tick().await;
                let now = Utc::now();
                self.tick(since, now).await;
                since = now;
            }
        })
    }

    /// Start every scheduled chain that came due in `(since, now]`; returns how many started
    pub async fn tick(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> usize {
        let chains = match self.chains.list().await {
            Ok(chains) => chains,
            Err(e) => {
                warn!(error = %e, "Scheduler could not list chains");
                return 0;
            }
        };

        let mut started = 0;
        for chain in chains
            .iter()
            .filter(|c| c.is_active() && c.trigger() == ChainTrigger::Schedule)
        {
            let Some(expression) = chain.schedule() else {
                continue;
            };
            let schedule = match parse_schedule(expression) {
                Ok(schedule) => schedule,
                Err(e) => {
                    warn!(chain_id = %chain.id(), error = %e, "Skipping chain with bad schedule");
                    continue;
                }
            };

            let Some(due) = schedule.after(&since).next().filter(|due| *due <= now) else {
                continue;
            };

            let mut inputs = Map::new();
            inputs.insert("scheduledAt".to_string(), json!(due.to_rfc3339()));

            match self
                .executions
                .start(chain.id().as_str(), RunRequest::new(inputs))
                .await
            {
                Ok(record) => {
                    debug!(chain_id = %chain.id(), execution_id = %record.id(), due = %due, "Scheduled run started");
                    started += 1;
                }
                Err(e) => warn!(chain_id = %chain.id(), error = %e, "Scheduled run failed to start"),
            }
        }

        started
    }
}

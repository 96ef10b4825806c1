//! Queued-state timeout sweeper (spec.md §4.4 "Timeout handling"). Shape
//! follows `everruns-durable::worker::poller::TaskPoller`'s fixed-interval
//! loop with a `watch`-based shutdown signal, simplified since there is no
//! adaptive backoff here — a sweep either finds timed-out states or it
//! doesn't, and either way the next tick is the same fixed distance away.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use state_manager_core::model::{State, StateId, StateStatus};
use state_manager_core::retry::{backoff_ms, should_retry};
use state_manager_storage::store::StateUpdate;

use crate::context::EngineContext;

#[derive(Debug, Clone, Copy)]
pub struct TimeoutSweeperConfig {
    pub interval: Duration,
}

impl Default for TimeoutSweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

pub struct TimeoutSweeper {
    ctx: Arc<EngineContext>,
    config: TimeoutSweeperConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl TimeoutSweeper {
    pub fn new(ctx: Arc<EngineContext>, config: TimeoutSweeperConfig, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self { ctx, config, shutdown_rx }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "timeout sweep failed");
                    }
                }
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        debug!("timeout sweeper shutting down");
                        return;
                    }
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn sweep_once(&self) -> Result<usize, state_manager_storage::StoreError> {
        let now_ms = Utc::now().timestamp_millis();
        let candidates = self.ctx.states.queued_past_timeout(now_ms).await?;

        let mut swept = 0;
        for state in candidates {
            let effective_minutes = self.effective_timeout_minutes(&state).await;
            let Some(queued_at) = state.queued_at else { continue };
            if queued_at + effective_minutes as i64 * 60_000 > now_ms {
                continue; // store's prefilter is conservative; this one hasn't actually timed out
            }

            self.timeout_one(&state, effective_minutes).await;
            swept += 1;
        }
        debug!(swept, "timeout sweep complete");
        Ok(swept)
    }

    async fn effective_timeout_minutes(&self, state: &State) -> u32 {
        if let Some(minutes) = state.timeout_minutes {
            return minutes;
        }
        if let Ok(node) = self.ctx.nodes.get(&state.namespace, &state.node_name).await {
            if let Some(minutes) = node.timeout_minutes {
                return minutes;
            }
        }
        self.ctx.settings.node_timeout_minutes
    }

    async fn timeout_one(&self, state: &State, effective_minutes: u32) {
        let message = format!("Node execution timed out after {effective_minutes} minutes");
        let updated = match self
            .ctx
            .states
            .transition(
                &state.id,
                StateStatus::Queued,
                StateUpdate {
                    status: Some(StateStatus::Timedout),
                    error: Some(Some(message)),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(s) => s,
            Err(e) => {
                warn!(state_id = %state.id, error = %e, "failed to mark state TIMEDOUT (already transitioned?)");
                return;
            }
        };

        self.maybe_retry(&updated).await;
    }

    /// Same retry-sibling construction as `dispatcher::errored`: a timeout
    /// is just another terminal failure as far as the retry policy is
    /// concerned (spec.md §4.4).
    async fn maybe_retry(&self, state: &State) {
        let graph = match self.ctx.graphs.get(&state.namespace, &state.graph_name).await {
            Ok(g) => g,
            Err(e) => {
                warn!(state_id = %state.id, error = %e, "could not load graph to evaluate retry policy");
                return;
            }
        };

        if !should_retry(&graph.retry_policy, state.retry_count) {
            return;
        }

        let next_retry_count = state.retry_count + 1;
        let delay = backoff_ms(&graph.retry_policy, next_retry_count);
        let sibling = State {
            id: StateId::new(""),
            status: StateStatus::Created,
            fanout_id: format!("{}-retry-{}", state.fanout_id, next_retry_count),
            retry_count: next_retry_count,
            enqueue_after: state.enqueue_after + delay,
            queued_at: None,
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            ..state.clone()
        };

        match self.ctx.states.insert_many(vec![sibling]).await {
            Ok(inserted) if inserted.is_empty() => {
                warn!(state_id = %state.id, "retry state already existed (race with dispatcher::errored)");
            }
            Ok(_) => {}
            Err(e) => warn!(state_id = %state.id, error = %e, "failed to create retry state after timeout"),
        }
    }
}

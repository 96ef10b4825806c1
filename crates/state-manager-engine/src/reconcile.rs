//! Startup/periodic reconciliation (SPEC_FULL §9 Open Question 2 and
//! spec.md §6 cron-trigger bookkeeping). Two independent sweeps share this
//! module because both exist to repair at-least-once gaps left by a crash
//! between "mark the durable row" and "schedule the follow-up work":
//!
//! - `EXECUTED` states whose fan-out job never ran (the engine process died
//!   between `dispatcher::executed`'s transition and its `schedule_fanout`
//!   send, or between the send and the fan-out worker picking it up).
//! - Dangling `TRIGGERING`/leftover trigger rows left by a scheduler worker
//!   that died mid-claim, covered by `TriggerStore::reconcile_dangling`.
//!
//! Shape follows `timeout_sweeper`'s fixed-interval loop; grace period is
//! generous since this only catches crashes, not routine latency.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::context::EngineContext;

const STALE_EXECUTED_GRACE_MS: i64 = 2 * 60 * 1000;

#[derive(Debug, Clone, Copy)]
pub struct ReconcileConfig {
    pub interval: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
        }
    }
}

pub struct ReconcileSweeper {
    ctx: Arc<EngineContext>,
    config: ReconcileConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl ReconcileSweeper {
    pub fn new(ctx: Arc<EngineContext>, config: ReconcileConfig, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self { ctx, config, shutdown_rx }
    }

    pub async fn run(mut self) {
        run_once(&self.ctx).await;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {
                    run_once(&self.ctx).await;
                }
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        debug!("reconcile sweeper shutting down");
                        return;
                    }
                }
            }
        }
    }
}

#[instrument(skip(ctx))]
pub async fn run_once(ctx: &EngineContext) {
    let now_ms = Utc::now().timestamp_millis();

    match ctx.states.executed_stale(now_ms - STALE_EXECUTED_GRACE_MS).await {
        Ok(stale) if !stale.is_empty() => {
            info!(count = stale.len(), "re-scheduling fanout for stranded EXECUTED states");
            ctx.schedule_fanout(stale.into_iter().map(|s| s.id).collect());
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "failed to query stale EXECUTED states"),
    }

    match ctx.triggers.reconcile_dangling(Utc::now()).await {
        Ok(count) if count > 0 => info!(count, "reconciled dangling trigger rows"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "failed to reconcile dangling trigger rows"),
    }
}

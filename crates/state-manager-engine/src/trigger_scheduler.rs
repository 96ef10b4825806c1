//! Cron trigger scheduler (spec.md §4.7, component H). Grounded step-for-
//! step on `original_source/.../tasks/trigger_cron.py`: a coalesced
//! once-a-minute tick fans out to `trigger_workers` concurrent workers, each
//! draining `claim_due` until nothing is left; every claimed row is resolved
//! via `trigger::trigger_graph` and, win or lose, followed by inserting
//! every missed successor fire up through the tick's own cron time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use state_manager_core::model::DatabaseTrigger;
use state_manager_storage::StoreError;

use crate::context::EngineContext;
use crate::trigger::{trigger_graph, TriggerRequest};

/// "At most one instance runs" (spec.md §4.7): the tick interval itself.
const TICK_INTERVAL: Duration = Duration::from_secs(60);

pub struct TriggerScheduler {
    ctx: Arc<EngineContext>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TriggerScheduler {
    pub fn new(ctx: Arc<EngineContext>, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self { ctx, shutdown_rx }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(TICK_INTERVAL) => {
                    tick(&self.ctx).await;
                }
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("trigger scheduler shutting down");
                        return;
                    }
                }
            }
        }
    }
}

/// One minute's worth of work: `trigger_workers` workers race to drain
/// whatever is due, mirroring `trigger_cron()`'s `asyncio.gather` over
/// `handle_trigger` instances.
#[instrument(skip(ctx))]
async fn tick(ctx: &EngineContext) {
    let cron_time = Utc::now();
    info!(%cron_time, "starting trigger scheduler tick");

    let workers = ctx.settings.trigger_workers.max(1);
    let handles: Vec<_> = (0..workers).map(|_| handle_due(ctx, cron_time)).collect();
    futures::future::join_all(handles).await;
}

/// One worker's loop: claim, resolve, replenish, repeat until nothing is due.
async fn handle_due(ctx: &EngineContext, cron_time: DateTime<Utc>) {
    while let Some(trigger) = claim_one(ctx, cron_time).await {
        match call_trigger_graph(ctx, &trigger).await {
            Ok(()) => mark_outcome(ctx, &trigger, true).await,
            Err(e) => {
                error!(trigger_id = %trigger.id, error = %e, "scheduled trigger call failed");
                mark_outcome(ctx, &trigger, false).await;
            }
        }
        create_next_triggers(ctx, &trigger, cron_time).await;
    }
}

async fn claim_one(ctx: &EngineContext, cron_time: DateTime<Utc>) -> Option<DatabaseTrigger> {
    match ctx.triggers.claim_due(cron_time).await {
        Ok(found) => found,
        Err(e) => {
            warn!(error = %e, "failed to claim due trigger");
            None
        }
    }
}

async fn call_trigger_graph(ctx: &EngineContext, trigger: &DatabaseTrigger) -> Result<(), state_manager_core::ManagerError> {
    trigger_graph(ctx, &trigger.namespace, &trigger.graph_name, TriggerRequest::default())
        .await
        .map(|_| ())
}

async fn mark_outcome(ctx: &EngineContext, trigger: &DatabaseTrigger, success: bool) {
    let status = if success {
        state_manager_core::model::TriggerStatus::Triggered
    } else {
        state_manager_core::model::TriggerStatus::Failed
    };
    let expires_at = Utc::now() + chrono::Duration::days(ctx.settings.trigger_retention_days as i64);
    if let Err(e) = ctx.triggers.set_status(trigger.id.as_str(), status, Some(expires_at)).await {
        warn!(trigger_id = %trigger.id, error = %e, "failed to record trigger outcome");
    }
}

/// Insert every successor fire from `trigger.trigger_time` up through
/// `cron_time`, so a worker that was asleep past several fires catches every
/// one of them up to (and including) the in-flight tick, same as
/// `create_next_triggers`'s `while ... if next_trigger_time > cron_time: break`.
async fn create_next_triggers(ctx: &EngineContext, trigger: &DatabaseTrigger, cron_time: DateTime<Utc>) {
    let mut after = trigger.trigger_time;
    loop {
        let next_time = match crate::cron_util::next_fire(&trigger.expression, &trigger.timezone, after) {
            Ok(t) => t,
            Err(e) => {
                warn!(expression = %trigger.expression, error = %e, "could not compute next cron fire");
                return;
            }
        };

        let row = DatabaseTrigger {
            id: state_manager_core::model::TriggerId::new(uuid::Uuid::new_v4().to_string()),
            kind: trigger.kind,
            expression: trigger.expression.clone(),
            timezone: trigger.timezone.clone(),
            graph_name: trigger.graph_name.clone(),
            namespace: trigger.namespace.clone(),
            trigger_time: next_time,
            trigger_status: state_manager_core::model::TriggerStatus::Pending,
            expires_at: None,
        };

        match ctx.triggers.insert_pending(row).await {
            Ok(()) => {}
            Err(StoreError::DuplicateKey(_)) => {
                info!(expression = %trigger.expression, "pending trigger for this fire already exists");
            }
            Err(e) => warn!(expression = %trigger.expression, error = %e, "failed to insert next trigger fire"),
        }

        if next_time > cron_time {
            return;
        }
        after = next_time;
    }
}

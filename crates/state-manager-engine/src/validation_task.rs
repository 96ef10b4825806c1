//! Background graph validation worker (spec.md §4.3/§4.8). Grounded on
//! `original_source/.../tasks/verify_graph.py`'s "revalidate after every
//! upsert, then reconcile cron triggers if the result is VALID" flow; the
//! channel-plus-worker-loop shape follows
//! `everruns-durable::worker::pool::WorkerPool`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use state_manager_core::model::{DatabaseTrigger, GraphTemplate, GraphValidationStatus, Trigger, TriggerStatus, TriggerType};
use state_manager_core::validator::validate;

use crate::context::EngineContext;

/// Enqueued by the graph-template API handler after every `upsert` (spec.md
/// §4.3: validation always runs asynchronously, never inline with the PUT).
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub namespace: String,
    pub name: String,
    /// The trigger set the template had *before* this upsert, for §4.8's
    /// cancel/insert diff.
    pub previous_triggers: Vec<Trigger>,
}

pub struct ValidationWorker {
    ctx: Arc<EngineContext>,
    rx: mpsc::UnboundedReceiver<ValidationRequest>,
}

impl ValidationWorker {
    pub fn new(ctx: Arc<EngineContext>, rx: mpsc::UnboundedReceiver<ValidationRequest>) -> Self {
        Self { ctx, rx }
    }

    pub async fn run(mut self) {
        while let Some(request) = self.rx.recv().await {
            self.validate_one(request).await;
        }
        info!("validation worker channel closed, exiting");
    }

    #[instrument(skip(self, request), fields(namespace = %request.namespace, name = %request.name))]
    async fn validate_one(&self, request: ValidationRequest) {
        let template = match self.ctx.graphs.get(&request.namespace, &request.name).await {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "validation worker could not reload template");
                return;
            }
        };

        let node_keys: Vec<(String, String)> = template
            .nodes
            .iter()
            .map(|n| (n.namespace.clone(), n.node_name.clone()))
            .collect();
        let registered_nodes = match self.ctx.nodes.list_for_template(&node_keys).await {
            Ok(nodes) => nodes,
            Err(e) => {
                error!(error = %e, "validation worker could not load registered nodes");
                return;
            }
        };

        let errors = validate(&template, &registered_nodes);
        let status = if errors.is_empty() {
            GraphValidationStatus::Valid
        } else {
            GraphValidationStatus::Invalid
        };

        if let Err(e) = self
            .ctx
            .graphs
            .set_validation_result(&request.namespace, &request.name, status, errors.clone())
            .await
        {
            error!(error = %e, "failed to persist validation result");
            return;
        }

        info!(valid = errors.is_empty(), error_count = errors.len(), "graph template validated");

        if status == GraphValidationStatus::Valid {
            self.reconcile_triggers(&template, &request.previous_triggers).await;
        }
    }

    /// spec.md §4.8: diff `previous_triggers` against `template.triggers` by
    /// `(expression, timezone)`; cancel rows for removed expressions, insert
    /// a fresh `PENDING` row for each added one.
    async fn reconcile_triggers(&self, template: &GraphTemplate, previous_triggers: &[Trigger]) {
        let current: HashSet<(&str, &str)> = template
            .triggers
            .iter()
            .map(|t| (t.expression.as_str(), t.timezone.as_str()))
            .collect();
        let previous: HashSet<(&str, &str)> = previous_triggers
            .iter()
            .map(|t| (t.expression.as_str(), t.timezone.as_str()))
            .collect();

        let removed: Vec<String> = previous
            .difference(&current)
            .map(|(expr, _)| expr.to_string())
            .collect();
        if !removed.is_empty() {
            let expires_at = Utc::now() + ChronoDuration::days(self.ctx.settings.trigger_retention_days as i64);
            match self.ctx.triggers.cancel_pending(&template.name, &template.namespace, &removed, expires_at).await {
                Ok(count) => info!(count, "cancelled pending triggers for removed cron expressions"),
                Err(e) => warn!(error = %e, "failed to cancel pending triggers"),
            }
        }

        for trigger in &template.triggers {
            if previous.contains(&(trigger.expression.as_str(), trigger.timezone.as_str())) {
                continue;
            }
            self.insert_next_fire(template, trigger, Utc::now()).await;
        }
    }

    async fn insert_next_fire(&self, template: &GraphTemplate, trigger: &Trigger, after: DateTime<Utc>) {
        let trigger_time = match crate::cron_util::next_fire(&trigger.expression, &trigger.timezone, after) {
            Ok(t) => t,
            Err(e) => {
                warn!(expression = %trigger.expression, error = %e, "could not compute next cron fire");
                return;
            }
        };

        let row = DatabaseTrigger {
            id: state_manager_core::model::TriggerId::new(uuid::Uuid::new_v4().to_string()),
            kind: TriggerType::Cron,
            expression: trigger.expression.clone(),
            timezone: trigger.timezone.clone(),
            graph_name: template.name.clone(),
            namespace: template.namespace.clone(),
            trigger_time,
            trigger_status: TriggerStatus::Pending,
            expires_at: None,
        };

        if let Err(e) = self.ctx.triggers.insert_pending(row).await {
            if matches!(e, state_manager_storage::StoreError::DuplicateKey(_)) {
                info!(expression = %trigger.expression, "pending trigger for this fire already exists");
            } else {
                warn!(expression = %trigger.expression, error = %e, "failed to insert pending trigger");
            }
        }
    }
}

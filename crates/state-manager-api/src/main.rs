//! Process entrypoint (spec.md §6). Grounded on `everruns-api::main`'s
//! bootstrap shape (tracing init, connect, build `AppState`, build router,
//! `axum::serve`), generalized with the background-worker fleet
//! `control-plane::main` spawns alongside its server.

mod auth;
mod error;
mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state_manager_core::config::Settings;
use state_manager_engine::context::EngineContext;
use state_manager_engine::reconcile::{ReconcileConfig, ReconcileSweeper};
use state_manager_engine::timeout_sweeper::{TimeoutSweeper, TimeoutSweeperConfig};
use state_manager_engine::trigger_scheduler::TriggerScheduler;
use state_manager_engine::validation_task::ValidationWorker;
use state_manager_storage::encryption::SecretsCipher;
use state_manager_storage::indexes::ensure_indexes;
use state_manager_storage::mongo::{
    MongoGraphTemplateStore, MongoRegisteredNodeStore, MongoRunStore, MongoStateStore, MongoTriggerStore,
};

const REQUEST_ID_HEADER: &str = "x-exosphere-request-id";

/// Shared across every handler (spec.md §6). `ctx` is itself cheaply
/// `Clone` (every field is an `Arc`), so this wrapper exists only because
/// axum's `State` extractor needs a single top-level type.
#[derive(Clone)]
pub struct AppState {
    pub ctx: EngineContext,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::nodes::register,
        routes::graph::upsert,
        routes::graph::get_template,
        routes::graph::trigger,
        routes::states::do_enqueue,
        routes::states::do_executed,
        routes::states::do_errored,
        routes::states::do_manual_retry,
        routes::runs::page,
        routes::runs::states,
        routes::runs::node,
    ),
    tags(
        (name = "health", description = "Liveness"),
        (name = "nodes", description = "Runtime node registration"),
        (name = "graph", description = "Graph template management"),
        (name = "states", description = "State dispatcher"),
        (name = "runs", description = "Run and state queries"),
    ),
    info(
        title = "State Manager API",
        version = "0.1.0",
        description = "Durable workflow state manager: graph templates, runs, and the node dispatcher protocol.",
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "state_manager_api=info,state_manager_engine=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("state-manager-api starting");

    let settings = Arc::new(Settings::from_env().context("failed to load configuration")?);

    let client = mongodb::Client::with_uri_str(&settings.mongo_uri)
        .await
        .context("failed to connect to MongoDB")?;
    let db = client.database(&settings.mongo_database_name);
    ensure_indexes(&db, settings.run_ttl_days)
        .await
        .context("failed to create MongoDB indexes")?;
    tracing::info!(database = %settings.mongo_database_name, "connected to MongoDB");

    let cipher = Arc::new(SecretsCipher::new(&settings.secrets_encryption_key).context("invalid SECRETS_ENCRYPTION_KEY")?);

    let states = Arc::new(MongoStateStore::new(&db));
    let graphs = Arc::new(MongoGraphTemplateStore::new(&db));
    let nodes = Arc::new(MongoRegisteredNodeStore::new(&db));
    let runs = Arc::new(MongoRunStore::new(&db));
    let triggers = Arc::new(MongoTriggerStore::new(&db));

    let (fanout_tx, mut fanout_rx) = mpsc::unbounded_channel();
    let (validation_tx, validation_rx) = mpsc::unbounded_channel();

    let ctx = Arc::new(EngineContext::new(
        settings.clone(),
        cipher,
        states,
        graphs,
        nodes,
        runs,
        triggers,
        fanout_tx,
        validation_tx,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let fanout_ctx = ctx.clone();
    tokio::spawn(async move {
        while let Some(job) = fanout_rx.recv().await {
            state_manager_engine::fanout::run(&fanout_ctx, job.state_ids).await;
        }
        tracing::info!("fanout worker channel closed, exiting");
    });

    tokio::spawn(ValidationWorker::new(ctx.clone(), validation_rx).run());
    tokio::spawn(TimeoutSweeper::new(ctx.clone(), TimeoutSweeperConfig::default(), shutdown_rx.clone()).run());
    tokio::spawn(TriggerScheduler::new(ctx.clone(), shutdown_rx.clone()).run());
    tokio::spawn(ReconcileSweeper::new(ctx.clone(), ReconcileConfig::default(), shutdown_rx.clone()).run());

    let state = AppState { ctx: (*ctx).clone() };

    let request_id_header = axum::http::HeaderName::from_static(REQUEST_ID_HEADER);
    let app = routes::router(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(SetRequestIdLayer::new(request_id_header.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(request_id_header))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = "0.0.0.0:9000";
    let listener = tokio::net::TcpListener::bind(addr).await.context("failed to bind listener")?;
    tracing::info!(%addr, "listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await.context("server error")?;
    Ok(())
}

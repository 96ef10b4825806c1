//! Route assembly (spec.md §6): `/health` and `/nodes/` are global, every
//! other endpoint is nested under `/v0/namespace/:namespace`.

pub mod graph;
pub mod health;
pub mod nodes;
pub mod runs;
pub mod states;

use axum::routing::get;
use axum::Router;

use crate::AppState;

fn namespaced() -> Router<AppState> {
    Router::new()
        .merge(graph::routes())
        .merge(states::routes())
        .merge(runs::routes())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .merge(nodes::routes())
        .nest("/v0/namespace/:namespace", namespaced())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use http_body_util::BodyExt;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use state_manager_core::config::Settings;
    use state_manager_engine::context::EngineContext;
    use state_manager_storage::encryption::SecretsCipher;
    use state_manager_storage::memory::{
        InMemoryGraphTemplateStore, InMemoryRegisteredNodeStore, InMemoryRunStore, InMemoryStateStore,
        InMemoryTriggerStore,
    };

    use super::*;

    const TEST_SECRET: &str = "test-secret";

    fn test_state() -> AppState {
        let settings = Arc::new(Settings {
            mongo_uri: "mongodb://unused".to_string(),
            mongo_database_name: "unused".to_string(),
            state_manager_secret: TEST_SECRET.to_string(),
            secrets_encryption_key: URL_SAFE_NO_PAD.encode([7u8; 32]),
            trigger_workers: 1,
            trigger_retention_days: 30,
            run_ttl_days: 30,
            node_timeout_minutes: 30,
            trigger_ahead_time: 10,
        });
        let cipher = Arc::new(SecretsCipher::new(&settings.secrets_encryption_key).unwrap());
        let (fanout_tx, _fanout_rx) = mpsc::unbounded_channel();
        let (validation_tx, _validation_rx) = mpsc::unbounded_channel();

        let ctx = EngineContext::new(
            settings,
            cipher,
            Arc::new(InMemoryStateStore::new()),
            Arc::new(InMemoryGraphTemplateStore::new()),
            Arc::new(InMemoryRegisteredNodeStore::new()),
            Arc::new(InMemoryRunStore::new()),
            Arc::new(InMemoryTriggerStore::new()),
            fanout_tx,
            validation_tx,
        );
        AppState { ctx }
    }

    #[tokio::test]
    async fn health_requires_no_auth() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("OK"));
    }

    #[tokio::test]
    async fn namespaced_route_rejects_missing_api_key() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v0/namespace/acme/graph/my-graph")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn namespaced_route_accepts_valid_api_key() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v0/namespace/acme/graph/my-graph")
                    .header("x-api-key", TEST_SECRET)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // Authenticated but the template doesn't exist: NotFound, not Unauthorized.
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn node_registration_route_is_global_and_unnamespaced() {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/nodes/")
                    .header("content-type", "application/json")
                    .header("x-api-key", TEST_SECRET)
                    .body(Body::from(
                        r#"{"runtime_name":"r","runtime_namespace":"acme","nodes":[]}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}

//! HTTP gateway for RelayChat.
//!
//! Serves the chat API over Axum: turns are answered either as an SSE
//! stream of relay events or as a single JSON reply, and conversations are
//! partitioned by an anonymous session cookie.

pub mod api;
pub mod session;

use axum::extract::DefaultBodyLimit;
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use relaychat_agent::{TurnController, TurnSettings};
use relaychat_config::{AppConfig, StoreBackendKind};
use relaychat_core::persistence::PersistenceBackend;
use relaychat_store::{ConversationStore, FileBackend, InMemoryBackend, NoopBackend};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub turns: Arc<TurnController>,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .merge(api::api_router(state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Open the conversation store on the configured backend.
pub async fn open_store(config: &AppConfig) -> Arc<ConversationStore> {
    let backend: Arc<dyn PersistenceBackend> = match config.store.backend {
        StoreBackendKind::File => Arc::new(FileBackend::new(&config.store.path)),
        StoreBackendKind::Memory => Arc::new(InMemoryBackend::new()),
        StoreBackendKind::Noop => Arc::new(NoopBackend),
    };
    info!(backend = backend.name(), "Opening conversation store");

    let store = ConversationStore::open(backend)
        .await
        .with_greeting(config.persona.greeting.clone());
    Arc::new(store)
}

/// Wire the store, provider router and model registry into a controller.
pub async fn build_controller(config: &AppConfig) -> TurnController {
    let store = open_store(config).await;
    let router = relaychat_providers::build_from_config(config);
    if router.list().is_empty() {
        warn!("No provider has an API key; every chat turn will fail");
    }

    TurnController::new(
        store,
        router,
        config.model_registry(),
        TurnSettings::from_config(config),
    )
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let turns = Arc::new(build_controller(&config).await);
    info!(
        models = turns.models().len(),
        history_limit = turns.settings().history_limit,
        "Turn controller ready"
    );

    let state = Arc::new(GatewayState { config, turns });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Gateway listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.store.backend = StoreBackendKind::Memory;
        config
    }

    async fn test_state() -> SharedState {
        let config = test_config();
        let turns = Arc::new(build_controller(&config).await);
        Arc::new(GatewayState { config, turns })
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(test_state().await);
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn open_store_applies_greeting() {
        let mut config = test_config();
        config.persona.greeting = "Welcome back.".into();

        let store = open_store(&config).await;
        assert_eq!(store.greeting(), "Welcome back.");
    }

    #[tokio::test]
    async fn file_store_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.store.backend = StoreBackendKind::File;
        config.store.path = dir.path().join("chats.json");

        let user = relaychat_core::message::UserId::from("u1");
        let id = relaychat_core::message::ConversationId::from("c1");
        open_store(&config).await.create(&user, &id).await;

        let reopened = open_store(&config).await;
        assert!(reopened.get(&user, &id).await.is_ok());
    }

    #[tokio::test]
    async fn unconfigured_turns_fail_without_panicking() {
        let app = build_router(test_state().await);
        let req = Request::builder()
            .uri("/chat?message=hello&model=gpt-4o")
            .header("cookie", "relaychat_session=u1")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["done"], true);
        assert!(json["error"].as_str().unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let app = build_router(test_state().await);
        let req = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

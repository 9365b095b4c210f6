//! HTTP gateway: an axum router in front of the history store and model invoker.
//!
//! Routes:
//! - `GET /` greeting
//! - `POST /chat` one conversational turn (JSON or multipart)
//! - `GET|DELETE /chat/history/{session_id}` inspect or clear a session
//! - `GET /health` liveness and basic stats

pub mod api;
pub mod error;
pub mod request;

pub use error::ChatError;
pub use request::{decode_json_body, ChatRequest};

use crate::agent::{self, ModelInvoker};
use crate::config::{Config, GatewayConfig};
use crate::sessions::{self, HistoryStore};
use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::limit::RequestBodyLimitLayer;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn HistoryStore>,
    pub invoker: Arc<ModelInvoker>,
    /// Upper bound on one `/chat` turn, session wait included.
    pub turn_timeout: Duration,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn HistoryStore>, invoker: Arc<ModelInvoker>) -> Self {
        Self {
            store,
            invoker,
            turn_timeout: Duration::from_secs(GatewayConfig::default().request_timeout_secs),
            started_at: Instant::now(),
        }
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    /// Wire the store and invoker described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn HistoryStore> = Arc::from(sessions::create_history_store(&config.history));
        let invoker = Arc::new(agent::create_invoker(config)?);
        Ok(Self::new(store, invoker).with_turn_timeout(Duration::from_secs(
            config.gateway.request_timeout_secs,
        )))
    }
}

/// Build the router with the body-size limit applied.
pub fn build_router(state: AppState, gateway: &GatewayConfig) -> Router {
    Router::new()
        .route("/", get(api::handle_root))
        .route("/health", get(api::handle_health))
        .route("/chat", post(api::handle_chat))
        .route(
            "/chat/history/{session_id}",
            get(api::handle_history_get).delete(api::handle_history_clear),
        )
        // axum's own 2 MiB default would shadow the configured limit
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(gateway.max_body_bytes))
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let state = AppState::from_config(&config)?;
    let app = build_router(state.clone(), &config.gateway);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind gateway on {addr}"))?;
    let local = listener.local_addr()?;

    tracing::info!(
        provider = state.invoker.provider_name(),
        model = state.invoker.model(),
        history_store = state.store.name(),
        "Gateway listening on http://{local}"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Gateway server error")?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

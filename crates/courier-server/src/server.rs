//! `CourierServer` — Axum HTTP + WebSocket server assembly.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use courier_llm::provider::{Provider, StreamOptions};
use courier_relay::relay::RelayConfig;
use courier_relay::store::SessionStore;

use crate::config::ServerConfig;
use crate::hub::ClientHub;
use crate::routes::{self, ActiveStreams};
use crate::shutdown::ShutdownCoordinator;

pub use courier_relay::delivery::DeliveryMode;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Injected session store.
    pub store: Arc<SessionStore>,
    /// Completion provider.
    pub provider: Arc<dyn Provider>,
    /// Client hub (connection registry + push delivery).
    pub hub: Arc<ClientHub>,
    /// Relay tuning.
    pub relay_config: RelayConfig,
    /// Provider stream options (tool behavior, caps).
    pub stream_options: StreamOptions,
    /// Deployment delivery mode.
    pub mode: DeliveryMode,
    /// Cancellation tokens of in-flight streams.
    pub active: Arc<ActiveStreams>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Per-connection outbound queue capacity.
    pub send_queue_capacity: usize,
    /// Maximum live WebSocket connections (`0` = unlimited).
    pub max_connections: usize,
    /// When the server started.
    pub start_time: Instant,
}

/// The Courier relay server.
pub struct CourierServer {
    config: ServerConfig,
    state: AppState,
}

impl CourierServer {
    /// Assemble a server over the given store and provider.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        store: Arc<SessionStore>,
        provider: Arc<dyn Provider>,
        relay_config: RelayConfig,
        mode: DeliveryMode,
    ) -> Self {
        let state = AppState {
            store,
            provider,
            hub: Arc::new(ClientHub::new()),
            relay_config,
            stream_options: StreamOptions::default(),
            mode,
            active: Arc::new(ActiveStreams::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            send_queue_capacity: config.send_queue_capacity,
            max_connections: config.max_connections,
            start_time: Instant::now(),
        };
        Self { config, state }
    }

    /// Override the provider stream options.
    #[must_use]
    pub fn with_stream_options(mut self, options: StreamOptions) -> Self {
        self.state.stream_options = options;
        self
    }

    /// Build the Axum router with all routes and layers.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/chat", post(routes::chat_handler))
            .route("/chat/cancel", post(routes::cancel_handler))
            .route("/hub", get(routes::ws_handler))
            .layer(TraceLayer::new_for_http())
            // The browser client may be served from anywhere; any origin is
            // accepted, with credentials.
            .layer(CorsLayer::very_permissive())
            .with_state(self.state.clone())
    }

    /// The client hub.
    #[must_use]
    pub fn hub(&self) -> &Arc<ClientHub> {
        &self.state.hub
    }

    /// The session store.
    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.state.store
    }

    /// The shutdown coordinator.
    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server answers.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live WebSocket connections.
    pub connections: usize,
    /// Sessions in the store.
    pub sessions: usize,
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
        connections: state.hub.live_count().await,
        sessions: state.store.len(),
    })
}

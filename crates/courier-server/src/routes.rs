//! Chat submission, cancellation, and WebSocket upgrade handlers.

use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use dashmap::DashMap;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use courier_core::ids::{ConnectionId, SessionId};
use courier_relay::delivery::{ChannelDelivery, DeliveryMode};
use courier_relay::relay::StreamRelay;

use crate::server::AppState;
use crate::ws::run_ws_session;

/// Buffer capacity for direct-mode response streaming.
const DIRECT_STREAM_BUFFER: usize = 64;

/// Submit request body.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The user prompt.
    pub prompt: String,
    /// Target session (same value as the client's connection id in the
    /// push deployment).
    pub session_id: String,
}

/// Cancel request body.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    /// Session whose in-flight stream should be cancelled.
    pub session_id: String,
}

/// Cancellation tokens of in-flight streams, keyed by session.
///
/// Each run gets a fresh token tagged with a run id so a finished run can
/// only retire its own entry — never a successor's that reused the session.
#[derive(Default)]
pub struct ActiveStreams {
    next_run: AtomicU64,
    streams: DashMap<SessionId, (u64, CancellationToken)>,
}

impl ActiveStreams {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new run for `session_id`, replacing any stale entry.
    #[must_use]
    pub fn register(&self, session_id: &SessionId) -> (u64, CancellationToken) {
        let run_id = self.next_run.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let _ = self
            .streams
            .insert(session_id.clone(), (run_id, token.clone()));
        (run_id, token)
    }

    /// Retire `run_id`'s entry once its stream finalized.
    pub fn complete(&self, session_id: &SessionId, run_id: u64) {
        let _ = self
            .streams
            .remove_if(session_id, |_, (id, _)| *id == run_id);
    }

    /// Cancel the session's in-flight stream, if any.
    ///
    /// Returns `false` when no stream is registered for the session.
    pub fn cancel(&self, session_id: &SessionId) -> bool {
        match self.streams.get(session_id) {
            Some(entry) => {
                entry.value().1.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of registered streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether no streams are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

/// POST /chat — submit a prompt for the given session.
///
/// Push mode responds `202` once streaming begins; chunks arrive over the
/// hub. Direct mode streams the chunk text back as the response body.
/// A session with a stream already in flight is rejected with `409`.
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let session_id = SessionId::from(request.session_id);

    // Fast-path rejection; the relay's stream claim enforces this atomically.
    if let Some(session) = state.store.get(&session_id) {
        if session.is_streaming() {
            return (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": format!("session {session_id} already has a stream in flight")
                })),
            )
                .into_response();
        }
    }

    match state.mode {
        DeliveryMode::Push => {
            let (run_id, token) = state.active.register(&session_id);
            let relay = StreamRelay::new(
                Arc::clone(&state.store),
                Arc::clone(&state.provider),
                state.hub.clone(),
                state.relay_config.clone(),
            )
            .with_stream_options(state.stream_options.clone());
            spawn_relay_run(relay, state.active.clone(), session_id.clone(), request.prompt, run_id, token);

            (
                StatusCode::ACCEPTED,
                Json(json!({
                    "status": "streaming",
                    "sessionId": session_id.as_str()
                })),
            )
                .into_response()
        }
        DeliveryMode::Direct => {
            let (run_id, token) = state.active.register(&session_id);
            let (delivery, rx) = ChannelDelivery::new(DIRECT_STREAM_BUFFER);
            let relay = StreamRelay::new(
                Arc::clone(&state.store),
                Arc::clone(&state.provider),
                Arc::new(delivery),
                state.relay_config.clone(),
            )
            .with_stream_options(state.stream_options.clone());
            spawn_relay_run(relay, state.active.clone(), session_id, request.prompt, run_id, token);

            let body = Body::from_stream(ReceiverStream::new(rx).map(|event| {
                Ok::<String, Infallible>(event.message_text().unwrap_or_default().to_owned())
            }));
            (
                [
                    (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                body,
            )
                .into_response()
        }
    }
}

/// Drive one relay run to completion in the background.
fn spawn_relay_run(
    relay: StreamRelay,
    active: Arc<ActiveStreams>,
    session_id: SessionId,
    prompt: String,
    run_id: u64,
    token: CancellationToken,
) {
    drop(tokio::spawn(async move {
        match relay.run(&session_id, &prompt, token).await {
            Ok(outcome) => {
                debug!(session_id = %session_id, status = ?outcome.status, chunks = outcome.chunks, "relay run finished");
            }
            Err(e) => warn!(session_id = %session_id, error = %e, "relay rejected submission"),
        }
        active.complete(&session_id, run_id);
    }));
}

/// POST /chat/cancel — cancel a session's in-flight stream.
pub async fn cancel_handler(
    State(state): State<AppState>,
    Json(request): Json<CancelRequest>,
) -> Response {
    let session_id = SessionId::from(request.session_id);
    if state.active.cancel(&session_id) {
        (
            StatusCode::OK,
            Json(json!({"status": "cancelling", "sessionId": session_id.as_str()})),
        )
            .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "no stream in flight for session"})),
        )
            .into_response()
    }
}

/// GET /hub — WebSocket upgrade for push delivery.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    if state.max_connections > 0 && state.hub.live_count().await >= state.max_connections {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "connection limit reached"})),
        )
            .into_response();
    }
    let connection_id = ConnectionId::new();
    let hub = state.hub.clone();
    let capacity = state.send_queue_capacity;
    ws.on_upgrade(move |socket| run_ws_session(socket, connection_id, hub, capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::Request;
    use courier_core::turns::Turn;
    use courier_llm::provider::{
        ChunkStream, Provider, ProviderResult, StreamOptions,
    };
    use courier_core::events::StreamEvent;
    use courier_relay::relay::RelayConfig;
    use courier_relay::store::SessionStore;
    use futures::stream;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::config::ServerConfig;
    use crate::server::CourierServer;

    // ── ActiveStreams ────────────────────────────────────────────────────

    #[test]
    fn register_and_cancel() {
        let active = ActiveStreams::new();
        let sid = SessionId::from("s1");
        let (_, token) = active.register(&sid);
        assert_eq!(active.len(), 1);

        assert!(active.cancel(&sid));
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_unknown_session_is_false() {
        let active = ActiveStreams::new();
        assert!(!active.cancel(&SessionId::from("ghost")));
    }

    #[test]
    fn complete_retires_own_run_only() {
        let active = ActiveStreams::new();
        let sid = SessionId::from("s1");

        let (old_run, _) = active.register(&sid);
        let (_new_run, new_token) = active.register(&sid);

        // The stale run finishing must not retire the new run's entry.
        active.complete(&sid, old_run);
        assert_eq!(active.len(), 1);
        assert!(active.cancel(&sid));
        assert!(new_token.is_cancelled());
    }

    #[test]
    fn complete_retires_current_run() {
        let active = ActiveStreams::new();
        let sid = SessionId::from("s1");
        let (run, _) = active.register(&sid);
        active.complete(&sid, run);
        assert!(active.is_empty());
    }

    // ── handler tests ────────────────────────────────────────────────────

    struct ScriptedProvider {
        chunks: Vec<&'static str>,
        hang_at_end: bool,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn stream(
            &self,
            _turns: &[Turn],
            _options: &StreamOptions,
        ) -> ProviderResult<ChunkStream> {
            let events: Vec<_> = self
                .chunks
                .iter()
                .map(|c| Ok(StreamEvent::TextDelta { delta: (*c).into() }))
                .collect();
            if self.hang_at_end {
                Ok(Box::pin(stream::iter(events).chain(stream::pending())))
            } else {
                Ok(Box::pin(stream::iter(events)))
            }
        }
    }

    fn make_app(provider: ScriptedProvider, mode: DeliveryMode) -> CourierServer {
        CourierServer::new(
            ServerConfig::default(),
            Arc::new(SessionStore::new()),
            Arc::new(provider),
            RelayConfig {
                chunk_delay: Duration::ZERO,
                cancel_policy: courier_relay::relay::CancelPolicy::KeepPartial,
            },
            mode,
        )
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn direct_mode_streams_chunks_as_body() {
        let server = make_app(
            ScriptedProvider {
                chunks: vec!["Hi", " there", "!"],
                hang_at_end: false,
            },
            DeliveryMode::Direct,
        );
        let store = server.store().clone();
        let app = server.router();

        let resp = app
            .oneshot(post_json(
                "/chat",
                json!({"prompt": "Hello", "sessionId": "s1"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        assert_eq!(&body[..], b"Hi there!");

        let turns = store.get(&SessionId::from("s1")).unwrap().turns();
        assert_eq!(turns[0], Turn::user("Hello"));
        assert_eq!(turns[1], Turn::assistant("Hi there!"));
    }

    #[tokio::test]
    async fn push_mode_accepts_and_finalizes_history() {
        let server = make_app(
            ScriptedProvider {
                chunks: vec!["ok"],
                hang_at_end: false,
            },
            DeliveryMode::Push,
        );
        let store = server.store().clone();
        let app = server.router();

        let resp = app
            .oneshot(post_json(
                "/chat",
                json!({"prompt": "Hello", "sessionId": "s1"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "streaming");
        assert_eq!(parsed["sessionId"], "s1");

        // Fire-and-forget: poll until the spawned run finalizes.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(session) = store.get(&SessionId::from("s1")) {
                if session.turn_count() == 2 {
                    assert_eq!(session.turns()[1], Turn::assistant("ok"));
                    break;
                }
            }
            assert!(tokio::time::Instant::now() < deadline, "run never finalized");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn busy_session_is_rejected_then_cancellable() {
        let server = make_app(
            ScriptedProvider {
                chunks: vec!["x"],
                hang_at_end: true,
            },
            DeliveryMode::Push,
        );
        let store = server.store().clone();
        let app = server.router();

        let resp = app
            .clone()
            .oneshot(post_json(
                "/chat",
                json!({"prompt": "first", "sessionId": "s1"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        // Wait for the spawned run to claim the stream.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if store
                .get(&SessionId::from("s1"))
                .is_some_and(|s| s.is_streaming())
            {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "stream never started");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let resp = app
            .clone()
            .oneshot(post_json(
                "/chat",
                json!({"prompt": "second", "sessionId": "s1"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = app
            .clone()
            .oneshot(post_json("/chat/cancel", json!({"sessionId": "s1"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        // Cancellation finalizes the stream and releases the claim.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if store
                .get(&SessionId::from("s1"))
                .is_some_and(|s| !s.is_streaming())
            {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "cancel never landed");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn cancel_without_stream_is_404() {
        let server = make_app(
            ScriptedProvider {
                chunks: vec![],
                hang_at_end: false,
            },
            DeliveryMode::Push,
        );
        let app = server.router();

        let resp = app
            .oneshot(post_json("/chat/cancel", json!({"sessionId": "idle"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_requires_json_body() {
        let server = make_app(
            ScriptedProvider {
                chunks: vec![],
                hang_at_end: false,
            },
            DeliveryMode::Push,
        );
        let app = server.router();

        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }
}

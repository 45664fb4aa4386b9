//! OpenAI-compatible provider implementing the [`Provider`] trait.
//!
//! Builds and sends streaming requests to a `chat/completions` endpoint
//! (`stream: true`) and converts the SSE response into the relay's
//! [`StreamEvent`] protocol. Works against any OpenAI-compatible gateway —
//! the base URL is configuration, not code.
//!
//! # Text extraction contract
//!
//! Assistant text is read from exactly one place: `choices[0].delta.content`.
//! Chunks without that field (role markers, keep-alives, tool-call deltas)
//! contribute no text.

pub mod types;

use async_trait::async_trait;
use tracing::{debug, warn};

use courier_core::events::StreamEvent;
use courier_core::turns::Turn;

use crate::pipeline::{sse_to_event_stream, wrap_provider_stream};
use crate::provider::{
    ChunkStream, Provider, ProviderError, ProviderResult, StreamOptions, ToolChoice,
};
use crate::sse::SseParserOptions;

use types::{ChatCompletionChunk, ChatMessage, ChatRequest, DEFAULT_BASE_URL};

/// SSE parser options for chat-completions streams.
///
/// The endpoint terminates with an explicit `[DONE]` marker, so remaining
/// buffer content is not processed.
static SSE_OPTIONS: SseParserOptions = SseParserOptions {
    process_remaining_buffer: false,
};

/// Configuration for the OpenAI-compatible provider.
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// Base URL of the gateway, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// Model identifier passed through verbatim.
    pub model: String,
}

impl OpenAiConfig {
    /// Create a config against the default gateway.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Override the gateway base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Streaming provider for OpenAI-compatible `chat/completions` endpoints.
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

/// Accumulation state threaded through the SSE chunk handler.
#[derive(Default)]
struct StreamState {
    accumulated: String,
    finished: bool,
}

impl OpenAiProvider {
    /// Create a provider with a fresh HTTP client.
    #[must_use]
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Build the streaming request body.
    fn build_request(&self, turns: &[Turn], options: &StreamOptions) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: turns.iter().map(ChatMessage::from).collect(),
            stream: true,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            tool_choice: match options.tool_choice {
                // Auto is the endpoint default; only `none` is sent explicitly.
                ToolChoice::Auto => None,
                ToolChoice::None => Some("none".into()),
            },
        }
    }

    /// Internal streaming implementation.
    async fn stream_internal(
        &self,
        turns: &[Turn],
        options: &StreamOptions,
    ) -> ProviderResult<ChunkStream> {
        debug!(
            model = %self.config.model,
            turn_count = turns.len(),
            "starting chat-completions stream"
        );

        let request = self.build_request(turns, options);
        let url = format!("{}/chat/completions", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let (message, code, retryable) = parse_api_error(&body_text, status.as_u16());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
                code,
                retryable,
            });
        }

        Ok(sse_to_event_stream(
            response,
            &SSE_OPTIONS,
            StreamState::default(),
            process_chunk,
        ))
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream(
        &self,
        turns: &[Turn],
        options: &StreamOptions,
    ) -> ProviderResult<ChunkStream> {
        wrap_provider_stream("openai", self.stream_internal(turns, options).await)
    }
}

/// Convert one SSE chunk into relay stream events.
///
/// Text deltas accumulate in `state`; the final chunk (carrying
/// `finish_reason`) emits `Done` with the full text. A chunk may carry both
/// content and a finish reason — content is processed first.
fn process_chunk(chunk: &ChatCompletionChunk, state: &mut StreamState) -> Vec<StreamEvent> {
    let Some(choice) = chunk.choices.first() else {
        return vec![];
    };
    if state.finished {
        warn!("chunk received after finish_reason; ignoring");
        return vec![];
    }

    let mut events = Vec::with_capacity(2);

    if let Some(content) = &choice.delta.content {
        if !content.is_empty() {
            state.accumulated.push_str(content);
            events.push(StreamEvent::TextDelta {
                delta: content.clone(),
            });
        }
    }

    if let Some(reason) = &choice.finish_reason {
        state.finished = true;
        events.push(StreamEvent::Done {
            text: state.accumulated.clone(),
            finish_reason: Some(reason.clone()),
        });
    }

    events
}

/// Parse an API error response body.
fn parse_api_error(body: &str, status: u16) -> (String, Option<String>, bool) {
    let retryable = status == 429 || status >= 500;
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let error = &json["error"];
        let message = error["message"]
            .as_str()
            .unwrap_or("Unknown error")
            .to_string();
        let code = error["type"].as_str().map(String::from);
        (message, code, retryable)
    } else {
        (format!("HTTP {status}: {body}"), None, retryable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn test_config(base_url: &str) -> OpenAiConfig {
        OpenAiConfig::new("test-key", "test-model").with_base_url(base_url)
    }

    fn content_chunk(text: &str) -> ChatCompletionChunk {
        serde_json::from_str(&format!(
            r#"{{"choices":[{{"index":0,"delta":{{"content":{}}},"finish_reason":null}}]}}"#,
            serde_json::Value::String(text.into())
        ))
        .unwrap()
    }

    fn finish_chunk(reason: &str) -> ChatCompletionChunk {
        serde_json::from_str(&format!(
            r#"{{"choices":[{{"index":0,"delta":{{}},"finish_reason":"{reason}"}}]}}"#
        ))
        .unwrap()
    }

    // ── process_chunk ────────────────────────────────────────────────────

    #[test]
    fn content_accumulates_in_order() {
        let mut state = StreamState::default();
        let e1 = process_chunk(&content_chunk("Hi"), &mut state);
        let e2 = process_chunk(&content_chunk(" there"), &mut state);
        assert_eq!(e1, vec![StreamEvent::TextDelta { delta: "Hi".into() }]);
        assert_eq!(
            e2,
            vec![StreamEvent::TextDelta {
                delta: " there".into()
            }]
        );
        assert_eq!(state.accumulated, "Hi there");
    }

    #[test]
    fn finish_emits_done_with_full_text() {
        let mut state = StreamState::default();
        let _ = process_chunk(&content_chunk("Hi"), &mut state);
        let events = process_chunk(&finish_chunk("stop"), &mut state);
        assert_eq!(
            events,
            vec![StreamEvent::Done {
                text: "Hi".into(),
                finish_reason: Some("stop".into()),
            }]
        );
    }

    #[test]
    fn chunks_after_finish_are_ignored() {
        let mut state = StreamState::default();
        let _ = process_chunk(&finish_chunk("stop"), &mut state);
        let events = process_chunk(&content_chunk("late"), &mut state);
        assert!(events.is_empty());
        assert!(state.accumulated.is_empty());
    }

    #[test]
    fn empty_choices_yield_nothing() {
        let mut state = StreamState::default();
        let chunk: ChatCompletionChunk = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert!(process_chunk(&chunk, &mut state).is_empty());
    }

    #[test]
    fn content_and_finish_in_one_chunk() {
        let mut state = StreamState::default();
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"choices":[{"index":0,"delta":{"content":"!"},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        let events = process_chunk(&chunk, &mut state);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].delta(), Some("!"));
        assert!(events[1].is_terminal());
    }

    // ── build_request ────────────────────────────────────────────────────

    #[test]
    fn request_carries_history_in_order() {
        let provider = OpenAiProvider::new(test_config("http://unused"));
        let turns = vec![
            Turn::user("Hello"),
            Turn::assistant("Hi there!"),
            Turn::user("How are you?"),
        ];
        let req = provider.build_request(&turns, &StreamOptions::default());
        assert_eq!(req.model, "test-model");
        assert!(req.stream);
        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.messages[0].role, "user");
        assert_eq!(req.messages[1].role, "assistant");
        assert_eq!(req.messages[2].content, "How are you?");
        assert!(req.tool_choice.is_none());
    }

    #[test]
    fn tool_choice_none_is_explicit() {
        let provider = OpenAiProvider::new(test_config("http://unused"));
        let opts = StreamOptions {
            tool_choice: ToolChoice::None,
            ..Default::default()
        };
        let req = provider.build_request(&[Turn::user("x")], &opts);
        assert_eq!(req.tool_choice.as_deref(), Some("none"));
    }

    // ── parse_api_error ──────────────────────────────────────────────────

    #[test]
    fn parse_structured_error() {
        let body = r#"{"error":{"message":"Invalid model","type":"invalid_request_error"}}"#;
        let (message, code, retryable) = parse_api_error(body, 400);
        assert_eq!(message, "Invalid model");
        assert_eq!(code.as_deref(), Some("invalid_request_error"));
        assert!(!retryable);
    }

    #[test]
    fn parse_unstructured_error() {
        let (message, code, retryable) = parse_api_error("Bad Gateway", 502);
        assert!(message.contains("502"));
        assert!(code.is_none());
        assert!(retryable);
    }

    #[test]
    fn rate_limit_is_retryable() {
        let (_, _, retryable) = parse_api_error("{}", 429);
        assert!(retryable);
    }

    // ── stream (wiremock) ────────────────────────────────────────────────

    const SSE_BODY: &str = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\" there\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"!\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );

    #[tokio::test]
    async fn stream_yields_deltas_in_order() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/chat/completions"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(SSE_BODY),
            )
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(test_config(&server.uri()));
        let stream = provider
            .stream(&[Turn::user("Hello")], &StreamOptions::default())
            .await
            .unwrap();

        let events: Vec<StreamEvent> = stream.map(Result::unwrap).collect().await;
        assert_eq!(events[0], StreamEvent::Start);
        let deltas: Vec<&str> = events.iter().filter_map(StreamEvent::delta).collect();
        assert_eq!(deltas, vec!["Hi", " there", "!"]);
        assert_eq!(
            events.last().unwrap(),
            &StreamEvent::Done {
                text: "Hi there!".into(),
                finish_reason: Some("stop".into()),
            }
        );
    }

    #[tokio::test]
    async fn api_error_surfaces_with_status() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/chat/completions"))
            .respond_with(wiremock::ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Invalid API key", "type": "authentication_error"}
            })))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(test_config(&server.uri()));
        let err = provider
            .stream(&[Turn::user("Hello")], &StreamOptions::default())
            .await
            .err()
            .expect("stream must fail");

        match err {
            ProviderError::Api {
                status, message, ..
            } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Invalid API key");
            }
            other => panic!("expected Api error, got {other}"),
        }
    }

    #[tokio::test]
    async fn request_body_shape() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/chat/completions"))
            .and(wiremock::matchers::body_partial_json(serde_json::json!({
                "model": "test-model",
                "stream": true
            })))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("data: [DONE]\n\n"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new(test_config(&server.uri()));
        let stream = provider
            .stream(&[Turn::user("Hello")], &StreamOptions::default())
            .await
            .unwrap();
        let events: Vec<_> = stream.collect().await;
        // Only the Start prefix — [DONE] is filtered by the SSE parser.
        assert_eq!(events.len(), 1);
    }
}

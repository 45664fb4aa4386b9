//! Wire types for OpenAI-compatible `chat/completions` endpoints.
//!
//! The streaming chunk types spell out the exact fields the adapter reads —
//! assistant text comes from `choices[0].delta.content` and nowhere else.

use serde::{Deserialize, Serialize};

use courier_core::turns::{Role, Turn};

/// Default chat-completions base URL.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// A chat message in request format.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `user` or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: match turn.role {
                Role::User => "user".into(),
                Role::Assistant => "assistant".into(),
            },
            content: turn.text.clone(),
        }
    }
}

/// Streaming request body.
#[derive(Clone, Debug, Serialize)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// Ordered conversation history including the new user prompt.
    pub messages: Vec<ChatMessage>,
    /// Always `true` — this adapter only streams.
    pub stream: bool,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Output token cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// `"none"` to disable autonomous tool invocation; omitted for the
    /// provider-default `auto` behavior.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming response chunks
// ─────────────────────────────────────────────────────────────────────────────

/// One SSE data frame of a streaming completion.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatCompletionChunk {
    /// Per-choice deltas; only index 0 is used.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// One choice within a streaming chunk.
#[derive(Clone, Debug, Deserialize)]
pub struct ChunkChoice {
    /// Incremental content.
    #[serde(default)]
    pub delta: ChunkDelta,
    /// Present on the final chunk for this choice.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The delta object of a streaming chunk.
///
/// Only `content` is read; tool-call deltas and role markers are ignored by
/// the relay's text-only contract.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChunkDelta {
    /// Text fragment, absent on role-only and finish chunks.
    #[serde(default)]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_to_message() {
        let msg = ChatMessage::from(&Turn::user("hello"));
        assert_eq!(msg.role, "user");
        assert_eq!(msg.content, "hello");

        let msg = ChatMessage::from(&Turn::assistant("hi"));
        assert_eq!(msg.role, "assistant");
    }

    #[test]
    fn request_omits_absent_options() {
        let req = ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![],
            stream: true,
            temperature: None,
            max_tokens: None,
            tool_choice: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("tool_choice").is_none());
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn parse_content_chunk() {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hi"));
        assert!(chunk.choices[0].finish_reason.is_none());
    }

    #[test]
    fn parse_finish_chunk() {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        )
        .unwrap();
        assert!(chunk.choices[0].delta.content.is_none());
        assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn parse_role_only_chunk() {
        // First chunk of a stream often carries only the role marker.
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert!(chunk.choices[0].delta.content.is_none());
    }

    #[test]
    fn parse_chunk_without_choices() {
        // Some gateways emit keep-alive frames with no choices.
        let chunk: ChatCompletionChunk = serde_json::from_str(r#"{"id":"c2"}"#).unwrap();
        assert!(chunk.choices.is_empty());
    }
}

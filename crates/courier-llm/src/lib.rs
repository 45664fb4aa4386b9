//! # courier-llm
//!
//! Completion-provider abstraction for the Courier relay.
//!
//! - [`provider::Provider`]: the trait every completion backend implements,
//!   returning a boxed stream of [`courier_core::StreamEvent`]s
//! - [`sse`]: shared Server-Sent Events parser for provider byte streams
//! - [`pipeline`]: SSE → event stream conversion helpers
//! - [`openai`]: adapter for OpenAI-compatible `chat/completions` endpoints

#![deny(unsafe_code)]

pub mod openai;
pub mod pipeline;
pub mod provider;
pub mod sse;

pub use provider::{ChunkStream, Provider, ProviderError, ProviderResult, StreamOptions, ToolChoice};
pub use sse::SseParserOptions;

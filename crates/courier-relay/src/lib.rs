//! # courier-relay
//!
//! The streaming relay pipeline: per-session conversation state, the
//! delivery-channel port, and the state machine that drives a completion
//! stream from a provider to a connected client.
//!
//! - [`store::SessionStore`]: injected, concurrency-safe session map
//! - [`delivery::Delivery`]: port for pushing chunks to a specific client
//!   (or all clients as a best-effort fallback)
//! - [`relay::StreamRelay`]: per-request orchestration — history, chunk
//!   forwarding, cancellation, error notices, finalization

#![deny(unsafe_code)]

pub mod delivery;
pub mod errors;
pub mod relay;
pub mod store;

pub use delivery::{ChannelDelivery, Delivery, DeliveryError, DeliveryMode};
pub use errors::RelayError;
pub use relay::{CancelPolicy, RelayConfig, RelayOutcome, RelayStatus, StreamRelay};
pub use store::{SessionStore, StreamClaim};

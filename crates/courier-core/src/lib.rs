//! # courier-core
//!
//! Foundation types for the Courier chat relay.
//!
//! This crate provides the shared vocabulary that all other Courier crates
//! depend on:
//!
//! - **Branded IDs**: `SessionId`, `ConnectionId` as newtypes for type safety
//! - **Turns**: `Turn` and `Role` forming per-session conversation history
//! - **Stream events**: `StreamEvent` enum for the provider streaming protocol
//! - **Wire events**: the JSON envelope pushed to connected clients

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod text;
pub mod turns;

pub use events::{StreamEvent, WireEvent, ERROR_PREFIX, RECEIVE_MESSAGE};
pub use ids::{ConnectionId, SessionId};
pub use turns::{Role, Turn};

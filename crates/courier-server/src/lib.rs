//! # courier-server
//!
//! Axum HTTP + WebSocket server for the Courier relay.
//!
//! - `POST /chat`: submit a prompt (push delivery or direct response stream)
//! - `POST /chat/cancel`: cancel a session's in-flight stream
//! - `GET /hub`: WebSocket upgrade for push delivery
//! - `GET /health`: status, uptime, connection and session counts
//! - Client hub: connection registry implementing the delivery-channel port
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod hub;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod ws;

pub use config::ServerConfig;
pub use hub::{ClientConnection, ClientHub, Liveness};
pub use server::{AppState, CourierServer, DeliveryMode};
pub use shutdown::ShutdownCoordinator;

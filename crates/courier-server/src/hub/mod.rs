//! Client hub — connection registry and push delivery.
//!
//! Tracks every logical client the transport has seen and implements the
//! relay's [`Delivery`] port on top of the live subset. Lifecycle methods
//! are pure bookkeeping with structured logs; nothing here blocks the relay,
//! and a disconnect never cancels an in-flight stream — delivery simply
//! degrades once the target is gone.

pub mod connection;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use courier_core::events::WireEvent;
use courier_core::ids::ConnectionId;
use courier_relay::delivery::{Delivery, DeliveryError};

pub use connection::{ClientConnection, Liveness};

/// Registry of client connections, live and historical.
pub struct ClientHub {
    /// All connections ever registered, indexed by connection id.
    /// Disconnected entries are retained and marked, never removed.
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl ClientHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection on its connect event.
    pub async fn on_connect(&self, connection: Arc<ClientConnection>) {
        info!(connection_id = %connection.id(), "client connected");
        let mut conns = self.connections.write().await;
        let _ = conns.insert(connection.id().clone(), connection);
    }

    /// Mark a connection disconnected. The entry is retained.
    pub async fn on_disconnect(&self, id: &ConnectionId, reason: Option<&str>) {
        match reason {
            Some(reason) => info!(connection_id = %id, reason, "client disconnected"),
            None => info!(connection_id = %id, "client disconnected"),
        }
        let conns = self.connections.read().await;
        if let Some(conn) = conns.get(id) {
            conn.mark_disconnected();
        }
    }

    /// Look up a connection by id (live or historical).
    pub async fn get(&self, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.connections.read().await.get(id).cloned()
    }

    /// Number of live connections.
    pub async fn live_count(&self) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.is_connected())
            .count()
    }

    /// Number of registered connections, including disconnected ones.
    pub async fn total_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ClientHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Delivery for ClientHub {
    async fn send(&self, target: &ConnectionId, event: &WireEvent) -> Result<(), DeliveryError> {
        let json = match serde_json::to_string(event) {
            Ok(j) => j,
            Err(e) => {
                warn!(event_type = %event.event_type, error = %e, "failed to serialize event");
                return Err(DeliveryError::Unreachable(target.clone()));
            }
        };

        let conns = self.connections.read().await;
        let Some(conn) = conns.get(target) else {
            debug!(connection_id = %target, "send to unknown connection");
            return Err(DeliveryError::Unreachable(target.clone()));
        };
        if conn.send(Arc::new(json)) {
            Ok(())
        } else {
            debug!(connection_id = %target, "send to unreachable connection");
            Err(DeliveryError::Unreachable(target.clone()))
        }
    }

    async fn broadcast(&self, event: &WireEvent) {
        let json = match serde_json::to_string(event) {
            Ok(j) => j,
            Err(e) => {
                warn!(event_type = %event.event_type, error = %e, "failed to serialize event");
                return;
            }
        };

        let conns = self.connections.read().await;
        let payload = Arc::new(json);
        let mut recipients = 0usize;
        for conn in conns.values().filter(|c| c.is_connected()) {
            if conn.send(Arc::clone(&payload)) {
                recipients += 1;
            } else {
                // Best-effort by contract: a slow or vanished recipient
                // never fails the broadcast.
                warn!(connection_id = %conn.id(), "failed to send broadcast to client");
            }
        }
        debug!(event_type = %event.event_type, recipients, "broadcast event");
    }
}

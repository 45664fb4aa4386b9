//! Per-client connection state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use courier_core::ids::ConnectionId;

/// Liveness of a registered connection.
///
/// Entries are retained after disconnect (marked [`Liveness::Disconnected`])
/// so historical ids stay addressable and report unreachable instead of
/// unknown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    /// The client's WebSocket is open.
    Connected,
    /// The client went away; targeted sends fail as unreachable.
    Disconnected,
}

/// A registered client connection.
pub struct ClientConnection {
    id: ConnectionId,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    connected: AtomicBool,
    connected_at: Instant,
    /// Count of messages dropped due to a full or closed channel.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Register a new live connection.
    #[must_use]
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            connected: AtomicBool::new(true),
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// The connection id.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Current liveness.
    #[must_use]
    pub fn liveness(&self) -> Liveness {
        if self.connected.load(Ordering::Acquire) {
            Liveness::Connected
        } else {
            Liveness::Disconnected
        }
    }

    /// Whether the connection is live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.liveness() == Liveness::Connected
    }

    /// Mark the connection as gone. Idempotent.
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Enqueue a text frame for the client.
    ///
    /// Returns `false` if the connection is disconnected or its queue is
    /// full or closed; the dropped-message counter is incremented.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.is_connected() && self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total messages dropped for this connection.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

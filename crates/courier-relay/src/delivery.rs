//! Delivery-channel port.
//!
//! The relay pushes chunks through this trait without knowing the transport.
//! `send` targets one logical client and reports unreachability explicitly;
//! `broadcast` is best-effort fan-out that cannot fail — per-recipient
//! failures are swallowed by the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use courier_core::events::WireEvent;
use courier_core::ids::ConnectionId;

/// Which delivery deployment a server runs.
///
/// The two modes are mutually exclusive per deployment; the relay itself is
/// identical in both — only the [`Delivery`] implementation differs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryMode {
    /// Fire-and-forget push over the client hub; the submit request returns
    /// once streaming begins.
    #[default]
    Push,
    /// Chunks stream back as the submit request's response body.
    Direct,
}

/// Errors from targeted delivery.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The target connection is unknown, disconnected, or its outbound
    /// queue rejected the payload. The caller decides the fallback.
    #[error("connection {0} is unreachable")]
    Unreachable(ConnectionId),
}

/// Push channel to logical clients.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Push a payload to one specific client.
    ///
    /// The channel itself never retries; on `Unreachable` the caller chooses
    /// whether to degrade to [`broadcast`](Self::broadcast).
    async fn send(&self, target: &ConnectionId, event: &WireEvent) -> Result<(), DeliveryError>;

    /// Push a payload to every currently live client, fire-and-forget.
    async fn broadcast(&self, event: &WireEvent);
}

/// Single-recipient delivery backed by an in-process channel.
///
/// Used by the direct HTTP delivery mode: the receiver side becomes the
/// streamed response body, so the relay runs unchanged in both deployments.
/// The target id is ignored — there is exactly one recipient.
pub struct ChannelDelivery {
    tx: mpsc::Sender<WireEvent>,
}

impl ChannelDelivery {
    /// Create a delivery channel with the given buffer capacity.
    ///
    /// Returns the delivery half and the receiver the transport drains.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<WireEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Delivery for ChannelDelivery {
    async fn send(&self, target: &ConnectionId, event: &WireEvent) -> Result<(), DeliveryError> {
        self.tx
            .send(event.clone())
            .await
            .map_err(|_| DeliveryError::Unreachable(target.clone()))
    }

    async fn broadcast(&self, event: &WireEvent) {
        // One recipient; a closed receiver means the client went away,
        // which broadcast swallows by contract.
        let _ = self.tx.send(event.clone()).await;
    }
}

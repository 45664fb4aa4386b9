//! WebSocket session lifecycle — handles a single connected client from
//! upgrade through disconnect.
//!
//! Incoming text frames are answered with an `Echo: <message>` reply on the
//! caller's own connection; everything else the client receives originates
//! from the relay via the hub.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use courier_core::events::WireEvent;
use courier_core::ids::ConnectionId;

use crate::hub::{ClientConnection, ClientHub};

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection with the hub
/// 2. Sends a `connection.established` event with the assigned id
/// 3. Forwards outbound hub traffic via the send channel
/// 4. Answers incoming text frames with an echo reply
/// 5. Marks the connection disconnected when the socket closes
#[instrument(skip_all, fields(connection_id = %connection_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    connection_id: ConnectionId,
    hub: Arc<ClientHub>,
    send_queue_capacity: usize,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(connection_id.clone(), send_tx));
    hub.on_connect(Arc::clone(&connection)).await;

    let established = WireEvent::connection_established(&connection_id);
    if let Ok(json) = serde_json::to_string(&established) {
        if ws_tx.send(Message::Text(json.into())).await.is_err() {
            warn!("failed to send connection.established");
        }
    }

    // Outbound forwarder: hub → socket.
    let outbound = tokio::spawn(async move {
        while let Some(text) = send_rx.recv().await {
            if ws_tx.send(Message::Text((*text).clone().into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound loop. The transport keeps this minimal: an echo request is the
    // only client-initiated message.
    let mut reason: Option<String> = None;
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                debug!(message = %text, "message received in hub");
                let reply = WireEvent::receive_message(format!("Echo: {text}"));
                match serde_json::to_string(&reply) {
                    Ok(json) => {
                        if !connection.send(Arc::new(json)) {
                            warn!("failed to enqueue echo reply");
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to serialize echo reply"),
                }
            }
            Ok(Message::Close(frame)) => {
                reason = frame.map(|f| f.reason.to_string()).filter(|r| !r.is_empty());
                break;
            }
            // Ping/Pong are handled by the protocol layer.
            Ok(_) => {}
            Err(e) => {
                reason = Some(e.to_string());
                break;
            }
        }
    }

    hub.on_disconnect(&connection_id, reason.as_deref()).await;
    info!("ws session ended");

    // The hub retains the (now disconnected) entry, so the send channel
    // stays open; stop the forwarder explicitly.
    outbound.abort();
}

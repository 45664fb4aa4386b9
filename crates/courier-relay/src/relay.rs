//! Stream relay — the per-request orchestration pipeline.
//!
//! Drives one completion stream from the provider to the delivery channel:
//! resolve session → append user turn → stream chunks in order → finalize
//! history. All provider and delivery faults are absorbed here and turned
//! into best-effort client notifications; nothing escapes to crash the
//! serving process.
//!
//! # Ordering
//!
//! Chunks for one stream are delivered strictly sequentially — delivery of
//! chunk N+1 is not attempted until delivery of chunk N has resolved
//! (success or broadcast fallback). Unrelated sessions proceed concurrently.
//!
//! # Cancellation
//!
//! The caller-supplied token is observed at chunk granularity: before acting
//! on each chunk, during the next-chunk await, and during the pacing delay.
//! On cancellation the in-flight chunk is not delivered; history keeps the
//! accumulated prefix or discards it per [`CancelPolicy`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use courier_core::events::{StreamEvent, WireEvent};
use courier_core::ids::{ConnectionId, SessionId};
use courier_llm::provider::{Provider, StreamOptions};

use crate::delivery::Delivery;
use crate::errors::RelayError;
use crate::store::SessionStore;

/// What happens to accumulated text when a stream is cancelled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CancelPolicy {
    /// Finalize history with whatever was accumulated before cancellation.
    #[default]
    KeepPartial,
    /// Drop the partial assistant text; only the user turn is recorded.
    Discard,
}

/// Relay tuning knobs.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Fixed pacing delay between chunk deliveries. A throttle only —
    /// `Duration::ZERO` disables it without changing any other behavior.
    pub chunk_delay: Duration,
    /// Cancellation-history policy.
    pub cancel_policy: CancelPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_delay: Duration::from_millis(100),
            cancel_policy: CancelPolicy::KeepPartial,
        }
    }
}

/// Terminal state of one relay run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayStatus {
    /// The completion stream ended normally.
    Completed,
    /// The stream terminated abnormally; an error notice was attempted.
    Failed,
    /// The caller cancelled mid-stream.
    Cancelled,
}

/// Result of a finished relay run.
///
/// A `Failed` or `Cancelled` outcome is still `Ok` at the call boundary —
/// the stream reached a terminal state and history was finalized.
#[derive(Clone, Debug)]
pub struct RelayOutcome {
    /// How the stream ended.
    pub status: RelayStatus,
    /// Number of chunks processed (accumulated and forwarded).
    pub chunks: u64,
    /// The accumulated assistant text.
    pub text: String,
}

/// Orchestrates streaming completions for all sessions.
pub struct StreamRelay {
    store: Arc<SessionStore>,
    provider: Arc<dyn Provider>,
    delivery: Arc<dyn Delivery>,
    options: StreamOptions,
    config: RelayConfig,
}

impl StreamRelay {
    /// Create a relay over the given store, provider, and delivery channel.
    #[must_use]
    pub fn new(
        store: Arc<SessionStore>,
        provider: Arc<dyn Provider>,
        delivery: Arc<dyn Delivery>,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            provider,
            delivery,
            options: StreamOptions::default(),
            config,
        }
    }

    /// Override the provider stream options (tool behavior, caps).
    #[must_use]
    pub fn with_stream_options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    /// The session store this relay mutates.
    #[must_use]
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Run one prompt through the pipeline.
    ///
    /// Returns once the stream reached a terminal state and history was
    /// finalized. The only error is [`RelayError::SessionBusy`]; provider
    /// and delivery faults are absorbed into the outcome.
    #[instrument(skip(self, prompt, cancel), fields(session_id = %session_id))]
    pub async fn run(
        &self,
        session_id: &SessionId,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<RelayOutcome, RelayError> {
        // Idle → HistoryLoaded
        let session = self.store.get_or_create(session_id);
        let claim = session.claim_stream().ok_or_else(|| RelayError::SessionBusy {
            session_id: session_id.clone(),
        })?;
        session.append_user_turn(prompt);

        // Session and connection share one id in the 1:1 deployment.
        let target = ConnectionId::from(session_id.as_str());
        let history = session.turns();

        let mut accumulated = String::new();
        let mut chunks: u64 = 0;
        let mut status = RelayStatus::Completed;

        // HistoryLoaded → Streaming
        match self.provider.stream(&history, &self.options).await {
            Err(e) => {
                warn!(error = %e, "completion stream failed to open");
                self.deliver(&target, &WireEvent::error_notice(&e.to_string()))
                    .await;
                status = RelayStatus::Failed;
            }
            Ok(mut stream) => loop {
                // Cancellation is checked before acting on each chunk; the
                // biased arm wins if the token fired while a chunk was ready.
                let next = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        debug!(chunks, "stream cancelled");
                        status = RelayStatus::Cancelled;
                        break;
                    }
                    next = stream.next() => next,
                };

                match next {
                    // Normal end — with or without an explicit Done marker.
                    None => break,
                    Some(Ok(StreamEvent::Done { .. })) => break,
                    Some(Ok(StreamEvent::Start)) => {}
                    Some(Ok(StreamEvent::TextDelta { delta })) => {
                        accumulated.push_str(&delta);
                        chunks += 1;
                        self.deliver(&target, &WireEvent::receive_message(&delta))
                            .await;

                        if !self.config.chunk_delay.is_zero() {
                            tokio::select! {
                                biased;
                                () = cancel.cancelled() => {
                                    debug!(chunks, "stream cancelled during pacing delay");
                                    status = RelayStatus::Cancelled;
                                    break;
                                }
                                () = tokio::time::sleep(self.config.chunk_delay) => {}
                            }
                        }
                    }
                    // Streaming → Finalizing (abnormal)
                    Some(Err(e)) => {
                        warn!(error = %e, chunks, "completion stream errored");
                        self.deliver(&target, &WireEvent::error_notice(&e.to_string()))
                            .await;
                        status = RelayStatus::Failed;
                        break;
                    }
                }
            },
        }

        // Finalizing → Done. An empty accumulator still finalizes; only a
        // cancelled stream under the Discard policy skips the assistant turn.
        if status == RelayStatus::Cancelled && self.config.cancel_policy == CancelPolicy::Discard {
            debug!("partial assistant turn discarded on cancellation");
        } else {
            session.append_assistant_turn(accumulated.clone());
        }
        drop(claim);

        info!(
            chunks,
            chars = accumulated.len(),
            status = ?status,
            "stream finalized"
        );

        Ok(RelayOutcome {
            status,
            chunks,
            text: accumulated,
        })
    }

    /// Deliver to the specific target, degrading to broadcast when the
    /// target is unreachable. Best-effort by contract — broadcast reaching
    /// the right client is not guaranteed.
    async fn deliver(&self, target: &ConnectionId, event: &WireEvent) {
        if let Err(e) = self.delivery.send(target, event).await {
            debug!(target = %target, error = %e, "targeted delivery failed, broadcasting");
            self.delivery.broadcast(event).await;
        }
    }
}

//! Relay error types.

use courier_core::ids::SessionId;

/// Errors surfaced to the request layer by the relay.
///
/// Provider and delivery faults never appear here — they are converted into
/// best-effort client notifications inside the relay and reported through
/// [`RelayOutcome`](crate::relay::RelayOutcome) instead.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A stream is already in flight for this session. The relay assumes at
    /// most one in-flight stream per session; concurrent submissions are
    /// rejected, not queued.
    #[error("session {session_id} already has a stream in flight")]
    SessionBusy {
        /// The busy session.
        session_id: SessionId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_busy_display() {
        let err = RelayError::SessionBusy {
            session_id: SessionId::from("s1"),
        };
        assert_eq!(err.to_string(), "session s1 already has a stream in flight");
    }
}

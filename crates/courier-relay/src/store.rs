//! Session store — injected, concurrency-safe conversation state.
//!
//! Sessions are created lazily on first reference and never removed by the
//! relay itself; an opt-in idle sweep ([`SessionStore::evict_idle`]) bounds
//! growth for long-lived deployments.
//!
//! Concurrency model: the map serializes concurrent first-creation of the
//! same id (DashMap entry API); per-session turn lists are guarded by their
//! own mutex; the single-in-flight-stream invariant is enforced by an atomic
//! claim released on drop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use courier_core::ids::SessionId;
use courier_core::turns::Turn;

/// One session's conversation state.
pub struct SessionHandle {
    id: SessionId,
    turns: Mutex<Vec<Turn>>,
    streaming: AtomicBool,
    last_touched: Mutex<Instant>,
}

impl SessionHandle {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            turns: Mutex::new(Vec::new()),
            streaming: AtomicBool::new(false),
            last_touched: Mutex::new(Instant::now()),
        }
    }

    /// The session id.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    fn touch(&self) {
        *self.last_touched.lock() = Instant::now();
    }

    /// Append the user's prompt as a new turn.
    pub fn append_user_turn(&self, text: impl Into<String>) {
        self.touch();
        self.turns.lock().push(Turn::user(text));
    }

    /// Append the (possibly empty) assistant reply as a new turn.
    ///
    /// An empty assistant turn is a valid terminal state — a stream that
    /// produced zero chunks still finalizes.
    pub fn append_assistant_turn(&self, text: impl Into<String>) {
        self.touch();
        self.turns.lock().push(Turn::assistant(text));
    }

    /// Snapshot of the ordered history.
    #[must_use]
    pub fn turns(&self) -> Vec<Turn> {
        self.turns.lock().clone()
    }

    /// Number of turns recorded.
    #[must_use]
    pub fn turn_count(&self) -> usize {
        self.turns.lock().len()
    }

    /// Whether a stream is currently in flight for this session.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// How long since this session was last touched.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_touched.lock().elapsed()
    }

    /// Claim the session's single stream slot.
    ///
    /// Returns `None` if a stream is already in flight. The claim releases
    /// on drop, so panics and early returns cannot wedge a session.
    #[must_use]
    pub fn claim_stream(self: &Arc<Self>) -> Option<StreamClaim> {
        self.streaming
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| StreamClaim {
                handle: Arc::clone(self),
            })
    }
}

/// RAII guard for a session's in-flight stream slot.
pub struct StreamClaim {
    handle: Arc<SessionHandle>,
}

impl Drop for StreamClaim {
    fn drop(&mut self) {
        self.handle.touch();
        self.handle.streaming.store(false, Ordering::Release);
    }
}

/// Map of all known sessions, keyed by session id.
///
/// Owned by the server process and passed by handle to the relay — never
/// ambient static state.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the session for `id`, creating an empty one on first reference.
    ///
    /// Concurrent first-creation of the same id is serialized by the map;
    /// both callers observe the same handle.
    #[must_use]
    pub fn get_or_create(&self, id: &SessionId) -> Arc<SessionHandle> {
        self.sessions
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(session_id = %id, "session created");
                Arc::new(SessionHandle::new(id.clone()))
            })
            .clone()
    }

    /// Return the session for `id` if it exists.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionHandle>> {
        self.sessions.get(id).map(|e| e.clone())
    }

    /// Number of sessions in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store holds no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove sessions idle for at least `max_idle`.
    ///
    /// Sessions with an in-flight stream are never evicted. Returns the
    /// number of sessions removed.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, handle| handle.is_streaming() || handle.idle_for() < max_idle);
        let evicted = before - self.sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = self.sessions.len(), "idle sessions evicted");
        }
        evicted
    }
}

//! Transport session management.
//!
//! Each logical client connection is one [`Session`] that lives across many
//! physical HTTP requests:
//! - Explicit lifecycle: `Created -> Initializing -> Ready -> {Closed | Expired}`
//! - In-memory ring buffer for Last-Event-ID replay on reconnection
//! - Broadcast channel for live event delivery to an open SSE stream
//! - Background sweep of idle sessions

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::response::sse::Event;
use tokio::sync::{RwLock, broadcast};

use crate::config::protocol::{
    EVENT_HISTORY_SIZE, SESSION_CLEANUP_INTERVAL, SESSION_IDLE_TIMEOUT,
};

/// Broadcast channel capacity per session.
const CHANNEL_CAPACITY: usize = 64;

/// Lifecycle errors surfaced to the transport as JSON-RPC errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Unknown or expired session")]
    UnknownSession,

    #[error("Session initialization has not completed")]
    NotInitialized,

    #[error("Session is already initialized")]
    AlreadyInitialized,
}

impl SessionError {
    /// JSON-RPC error code for this condition.
    #[must_use]
    pub const fn jsonrpc_code(self) -> i32 {
        match self {
            Self::UnknownSession => -32001,
            Self::NotInitialized => -32002,
            Self::AlreadyInitialized => -32600,
        }
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Allocated, handshake not started.
    Created,
    /// `initialize` answered, waiting for `notifications/initialized`.
    Initializing,
    /// Handshake complete, tool calls accepted.
    Ready,
    /// Explicitly terminated.
    Closed,
    /// Evicted by the idle sweep.
    Expired,
}

/// A buffered SSE event with an ID for replay support.
#[derive(Clone, Debug)]
pub struct BufferedEvent {
    /// Monotonically increasing per session, starting at 1.
    pub id: u64,
    /// Event type, e.g. "message".
    pub event_type: String,
    /// JSON payload.
    pub data: String,
    /// When the event was created.
    pub created_at: Instant,
}

impl BufferedEvent {
    pub fn new(id: u64, event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id,
            event_type: event_type.into(),
            data: data.into(),
            created_at: Instant::now(),
        }
    }

    /// Convert to an Axum SSE event.
    pub fn to_sse_event(&self) -> Event {
        Event::default()
            .id(self.id.to_string())
            .event(self.event_type.clone())
            .data(self.data.clone())
    }
}

/// A single transport session with its outbound mailbox.
pub struct Session {
    /// Unique session identifier, minted by the manager.
    pub id: String,
    state: RwLock<SessionState>,
    protocol_version: RwLock<Option<String>>,
    /// Broadcast sender for live events.
    tx: broadcast::Sender<BufferedEvent>,
    /// Ring buffer of recent events for replay.
    history: RwLock<VecDeque<BufferedEvent>>,
    next_event_id: AtomicU64,
    pub created_at: Instant,
    last_seen_at: RwLock<Instant>,
}

impl Session {
    fn new(id: String) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            id,
            state: RwLock::new(SessionState::Created),
            protocol_version: RwLock::new(None),
            tx,
            history: RwLock::new(VecDeque::with_capacity(EVENT_HISTORY_SIZE)),
            next_event_id: AtomicU64::new(1),
            created_at: Instant::now(),
            last_seen_at: RwLock::new(Instant::now()),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Protocol version negotiated during `initialize`, if any yet.
    pub async fn protocol_version(&self) -> Option<String> {
        self.protocol_version.read().await.clone()
    }

    /// Record the `initialize` handshake.
    ///
    /// # Errors
    ///
    /// `AlreadyInitialized` if the handshake already started or finished,
    /// `UnknownSession` if the session is terminated.
    pub async fn begin_initialization(&self, protocol_version: &str) -> Result<(), SessionError> {
        let mut state = self.state.write().await;
        match *state {
            SessionState::Created => {
                *state = SessionState::Initializing;
                *self.protocol_version.write().await = Some(protocol_version.to_string());
                Ok(())
            }
            SessionState::Initializing | SessionState::Ready => {
                Err(SessionError::AlreadyInitialized)
            }
            SessionState::Closed | SessionState::Expired => Err(SessionError::UnknownSession),
        }
    }

    /// Record the `notifications/initialized` handshake completion.
    ///
    /// # Errors
    ///
    /// `NotInitialized` if the handshake never started, `AlreadyInitialized`
    /// if it already completed, `UnknownSession` if the session is terminated.
    pub async fn complete_initialization(&self) -> Result<(), SessionError> {
        let mut state = self.state.write().await;
        match *state {
            SessionState::Initializing => {
                *state = SessionState::Ready;
                Ok(())
            }
            SessionState::Created => Err(SessionError::NotInitialized),
            SessionState::Ready => Err(SessionError::AlreadyInitialized),
            SessionState::Closed | SessionState::Expired => Err(SessionError::UnknownSession),
        }
    }

    /// Gate for methods only valid after the handshake.
    ///
    /// # Errors
    ///
    /// `NotInitialized` before the handshake completes, `UnknownSession`
    /// after termination.
    pub async fn require_ready(&self) -> Result<(), SessionError> {
        match *self.state.read().await {
            SessionState::Ready => Ok(()),
            SessionState::Created | SessionState::Initializing => {
                Err(SessionError::NotInitialized)
            }
            SessionState::Closed | SessionState::Expired => Err(SessionError::UnknownSession),
        }
    }

    /// Push an event into the mailbox: stored for replay, broadcast live.
    ///
    /// Returns the event id.
    pub async fn push_event(&self, event_type: impl Into<String>, data: impl Into<String>) -> u64 {
        let id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        let event = BufferedEvent::new(id, event_type, data);

        {
            let mut history = self.history.write().await;
            if history.len() >= EVENT_HISTORY_SIZE {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        // No subscribers is fine; the history buffer covers late joiners.
        let _ = self.tx.send(event);

        *self.last_seen_at.write().await = Instant::now();
        id
    }

    /// Events after a given ID, for replay on reconnection.
    pub async fn get_events_after(&self, last_event_id: u64) -> Vec<BufferedEvent> {
        let history = self.history.read().await;
        history.iter().filter(|e| e.id > last_event_id).cloned().collect()
    }

    /// Subscribe to live events.
    pub fn subscribe(&self) -> broadcast::Receiver<BufferedEvent> {
        self.tx.subscribe()
    }

    /// Update the activity timestamp, extending idle lifetime.
    pub async fn touch(&self) {
        *self.last_seen_at.write().await = Instant::now();
    }

    pub async fn is_idle(&self, timeout: Duration) -> bool {
        self.last_seen_at.read().await.elapsed() > timeout
    }

    async fn mark(&self, terminal: SessionState) {
        *self.state.write().await = terminal;
    }

    /// Current event ID counter value.
    pub fn current_event_id(&self) -> u64 {
        self.next_event_id.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("current_event_id", &self.current_event_id())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Global session table. The map lock guards membership only; all per-session
/// state lives behind the session's own locks.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    idle_timeout: Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Allocate a new session in the `Created` state.
    pub async fn create(&self) -> Arc<Session> {
        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone()));

        self.sessions.write().await.insert(id, Arc::clone(&session));

        tracing::info!(session_id = %session.id, "Created session");
        session
    }

    /// Look up a session by ID.
    ///
    /// # Errors
    ///
    /// `UnknownSession` for ids never issued or already evicted.
    pub async fn get(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(SessionError::UnknownSession)
    }

    /// Complete the handshake for a session.
    ///
    /// # Errors
    ///
    /// See [`Session::complete_initialization`].
    pub async fn complete_initialization(&self, id: &str) -> Result<(), SessionError> {
        let session = self.get(id).await?;
        session.complete_initialization().await?;
        session.touch().await;
        tracing::info!(session_id = %id, "Session ready");
        Ok(())
    }

    /// Explicitly terminate a session. Idempotent: closing an unknown or
    /// already-closed session is not an error.
    pub async fn close(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                session.mark(SessionState::Closed).await;
                tracing::info!(session_id = %id, "Closed session");
                true
            }
            None => false,
        }
    }

    /// Evict sessions idle beyond the configured timeout.
    pub async fn sweep_idle(&self) -> usize {
        let mut stale = Vec::new();

        {
            let sessions = self.sessions.read().await;
            for (id, session) in sessions.iter() {
                if session.is_idle(self.idle_timeout).await {
                    stale.push(id.clone());
                }
            }
        }

        let count = stale.len();
        if count > 0 {
            let mut sessions = self.sessions.write().await;
            for id in stale {
                if let Some(session) = sessions.remove(&id) {
                    session.mark(SessionState::Expired).await;
                    tracing::info!(session_id = %id, "Expired idle session");
                }
            }
        }

        count
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Start the background idle sweep.
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let swept = self.sweep_idle().await;
                if swept > 0 {
                    tracing::debug!(count = swept, "Session sweep completed");
                }
            }
        });
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SESSION_IDLE_TIMEOUT)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

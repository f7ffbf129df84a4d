//! Chat sessions for the analytics assistant.
//!
//! A [`ChatSession`] keeps an append-only list of turns and allows one
//! message in flight at a time. Every send packages the full history plus
//! a fresh analytics snapshot from the [`AggregationStore`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use crowdwatch_cloud::chat::ChatCompleter;
use crowdwatch_core::aggregation::{AggregateStats, AggregationStore};
use crowdwatch_core::chat::{welcome_message, ChatRole, ChatTurn, APOLOGY_REPLY};

/// Assistant turn appended when a session is reset.
pub const RESET_NOTICE: &str = "Chat has been reset. Ask me anything about your CCTV data.";

/// Most sessions kept at once.
pub const DEFAULT_SESSION_CAPACITY: usize = 256;

/// Sessions untouched for this long are dropped.
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, thiserror::Error)]
pub enum ChatSessionError {
    #[error("message text must not be empty")]
    EmptyMessage,

    #[error("a message is already being answered in this session")]
    Busy,

    #[error("chat session {0} not found")]
    NotFound(Uuid),
}

/// Serializable view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub turns: Vec<ChatTurn>,
}

pub struct ChatSession {
    id: Uuid,
    turns: RwLock<Vec<ChatTurn>>,
    in_flight: AtomicBool,
    last_used: Mutex<Instant>,
}

/// Clears the in-flight flag when the send finishes or is dropped.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ChatSession {
    /// New session seeded with a welcome turn rendered from `stats`.
    pub fn new(stats: &AggregateStats) -> Self {
        Self {
            id: Uuid::new_v4(),
            turns: RwLock::new(vec![ChatTurn::assistant(welcome_message(stats))]),
            in_flight: AtomicBool::new(false),
            last_used: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn last_used(&self) -> Instant {
        *self.last_used.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            turns: self.turns.read().await.clone(),
        }
    }

    /// Re-render the welcome turn while it is still the only turn, so an
    /// untouched session shows current numbers. A reset notice is kept.
    pub async fn refresh_welcome(&self, stats: &AggregateStats) {
        let mut turns = self.turns.write().await;
        if let [only] = turns.as_mut_slice() {
            if only.role == ChatRole::Assistant && only.content != RESET_NOTICE {
                *only = ChatTurn::assistant(welcome_message(stats));
            }
        }
    }

    /// Drop the history and start over with a reset notice.
    pub async fn reset(&self) -> Result<(), ChatSessionError> {
        if self.is_busy() {
            return Err(ChatSessionError::Busy);
        }
        *self.turns.write().await = vec![ChatTurn::assistant(RESET_NOTICE)];
        Ok(())
    }

    /// Append a user turn, ask the assistant, append its reply.
    ///
    /// A failed completion appends the fixed apology turn instead; it is
    /// not an error for the caller.
    pub async fn send(
        &self,
        text: &str,
        completer: &dyn ChatCompleter,
        store: &AggregationStore,
    ) -> Result<ChatTurn, ChatSessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatSessionError::EmptyMessage);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ChatSessionError::Busy);
        }
        let _guard = FlightGuard(&self.in_flight);

        let history = {
            let mut turns = self.turns.write().await;
            turns.push(ChatTurn::user(text));
            turns.iter().map(ChatTurn::to_message).collect::<Vec<_>>()
        };
        let context = store.analytics_context().await;

        let reply = match completer.complete(&history, Some(&context)).await {
            Ok(reply) => ChatTurn::assistant(reply.message),
            Err(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "Chat completion failed");
                ChatTurn::assistant(APOLOGY_REPLY)
            }
        };
        self.turns.write().await.push(reply.clone());
        Ok(reply)
    }
}

/// All live chat sessions, keyed by id.
///
/// The registry is bounded: sessions idle longer than the idle limit are
/// pruned on every create, and when it is still full the least recently
/// used idle session is evicted. Sessions with a message in flight are
/// never evicted.
pub struct ChatSessions {
    sessions: RwLock<HashMap<Uuid, Arc<ChatSession>>>,
    capacity: usize,
    idle: Duration,
}

impl Default for ChatSessions {
    fn default() -> Self {
        Self::with_limits(DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_IDLE)
    }
}

impl ChatSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(capacity: usize, idle: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            idle,
        }
    }

    pub async fn create(&self, stats: &AggregateStats) -> Arc<ChatSession> {
        let session = Arc::new(ChatSession::new(stats));
        let mut sessions = self.sessions.write().await;

        let idle = self.idle;
        let before = sessions.len();
        sessions.retain(|_, s| s.is_busy() || s.last_used().elapsed() < idle);
        let pruned = before - sessions.len();
        if pruned > 0 {
            tracing::debug!(pruned, "Idle chat sessions dropped");
        }

        while sessions.len() >= self.capacity {
            let oldest = sessions
                .values()
                .filter(|s| !s.is_busy())
                .min_by_key(|s| s.last_used())
                .map(|s| s.id());
            let Some(oldest) = oldest else { break };
            sessions.remove(&oldest);
            tracing::debug!(session_id = %oldest, "Chat session evicted");
        }

        sessions.insert(session.id(), Arc::clone(&session));
        tracing::debug!(session_id = %session.id(), "Chat session created");
        session
    }

    /// Look up a session and mark it used.
    pub async fn get(&self, id: Uuid) -> Result<Arc<ChatSession>, ChatSessionError> {
        let session = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ChatSessionError::NotFound(id))?;
        session.touch();
        Ok(session)
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), ChatSessionError> {
        match self.sessions.write().await.remove(&id) {
            Some(_) => {
                tracing::debug!(session_id = %id, "Chat session deleted");
                Ok(())
            }
            None => Err(ChatSessionError::NotFound(id)),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use super::types::MemoryStats;
use crate::models::chat::{ChatMessage, Role, SessionId};

/// Thread-safe, per-session bounded conversation log.
///
/// Storage is sharded by session key (DashMap), so appends for unrelated
/// sessions never contend on a single lock. Each session retains at most
/// `2 * max_history` turns; older turns are dropped a whole exchange at a time.
pub struct ConversationMemory {
    sessions: DashMap<SessionId, VecDeque<ChatMessage>>,
    gates: DashMap<SessionId, Arc<Mutex<()>>>,
    max_history: usize,
}

impl ConversationMemory {
    pub fn new(max_history: usize) -> Self {
        info!("Initializing conversation memory (max {} exchanges per session)", max_history);
        Self {
            sessions: DashMap::new(),
            gates: DashMap::new(),
            max_history,
        }
    }

    /// Hard cap on retained turns per session
    pub fn capacity(&self) -> usize {
        self.max_history * 2
    }

    /// Append one turn and enforce the bound
    pub fn add(&self, session_id: &str, role: Role, content: impl Into<String>) {
        let cap = self.capacity();
        let mut turns = self.sessions.entry(session_id.to_string()).or_default();
        turns.push_back(ChatMessage {
            role,
            content: content.into(),
        });
        Self::enforce_bound(&mut turns, cap);
    }

    /// Append a completed user/assistant exchange under a single lock
    pub fn append_exchange(
        &self,
        session_id: &str,
        user: impl Into<String>,
        assistant: impl Into<String>,
    ) {
        let cap = self.capacity();
        let mut turns = self.sessions.entry(session_id.to_string()).or_default();
        turns.push_back(ChatMessage::user(user));
        turns.push_back(ChatMessage::assistant(assistant));
        Self::enforce_bound(&mut turns, cap);
        debug!("Session {} now holds {} turns", session_id, turns.len());
    }

    /// Full retained history, oldest first. Unknown sessions yield an empty list.
    pub fn get(&self, session_id: &str) -> Vec<ChatMessage> {
        self.sessions
            .get(session_id)
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove a session. Returns whether anything was stored for it.
    pub fn clear(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            info!("Cleared conversation for session {}", session_id);
        }
        removed
    }

    /// Serialize mutations of one session in arrival order.
    ///
    /// tokio's mutex is FIFO, so turns land in memory in call order even when
    /// several requests for the same session overlap. The gate lives only
    /// while someone holds or waits on it.
    pub async fn acquire_session(&self, session_id: &str) -> SessionGuard<'_> {
        let gate = self
            .gates
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        SessionGuard {
            memory: self,
            session_id: session_id.to_string(),
            guard: Some(gate.lock_owned().await),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            active_sessions: self.sessions.len(),
            retained_turns: self.sessions.iter().map(|entry| entry.value().len()).sum(),
        }
    }

    fn enforce_bound(turns: &mut VecDeque<ChatMessage>, cap: usize) {
        while turns.len() > cap {
            let evict = turns.len().min(2);
            turns.drain(..evict);
        }
    }
}

/// Exclusive turn on one session, released on drop
pub struct SessionGuard<'a> {
    memory: &'a ConversationMemory,
    session_id: SessionId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Clones are taken under the shard lock, so a count of 1 means no holder or waiter
        self.memory
            .gates
            .remove_if(&self.session_id, |_, gate| Arc::strong_count(gate) == 1);
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(5)
    }
}

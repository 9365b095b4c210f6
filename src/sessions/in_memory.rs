//! In-memory history store implementation.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::traits::HistoryStore;
use crate::providers::ChatMessage;

/// An in-memory history store backed by mutex-protected hash maps.
///
/// Contents live for the process lifetime. Growth is unbounded unless
/// `max_messages` is non-zero, in which case the oldest user/assistant pairs
/// are dropped after each append.
pub struct InMemoryHistoryStore {
    histories: Mutex<HashMap<String, Vec<ChatMessage>>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    max_messages: usize,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::with_max_messages(0)
    }

    /// `0` disables the cap.
    pub fn with_max_messages(max_messages: usize) -> Self {
        Self {
            histories: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            max_messages,
        }
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop whole leading pairs until `history` fits in `max_messages`.
fn enforce_cap(history: &mut Vec<ChatMessage>, max_messages: usize) {
    if max_messages == 0 || history.len() <= max_messages {
        return;
    }
    let mut excess = history.len() - max_messages;
    // keep user/assistant pairs aligned
    excess += excess % 2;
    history.drain(..excess.min(history.len()));
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn get_history(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let mut histories = self.histories.lock();
        Ok(histories
            .entry(session_id.to_string())
            .or_default()
            .clone())
    }

    async fn update_history(
        &self,
        session_id: &str,
        user: ChatMessage,
        assistant: ChatMessage,
    ) -> Result<()> {
        let mut histories = self.histories.lock();
        let history = histories.entry(session_id.to_string()).or_default();
        history.push(user);
        history.push(assistant);
        let before = history.len();
        enforce_cap(history, self.max_messages);
        if history.len() < before {
            tracing::debug!(
                session_id,
                dropped = before - history.len(),
                "History cap reached; dropped oldest turns"
            );
        }
        Ok(())
    }

    async fn clear_history(&self, session_id: &str) -> Result<bool> {
        // Lock entries are pruned separately via `release_session_lock`.
        Ok(self.histories.lock().remove(session_id).is_some())
    }

    fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(session_id.to_string()).or_default())
    }

    fn release_session_lock(&self, session_id: &str) -> bool {
        let mut locks = self.locks.lock();
        // a waiter holding a clone keeps the entry alive
        let idle = locks
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(session_id);
        }
        idle
    }

    fn session_count(&self) -> usize {
        self.histories.lock().len()
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

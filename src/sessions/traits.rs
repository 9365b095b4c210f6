//! History storage trait for session-scoped conversations.

use crate::providers::ChatMessage;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Storage for per-session conversation histories.
///
/// A session is identified by an opaque caller-supplied string; unknown ids
/// behave as empty sessions. Histories are append-only apart from
/// [`HistoryStore::clear_history`] and the configured cap.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Return the history for `session_id`, creating an empty one if needed.
    ///
    /// A read alone registers the session, so it shows up in [`HistoryStore::session_count`].
    async fn get_history(&self, session_id: &str) -> Result<Vec<ChatMessage>>;

    /// Append the user message, then the assistant reply.
    async fn update_history(
        &self,
        session_id: &str,
        user: ChatMessage,
        assistant: ChatMessage,
    ) -> Result<()>;

    /// Drop a session's history. Returns whether the session existed.
    async fn clear_history(&self, session_id: &str) -> Result<bool>;

    /// Lock that serializes whole turns within one session.
    ///
    /// Callers hold it across read, model call and append.
    fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>>;

    /// Forget the session's lock if no caller still holds a handle to it.
    ///
    /// Callers drop their own handle first. Returns whether the entry was removed.
    fn release_session_lock(&self, session_id: &str) -> bool;

    /// Number of sessions currently tracked.
    fn session_count(&self) -> usize;

    /// The name of this store implementation.
    fn name(&self) -> &str;
}

//! HTTP handlers for the chat relay.

use super::error::ChatError;
use super::request::ChatRequest;
use super::AppState;
use crate::providers::{ChatMessage, ModelReply};
use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;

// ── Response bodies ──────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ChatReplyBody {
    pub response: String,
    /// Reserved for product suggestions; always empty.
    pub products: Vec<serde_json::Value>,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryBody {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ClearedBody {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub cleared: bool,
}

// ── Handlers ────────────────────────────────────────────────────

/// GET /
pub async fn handle_root() -> &'static str {
    "Hi, how can I assist you today!"
}

/// POST /chat: one conversational turn.
///
/// The session lock is held from history read to history append, so turns
/// within one session never interleave. A failed or timed-out model call
/// leaves the history untouched. The timeout covers the wait for the lock.
pub async fn handle_chat(
    State(state): State<AppState>,
    request: ChatRequest,
) -> Result<Json<ChatReplyBody>, ChatError> {
    let outcome = tokio::time::timeout(state.turn_timeout, async {
        let lock = state.store.session_lock(&request.session_id);
        let _turn = lock.lock().await;
        run_turn(&state, &request).await
    })
    .await
    .unwrap_or(Err(ChatError::Timeout(state.turn_timeout)));

    match outcome {
        Ok(reply) => {
            tracing::info!(
                session_id = %request.session_id,
                image = request.image.is_some(),
                "Chat turn completed"
            );
            Ok(Json(ChatReplyBody {
                response: reply.text,
                products: Vec::new(),
                session_id: request.session_id,
            }))
        }
        Err(e) => {
            tracing::error!(session_id = %request.session_id, "Error in chat endpoint: {e}");
            Err(e)
        }
    }
}

async fn run_turn(state: &AppState, request: &ChatRequest) -> Result<ModelReply, ChatError> {
    let history = state.store.get_history(&request.session_id).await?;
    let turn = state
        .invoker
        .invoke(&request.message, request.image.as_deref(), &history)
        .await?;
    state
        .store
        .update_history(&request.session_id, turn.user, turn.reply.to_message())
        .await?;
    Ok(turn.reply)
}

/// GET /chat/history/{session_id}
pub async fn handle_history_get(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryBody>, ChatError> {
    let messages = state.store.get_history(&session_id).await?;
    Ok(Json(HistoryBody {
        session_id,
        messages,
    }))
}

/// DELETE /chat/history/{session_id}
///
/// Waits for any in-flight turn on the session before clearing.
pub async fn handle_history_clear(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ClearedBody>, ChatError> {
    let lock = state.store.session_lock(&session_id);
    let turn = lock.lock().await;
    let cleared = state.store.clear_history(&session_id).await;
    drop(turn);
    drop(lock);
    state.store.release_session_lock(&session_id);

    let cleared = cleared?;
    if cleared {
        tracing::info!(%session_id, "Session history cleared");
    }
    Ok(Json(ClearedBody {
        session_id,
        cleared,
    }))
}

/// GET /health
pub async fn handle_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "provider": state.invoker.provider_name(),
        "model": state.invoker.model(),
        "history_store": state.store.name(),
        "sessions": state.store.session_count(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

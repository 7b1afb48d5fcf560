use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uniride_chat::{ChatMessage, ChatStats, MessageKind};
use uniride_core::TripId;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub sender: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: Option<MessageKind>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub success: bool,
    pub message: String,
    pub data: ChatMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingRequest {
    pub sender: String,
    pub is_typing: bool,
}

#[derive(Debug, Deserialize)]
pub struct SystemMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStatsResponse {
    #[serde(flatten)]
    pub chat: ChatStats,
    pub active_trips: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/chat/stats", get(chat_stats))
        .route("/api/chat/{trip}/messages", get(messages))
        .route("/api/chat/{trip}/history", get(history))
        .route("/api/chat/{trip}/send", post(send_message))
        .route("/api/chat/{trip}/typing", get(typing_users).post(set_typing))
        .route("/api/chat/{trip}/system", post(system_message))
        .route("/api/chat/{trip}/clear", post(clear_chat))
}

/// GET /api/chat/{trip}/messages
async fn messages(
    State(state): State<AppState>,
    Path(trip): Path<TripId>,
) -> Json<Vec<ChatMessage>> {
    Json(state.chat.get_or_create(trip).await)
}

/// GET /api/chat/{trip}/history
async fn history(
    State(state): State<AppState>,
    Path(trip): Path<TripId>,
) -> Json<Vec<ChatMessage>> {
    Json(state.chat.history(trip).await)
}

/// POST /api/chat/{trip}/send
async fn send_message(
    State(state): State<AppState>,
    Path(trip): Path<TripId>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, AppError> {
    let kind = req.kind.unwrap_or(MessageKind::User);
    let data = state.chat.append(trip, &req.sender, &req.message, kind).await?;
    state.metrics.chat_messages.inc();

    Ok(Json(SendMessageResponse {
        success: true,
        message: "Message sent".to_string(),
        data,
    }))
}

/// POST /api/chat/{trip}/typing
async fn set_typing(
    State(state): State<AppState>,
    Path(trip): Path<TripId>,
    Json(req): Json<TypingRequest>,
) -> Result<Json<Value>, AppError> {
    let sender = req.sender.trim();
    if sender.is_empty() {
        return Err(AppError::ValidationError("sender is required".to_string()));
    }

    state.chat.typing(trip, sender, req.is_typing).await;
    Ok(Json(json!({ "success": true })))
}

/// GET /api/chat/{trip}/typing
async fn typing_users(State(state): State<AppState>, Path(trip): Path<TripId>) -> Json<Value> {
    let typing = state.chat.currently_typing(trip).await;
    Json(json!({ "typing": typing }))
}

/// POST /api/chat/{trip}/system
async fn system_message(
    State(state): State<AppState>,
    Path(trip): Path<TripId>,
    Json(req): Json<SystemMessageRequest>,
) -> Result<Json<Value>, AppError> {
    let text = req.message.trim();
    if text.is_empty() {
        return Err(AppError::ValidationError("message is required".to_string()));
    }

    let data = state.chat.system(trip, text).await;
    Ok(Json(json!({ "success": true, "data": data })))
}

/// POST /api/chat/{trip}/clear
async fn clear_chat(State(state): State<AppState>, Path(trip): Path<TripId>) -> Json<Value> {
    state.chat.clear(trip).await;
    Json(json!({ "success": true }))
}

/// GET /api/chat/stats
async fn chat_stats(State(state): State<AppState>) -> Json<ChatStatsResponse> {
    Json(ChatStatsResponse {
        chat: state.chat.stats().await,
        active_trips: state.trips.active_count().await,
    })
}

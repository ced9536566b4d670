//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    domain::RoomId,
    infrastructure::dto::http::{
        ChatSummaryDto, CreateChatRequest, CreateChatResponse, HistoryQuery, MessageDto,
        MessageHitDto, RoomActivityDto, SearchQuery, UserDto, UserSearchQuery,
    },
    ui::{extract::AuthenticatedUser, state::AppState},
    usecase::ChatQueryError,
};

/// Error response of the chat API
pub struct ApiError(ChatQueryError);

impl From<ChatQueryError> for ApiError {
    fn from(error: ChatQueryError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChatQueryError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ChatQueryError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ChatQueryError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ChatQueryError::NoMessages(_) => StatusCode::NOT_FOUND,
            ChatQueryError::Repository(_) | ChatQueryError::Search(_) => {
                tracing::error!("Chat API failure: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Debug endpoint to get the local room registry (for testing purposes)
pub async fn debug_rooms(State(state): State<Arc<AppState>>) -> Json<Vec<RoomActivityDto>> {
    let rooms = state.registry.overview().await;

    // Domain Model から DTO への変換
    Json(rooms.into_iter().map(Into::into).collect())
}

/// Create (or get) the direct chat between the caller and `userId`
pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(request): Json<CreateChatRequest>,
) -> Result<Json<CreateChatResponse>, ApiError> {
    let room = state
        .create_direct_chat_usecase
        .execute(&caller, request.user_id)
        .await?;

    Ok(Json(CreateChatResponse {
        message: "Chat created".to_string(),
        chat_id: room.id.value(),
    }))
}

/// Chats of the caller
pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> Result<Json<Vec<ChatSummaryDto>>, ApiError> {
    let rooms = state.list_chats_usecase.execute(&caller).await?;
    Ok(Json(rooms.into_iter().map(Into::into).collect()))
}

/// Most recent messages of a chat
pub async fn get_chat_history(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(chat_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageDto>>, ApiError> {
    let limit = query.effective_limit(state.history_limit);
    let messages = state
        .get_chat_history_usecase
        .execute(&caller, RoomId::new(chat_id), limit)
        .await?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

/// Full-text search inside a chat
pub async fn search_messages(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(chat_id): Path<i64>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<MessageHitDto>>, ApiError> {
    let hits = state
        .search_messages_usecase
        .execute(&caller, RoomId::new(chat_id), &query.query)
        .await?;
    Ok(Json(hits.into_iter().map(Into::into).collect()))
}

/// Users whose username starts with the given prefix
pub async fn search_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserSearchQuery>,
) -> Result<Json<Vec<UserDto>>, ApiError> {
    let users = state.search_users_usecase.execute(&query.username).await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

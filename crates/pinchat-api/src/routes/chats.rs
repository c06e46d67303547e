use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use pinchat_types::api::{
    ChatListResponse, Claims, MessageQuery, MessageResponse, SendMessageRequest, StartChatRequest,
    StartChatResponse,
};
use pinchat_types::models::MessageCursor;

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

pub async fn start_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<StartChatRequest>,
) -> Result<Json<StartChatResponse>, ApiError> {
    // Callers may only open chats they take part in.
    if claims.sub != req.user1_id && claims.sub != req.user2_id {
        warn!(user_id = %claims.sub, "Rejected start_chat for a pair without the caller");
        return Err(ApiError::Forbidden("Cannot start a chat for other users".into()));
    }

    Ok(Json(state.chats.start_chat(req.user1_id, req.user2_id).await?))
}

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ChatListResponse>, ApiError> {
    Ok(Json(state.chats.list_chats(claims.sub).await?))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(chat_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message: MessageResponse = state
        .messages
        .send(chat_id, claims.sub, req.encrypted_message, req.iv)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(chat_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<MessageQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let cursor = match (query.before, query.before_id) {
        (Some(created_at), id) => Some(MessageCursor { created_at, id }),
        (None, Some(_)) => return Err(ApiError::invalid("before_id requires before")),
        (None, None) => None,
    };

    let page = state
        .messages
        .history(chat_id, claims.sub, query.limit, cursor)
        .await?;
    Ok(Json(page))
}

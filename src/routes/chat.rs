use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::chat::{ChatMessageView, SendMessageRequest},
    error::AppError,
    routes::auth::ActingUser,
    services::chat_service,
    state::SharedState,
};

/// Per-match chat endpoints.
pub fn router() -> Router<SharedState> {
    Router::new().route(
        "/matches/{id}/messages",
        get(list_messages).post(send_message),
    )
}

/// Post a message to the match channel.
#[utoipa::path(
    post,
    path = "/matches/{id}/messages",
    tag = "chat",
    params(("X-User-Id" = String, Header, description = "Caller identity"),
    ("id" = String, Path, description = "Match identifier")),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent", body = ChatMessageView),
        (status = 400, description = "Empty or oversized message"),
        (status = 403, description = "Caller is not on the roster")
    )
)]
pub async fn send_message(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessageView>), AppError> {
    let message = chat_service::send(&state, actor, id, payload).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Messages of the match channel, oldest first.
#[utoipa::path(
    get,
    path = "/matches/{id}/messages",
    tag = "chat",
    params(("X-User-Id" = String, Header, description = "Caller identity"),
    ("id" = String, Path, description = "Match identifier")),
    responses((status = 200, description = "Chat history", body = [ChatMessageView]))
)]
pub async fn list_messages(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChatMessageView>>, AppError> {
    Ok(Json(chat_service::list_messages(&state, actor, id).await?))
}

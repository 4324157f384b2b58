use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::{ChatMessageEntity, MatchEntity, NotificationKind},
    dto::chat::{ChatMessageView, SendMessageRequest},
    error::ServiceError,
    services::{
        match_service::{load_match, roster},
        notification_service::Notice,
    },
    state::SharedState,
};

/// Longest accepted message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 1_000;

/// Append a message to the match channel and notify the rest of the roster.
pub async fn send(
    state: &SharedState,
    actor: Uuid,
    match_id: Uuid,
    request: SendMessageRequest,
) -> Result<ChatMessageView, ServiceError> {
    let text = validate_text(&request.text)?;
    let store = state.require_store().await?;
    let entity = load_match(store.as_ref(), match_id).await?;
    let members = roster(store.as_ref(), &entity).await?;
    ensure_member(&entity, &members, actor)?;

    let message = ChatMessageEntity {
        id: Uuid::new_v4(),
        match_id,
        sender_id: actor,
        text: text.to_string(),
        created_at: SystemTime::now(),
    };
    store.insert_message(message.clone()).await?;
    info!(match_id = %match_id, message_id = %message.id, "chat message sent");

    let recipients: Vec<Uuid> = members.into_iter().filter(|user| *user != actor).collect();
    state.fanout().dispatch(
        store,
        recipients,
        Notice::new(
            NotificationKind::ChatMessage {
                match_id,
                message_id: message.id,
                sender_id: actor,
            },
            preview(&message.text, state.config().chat.preview_chars),
        ),
    );
    Ok(ChatMessageView::from(&message))
}

/// Messages of a match in insertion order. Roster members only.
pub async fn list_messages(
    state: &SharedState,
    actor: Uuid,
    match_id: Uuid,
) -> Result<Vec<ChatMessageView>, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(store.as_ref(), match_id).await?;
    let members = roster(store.as_ref(), &entity).await?;
    ensure_member(&entity, &members, actor)?;

    Ok(store
        .list_messages(match_id)
        .await?
        .iter()
        .map(ChatMessageView::from)
        .collect())
}

fn ensure_member(entity: &MatchEntity, members: &[Uuid], actor: Uuid) -> Result<(), ServiceError> {
    if members.contains(&actor) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "only players of match `{}` can use its chat",
            entity.id
        )))
    }
}

/// Reject blank and oversized messages. The text is kept as sent.
fn validate_text(text: &str) -> Result<&str, ServiceError> {
    if text.trim().is_empty() {
        return Err(ServiceError::EmptyMessage);
    }
    let len = text.chars().count();
    if len > MAX_MESSAGE_CHARS {
        return Err(ServiceError::MessageTooLong {
            len,
            max: MAX_MESSAGE_CHARS,
        });
    }
    Ok(text)
}

/// First `max_chars` characters of `text`, with an ellipsis when cut.
fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

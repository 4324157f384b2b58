use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{dao::models::ChatMessageEntity, dto::format_system_time};

/// Payload of `POST /matches/{id}/messages`. Length rules are enforced by the chat service.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub text: String,
}

/// One chat line.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChatMessageView {
    pub id: Uuid,
    pub match_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    pub created_at: String,
}

impl From<&ChatMessageEntity> for ChatMessageView {
    fn from(entity: &ChatMessageEntity) -> Self {
        Self {
            id: entity.id,
            match_id: entity.match_id,
            sender_id: entity.sender_id,
            text: entity.text.clone(),
            created_at: format_system_time(entity.created_at),
        }
    }
}

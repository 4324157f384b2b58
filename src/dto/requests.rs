use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::dao::models::{JoinRequestEntity, JoinRequestStatus};
use crate::dto::format_system_time;

/// Payload of `POST /matches/{id}/requests`.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct JoinMatchRequest {
    /// Optional mood tag shown to the organizer.
    #[serde(default)]
    #[validate(length(max = 40))]
    pub mood: Option<String>,
}

/// Query string of `GET /matches/{id}/requests`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListRequestsQuery {
    /// Restrict the listing to one status.
    #[serde(default)]
    #[param(value_type = Option<String>)]
    pub status: Option<JoinRequestStatus>,
}

/// Payload of `POST /matches/{id}/red-cards`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RedCardRequest {
    pub user_id: Uuid,
}

/// Payload of `POST /matches/{id}/transfer`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TransferSpotRequest {
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
}

/// Public projection of a join request.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JoinRequestView {
    pub id: Uuid,
    pub match_id: Uuid,
    pub user_id: Uuid,
    pub status: JoinRequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<Uuid>,
}

impl From<&JoinRequestEntity> for JoinRequestView {
    fn from(entity: &JoinRequestEntity) -> Self {
        Self {
            id: entity.id,
            match_id: entity.match_id,
            user_id: entity.user_id,
            status: entity.status,
            mood: entity.mood.clone(),
            created_at: format_system_time(entity.created_at),
            reviewed_at: entity.reviewed_at.map(format_system_time),
            reviewed_by: entity.reviewed_by,
        }
    }
}

/// Both sides of a completed spot transfer.
#[derive(Debug, Serialize, ToSchema)]
pub struct TransferView {
    /// Former seat holder's request, now withdrawn.
    pub released: JoinRequestView,
    /// Receiver's request, now approved.
    pub granted: JoinRequestView,
}

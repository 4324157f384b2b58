use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{dao::models::PlayerProfileEntity, dto::format_system_time};

/// Payload of `PUT /profile`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 60))]
    pub display_name: Option<String>,
    /// Receive SOS broadcasts from matches looking for a player.
    #[serde(default)]
    pub sos_opt_in: bool,
}

/// A player's profile.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileView {
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub sos_opt_in: bool,
    pub red_cards: u32,
    pub updated_at: String,
}

impl From<&PlayerProfileEntity> for ProfileView {
    fn from(entity: &PlayerProfileEntity) -> Self {
        Self {
            user_id: entity.user_id,
            display_name: entity.display_name.clone(),
            sos_opt_in: entity.sos_opt_in,
            red_cards: entity.red_cards,
            updated_at: format_system_time(entity.updated_at),
        }
    }
}

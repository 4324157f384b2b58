//! DTO definitions used by the match REST API and the realtime streams.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{MatchEntity, MatchLevel},
    dto::{
        format_system_time,
        validation::{validate_level, validate_not_blank},
    },
    state::capacity::CapacityView,
};

/// Payload used to create a match. The caller becomes its organizer.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateMatchRequest {
    #[validate(length(min = 1, max = 120), custom(function = "validate_not_blank"))]
    pub club_id: String,
    /// Start of the booking; must be in the future.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub starts_at: OffsetDateTime,
    #[validate(range(min = 30, max = 180))]
    pub duration_minutes: u16,
    /// `beginner`, `intermediate` or `advanced`.
    #[validate(custom(function = "validate_level"))]
    pub level: String,
    #[serde(default)]
    pub price_per_player_cents: Option<u32>,
    /// Players wanted; clamped to [2, 8].
    #[serde(default)]
    pub players_needed: Option<u8>,
}

/// Partial update of a match; omitted fields are left untouched.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct UpdateMatchRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 120), custom(function = "validate_not_blank"))]
    pub club_id: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub starts_at: Option<OffsetDateTime>,
    #[serde(default)]
    #[validate(range(min = 30, max = 180))]
    pub duration_minutes: Option<u16>,
    #[serde(default)]
    #[validate(custom(function = "validate_level"))]
    pub level: Option<String>,
    /// If not specified, does not change it. If null is specified, removes the price.
    #[serde(default)]
    #[schema(value_type = Option<u32>)]
    pub price_per_player_cents: Option<Option<u32>>,
    #[serde(default)]
    pub players_needed: Option<u8>,
}

/// Query string of `GET /matches`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListMatchesQuery {
    /// Only return matches that have not started yet.
    #[serde(default)]
    pub upcoming_only: bool,
}

/// Public projection of a match record.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MatchView {
    pub id: Uuid,
    pub club_id: String,
    pub starts_at: String,
    pub ends_at: String,
    pub duration_minutes: u16,
    pub level: MatchLevel,
    pub organizer_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_per_player_cents: Option<u32>,
    pub players_needed: u8,
    pub sos_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&MatchEntity> for MatchView {
    fn from(entity: &MatchEntity) -> Self {
        Self {
            id: entity.id,
            club_id: entity.club_id.clone(),
            starts_at: format_system_time(entity.starts_at),
            ends_at: format_system_time(entity.ends_at()),
            duration_minutes: entity.duration_minutes,
            level: entity.level,
            organizer_id: entity.organizer_id,
            price_per_player_cents: entity.price_per_player_cents,
            players_needed: entity.players_needed,
            sos_active: entity.sos_active,
            created_at: format_system_time(entity.created_at),
            updated_at: format_system_time(entity.updated_at),
        }
    }
}

/// A match with its seat accounting and current roster.
#[derive(Debug, Serialize, ToSchema)]
pub struct MatchDetails {
    #[serde(flatten)]
    pub r#match: MatchView,
    pub capacity: CapacityView,
    /// Organizer first, then approved players in request order.
    pub roster: Vec<Uuid>,
}

/// Outcome of an SOS broadcast.
#[derive(Debug, Serialize, ToSchema)]
pub struct SosResponse {
    pub match_id: Uuid,
    pub sos_active: bool,
    /// Users the alert was addressed to.
    pub recipients: usize,
}

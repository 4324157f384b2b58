use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Skill level advertised for a match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl MatchLevel {
    /// Stable lowercase identifier used in persistence filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchLevel::Beginner => "beginner",
            MatchLevel::Intermediate => "intermediate",
            MatchLevel::Advanced => "advanced",
        }
    }
}

/// A scheduled game at a club, owned by its organizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEntity {
    /// Primary key of the match.
    pub id: Uuid,
    /// Reference to the club hosting the match (managed by the catalog).
    pub club_id: String,
    /// Scheduled start of the match.
    pub starts_at: SystemTime,
    /// Length of the booking in minutes.
    pub duration_minutes: u16,
    /// Advertised skill level.
    pub level: MatchLevel,
    /// User who created the match and holds the first seat.
    pub organizer_id: Uuid,
    /// Optional price each player pays, in cents.
    pub price_per_player_cents: Option<u32>,
    /// Informational hint of how many players the organizer is looking for.
    pub players_needed: u8,
    /// Whether an SOS broadcast is currently active.
    pub sos_active: bool,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time the match record changed.
    pub updated_at: SystemTime,
}

impl MatchEntity {
    /// Moment the booking ends.
    pub fn ends_at(&self) -> SystemTime {
        self.starts_at + Duration::from_secs(u64::from(self.duration_minutes) * 60)
    }

    /// Whether `user_id` is the organizer of this match.
    pub fn is_organizer(&self, user_id: Uuid) -> bool {
        self.organizer_id == user_id
    }
}

/// Lifecycle status of a join request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JoinRequestStatus {
    Pending,
    Approved,
    Rejected,
    RedCarded,
    Withdrawn,
}

impl JoinRequestStatus {
    /// Pending and approved requests block a second request for the same match.
    pub fn is_active(&self) -> bool {
        matches!(self, JoinRequestStatus::Pending | JoinRequestStatus::Approved)
    }

    /// Only approved requests occupy a roster seat.
    pub fn holds_seat(&self) -> bool {
        matches!(self, JoinRequestStatus::Approved)
    }

    /// Stable lowercase identifier used in persistence filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinRequestStatus::Pending => "pending",
            JoinRequestStatus::Approved => "approved",
            JoinRequestStatus::Rejected => "rejected",
            JoinRequestStatus::RedCarded => "red_carded",
            JoinRequestStatus::Withdrawn => "withdrawn",
        }
    }
}

/// A user's application for a seat in a match. Never deleted, only transitioned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinRequestEntity {
    pub id: Uuid,
    pub match_id: Uuid,
    pub user_id: Uuid,
    pub status: JoinRequestStatus,
    /// Free-form mood tag chosen by the requester.
    pub mood: Option<String>,
    pub created_at: SystemTime,
    /// Set when the request last left the pending state.
    pub reviewed_at: Option<SystemTime>,
    /// User who performed the last review (organizer, or the requester when withdrawing).
    pub reviewed_by: Option<Uuid>,
}

/// Web-push subscription of one device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushSubscriptionEntity {
    pub user_id: Uuid,
    /// Device endpoint, unique across all subscriptions.
    pub endpoint: String,
    /// Client public key (`p256dh`).
    pub public_key: String,
    /// Client auth secret.
    pub auth_secret: String,
    pub updated_at: SystemTime,
}

/// Closed set of notification events, each with its own payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    JoinRequested {
        match_id: Uuid,
        request_id: Uuid,
        requester_id: Uuid,
    },
    RequestApproved {
        match_id: Uuid,
        request_id: Uuid,
    },
    RequestRejected {
        match_id: Uuid,
        request_id: Uuid,
    },
    PlayerJoined {
        match_id: Uuid,
        player_id: Uuid,
    },
    RedCarded {
        match_id: Uuid,
        red_cards: u32,
    },
    RequestWithdrawn {
        match_id: Uuid,
        player_id: Uuid,
    },
    SpotTransferred {
        match_id: Uuid,
        from_user_id: Uuid,
        to_user_id: Uuid,
    },
    MatchUpdated {
        match_id: Uuid,
    },
    MatchCancelled {
        match_id: Uuid,
        club_id: String,
    },
    SosAlert {
        match_id: Uuid,
        club_id: String,
        level: MatchLevel,
    },
    ChatMessage {
        match_id: Uuid,
        message_id: Uuid,
        sender_id: Uuid,
    },
    MatchEndingSoon {
        match_id: Uuid,
        minutes_left: u32,
    },
    MatchEnded {
        match_id: Uuid,
    },
}

impl NotificationKind {
    /// Wire tag of the event, identical to the serialized `type` field.
    pub fn tag(&self) -> &'static str {
        match self {
            NotificationKind::JoinRequested { .. } => "join_requested",
            NotificationKind::RequestApproved { .. } => "request_approved",
            NotificationKind::RequestRejected { .. } => "request_rejected",
            NotificationKind::PlayerJoined { .. } => "player_joined",
            NotificationKind::RedCarded { .. } => "red_carded",
            NotificationKind::RequestWithdrawn { .. } => "request_withdrawn",
            NotificationKind::SpotTransferred { .. } => "spot_transferred",
            NotificationKind::MatchUpdated { .. } => "match_updated",
            NotificationKind::MatchCancelled { .. } => "match_cancelled",
            NotificationKind::SosAlert { .. } => "sos_alert",
            NotificationKind::ChatMessage { .. } => "chat_message",
            NotificationKind::MatchEndingSoon { .. } => "match_ending_soon",
            NotificationKind::MatchEnded { .. } => "match_ended",
        }
    }

    /// Match the event refers to.
    pub fn match_id(&self) -> Uuid {
        match self {
            NotificationKind::JoinRequested { match_id, .. }
            | NotificationKind::RequestApproved { match_id, .. }
            | NotificationKind::RequestRejected { match_id, .. }
            | NotificationKind::PlayerJoined { match_id, .. }
            | NotificationKind::RedCarded { match_id, .. }
            | NotificationKind::RequestWithdrawn { match_id, .. }
            | NotificationKind::SpotTransferred { match_id, .. }
            | NotificationKind::MatchUpdated { match_id }
            | NotificationKind::MatchCancelled { match_id, .. }
            | NotificationKind::SosAlert { match_id, .. }
            | NotificationKind::ChatMessage { match_id, .. }
            | NotificationKind::MatchEndingSoon { match_id, .. }
            | NotificationKind::MatchEnded { match_id } => *match_id,
        }
    }

    /// Deep link opened when the notification is clicked.
    pub fn url(&self) -> String {
        match self {
            NotificationKind::ChatMessage { match_id, .. } => format!("/matches/{match_id}/chat"),
            NotificationKind::MatchCancelled { .. } => "/matches".to_string(),
            other => format!("/matches/{}", other.match_id()),
        }
    }

    /// Urgent events are delivered with high push priority.
    pub fn is_urgent(&self) -> bool {
        matches!(
            self,
            NotificationKind::SosAlert { .. } | NotificationKind::MatchCancelled { .. }
        )
    }
}

/// In-app notification row; the source of truth for the notification center.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationEntity {
    pub id: Uuid,
    /// Recipient.
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub clicked: bool,
    pub created_at: SystemTime,
}

/// Append-only chat line of a match channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessageEntity {
    pub id: Uuid,
    pub match_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    pub created_at: SystemTime,
}

/// Per-user settings and penalty counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerProfileEntity {
    pub user_id: Uuid,
    pub display_name: Option<String>,
    /// Whether the user wants to receive SOS broadcasts.
    pub sos_opt_in: bool,
    /// Number of red cards received after no-shows.
    pub red_cards: u32,
    pub updated_at: SystemTime,
}

impl PlayerProfileEntity {
    /// Blank profile used when a user is referenced before configuring anything.
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            display_name: None,
            sos_opt_in: false,
            red_cards: 0,
            updated_at: SystemTime::now(),
        }
    }
}

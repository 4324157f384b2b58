use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::dao::models::{
    ChatMessageEntity, JoinRequestEntity, JoinRequestStatus, MatchEntity, MatchLevel,
    NotificationEntity, NotificationKind, PlayerProfileEntity, PushSubscriptionEntity,
};

pub const MATCHES: &str = "matches";
pub const JOIN_REQUESTS: &str = "join_requests";
pub const PUSH_SUBSCRIPTIONS: &str = "push_subscriptions";
pub const NOTIFICATIONS: &str = "notifications";
pub const MESSAGES: &str = "chat_messages";
pub const PROFILES: &str = "player_profiles";

/// Identifiers are stored as hyphenated strings so filters stay readable in the shell.
pub fn key(id: Uuid) -> String {
    id.to_string()
}

fn parse_key(collection: &'static str, raw: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(raw).map_err(|err| MongoDaoError::Corrupted {
        collection,
        message: format!("invalid identifier `{raw}`: {err}"),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub club_id: String,
    pub starts_at: DateTime,
    pub duration_minutes: i32,
    pub level: MatchLevel,
    pub organizer_id: String,
    pub price_per_player_cents: Option<i64>,
    pub players_needed: i32,
    pub sos_active: bool,
    /// Approved requests, maintained by the request writes for seat compare-and-set.
    #[serde(default)]
    pub approved_count: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl MatchDocument {
    pub fn new(entity: &MatchEntity) -> Self {
        Self {
            id: key(entity.id),
            club_id: entity.club_id.clone(),
            starts_at: DateTime::from_system_time(entity.starts_at),
            duration_minutes: i32::from(entity.duration_minutes),
            level: entity.level,
            organizer_id: key(entity.organizer_id),
            price_per_player_cents: entity.price_per_player_cents.map(i64::from),
            players_needed: i32::from(entity.players_needed),
            sos_active: entity.sos_active,
            approved_count: 0,
            created_at: DateTime::from_system_time(entity.created_at),
            updated_at: DateTime::from_system_time(entity.updated_at),
        }
    }

    pub fn into_entity(self) -> MongoResult<MatchEntity> {
        let corrupted = |message: String| MongoDaoError::Corrupted {
            collection: MATCHES,
            message,
        };
        Ok(MatchEntity {
            id: parse_key(MATCHES, &self.id)?,
            club_id: self.club_id,
            starts_at: self.starts_at.to_system_time(),
            duration_minutes: u16::try_from(self.duration_minutes)
                .map_err(|_| corrupted(format!("duration {}", self.duration_minutes)))?,
            level: self.level,
            organizer_id: parse_key(MATCHES, &self.organizer_id)?,
            price_per_player_cents: self
                .price_per_player_cents
                .map(u32::try_from)
                .transpose()
                .map_err(|_| corrupted("negative price".into()))?,
            players_needed: u8::try_from(self.players_needed)
                .map_err(|_| corrupted(format!("players needed {}", self.players_needed)))?,
            sos_active: self.sos_active,
            created_at: self.created_at.to_system_time(),
            updated_at: self.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequestDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub match_id: String,
    pub user_id: String,
    pub status: JoinRequestStatus,
    /// Mirrors `status.is_active()`; the partial unique index is built on it.
    pub active: bool,
    pub mood: Option<String>,
    pub created_at: DateTime,
    pub reviewed_at: Option<DateTime>,
    pub reviewed_by: Option<String>,
}

impl From<&JoinRequestEntity> for JoinRequestDocument {
    fn from(entity: &JoinRequestEntity) -> Self {
        Self {
            id: key(entity.id),
            match_id: key(entity.match_id),
            user_id: key(entity.user_id),
            status: entity.status,
            active: entity.status.is_active(),
            mood: entity.mood.clone(),
            created_at: DateTime::from_system_time(entity.created_at),
            reviewed_at: entity.reviewed_at.map(DateTime::from_system_time),
            reviewed_by: entity.reviewed_by.map(key),
        }
    }
}

impl TryFrom<JoinRequestDocument> for JoinRequestEntity {
    type Error = MongoDaoError;

    fn try_from(document: JoinRequestDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_key(JOIN_REQUESTS, &document.id)?,
            match_id: parse_key(JOIN_REQUESTS, &document.match_id)?,
            user_id: parse_key(JOIN_REQUESTS, &document.user_id)?,
            status: document.status,
            mood: document.mood,
            created_at: document.created_at.to_system_time(),
            reviewed_at: document.reviewed_at.map(|at| at.to_system_time()),
            reviewed_by: document
                .reviewed_by
                .map(|raw| parse_key(JOIN_REQUESTS, &raw))
                .transpose()?,
        })
    }
}

/// Keyed by endpoint, which is unique across users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscriptionDocument {
    #[serde(rename = "_id")]
    pub endpoint: String,
    pub user_id: String,
    pub public_key: String,
    pub auth_secret: String,
    pub updated_at: DateTime,
}

impl From<&PushSubscriptionEntity> for PushSubscriptionDocument {
    fn from(entity: &PushSubscriptionEntity) -> Self {
        Self {
            endpoint: entity.endpoint.clone(),
            user_id: key(entity.user_id),
            public_key: entity.public_key.clone(),
            auth_secret: entity.auth_secret.clone(),
            updated_at: DateTime::from_system_time(entity.updated_at),
        }
    }
}

impl TryFrom<PushSubscriptionDocument> for PushSubscriptionEntity {
    type Error = MongoDaoError;

    fn try_from(document: PushSubscriptionDocument) -> MongoResult<Self> {
        Ok(Self {
            user_id: parse_key(PUSH_SUBSCRIPTIONS, &document.user_id)?,
            endpoint: document.endpoint,
            public_key: document.public_key,
            auth_secret: document.auth_secret,
            updated_at: document.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub clicked: bool,
    pub created_at: DateTime,
}

impl From<&NotificationEntity> for NotificationDocument {
    fn from(entity: &NotificationEntity) -> Self {
        Self {
            id: key(entity.id),
            user_id: key(entity.user_id),
            kind: entity.kind.clone(),
            title: entity.title.clone(),
            body: entity.body.clone(),
            read: entity.read,
            clicked: entity.clicked,
            created_at: DateTime::from_system_time(entity.created_at),
        }
    }
}

impl TryFrom<NotificationDocument> for NotificationEntity {
    type Error = MongoDaoError;

    fn try_from(document: NotificationDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_key(NOTIFICATIONS, &document.id)?,
            user_id: parse_key(NOTIFICATIONS, &document.user_id)?,
            kind: document.kind,
            title: document.title,
            body: document.body,
            read: document.read,
            clicked: document.clicked,
            created_at: document.created_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub match_id: String,
    pub sender_id: String,
    pub text: String,
    pub created_at: DateTime,
}

impl From<&ChatMessageEntity> for MessageDocument {
    fn from(entity: &ChatMessageEntity) -> Self {
        Self {
            id: key(entity.id),
            match_id: key(entity.match_id),
            sender_id: key(entity.sender_id),
            text: entity.text.clone(),
            created_at: DateTime::from_system_time(entity.created_at),
        }
    }
}

impl TryFrom<MessageDocument> for ChatMessageEntity {
    type Error = MongoDaoError;

    fn try_from(document: MessageDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_key(MESSAGES, &document.id)?,
            match_id: parse_key(MESSAGES, &document.match_id)?,
            sender_id: parse_key(MESSAGES, &document.sender_id)?,
            text: document.text,
            created_at: document.created_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDocument {
    #[serde(rename = "_id")]
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub sos_opt_in: bool,
    #[serde(default)]
    pub red_cards: i64,
    pub updated_at: DateTime,
}

impl From<&PlayerProfileEntity> for ProfileDocument {
    fn from(entity: &PlayerProfileEntity) -> Self {
        Self {
            user_id: key(entity.user_id),
            display_name: entity.display_name.clone(),
            sos_opt_in: entity.sos_opt_in,
            red_cards: i64::from(entity.red_cards),
            updated_at: DateTime::from_system_time(entity.updated_at),
        }
    }
}

impl TryFrom<ProfileDocument> for PlayerProfileEntity {
    type Error = MongoDaoError;

    fn try_from(document: ProfileDocument) -> MongoResult<Self> {
        Ok(Self {
            user_id: parse_key(PROFILES, &document.user_id)?,
            display_name: document.display_name,
            sos_opt_in: document.sos_opt_in,
            red_cards: u32::try_from(document.red_cards).map_err(|_| MongoDaoError::Corrupted {
                collection: PROFILES,
                message: format!("red card counter {}", document.red_cards),
            })?,
            updated_at: document.updated_at.to_system_time(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    #[test]
    fn request_documents_track_the_active_flag() {
        let mut entity = JoinRequestEntity {
            id: Uuid::new_v4(),
            match_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: JoinRequestStatus::Pending,
            mood: Some("chill".into()),
            created_at: SystemTime::now(),
            reviewed_at: None,
            reviewed_by: None,
        };
        assert!(JoinRequestDocument::from(&entity).active);

        entity.status = JoinRequestStatus::Withdrawn;
        entity.reviewed_by = Some(entity.user_id);
        let document = JoinRequestDocument::from(&entity);
        assert!(!document.active);
        assert_eq!(document.match_id, entity.match_id.to_string());

        let restored = JoinRequestEntity::try_from(document).unwrap();
        assert_eq!(restored.reviewed_by, Some(entity.user_id));
        assert_eq!(restored.status, JoinRequestStatus::Withdrawn);
    }

    #[test]
    fn malformed_identifiers_are_reported_as_corruption() {
        let document = MessageDocument {
            id: "not-a-uuid".into(),
            match_id: Uuid::new_v4().to_string(),
            sender_id: Uuid::new_v4().to_string(),
            text: "hola".into(),
            created_at: DateTime::now(),
        };
        let err = ChatMessageEntity::try_from(document).unwrap_err();
        assert!(matches!(
            err,
            MongoDaoError::Corrupted {
                collection: MESSAGES,
                ..
            }
        ));
    }
}

//! DTO definitions of the notification center and push subscription endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{NotificationEntity, NotificationKind},
    dto::{format_system_time, validation::validate_not_blank},
};

/// Query string of `GET /notifications`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
}

/// A notification row as shown in the notification center.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NotificationView {
    pub id: Uuid,
    /// Typed event payload, tagged by `type`.
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    /// Deep link opened on click.
    pub url: String,
    pub read: bool,
    pub clicked: bool,
    pub created_at: String,
}

impl From<&NotificationEntity> for NotificationView {
    fn from(entity: &NotificationEntity) -> Self {
        Self {
            id: entity.id,
            kind: entity.kind.clone(),
            title: entity.title.clone(),
            body: entity.body.clone(),
            url: entity.kind.url(),
            read: entity.read,
            clicked: entity.clicked,
            created_at: format_system_time(entity.created_at),
        }
    }
}

/// Result of `POST /notifications/read-all`.
#[derive(Debug, Serialize, ToSchema)]
pub struct MarkAllReadResponse {
    /// Rows that were unread before the call.
    pub updated: u64,
}

/// Browser push subscription as produced by the Push API.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PushSubscriptionRequest {
    #[validate(url)]
    pub endpoint: String,
    #[validate(nested)]
    pub keys: PushSubscriptionKeys,
}

/// Encryption material of a push subscription.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PushSubscriptionKeys {
    #[validate(custom(function = "validate_not_blank"))]
    pub p256dh: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub auth: String,
}

/// Payload of `DELETE /push/subscriptions`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UnsubscribeRequest {
    #[validate(length(min = 1))]
    pub endpoint: String,
}

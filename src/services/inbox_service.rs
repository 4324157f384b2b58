//! Notification center: the recipient reads, flags and deletes their own rows.

use uuid::Uuid;

use crate::{
    dao::record_store::NotificationFlags,
    dto::notifications::{MarkAllReadResponse, NotificationView},
    error::ServiceError,
    state::SharedState,
};

/// Notifications of `actor`, newest first.
pub async fn list(
    state: &SharedState,
    actor: Uuid,
    unread_only: bool,
) -> Result<Vec<NotificationView>, ServiceError> {
    let store = state.require_store().await?;
    Ok(store
        .list_notifications(actor, unread_only)
        .await?
        .iter()
        .map(NotificationView::from)
        .collect())
}

pub async fn mark_read(
    state: &SharedState,
    actor: Uuid,
    notification_id: Uuid,
) -> Result<NotificationView, ServiceError> {
    raise(
        state,
        actor,
        notification_id,
        NotificationFlags {
            read: true,
            clicked: false,
        },
    )
    .await
}

/// Record a click, which also marks the row as read.
pub async fn mark_clicked(
    state: &SharedState,
    actor: Uuid,
    notification_id: Uuid,
) -> Result<NotificationView, ServiceError> {
    raise(
        state,
        actor,
        notification_id,
        NotificationFlags {
            read: true,
            clicked: true,
        },
    )
    .await
}

pub async fn mark_all_read(
    state: &SharedState,
    actor: Uuid,
) -> Result<MarkAllReadResponse, ServiceError> {
    let store = state.require_store().await?;
    let updated = store.mark_all_notifications_read(actor).await?;
    Ok(MarkAllReadResponse { updated })
}

pub async fn delete(
    state: &SharedState,
    actor: Uuid,
    notification_id: Uuid,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    if store.delete_notification(notification_id, actor).await? {
        Ok(())
    } else {
        Err(not_found(notification_id))
    }
}

async fn raise(
    state: &SharedState,
    actor: Uuid,
    notification_id: Uuid,
    flags: NotificationFlags,
) -> Result<NotificationView, ServiceError> {
    let store = state.require_store().await?;
    store
        .raise_notification_flags(notification_id, actor, flags)
        .await?
        .map(|row| NotificationView::from(&row))
        .ok_or_else(|| not_found(notification_id))
}

// Rows of other users are reported as missing.
fn not_found(notification_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("notification `{notification_id}`"))
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::SystemTime};

    use super::*;
    use crate::{
        dao::models::{NotificationEntity, NotificationKind},
        services::notification_service::tests::RecordingTransport,
        state::tests::memory_state,
    };

    fn row(user_id: Uuid) -> NotificationEntity {
        NotificationEntity {
            id: Uuid::new_v4(),
            user_id,
            kind: NotificationKind::MatchEnded {
                match_id: Uuid::new_v4(),
            },
            title: "Match finished".into(),
            body: "gg".into(),
            read: false,
            clicked: false,
            created_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn click_marks_read_and_foreign_rows_are_hidden() {
        let state = memory_state(Arc::new(RecordingTransport::default())).await;
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let first = row(owner);
        let second = row(owner);
        state
            .require_store()
            .await
            .unwrap()
            .insert_notifications(vec![first.clone(), second.clone()])
            .await
            .unwrap();

        assert!(matches!(
            mark_clicked(&state, stranger, first.id).await,
            Err(ServiceError::NotFound(_))
        ));
        let clicked = mark_clicked(&state, owner, first.id).await.unwrap();
        assert!(clicked.read && clicked.clicked);

        let unread = list(&state, owner, true).await.unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, second.id);

        assert_eq!(mark_all_read(&state, owner).await.unwrap().updated, 1);
        assert!(list(&state, owner, true).await.unwrap().is_empty());

        assert!(matches!(
            delete(&state, stranger, second.id).await,
            Err(ServiceError::NotFound(_))
        ));
        delete(&state, owner, second.id).await.unwrap();
        assert_eq!(list(&state, owner, false).await.unwrap().len(), 1);
    }
}

use std::time::SystemTime;

use uuid::Uuid;

use crate::{
    dao::models::PlayerProfileEntity,
    dto::profile::{ProfileView, UpdateProfileRequest},
    error::ServiceError,
    state::SharedState,
};

/// Profile of `actor`; users who never saved one get the defaults.
pub async fn get(state: &SharedState, actor: Uuid) -> Result<ProfileView, ServiceError> {
    let store = state.require_store().await?;
    let profile = store
        .find_profile(actor)
        .await?
        .unwrap_or_else(|| PlayerProfileEntity::new(actor));
    Ok(ProfileView::from(&profile))
}

/// Save the editable fields. The red-card counter is kept as stored.
pub async fn update(
    state: &SharedState,
    actor: Uuid,
    request: UpdateProfileRequest,
) -> Result<ProfileView, ServiceError> {
    let store = state.require_store().await?;
    let mut profile = store
        .find_profile(actor)
        .await?
        .unwrap_or_else(|| PlayerProfileEntity::new(actor));
    profile.display_name = request
        .display_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    profile.sos_opt_in = request.sos_opt_in;
    profile.updated_at = SystemTime::now();

    store.upsert_profile(profile.clone()).await?;
    Ok(ProfileView::from(&profile))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        services::notification_service::tests::RecordingTransport, state::tests::memory_state,
    };

    #[tokio::test]
    async fn updates_keep_the_red_card_counter() {
        let state = memory_state(Arc::new(RecordingTransport::default())).await;
        let user = Uuid::new_v4();
        let store = state.require_store().await.unwrap();
        store.increment_red_cards(user).await.unwrap();

        let view = update(
            &state,
            user,
            UpdateProfileRequest {
                display_name: Some(" Ana ".into()),
                sos_opt_in: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(view.display_name.as_deref(), Some("Ana"));
        assert_eq!(view.red_cards, 1);
        assert_eq!(store.list_sos_candidates().await.unwrap(), vec![user]);
    }

    #[tokio::test]
    async fn unknown_users_get_defaults() {
        let state = memory_state(Arc::new(RecordingTransport::default())).await;
        let view = get(&state, Uuid::new_v4()).await.unwrap();
        assert!(!view.sos_opt_in);
        assert_eq!(view.red_cards, 0);
    }
}

use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::PushSubscriptionEntity,
    dto::notifications::{PushSubscriptionRequest, UnsubscribeRequest},
    error::ServiceError,
    state::SharedState,
};

/// Register a device of `actor`. A known endpoint moves to the caller with a fresh
/// `updated_at`, which makes it the device that receives pushes.
pub async fn subscribe(
    state: &SharedState,
    actor: Uuid,
    request: PushSubscriptionRequest,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    store
        .upsert_push_subscription(PushSubscriptionEntity {
            user_id: actor,
            endpoint: request.endpoint,
            public_key: request.keys.p256dh,
            auth_secret: request.keys.auth,
            updated_at: SystemTime::now(),
        })
        .await?;
    info!(user_id = %actor, "push subscription registered");
    Ok(())
}

/// Forget one device of `actor`.
pub async fn unsubscribe(
    state: &SharedState,
    actor: Uuid,
    request: UnsubscribeRequest,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    if store
        .delete_push_subscription(request.endpoint, Some(actor))
        .await?
    {
        info!(user_id = %actor, "push subscription removed");
        Ok(())
    } else {
        Err(ServiceError::NotFound("push subscription".into()))
    }
}

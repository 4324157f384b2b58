use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::notifications::{
        ListNotificationsQuery, MarkAllReadResponse, NotificationView, PushSubscriptionRequest,
        UnsubscribeRequest,
    },
    error::AppError,
    routes::auth::ActingUser,
    services::{inbox_service, subscription_service},
    state::SharedState,
};

/// Notification center and push subscription endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/{id}", delete(delete_notification))
        .route("/notifications/{id}/read", post(mark_read))
        .route("/notifications/{id}/clicked", post(mark_clicked))
        .route("/push/subscriptions", post(subscribe).delete(unsubscribe))
}

/// Notifications of the caller, newest first.
#[utoipa::path(
    get,
    path = "/notifications",
    tag = "notifications",
    params(("X-User-Id" = String, Header, description = "Caller identity"), ListNotificationsQuery),
    responses((status = 200, description = "Notifications", body = [NotificationView]))
)]
pub async fn list_notifications(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<Vec<NotificationView>>, AppError> {
    Ok(Json(
        inbox_service::list(&state, actor, query.unread_only).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    tag = "notifications",
    params(("X-User-Id" = String, Header, description = "Caller identity"),
    ("id" = String, Path, description = "Notification identifier")),
    responses(
        (status = 200, description = "Notification marked as read", body = NotificationView),
        (status = 404, description = "Unknown notification")
    )
)]
pub async fn mark_read(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationView>, AppError> {
    Ok(Json(inbox_service::mark_read(&state, actor, id).await?))
}

/// Record that the caller opened the notification.
#[utoipa::path(
    post,
    path = "/notifications/{id}/clicked",
    tag = "notifications",
    params(("X-User-Id" = String, Header, description = "Caller identity"),
    ("id" = String, Path, description = "Notification identifier")),
    responses((status = 200, description = "Notification marked as clicked", body = NotificationView))
)]
pub async fn mark_clicked(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<NotificationView>, AppError> {
    Ok(Json(
        inbox_service::mark_clicked(&state, actor, id).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/notifications/read-all",
    tag = "notifications",
    params(("X-User-Id" = String, Header, description = "Caller identity")),
    responses((status = 200, description = "Unread notifications marked as read", body = MarkAllReadResponse))
)]
pub async fn mark_all_read(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
) -> Result<Json<MarkAllReadResponse>, AppError> {
    Ok(Json(inbox_service::mark_all_read(&state, actor).await?))
}

#[utoipa::path(
    delete,
    path = "/notifications/{id}",
    tag = "notifications",
    params(("X-User-Id" = String, Header, description = "Caller identity"),
    ("id" = String, Path, description = "Notification identifier")),
    responses((status = 204, description = "Notification deleted"))
)]
pub async fn delete_notification(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    inbox_service::delete(&state, actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Register the caller's device for push delivery.
#[utoipa::path(
    post,
    path = "/push/subscriptions",
    tag = "notifications",
    params(("X-User-Id" = String, Header, description = "Caller identity")),
    request_body = PushSubscriptionRequest,
    responses((status = 204, description = "Subscription stored"))
)]
pub async fn subscribe(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Valid(Json(payload)): Valid<Json<PushSubscriptionRequest>>,
) -> Result<StatusCode, AppError> {
    subscription_service::subscribe(&state, actor, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/push/subscriptions",
    tag = "notifications",
    params(("X-User-Id" = String, Header, description = "Caller identity")),
    request_body = UnsubscribeRequest,
    responses((status = 204, description = "Subscription removed"))
)]
pub async fn unsubscribe(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Valid(Json(payload)): Valid<Json<UnsubscribeRequest>>,
) -> Result<StatusCode, AppError> {
    subscription_service::unsubscribe(&state, actor, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

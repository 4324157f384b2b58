use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::requests::{
        JoinMatchRequest, JoinRequestView, ListRequestsQuery, RedCardRequest, TransferSpotRequest,
        TransferView,
    },
    error::AppError,
    routes::auth::ActingUser,
    services::join_service,
    state::SharedState,
};

/// Join request workflow: submit, review, withdraw, red card and transfer.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/matches/{id}/requests",
            get(list_requests).post(request_join),
        )
        .route("/matches/{id}/requests/mine", delete(cancel_own_request))
        .route("/matches/{id}/red-cards", post(red_card))
        .route("/matches/{id}/transfer", post(transfer_spot))
        .route("/requests/{id}/approve", post(approve))
        .route("/requests/{id}/reject", post(reject))
}

/// Ask to join a match.
#[utoipa::path(
    post,
    path = "/matches/{id}/requests",
    tag = "requests",
    params(("X-User-Id" = String, Header, description = "Caller identity"),
    ("id" = String, Path, description = "Match identifier")),
    request_body = JoinMatchRequest,
    responses(
        (status = 201, description = "Request submitted", body = JoinRequestView),
        (status = 409, description = "An active request already exists")
    )
)]
pub async fn request_join(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<JoinMatchRequest>>,
) -> Result<(StatusCode, Json<JoinRequestView>), AppError> {
    let view = join_service::request_join(&state, actor, id, payload).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Requests of a match. The organizer sees all of them, others only their own.
#[utoipa::path(
    get,
    path = "/matches/{id}/requests",
    tag = "requests",
    params(("X-User-Id" = String, Header, description = "Caller identity"),
    ("id" = String, Path, description = "Match identifier"),
    ListRequestsQuery),
    responses((status = 200, description = "Join requests", body = [JoinRequestView]))
)]
pub async fn list_requests(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
    Query(query): Query<ListRequestsQuery>,
) -> Result<Json<Vec<JoinRequestView>>, AppError> {
    Ok(Json(
        join_service::list_requests(&state, actor, id, query.status).await?,
    ))
}

/// Withdraw the caller's pending or approved request.
#[utoipa::path(
    delete,
    path = "/matches/{id}/requests/mine",
    tag = "requests",
    params(("X-User-Id" = String, Header, description = "Caller identity"),
    ("id" = String, Path, description = "Match identifier")),
    responses((status = 200, description = "Request withdrawn", body = JoinRequestView))
)]
pub async fn cancel_own_request(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<JoinRequestView>, AppError> {
    Ok(Json(
        join_service::cancel_own_request(&state, actor, id).await?,
    ))
}

/// Approve a pending request. Organizer only.
#[utoipa::path(
    post,
    path = "/requests/{id}/approve",
    tag = "requests",
    params(("X-User-Id" = String, Header, description = "Caller identity"),
    ("id" = String, Path, description = "Join request identifier")),
    responses(
        (status = 200, description = "Request approved", body = JoinRequestView),
        (status = 409, description = "Match is full or the request is no longer pending")
    )
)]
pub async fn approve(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<JoinRequestView>, AppError> {
    Ok(Json(join_service::approve(&state, actor, id).await?))
}

/// Reject a pending request. Organizer only.
#[utoipa::path(
    post,
    path = "/requests/{id}/reject",
    tag = "requests",
    params(("X-User-Id" = String, Header, description = "Caller identity"),
    ("id" = String, Path, description = "Join request identifier")),
    responses((status = 200, description = "Request rejected", body = JoinRequestView))
)]
pub async fn reject(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<JoinRequestView>, AppError> {
    Ok(Json(join_service::reject(&state, actor, id).await?))
}

/// Remove an approved player and count a red card against them. Organizer only.
#[utoipa::path(
    post,
    path = "/matches/{id}/red-cards",
    tag = "requests",
    params(("X-User-Id" = String, Header, description = "Caller identity"),
    ("id" = String, Path, description = "Match identifier")),
    request_body = RedCardRequest,
    responses((status = 200, description = "Player red-carded", body = JoinRequestView))
)]
pub async fn red_card(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RedCardRequest>,
) -> Result<Json<JoinRequestView>, AppError> {
    Ok(Json(
        join_service::red_card(&state, actor, id, payload.user_id).await?,
    ))
}

/// Hand a seat over to another player.
#[utoipa::path(
    post,
    path = "/matches/{id}/transfer",
    tag = "requests",
    params(("X-User-Id" = String, Header, description = "Caller identity"),
    ("id" = String, Path, description = "Match identifier")),
    request_body = TransferSpotRequest,
    responses((status = 200, description = "Seat transferred", body = TransferView))
)]
pub async fn transfer_spot(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransferSpotRequest>,
) -> Result<Json<TransferView>, AppError> {
    Ok(Json(
        join_service::transfer_spot(&state, actor, id, payload).await?,
    ))
}

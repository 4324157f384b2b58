use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::matches::{
        CreateMatchRequest, ListMatchesQuery, MatchDetails, SosResponse, UpdateMatchRequest,
    },
    error::AppError,
    routes::auth::ActingUser,
    services::match_service,
    state::SharedState,
};

/// Match lifecycle endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches", get(list_matches).post(create_match))
        .route(
            "/matches/{id}",
            get(get_match).put(update_match).delete(delete_match),
        )
        .route("/matches/{id}/sos", post(trigger_sos).delete(clear_sos))
}

/// List matches ordered by start time.
#[utoipa::path(
    get,
    path = "/matches",
    tag = "matches",
    params(ListMatchesQuery),
    responses((status = 200, description = "Matches with their capacity", body = [MatchDetails]))
)]
pub async fn list_matches(
    State(state): State<SharedState>,
    Query(query): Query<ListMatchesQuery>,
) -> Result<Json<Vec<MatchDetails>>, AppError> {
    Ok(Json(
        match_service::list_matches(&state, query.upcoming_only).await?,
    ))
}

/// Create a match organized by the caller.
#[utoipa::path(
    post,
    path = "/matches",
    tag = "matches",
    params(("X-User-Id" = String, Header, description = "Caller identity")),
    request_body = CreateMatchRequest,
    responses(
        (status = 201, description = "Match created", body = MatchDetails),
        (status = 400, description = "Invalid match data")
    )
)]
pub async fn create_match(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Valid(Json(payload)): Valid<Json<CreateMatchRequest>>,
) -> Result<(StatusCode, Json<MatchDetails>), AppError> {
    let details = match_service::create_match(&state, actor, payload).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// Retrieve a match with its capacity and roster.
#[utoipa::path(
    get,
    path = "/matches/{id}",
    tag = "matches",
    params(("id" = String, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match", body = MatchDetails),
        (status = 404, description = "Unknown match")
    )
)]
pub async fn get_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchDetails>, AppError> {
    Ok(Json(match_service::get_match(&state, id).await?))
}

/// Edit a match. Organizer only.
#[utoipa::path(
    put,
    path = "/matches/{id}",
    tag = "matches",
    params(("X-User-Id" = String, Header, description = "Caller identity"),
    ("id" = String, Path, description = "Match identifier")),
    request_body = UpdateMatchRequest,
    responses(
        (status = 200, description = "Match updated", body = MatchDetails),
        (status = 403, description = "Caller is not the organizer")
    )
)]
pub async fn update_match(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<UpdateMatchRequest>>,
) -> Result<Json<MatchDetails>, AppError> {
    Ok(Json(
        match_service::update_match(&state, actor, id, payload).await?,
    ))
}

/// Delete a match and notify its players. Organizer only.
#[utoipa::path(
    delete,
    path = "/matches/{id}",
    tag = "matches",
    params(("X-User-Id" = String, Header, description = "Caller identity"),
    ("id" = String, Path, description = "Match identifier")),
    responses((status = 204, description = "Match deleted"))
)]
pub async fn delete_match(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    match_service::delete_match(&state, actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Broadcast an SOS to opted-in players. Organizer only.
#[utoipa::path(
    post,
    path = "/matches/{id}/sos",
    tag = "matches",
    params(("X-User-Id" = String, Header, description = "Caller identity"),
    ("id" = String, Path, description = "Match identifier")),
    responses((status = 200, description = "SOS raised", body = SosResponse))
)]
pub async fn trigger_sos(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SosResponse>, AppError> {
    Ok(Json(match_service::trigger_sos(&state, actor, id).await?))
}

/// Lower the SOS flag. Organizer only.
#[utoipa::path(
    delete,
    path = "/matches/{id}/sos",
    tag = "matches",
    params(("X-User-Id" = String, Header, description = "Caller identity"),
    ("id" = String, Path, description = "Match identifier")),
    responses((status = 200, description = "SOS cleared", body = MatchDetails))
)]
pub async fn clear_sos(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchDetails>, AppError> {
    Ok(Json(match_service::clear_sos(&state, actor, id).await?))
}

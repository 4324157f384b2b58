use axum::{Json, Router, extract::State, routing::get};
use axum_valid::Valid;

use crate::{
    dto::profile::{ProfileView, UpdateProfileRequest},
    error::AppError,
    routes::auth::ActingUser,
    services::profile_service,
    state::SharedState,
};

/// Profile of the calling player.
pub fn router() -> Router<SharedState> {
    Router::new().route("/profile", get(get_profile).put(update_profile))
}

#[utoipa::path(
    get,
    path = "/profile",
    tag = "profile",
    params(("X-User-Id" = String, Header, description = "Caller identity")),
    responses((status = 200, description = "Caller profile", body = ProfileView))
)]
pub async fn get_profile(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
) -> Result<Json<ProfileView>, AppError> {
    Ok(Json(profile_service::get(&state, actor).await?))
}

/// Save the display name and SOS opt-in of the caller.
#[utoipa::path(
    put,
    path = "/profile",
    tag = "profile",
    params(("X-User-Id" = String, Header, description = "Caller identity")),
    request_body = UpdateProfileRequest,
    responses((status = 200, description = "Profile saved", body = ProfileView))
)]
pub async fn update_profile(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Valid(Json(payload)): Valid<Json<UpdateProfileRequest>>,
) -> Result<Json<ProfileView>, AppError> {
    Ok(Json(
        profile_service::update(&state, actor, payload).await?,
    ))
}

use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError,
    services::{match_service, realtime_service},
    state::{SharedState, realtime::StreamKind},
};

#[utoipa::path(
    get,
    path = "/sse/matches",
    tag = "realtime",
    responses((status = 200, description = "Match list changes", content_type = "text/event-stream", body = String))
)]
/// Stream creations, edits and deletions of matches.
pub async fn match_list_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    open(state, StreamKind::MatchList)
}

#[utoipa::path(
    get,
    path = "/sse/matches/{id}",
    tag = "realtime",
    params(("id" = String, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Changes touching one match", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown match")
    )
)]
/// Stream every change touching one match: the match itself, its requests and its chat.
pub async fn match_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if let Some(store) = state.store().await {
        match_service::load_match(store.as_ref(), id).await?;
    }
    Ok(open(state, StreamKind::Match(id)))
}

fn open(
    state: SharedState,
    kind: StreamKind,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // subscribe before the handshake so no change slips between the two
    let receiver = state.realtime().subscribe();
    info!(stream = kind.label(), "new SSE connection");
    let greeting = realtime_service::handshake(kind, state.is_degraded());
    realtime_service::to_sse_stream(receiver, kind, greeting)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/matches", get(match_list_stream))
        .route("/sse/matches/{id}", get(match_stream))
}

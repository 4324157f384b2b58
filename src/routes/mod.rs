use axum::Router;

use crate::state::SharedState;

pub mod auth;
pub mod chat;
pub mod docs;
pub mod health;
pub mod matches;
pub mod notifications;
pub mod profile;
pub mod realtime;
pub mod requests;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(matches::router())
        .merge(requests::router())
        .merge(chat::router())
        .merge(notifications::router())
        .merge(profile::router())
        .merge(realtime::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use time::{OffsetDateTime, format_description::well_known::Rfc3339};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::AppConfig,
        services::notification_service::tests::RecordingTransport,
        state::{AppState, tests::memory_state},
    };

    async fn send(
        app: &Router<()>,
        method: &str,
        uri: &str,
        user: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(auth::USER_ID_HEADER, user.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn match_body() -> Value {
        let starts_at = (OffsetDateTime::now_utc() + time::Duration::hours(3))
            .format(&Rfc3339)
            .unwrap();
        json!({
            "club_id": "club-42",
            "starts_at": starts_at,
            "duration_minutes": 90,
            "level": "Intermediate",
        })
    }

    #[tokio::test]
    async fn healthcheck_reports_degraded_without_store() {
        let state = AppState::new(
            AppConfig::default(),
            Arc::new(RecordingTransport::default()),
        );
        let app = router(state);

        let (status, body) = send(&app, "GET", "/healthcheck", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");

        let (status, _) = send(&app, "GET", "/matches", None, None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn mutating_routes_require_identity() {
        let app = router(memory_state(Arc::new(RecordingTransport::default())).await);

        let (status, _) = send(&app, "POST", "/matches", None, Some(match_body())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut builder = Request::builder().method("GET").uri("/profile");
        builder = builder.header(auth::USER_ID_HEADER, "not-a-uuid");
        let response = app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_match_payload_is_rejected() {
        let app = router(memory_state(Arc::new(RecordingTransport::default())).await);
        let mut body = match_body();
        body["duration_minutes"] = json!(10);

        let (status, _) = send(&app, "POST", "/matches", Some(Uuid::new_v4()), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn join_flow_over_http() {
        let app = router(memory_state(Arc::new(RecordingTransport::default())).await);
        let organizer = Uuid::new_v4();
        let player = Uuid::new_v4();

        let (status, created) =
            send(&app, "POST", "/matches", Some(organizer), Some(match_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["capacity"]["occupied"], 1);
        let match_id = created["id"].as_str().unwrap().to_string();

        let requests_uri = format!("/matches/{match_id}/requests");
        let (status, request) =
            send(&app, "POST", &requests_uri, Some(player), Some(json!({}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(request["status"], "pending");

        let (status, conflict) =
            send(&app, "POST", &requests_uri, Some(player), Some(json!({}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(conflict["existing_request_id"], request["id"]);

        let approve_uri = format!("/requests/{}/approve", request["id"].as_str().unwrap());
        let (status, _) = send(&app, "POST", &approve_uri, Some(player), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, approved) = send(&app, "POST", &approve_uri, Some(organizer), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["status"], "approved");

        let (status, details) =
            send(&app, "GET", &format!("/matches/{match_id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(details["capacity"]["occupied"], 2);
        assert_eq!(details["roster"].as_array().unwrap().len(), 2);

        let chat_uri = format!("/matches/{match_id}/messages");
        let (status, _) = send(&app, "POST", &chat_uri, Some(player), Some(json!({"text": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) =
            send(&app, "POST", &chat_uri, Some(player), Some(json!({"text": "see you"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, history) = send(&app, "GET", &chat_uri, Some(organizer), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_match_stream_is_not_found() {
        let app = router(memory_state(Arc::new(RecordingTransport::default())).await);
        let (status, _) = send(
            &app,
            "GET",
            &format!("/sse/matches/{}", Uuid::new_v4()),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: &'static str,
    /// Connected SSE clients.
    pub realtime_subscribers: usize,
    /// End-of-match reminders waiting to fire.
    pub pending_reminders: usize,
}

impl HealthResponse {
    pub fn new(degraded: bool, realtime_subscribers: usize, pending_reminders: usize) -> Self {
        Self {
            status: if degraded { "degraded" } else { "ok" },
            realtime_subscribers,
            pending_reminders,
        }
    }
}

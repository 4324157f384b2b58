/// Chat channel of a match.
pub mod chat_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Notification center of the calling user.
pub mod inbox_service;
/// Join request workflow.
pub mod join_service;
/// Match lifecycle, SOS and end-of-match reminders.
pub mod match_service;
/// Persist-then-push notification fan-out.
pub mod notification_service;
/// Player profiles.
pub mod profile_service;
/// Delivery of push payloads to devices.
pub mod push_transport;
/// Change feed to SSE propagation.
pub mod realtime_service;
/// Record store supervision with reconnect and degraded mode.
pub mod storage_supervisor;
/// Push subscription registration.
pub mod subscription_service;

use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for the padel match backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::matches::list_matches,
        crate::routes::matches::create_match,
        crate::routes::matches::get_match,
        crate::routes::matches::update_match,
        crate::routes::matches::delete_match,
        crate::routes::matches::trigger_sos,
        crate::routes::matches::clear_sos,
        crate::routes::requests::request_join,
        crate::routes::requests::list_requests,
        crate::routes::requests::cancel_own_request,
        crate::routes::requests::approve,
        crate::routes::requests::reject,
        crate::routes::requests::red_card,
        crate::routes::requests::transfer_spot,
        crate::routes::chat::send_message,
        crate::routes::chat::list_messages,
        crate::routes::notifications::list_notifications,
        crate::routes::notifications::mark_read,
        crate::routes::notifications::mark_clicked,
        crate::routes::notifications::mark_all_read,
        crate::routes::notifications::delete_notification,
        crate::routes::notifications::subscribe,
        crate::routes::notifications::unsubscribe,
        crate::routes::profile::get_profile,
        crate::routes::profile::update_profile,
        crate::routes::realtime::match_list_stream,
        crate::routes::realtime::match_stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::matches::CreateMatchRequest,
            crate::dto::matches::UpdateMatchRequest,
            crate::dto::matches::MatchView,
            crate::dto::matches::MatchDetails,
            crate::dto::matches::SosResponse,
            crate::dto::requests::JoinMatchRequest,
            crate::dto::requests::JoinRequestView,
            crate::dto::requests::RedCardRequest,
            crate::dto::requests::TransferSpotRequest,
            crate::dto::requests::TransferView,
            crate::dto::chat::SendMessageRequest,
            crate::dto::chat::ChatMessageView,
            crate::dto::notifications::NotificationView,
            crate::dto::notifications::MarkAllReadResponse,
            crate::dto::notifications::PushSubscriptionRequest,
            crate::dto::notifications::PushSubscriptionKeys,
            crate::dto::notifications::UnsubscribeRequest,
            crate::dto::profile::UpdateProfileRequest,
            crate::dto::profile::ProfileView,
            crate::dto::realtime::Handshake,
            crate::dto::realtime::RecordRemovedEvent,
            crate::state::capacity::CapacityView,
            crate::dao::models::MatchLevel,
            crate::dao::models::JoinRequestStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "matches", description = "Match lifecycle and SOS broadcasts"),
        (name = "requests", description = "Join requests, red cards and seat transfers"),
        (name = "chat", description = "Per-match chat"),
        (name = "notifications", description = "Notification center and push subscriptions"),
        (name = "profile", description = "Player profile"),
        (name = "realtime", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;

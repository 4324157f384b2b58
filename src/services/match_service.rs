//! Match coordinator: create, edit, delete and SOS operations plus the derived roster.

use std::{
    sync::{Arc, Weak},
    time::{Duration, SystemTime},
};

use indexmap::IndexSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{JoinRequestStatus, MatchEntity, MatchLevel, NotificationKind},
        record_store::RecordStore,
    },
    dto::{
        matches::{CreateMatchRequest, MatchDetails, MatchView, SosResponse, UpdateMatchRequest},
        validation::parse_level,
    },
    error::ServiceError,
    services::notification_service::Notice,
    state::{
        AppState, SharedState,
        capacity::CapacityView,
        reminders::{ReminderKind, ReminderSignature},
    },
};

const MIN_PLAYERS_NEEDED: u8 = 2;
const MAX_PLAYERS_NEEDED: u8 = 8;
const DEFAULT_PLAYERS_NEEDED: u8 = 4;

/// Create a match organised by `actor`.
pub async fn create_match(
    state: &SharedState,
    actor: Uuid,
    request: CreateMatchRequest,
) -> Result<MatchDetails, ServiceError> {
    let store = state.require_store().await?;
    let starts_at = future_start(request.starts_at.into())?;
    let now = SystemTime::now();
    let entity = MatchEntity {
        id: Uuid::new_v4(),
        club_id: request.club_id.trim().to_string(),
        starts_at,
        duration_minutes: request.duration_minutes,
        level: level_from(&request.level)?,
        organizer_id: actor,
        price_per_player_cents: request.price_per_player_cents,
        players_needed: clamp_players_needed(request.players_needed),
        sos_active: false,
        created_at: now,
        updated_at: now,
    };

    store.insert_match(entity.clone()).await?;
    info!(match_id = %entity.id, organizer_id = %actor, "match created");
    schedule_reminders(state, &entity);

    Ok(MatchDetails {
        r#match: MatchView::from(&entity),
        capacity: CapacityView::from_approved(0),
        roster: vec![actor],
    })
}

/// Edit a match. Organizer-only; the roster is told about the change.
pub async fn update_match(
    state: &SharedState,
    actor: Uuid,
    match_id: Uuid,
    request: UpdateMatchRequest,
) -> Result<MatchDetails, ServiceError> {
    let store = state.require_store().await?;
    let mut entity = load_match(store.as_ref(), match_id).await?;
    ensure_organizer(&entity, actor)?;

    if let Some(club_id) = request.club_id {
        entity.club_id = club_id.trim().to_string();
    }
    if let Some(starts_at) = request.starts_at {
        entity.starts_at = future_start(starts_at.into())?;
    }
    if let Some(duration) = request.duration_minutes {
        entity.duration_minutes = duration;
    }
    if let Some(level) = request.level {
        entity.level = level_from(&level)?;
    }
    if let Some(price) = request.price_per_player_cents {
        entity.price_per_player_cents = price;
    }
    if request.players_needed.is_some() {
        entity.players_needed = clamp_players_needed(request.players_needed);
    }
    entity.updated_at = SystemTime::now();

    if !store.update_match(entity.clone()).await? {
        return Err(ServiceError::NotFound(format!("match `{match_id}`")));
    }
    info!(match_id = %match_id, "match updated");
    schedule_reminders(state, &entity);

    let details = describe(store.as_ref(), &entity).await?;
    let recipients: Vec<Uuid> = details
        .roster
        .iter()
        .copied()
        .filter(|user| *user != actor)
        .collect();
    state.fanout().dispatch(
        Arc::clone(&store),
        recipients,
        Notice::new(
            NotificationKind::MatchUpdated { match_id },
            format!("The match at {} has new details.", entity.club_id),
        ),
    );
    Ok(details)
}

/// Delete a match. Organizer-only; seated players and pending requesters are notified.
pub async fn delete_match(
    state: &SharedState,
    actor: Uuid,
    match_id: Uuid,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(store.as_ref(), match_id).await?;
    ensure_organizer(&entity, actor)?;

    let requests = store.list_join_requests(match_id).await?;
    let recipients: IndexSet<Uuid> = requests
        .iter()
        .filter(|request| request.status.is_active())
        .map(|request| request.user_id)
        .filter(|user| *user != actor)
        .collect();

    if store.delete_match(match_id).await?.is_none() {
        return Err(ServiceError::NotFound(format!("match `{match_id}`")));
    }
    let cancelled = state.reminders().cancel_match(match_id);
    info!(
        match_id = %match_id,
        notified = recipients.len(),
        reminders_cancelled = cancelled,
        "match deleted"
    );

    state.fanout().dispatch(
        store,
        recipients,
        Notice::new(
            NotificationKind::MatchCancelled {
                match_id,
                club_id: entity.club_id.clone(),
            },
            format!("The organizer cancelled the match at {}.", entity.club_id),
        ),
    );
    Ok(())
}

/// Fetch one match with its capacity and roster.
pub async fn get_match(state: &SharedState, match_id: Uuid) -> Result<MatchDetails, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(store.as_ref(), match_id).await?;
    describe(store.as_ref(), &entity).await
}

/// List matches by start time, optionally only those that have not started.
pub async fn list_matches(
    state: &SharedState,
    upcoming_only: bool,
) -> Result<Vec<MatchDetails>, ServiceError> {
    let store = state.require_store().await?;
    let after = upcoming_only.then(SystemTime::now);
    let matches = store.list_matches(after).await?;

    let mut details = Vec::with_capacity(matches.len());
    for entity in &matches {
        details.push(describe(store.as_ref(), entity).await?);
    }
    Ok(details)
}

/// Raise the SOS flag and broadcast an urgent alert to opted-in players outside the match.
pub async fn trigger_sos(
    state: &SharedState,
    actor: Uuid,
    match_id: Uuid,
) -> Result<SosResponse, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(store.as_ref(), match_id).await?;
    ensure_organizer(&entity, actor)?;

    let entity = store
        .set_sos(match_id, true)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("match `{match_id}`")))?;

    let involved: IndexSet<Uuid> = store
        .list_join_requests(match_id)
        .await?
        .into_iter()
        .filter(|request| request.status.is_active())
        .map(|request| request.user_id)
        .chain([entity.organizer_id])
        .collect();
    let recipients: Vec<Uuid> = store
        .list_sos_candidates()
        .await?
        .into_iter()
        .filter(|user| !involved.contains(user))
        .collect();

    info!(match_id = %match_id, recipients = recipients.len(), "SOS triggered");
    let response = SosResponse {
        match_id,
        sos_active: true,
        recipients: recipients.len(),
    };
    state.fanout().dispatch(
        store,
        recipients,
        Notice::new(
            NotificationKind::SosAlert {
                match_id,
                club_id: entity.club_id.clone(),
                level: entity.level,
            },
            format!(
                "A {} match at {} needs a player.",
                entity.level.as_str(),
                entity.club_id
            ),
        ),
    );
    Ok(response)
}

/// Lower the SOS flag. Organizer-only.
pub async fn clear_sos(
    state: &SharedState,
    actor: Uuid,
    match_id: Uuid,
) -> Result<MatchDetails, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(store.as_ref(), match_id).await?;
    ensure_organizer(&entity, actor)?;

    let entity = store
        .set_sos(match_id, false)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("match `{match_id}`")))?;
    debug!(match_id = %match_id, "SOS cleared");
    describe(store.as_ref(), &entity).await
}

/// Load a match or fail with [`ServiceError::NotFound`].
pub(crate) async fn load_match(
    store: &dyn RecordStore,
    match_id: Uuid,
) -> Result<MatchEntity, ServiceError> {
    store
        .find_match(match_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("match `{match_id}`")))
}

/// Fail with [`ServiceError::Forbidden`] unless `actor` organises the match.
pub(crate) fn ensure_organizer(entity: &MatchEntity, actor: Uuid) -> Result<(), ServiceError> {
    if entity.is_organizer(actor) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "only the match organizer can do this".into(),
        ))
    }
}

/// Organizer first, then approved players in request order.
pub(crate) async fn roster(
    store: &dyn RecordStore,
    entity: &MatchEntity,
) -> Result<Vec<Uuid>, ServiceError> {
    let requests = store.list_join_requests(entity.id).await?;
    Ok(std::iter::once(entity.organizer_id)
        .chain(
            requests
                .iter()
                .filter(|request| request.status == JoinRequestStatus::Approved)
                .map(|request| request.user_id),
        )
        .collect())
}

/// Capacity and roster derived from a single read of the request table.
async fn describe(
    store: &dyn RecordStore,
    entity: &MatchEntity,
) -> Result<MatchDetails, ServiceError> {
    let roster = roster(store, entity).await?;
    Ok(MatchDetails {
        r#match: MatchView::from(entity),
        capacity: CapacityView::from_approved(roster.len() - 1),
        roster,
    })
}

fn future_start(starts_at: SystemTime) -> Result<SystemTime, ServiceError> {
    if starts_at <= SystemTime::now() {
        return Err(ServiceError::Validation(
            "start time must be in the future".into(),
        ));
    }
    Ok(starts_at)
}

fn level_from(level: &str) -> Result<MatchLevel, ServiceError> {
    parse_level(level).ok_or_else(|| ServiceError::Validation(format!("unknown level `{level}`")))
}

fn clamp_players_needed(requested: Option<u8>) -> u8 {
    requested
        .unwrap_or(DEFAULT_PLAYERS_NEEDED)
        .clamp(MIN_PLAYERS_NEEDED, MAX_PLAYERS_NEEDED)
}

/// (Re)schedule the end-of-match reminders of `entity`, replacing any pending ones.
pub(crate) fn schedule_reminders(state: &SharedState, entity: &MatchEntity) {
    let settings = &state.config().reminders;
    if !settings.enabled {
        return;
    }
    let reminders = state.reminders();
    reminders.cancel_match(entity.id);

    let lead = Duration::from_secs(u64::from(settings.lead_minutes) * 60);
    let ends_at = entity.ends_at();
    let plan = [
        (ReminderKind::EndingSoon, ends_at.checked_sub(lead)),
        (ReminderKind::Ended, Some(ends_at)),
    ];
    for (kind, fire_at) in plan {
        let Some(fire_at) = fire_at else { continue };
        let signature = ReminderSignature {
            match_id: entity.id,
            kind,
            fire_at,
        };
        let weak = Arc::downgrade(state);
        let lead_minutes = settings.lead_minutes;
        let outcome = reminders.schedule(signature, async move {
            fire_reminder(weak, signature, lead_minutes).await;
        });
        debug!(reminder = %signature, ?outcome, "reminder scheduled");
    }
}

async fn fire_reminder(state: Weak<AppState>, signature: ReminderSignature, lead_minutes: u32) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let Ok(store) = state.require_store().await else {
        warn!(reminder = %signature, "storage unavailable; dropping reminder");
        return;
    };
    let entity = match store.find_match(signature.match_id).await {
        Ok(Some(entity)) => entity,
        Ok(None) => return,
        Err(err) => {
            warn!(reminder = %signature, error = %err, "failed to load match for reminder");
            return;
        }
    };
    let recipients = match roster(store.as_ref(), &entity).await {
        Ok(roster) => roster,
        Err(err) => {
            warn!(reminder = %signature, error = %err, "failed to resolve roster for reminder");
            return;
        }
    };

    let notice = match signature.kind {
        ReminderKind::EndingSoon => Notice::new(
            NotificationKind::MatchEndingSoon {
                match_id: entity.id,
                minutes_left: lead_minutes,
            },
            format!("Your match at {} ends in {lead_minutes} minutes.", entity.club_id),
        ),
        ReminderKind::Ended => Notice::new(
            NotificationKind::MatchEnded { match_id: entity.id },
            format!("Your match at {} is over.", entity.club_id),
        ),
    };
    state.fanout().notify(store.as_ref(), recipients, notice).await;
}

#[cfg(test)]
pub(crate) mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::{
        dao::models::PlayerProfileEntity,
        dto::requests::JoinMatchRequest,
        services::{
            join_service,
            notification_service::{DeliveryReport, tests::RecordingTransport},
        },
        state::tests::memory_state,
    };

    pub(crate) fn create_request(hours_ahead: i64) -> CreateMatchRequest {
        CreateMatchRequest {
            club_id: "club-42".into(),
            starts_at: OffsetDateTime::now_utc() + time::Duration::hours(hours_ahead),
            duration_minutes: 90,
            level: "intermediate".into(),
            price_per_player_cents: Some(1_200),
            players_needed: Some(12),
        }
    }

    #[tokio::test]
    async fn organizer_holds_the_first_seat() {
        let state = memory_state(Arc::new(RecordingTransport::default())).await;
        let organizer = Uuid::new_v4();
        let details = create_match(&state, organizer, create_request(2))
            .await
            .unwrap();

        assert_eq!(details.roster, vec![organizer]);
        assert_eq!(details.capacity.occupied, 1);
        assert_eq!(details.capacity.available, 3);
        assert_eq!(details.r#match.players_needed, MAX_PLAYERS_NEEDED);
        assert_eq!(state.reminders().len(), 2);
    }

    #[tokio::test]
    async fn matches_in_the_past_are_rejected() {
        let state = memory_state(Arc::new(RecordingTransport::default())).await;
        let err = create_match(&state, Uuid::new_v4(), create_request(-1))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn only_the_organizer_can_edit() {
        let state = memory_state(Arc::new(RecordingTransport::default())).await;
        let organizer = Uuid::new_v4();
        let created = create_match(&state, organizer, create_request(2))
            .await
            .unwrap();

        let err = update_match(
            &state,
            Uuid::new_v4(),
            created.r#match.id,
            UpdateMatchRequest {
                duration_minutes: Some(60),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let updated = update_match(
            &state,
            organizer,
            created.r#match.id,
            UpdateMatchRequest {
                duration_minutes: Some(60),
                price_per_player_cents: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.r#match.duration_minutes, 60);
        assert_eq!(updated.r#match.price_per_player_cents, None);
        assert_eq!(state.reminders().len(), 2);
    }

    #[tokio::test]
    async fn deleting_cancels_reminders() {
        let state = memory_state(Arc::new(RecordingTransport::default())).await;
        let organizer = Uuid::new_v4();
        let created = create_match(&state, organizer, create_request(2))
            .await
            .unwrap();

        delete_match(&state, organizer, created.r#match.id)
            .await
            .unwrap();
        assert!(state.reminders().is_empty());
        assert!(matches!(
            get_match(&state, created.r#match.id).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    async fn report_of(
        reports: &mut tokio::sync::broadcast::Receiver<DeliveryReport>,
        kind: &str,
    ) -> DeliveryReport {
        loop {
            let report = tokio::time::timeout(Duration::from_secs(1), reports.recv())
                .await
                .unwrap()
                .unwrap();
            if report.kind == kind {
                return report;
            }
        }
    }

    async fn rows_of(store: &dyn RecordStore, user: Uuid, kind: &str) -> usize {
        store
            .list_notifications(user, false)
            .await
            .unwrap()
            .iter()
            .filter(|row| row.kind.tag() == kind)
            .count()
    }

    async fn seat(state: &SharedState, organizer: Uuid, match_id: Uuid) -> Uuid {
        let user = Uuid::new_v4();
        let request = join_service::request_join(state, user, match_id, JoinMatchRequest::default())
            .await
            .unwrap();
        join_service::approve(state, organizer, request.id).await.unwrap();
        user
    }

    #[tokio::test]
    async fn deleting_notifies_every_seated_player() {
        let state = memory_state(Arc::new(RecordingTransport::default())).await;
        let organizer = Uuid::new_v4();
        let match_id = create_match(&state, organizer, create_request(2))
            .await
            .unwrap()
            .r#match
            .id;
        let mut seated = Vec::new();
        for _ in 0..3 {
            seated.push(seat(&state, organizer, match_id).await);
        }
        let declined = Uuid::new_v4();
        let request =
            join_service::request_join(&state, declined, match_id, JoinMatchRequest::default())
                .await
                .unwrap();
        join_service::reject(&state, organizer, request.id).await.unwrap();

        let mut reports = state.fanout().subscribe_reports();
        delete_match(&state, organizer, match_id).await.unwrap();
        let report = report_of(&mut reports, "match_cancelled").await;
        assert_eq!(report.recipients, 3);
        assert_eq!(report.persisted, 3);

        let store = state.require_store().await.unwrap();
        for user in seated {
            assert_eq!(rows_of(store.as_ref(), user, "match_cancelled").await, 1);
        }
        assert_eq!(rows_of(store.as_ref(), organizer, "match_cancelled").await, 0);
        assert_eq!(rows_of(store.as_ref(), declined, "match_cancelled").await, 0);
    }

    #[tokio::test]
    async fn sos_reaches_only_opted_in_outsiders() {
        let state = memory_state(Arc::new(RecordingTransport::default())).await;
        let organizer = Uuid::new_v4();
        let match_id = create_match(&state, organizer, create_request(2))
            .await
            .unwrap()
            .r#match
            .id;
        let seated = seat(&state, organizer, match_id).await;
        let pending = Uuid::new_v4();
        join_service::request_join(&state, pending, match_id, JoinMatchRequest::default())
            .await
            .unwrap();
        let outsiders = [Uuid::new_v4(), Uuid::new_v4()];
        let opted_out = Uuid::new_v4();

        let store = state.require_store().await.unwrap();
        for user in [organizer, seated, pending, outsiders[0], outsiders[1]] {
            store
                .upsert_profile(PlayerProfileEntity {
                    sos_opt_in: true,
                    ..PlayerProfileEntity::new(user)
                })
                .await
                .unwrap();
        }
        store
            .upsert_profile(PlayerProfileEntity::new(opted_out))
            .await
            .unwrap();

        let mut reports = state.fanout().subscribe_reports();
        let response = trigger_sos(&state, organizer, match_id).await.unwrap();
        assert!(response.sos_active);
        assert_eq!(response.recipients, 2);
        let report = report_of(&mut reports, "sos_alert").await;
        assert_eq!(report.recipients, 2);

        for user in outsiders {
            assert_eq!(rows_of(store.as_ref(), user, "sos_alert").await, 1);
        }
        for user in [organizer, seated, pending, opted_out] {
            assert_eq!(rows_of(store.as_ref(), user, "sos_alert").await, 0);
        }

        let err = trigger_sos(&state, seated, match_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[test]
    fn players_needed_is_clamped() {
        assert_eq!(clamp_players_needed(None), DEFAULT_PLAYERS_NEEDED);
        assert_eq!(clamp_players_needed(Some(0)), MIN_PLAYERS_NEEDED);
        assert_eq!(clamp_players_needed(Some(20)), MAX_PLAYERS_NEEDED);
        assert_eq!(clamp_players_needed(Some(3)), 3);
    }
}

//! Join request lifecycle. Every roster change goes through the state machine in
//! [`crate::state::join_request`] and is committed by a compare-and-set in the store.

use std::{sync::Arc, time::SystemTime};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{JoinRequestEntity, JoinRequestStatus, MatchEntity, NotificationKind},
        record_store::{
            InsertRequestOutcome, RecordStore, SpotTransfer, TransferOutcome, TransitionOutcome,
        },
    },
    dto::requests::{JoinMatchRequest, JoinRequestView, TransferSpotRequest, TransferView},
    error::ServiceError,
    services::{
        match_service::{ensure_organizer, load_match, roster},
        notification_service::Notice,
    },
    state::{
        SharedState,
        join_request::{self, InvalidTransition, JoinEvent},
    },
};

/// Ask for a seat in a match. Capacity is not checked here, only at approval.
pub async fn request_join(
    state: &SharedState,
    actor: Uuid,
    match_id: Uuid,
    request: JoinMatchRequest,
) -> Result<JoinRequestView, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(store.as_ref(), match_id).await?;
    if entity.is_organizer(actor) {
        return Err(ServiceError::Validation(
            "the organizer already holds a seat in this match".into(),
        ));
    }

    let candidate = JoinRequestEntity {
        id: Uuid::new_v4(),
        match_id,
        user_id: actor,
        status: JoinRequestStatus::Pending,
        mood: request
            .mood
            .map(|mood| mood.trim().to_string())
            .filter(|mood| !mood.is_empty()),
        created_at: SystemTime::now(),
        reviewed_at: None,
        reviewed_by: None,
    };

    let created = match store.insert_join_request(candidate).await? {
        InsertRequestOutcome::Created(created) => created,
        InsertRequestOutcome::Duplicate(existing) => {
            debug!(
                match_id = %match_id,
                user_id = %actor,
                existing = %existing.id,
                "duplicate join request"
            );
            return Err(ServiceError::DuplicateRequest {
                existing: existing.id,
            });
        }
    };
    info!(match_id = %match_id, request_id = %created.id, "join request created");

    state.fanout().dispatch(
        store,
        [entity.organizer_id],
        Notice::new(
            NotificationKind::JoinRequested {
                match_id,
                request_id: created.id,
                requester_id: actor,
            },
            format!("Someone wants to join your match at {}.", entity.club_id),
        ),
    );
    Ok(JoinRequestView::from(&created))
}

/// Organizer accepts a pending request, provided a seat is still open.
pub async fn approve(
    state: &SharedState,
    actor: Uuid,
    request_id: Uuid,
) -> Result<JoinRequestView, ServiceError> {
    let store = state.require_store().await?;
    let (request, entity) = load_for_review(store.as_ref(), actor, request_id).await?;
    let approved = apply(store.as_ref(), &request, JoinEvent::Approve, actor).await?;
    info!(match_id = %entity.id, request_id = %request_id, "join request approved");

    state.fanout().dispatch(
        Arc::clone(&store),
        [approved.user_id],
        Notice::new(
            NotificationKind::RequestApproved {
                match_id: entity.id,
                request_id,
            },
            format!("You have a seat in the match at {}.", entity.club_id),
        ),
    );
    let others: Vec<Uuid> = roster(store.as_ref(), &entity)
        .await?
        .into_iter()
        .filter(|user| *user != actor && *user != approved.user_id)
        .collect();
    state.fanout().dispatch(
        store,
        others,
        Notice::new(
            NotificationKind::PlayerJoined {
                match_id: entity.id,
                player_id: approved.user_id,
            },
            format!("A new player joined the match at {}.", entity.club_id),
        ),
    );
    Ok(JoinRequestView::from(&approved))
}

/// Organizer declines a pending request.
pub async fn reject(
    state: &SharedState,
    actor: Uuid,
    request_id: Uuid,
) -> Result<JoinRequestView, ServiceError> {
    let store = state.require_store().await?;
    let (request, entity) = load_for_review(store.as_ref(), actor, request_id).await?;
    let rejected = apply(store.as_ref(), &request, JoinEvent::Reject, actor).await?;
    info!(match_id = %entity.id, request_id = %request_id, "join request rejected");

    state.fanout().dispatch(
        store,
        [rejected.user_id],
        Notice::new(
            NotificationKind::RequestRejected {
                match_id: entity.id,
                request_id,
            },
            format!("Your request for the match at {} was declined.", entity.club_id),
        ),
    );
    Ok(JoinRequestView::from(&rejected))
}

/// Organizer penalises an approved player after a no-show.
pub async fn red_card(
    state: &SharedState,
    actor: Uuid,
    match_id: Uuid,
    user_id: Uuid,
) -> Result<JoinRequestView, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(store.as_ref(), match_id).await?;
    ensure_organizer(&entity, actor)?;

    let request = latest_request(store.as_ref(), match_id, user_id)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("`{user_id}` never asked to join this match"))
        })?;
    let carded = apply(store.as_ref(), &request, JoinEvent::RedCard, actor).await?;
    let red_cards = match store.find_profile(user_id).await {
        Ok(profile) => profile.map_or(0, |profile| profile.red_cards),
        Err(err) => {
            warn!(user_id = %user_id, error = %err, "red card counter unavailable");
            0
        }
    };
    info!(match_id = %match_id, user_id = %user_id, red_cards, "red card issued");

    state.fanout().dispatch(
        store,
        [user_id],
        Notice::new(
            NotificationKind::RedCarded {
                match_id,
                red_cards,
            },
            format!("You missed the match at {}.", entity.club_id),
        ),
    );
    Ok(JoinRequestView::from(&carded))
}

/// Withdraw the caller's own pending or approved request, freeing the seat.
pub async fn cancel_own_request(
    state: &SharedState,
    actor: Uuid,
    match_id: Uuid,
) -> Result<JoinRequestView, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(store.as_ref(), match_id).await?;
    let request = store
        .find_active_request(match_id, actor)
        .await?
        .ok_or_else(|| ServiceError::NotFound("no active request for this match".into()))?;

    let withdrawn = apply(store.as_ref(), &request, JoinEvent::Withdraw, actor).await?;
    info!(match_id = %match_id, user_id = %actor, "join request withdrawn");

    state.fanout().dispatch(
        store,
        [entity.organizer_id],
        Notice::new(
            NotificationKind::RequestWithdrawn {
                match_id,
                player_id: actor,
            },
            format!("A player left the match at {}.", entity.club_id),
        ),
    );
    Ok(JoinRequestView::from(&withdrawn))
}

/// Hand an approved seat from one user to another in one atomic step.
pub async fn transfer_spot(
    state: &SharedState,
    actor: Uuid,
    match_id: Uuid,
    request: TransferSpotRequest,
) -> Result<TransferView, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(store.as_ref(), match_id).await?;
    let TransferSpotRequest {
        from_user_id,
        to_user_id,
    } = request;

    if entity.is_organizer(from_user_id) {
        return Err(ServiceError::Forbidden(
            "the organizer's seat cannot be transferred".into(),
        ));
    }
    if actor != from_user_id && !entity.is_organizer(actor) {
        return Err(ServiceError::Forbidden(
            "only the seat holder or the organizer can transfer a seat".into(),
        ));
    }
    if from_user_id == to_user_id || entity.is_organizer(to_user_id) {
        return Err(ServiceError::Validation(
            "the receiver must be a different player without a seat".into(),
        ));
    }

    let outcome = store
        .transfer_spot(SpotTransfer {
            match_id,
            from_user_id,
            to_user_id,
            actor,
            at: SystemTime::now(),
        })
        .await?;
    let (released, granted) = match outcome {
        TransferOutcome::Applied { released, granted } => (released, granted),
        TransferOutcome::SourceNotSeated => {
            return Err(ServiceError::NotFound(format!(
                "`{from_user_id}` holds no approved seat in this match"
            )));
        }
        TransferOutcome::TargetAlreadySeated => {
            return Err(ServiceError::Validation(format!(
                "`{to_user_id}` already holds a seat in this match"
            )));
        }
    };
    info!(
        match_id = %match_id,
        from_user_id = %from_user_id,
        to_user_id = %to_user_id,
        "seat transferred"
    );

    let recipients: Vec<Uuid> = [to_user_id, entity.organizer_id]
        .into_iter()
        .filter(|user| *user != actor)
        .collect();
    state.fanout().dispatch(
        store,
        recipients,
        Notice::new(
            NotificationKind::SpotTransferred {
                match_id,
                from_user_id,
                to_user_id,
            },
            format!("A seat in the match at {} changed hands.", entity.club_id),
        ),
    );
    Ok(TransferView {
        released: JoinRequestView::from(&released),
        granted: JoinRequestView::from(&granted),
    })
}

/// Requests of a match. The organizer sees all of them, other users only their own.
pub async fn list_requests(
    state: &SharedState,
    actor: Uuid,
    match_id: Uuid,
    status: Option<JoinRequestStatus>,
) -> Result<Vec<JoinRequestView>, ServiceError> {
    let store = state.require_store().await?;
    let entity = load_match(store.as_ref(), match_id).await?;
    let organizer = entity.is_organizer(actor);

    Ok(store
        .list_join_requests(match_id)
        .await?
        .iter()
        .filter(|request| organizer || request.user_id == actor)
        .filter(|request| status.is_none_or(|status| request.status == status))
        .map(JoinRequestView::from)
        .collect())
}

/// Load a request and its match, checking that `actor` organises it.
async fn load_for_review(
    store: &dyn RecordStore,
    actor: Uuid,
    request_id: Uuid,
) -> Result<(JoinRequestEntity, MatchEntity), ServiceError> {
    let request = store
        .find_join_request(request_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("join request `{request_id}`")))?;
    let entity = load_match(store, request.match_id).await?;
    ensure_organizer(&entity, actor)?;
    Ok((request, entity))
}

/// Validate `event` against the state machine and commit it with a compare-and-set.
/// The active request of a user, or their most recent one once it is settled.
async fn latest_request(
    store: &dyn RecordStore,
    match_id: Uuid,
    user_id: Uuid,
) -> Result<Option<JoinRequestEntity>, ServiceError> {
    if let Some(active) = store.find_active_request(match_id, user_id).await? {
        return Ok(Some(active));
    }
    let requests = store.list_join_requests(match_id).await?;
    Ok(requests
        .into_iter()
        .filter(|request| request.user_id == user_id)
        .max_by_key(|request| request.created_at))
}

async fn apply(
    store: &dyn RecordStore,
    request: &JoinRequestEntity,
    event: JoinEvent,
    actor: Uuid,
) -> Result<JoinRequestEntity, ServiceError> {
    let transition = join_request::plan(request, event, actor, SystemTime::now())?;
    match store.transition_request(transition).await? {
        TransitionOutcome::Applied(updated) => Ok(updated),
        TransitionOutcome::NotFound => Err(ServiceError::NotFound(format!(
            "join request `{}`",
            request.id
        ))),
        TransitionOutcome::StatusChanged(from) => {
            Err(ServiceError::InvalidTransition(InvalidTransition { from, event }))
        }
        TransitionOutcome::CapacityExceeded { occupied } => {
            Err(ServiceError::CapacityExceeded { occupied })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        services::{
            match_service::{self, tests::create_request},
            notification_service::tests::RecordingTransport,
        },
        state::{capacity::MATCH_CAPACITY, tests::memory_state},
    };

    async fn setup() -> (SharedState, Uuid, Uuid) {
        let state = memory_state(Arc::new(RecordingTransport::default())).await;
        let organizer = Uuid::new_v4();
        let details = match_service::create_match(&state, organizer, create_request(3))
            .await
            .unwrap();
        (state, organizer, details.r#match.id)
    }

    async fn join(state: &SharedState, match_id: Uuid) -> (Uuid, JoinRequestView) {
        let user = Uuid::new_v4();
        let view = request_join(state, user, match_id, JoinMatchRequest::default())
            .await
            .unwrap();
        (user, view)
    }

    #[tokio::test]
    async fn second_active_request_is_a_duplicate() {
        let (state, _, match_id) = setup().await;
        let user = Uuid::new_v4();
        let first = request_join(&state, user, match_id, JoinMatchRequest::default())
            .await
            .unwrap();
        let err = request_join(&state, user, match_id, JoinMatchRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateRequest { existing } if existing == first.id));
    }

    #[tokio::test]
    async fn fifth_approval_in_order_exceeds_capacity() {
        let (state, organizer, match_id) = setup().await;
        let mut requests = Vec::new();
        for _ in 0..5 {
            requests.push(join(&state, match_id).await.1);
        }

        for request in &requests[..3] {
            approve(&state, organizer, request.id).await.unwrap();
        }
        let err = approve(&state, organizer, requests[3].id).await.unwrap_err();
        assert!(matches!(err, ServiceError::CapacityExceeded { occupied: 4 }));
        let err = approve(&state, organizer, requests[4].id).await.unwrap_err();
        assert!(matches!(err, ServiceError::CapacityExceeded { .. }));

        let details = match_service::get_match(&state, match_id).await.unwrap();
        assert_eq!(details.roster.len(), MATCH_CAPACITY);
        assert!(details.capacity.is_full());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_approvals_for_the_last_seat_admit_exactly_one() {
        let (state, organizer, match_id) = setup().await;
        for _ in 0..2 {
            let (_, view) = join(&state, match_id).await;
            approve(&state, organizer, view.id).await.unwrap();
        }
        let mut contenders = Vec::new();
        for _ in 0..6 {
            contenders.push(join(&state, match_id).await.1.id);
        }

        let handles: Vec<_> = contenders
            .into_iter()
            .map(|request_id| {
                let state = state.clone();
                tokio::spawn(async move { approve(&state, organizer, request_id).await })
            })
            .collect();
        let mut approved = 0;
        let mut refused = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => approved += 1,
                Err(ServiceError::CapacityExceeded { .. }) => refused += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(approved, 1);
        assert_eq!(refused, 5);

        let details = match_service::get_match(&state, match_id).await.unwrap();
        assert_eq!(details.capacity.occupied, MATCH_CAPACITY);
    }

    #[tokio::test]
    async fn non_organizer_cannot_approve() {
        let (state, _, match_id) = setup().await;
        let (_, view) = join(&state, match_id).await;
        let err = approve(&state, Uuid::new_v4(), view.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let store = state.require_store().await.unwrap();
        let request = store.find_join_request(view.id).await.unwrap().unwrap();
        assert_eq!(request.status, JoinRequestStatus::Pending);
    }

    #[tokio::test]
    async fn rejected_requests_cannot_be_approved() {
        let (state, organizer, match_id) = setup().await;
        let (_, view) = join(&state, match_id).await;
        reject(&state, organizer, view.id).await.unwrap();
        let err = approve(&state, organizer, view.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidTransition(InvalidTransition {
                from: JoinRequestStatus::Rejected,
                event: JoinEvent::Approve,
            })
        ));
    }

    #[tokio::test]
    async fn red_card_requires_an_approved_seat_and_counts() {
        let (state, organizer, match_id) = setup().await;
        let (pending_user, _) = join(&state, match_id).await;
        let err = red_card(&state, organizer, match_id, pending_user)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition(_)));

        let (user, view) = join(&state, match_id).await;
        approve(&state, organizer, view.id).await.unwrap();
        let carded = red_card(&state, organizer, match_id, user).await.unwrap();
        assert_eq!(carded.status, JoinRequestStatus::RedCarded);

        let store = state.require_store().await.unwrap();
        let profile = store.find_profile(user).await.unwrap().unwrap();
        assert_eq!(profile.red_cards, 1);
    }

    #[tokio::test]
    async fn second_red_card_is_an_invalid_transition() {
        let (state, organizer, match_id) = setup().await;
        let (user, view) = join(&state, match_id).await;
        approve(&state, organizer, view.id).await.unwrap();
        red_card(&state, organizer, match_id, user).await.unwrap();

        let err = red_card(&state, organizer, match_id, user)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidTransition(InvalidTransition {
                from: JoinRequestStatus::RedCarded,
                event: JoinEvent::RedCard,
            })
        ));
        let store = state.require_store().await.unwrap();
        let profile = store.find_profile(user).await.unwrap().unwrap();
        assert_eq!(profile.red_cards, 1);

        let err = red_card(&state, organizer, match_id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancelling_frees_the_seat() {
        let (state, organizer, match_id) = setup().await;
        let (user, view) = join(&state, match_id).await;
        approve(&state, organizer, view.id).await.unwrap();

        let withdrawn = cancel_own_request(&state, user, match_id).await.unwrap();
        assert_eq!(withdrawn.status, JoinRequestStatus::Withdrawn);
        let details = match_service::get_match(&state, match_id).await.unwrap();
        assert_eq!(details.roster, vec![organizer]);

        // a fresh request is allowed once the previous one is terminal
        request_join(&state, user, match_id, JoinMatchRequest::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn transfer_on_a_full_match_keeps_four_seats() {
        let transport = Arc::new(RecordingTransport::default());
        let state = memory_state(transport).await;
        let organizer = Uuid::new_v4();
        let match_id = match_service::create_match(&state, organizer, create_request(3))
            .await
            .unwrap()
            .r#match
            .id;

        let mut seated = Vec::new();
        for _ in 0..3 {
            let (user, view) = join(&state, match_id).await;
            approve(&state, organizer, view.id).await.unwrap();
            seated.push(user);
        }
        let store = state.require_store().await.unwrap();
        let mut feed = store.changes();

        let newcomer = Uuid::new_v4();
        let transfer = transfer_spot(
            &state,
            seated[0],
            match_id,
            TransferSpotRequest {
                from_user_id: seated[0],
                to_user_id: newcomer,
            },
        )
        .await
        .unwrap();
        assert_eq!(transfer.released.status, JoinRequestStatus::Withdrawn);
        assert_eq!(transfer.granted.status, JoinRequestStatus::Approved);
        assert_eq!(store.count_approved(match_id).await.unwrap(), 3);

        // both halves are published back to back
        let first = tokio::time::timeout(Duration::from_secs(1), feed.recv())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), feed.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.record_id(), transfer.released.id);
        assert_eq!(second.record_id(), transfer.granted.id);
    }

    #[tokio::test]
    async fn organizer_seat_is_not_transferable() {
        let (state, organizer, match_id) = setup().await;
        let err = transfer_spot(
            &state,
            organizer,
            match_id,
            TransferSpotRequest {
                from_user_id: organizer,
                to_user_id: Uuid::new_v4(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn requesters_only_list_their_own_requests() {
        let (state, organizer, match_id) = setup().await;
        let (user, _) = join(&state, match_id).await;
        join(&state, match_id).await;

        let all = list_requests(&state, organizer, match_id, None).await.unwrap();
        assert_eq!(all.len(), 2);
        let own = list_requests(&state, user, match_id, None).await.unwrap();
        assert_eq!(own.len(), 1);
        let approved = list_requests(&state, organizer, match_id, Some(JoinRequestStatus::Approved))
            .await
            .unwrap();
        assert!(approved.is_empty());
    }
}

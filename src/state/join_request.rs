use std::time::SystemTime;

use thiserror::Error;
use uuid::Uuid;

use crate::{
    dao::{
        models::{JoinRequestEntity, JoinRequestStatus},
        record_store::RequestTransition,
    },
    state::capacity::MATCH_CAPACITY,
};

/// Events that can be applied to a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinEvent {
    /// Organizer accepts the requester onto the roster.
    Approve,
    /// Organizer declines the request.
    Reject,
    /// Organizer penalises an approved player after a no-show.
    RedCard,
    /// Requester withdraws, or hands their seat over to someone else.
    Withdraw,
}

/// Error returned when an event cannot be applied from the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied to a {from:?} request")]
pub struct InvalidTransition {
    /// Status the request was in when the event was received.
    pub from: JoinRequestStatus,
    /// Event that cannot be applied from this status.
    pub event: JoinEvent,
}

/// Compute the status reached by applying `event` to a request in `from`.
pub fn next_status(
    from: JoinRequestStatus,
    event: JoinEvent,
) -> Result<JoinRequestStatus, InvalidTransition> {
    let next = match (from, event) {
        (JoinRequestStatus::Pending, JoinEvent::Approve) => JoinRequestStatus::Approved,
        (JoinRequestStatus::Pending, JoinEvent::Reject) => JoinRequestStatus::Rejected,
        (JoinRequestStatus::Approved, JoinEvent::RedCard) => JoinRequestStatus::RedCarded,
        (JoinRequestStatus::Pending | JoinRequestStatus::Approved, JoinEvent::Withdraw) => {
            JoinRequestStatus::Withdrawn
        }
        (from, event) => return Err(InvalidTransition { from, event }),
    };
    Ok(next)
}

/// Validate `event` against the request's current status and build the compare-and-set
/// write for the store. Approvals carry the seat limit so the store re-checks capacity
/// inside the same atomic step.
pub fn plan(
    request: &JoinRequestEntity,
    event: JoinEvent,
    actor: Uuid,
    at: SystemTime,
) -> Result<RequestTransition, InvalidTransition> {
    let next = next_status(request.status, event)?;
    Ok(RequestTransition {
        request_id: request.id,
        expected: request.status,
        next,
        actor,
        at,
        seat_limit: (event == JoinEvent::Approve).then_some(MATCH_CAPACITY),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATUSES: [JoinRequestStatus; 5] = [
        JoinRequestStatus::Pending,
        JoinRequestStatus::Approved,
        JoinRequestStatus::Rejected,
        JoinRequestStatus::RedCarded,
        JoinRequestStatus::Withdrawn,
    ];
    const ALL_EVENTS: [JoinEvent; 4] = [
        JoinEvent::Approve,
        JoinEvent::Reject,
        JoinEvent::RedCard,
        JoinEvent::Withdraw,
    ];

    #[test]
    fn legal_transitions() {
        assert_eq!(
            next_status(JoinRequestStatus::Pending, JoinEvent::Approve),
            Ok(JoinRequestStatus::Approved)
        );
        assert_eq!(
            next_status(JoinRequestStatus::Pending, JoinEvent::Reject),
            Ok(JoinRequestStatus::Rejected)
        );
        assert_eq!(
            next_status(JoinRequestStatus::Approved, JoinEvent::RedCard),
            Ok(JoinRequestStatus::RedCarded)
        );
        assert_eq!(
            next_status(JoinRequestStatus::Approved, JoinEvent::Withdraw),
            Ok(JoinRequestStatus::Withdrawn)
        );
    }

    #[test]
    fn terminal_statuses_accept_no_event() {
        for from in [
            JoinRequestStatus::Rejected,
            JoinRequestStatus::RedCarded,
            JoinRequestStatus::Withdrawn,
        ] {
            for event in ALL_EVENTS {
                assert_eq!(
                    next_status(from, event),
                    Err(InvalidTransition { from, event })
                );
            }
        }
    }

    #[test]
    fn only_five_pairs_are_legal() {
        let legal = ALL_STATUSES
            .iter()
            .flat_map(|from| ALL_EVENTS.iter().map(move |event| (*from, *event)))
            .filter(|(from, event)| next_status(*from, *event).is_ok())
            .count();
        assert_eq!(legal, 5);
    }

    #[test]
    fn approving_twice_is_rejected() {
        let err = next_status(JoinRequestStatus::Approved, JoinEvent::Approve).unwrap_err();
        assert_eq!(err.from, JoinRequestStatus::Approved);
        assert_eq!(err.event, JoinEvent::Approve);
    }

    #[test]
    fn red_card_requires_an_approved_request() {
        assert!(next_status(JoinRequestStatus::Pending, JoinEvent::RedCard).is_err());
    }

    #[test]
    fn only_approvals_carry_a_seat_limit() {
        let request = JoinRequestEntity {
            id: Uuid::new_v4(),
            match_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: JoinRequestStatus::Pending,
            mood: Some("competitive".into()),
            created_at: SystemTime::now(),
            reviewed_at: None,
            reviewed_by: None,
        };
        let actor = Uuid::new_v4();

        let approve = plan(&request, JoinEvent::Approve, actor, SystemTime::now()).unwrap();
        assert_eq!(approve.seat_limit, Some(MATCH_CAPACITY));
        assert_eq!(approve.expected, JoinRequestStatus::Pending);
        assert_eq!(approve.next, JoinRequestStatus::Approved);

        let reject = plan(&request, JoinEvent::Reject, actor, SystemTime::now()).unwrap();
        assert_eq!(reject.seat_limit, None);
    }
}

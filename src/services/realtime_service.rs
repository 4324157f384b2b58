use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc,
    },
    task::JoinHandle,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::{
    dao::change_feed::{ChangeEvent, ChangeOp, ChangeRecord},
    dto::{
        chat::ChatMessageView,
        matches::MatchView,
        realtime::{Handshake, RecordRemovedEvent, ServerEvent},
        requests::JoinRequestView,
    },
    state::{
        RealtimeHub,
        realtime::{Audience, RealtimeEvent, StreamKind},
    },
};

/// Translate one committed change into the event sent to SSE clients.
pub fn to_realtime_event(change: &ChangeEvent) -> serde_json::Result<RealtimeEvent> {
    let match_id = change.match_id();
    let (audience, payload) = match (&change.record, change.op) {
        (ChangeRecord::Match(entity), ChangeOp::Delete) => (
            Audience::MatchList,
            ServerEvent::json(
                Some("match.deleted".to_string()),
                &RecordRemovedEvent {
                    id: entity.id,
                    match_id,
                },
            )?,
        ),
        (ChangeRecord::Match(entity), op) => (
            Audience::MatchList,
            ServerEvent::json(
                Some(event_name("match", op)),
                &MatchView::from(entity),
            )?,
        ),
        (ChangeRecord::JoinRequest(entity), op) => (
            Audience::MatchViewers,
            ServerEvent::json(
                Some(event_name("request", op)),
                &JoinRequestView::from(entity),
            )?,
        ),
        (ChangeRecord::Message(entity), op) => (
            Audience::MatchViewers,
            ServerEvent::json(
                Some(event_name("message", op)),
                &ChatMessageView::from(entity),
            )?,
        ),
    };
    Ok(RealtimeEvent {
        match_id,
        audience,
        payload,
    })
}

fn event_name(table: &'static str, op: ChangeOp) -> String {
    let suffix = match op {
        ChangeOp::Insert => "created",
        ChangeOp::Update => "updated",
        ChangeOp::Delete => "deleted",
    };
    format!("{table}.{suffix}")
}

/// Forward every change of the feed to the hub, in feed order, until the feed closes.
pub fn spawn_propagator(
    mut changes: broadcast::Receiver<ChangeEvent>,
    hub: RealtimeHub,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => match to_realtime_event(&change) {
                    Ok(event) => hub.broadcast(event),
                    Err(err) => warn!(
                        match_id = %change.match_id(),
                        error = %err,
                        "failed to serialise realtime event"
                    ),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "realtime propagator lagged behind the change feed");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("change feed closed; realtime propagator stopped");
    })
}

/// Handshake event sent first on every stream.
pub fn handshake(kind: StreamKind, degraded: bool) -> Option<ServerEvent> {
    let match_id = match kind {
        StreamKind::MatchList => None,
        StreamKind::Match(id) => Some(id),
    };
    ServerEvent::json(
        Some("handshake".to_string()),
        &Handshake {
            stream: kind.label().to_string(),
            match_id,
            degraded,
        },
    )
    .ok()
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Convert a hub receiver into an SSE response carrying the events `kind` accepts.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<RealtimeEvent>,
    kind: StreamKind,
    greeting: Option<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(greeting) = greeting {
            if tx.send(Ok(to_event(greeting))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(event) if kind.accepts(&event) => {
                            if tx.send(Ok(to_event(event.payload))).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => continue,
                        Err(RecvError::Closed) => break,
                        // Skip lagged messages but keep the stream alive.
                        Err(RecvError::Lagged(_)) => continue,
                    }
                }
            }
        }

        info!(stream = kind.label(), "SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use uuid::Uuid;

    use super::*;
    use crate::dao::{
        change_feed::ChangeFeed,
        models::{ChatMessageEntity, MatchEntity, MatchLevel},
    };

    fn sample_match() -> MatchEntity {
        MatchEntity {
            id: Uuid::new_v4(),
            club_id: "club-9".into(),
            starts_at: SystemTime::now(),
            duration_minutes: 90,
            level: MatchLevel::Intermediate,
            organizer_id: Uuid::new_v4(),
            price_per_player_cents: None,
            players_needed: 4,
            sos_active: false,
            created_at: SystemTime::now(),
            updated_at: SystemTime::now(),
        }
    }

    #[test]
    fn match_changes_reach_the_match_list() {
        let entity = sample_match();
        let event = to_realtime_event(&ChangeEvent {
            op: ChangeOp::Delete,
            record: ChangeRecord::Match(entity.clone()),
        })
        .unwrap();
        assert_eq!(event.audience, Audience::MatchList);
        assert_eq!(event.payload.event.as_deref(), Some("match.deleted"));
        assert!(event.payload.data.contains(&entity.id.to_string()));
    }

    #[test]
    fn messages_only_reach_match_viewers() {
        let message = ChatMessageEntity {
            id: Uuid::new_v4(),
            match_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            text: "warming up".into(),
            created_at: SystemTime::now(),
        };
        let event = to_realtime_event(&ChangeEvent {
            op: ChangeOp::Insert,
            record: ChangeRecord::Message(message.clone()),
        })
        .unwrap();
        assert_eq!(event.audience, Audience::MatchViewers);
        assert_eq!(event.match_id, message.match_id);
        assert_eq!(event.payload.event.as_deref(), Some("message.created"));
    }

    #[tokio::test]
    async fn propagator_preserves_feed_order() {
        let feed = ChangeFeed::new(16);
        let hub = RealtimeHub::new(16);
        let mut receiver = hub.subscribe();
        let handle = spawn_propagator(feed.subscribe(), hub.clone());

        let entity = sample_match();
        feed.publish(ChangeOp::Insert, ChangeRecord::Match(entity.clone()));
        feed.publish(ChangeOp::Update, ChangeRecord::Match(entity.clone()));
        feed.publish(ChangeOp::Delete, ChangeRecord::Match(entity));

        let mut names = Vec::new();
        for _ in 0..3 {
            let event = receiver.recv().await.unwrap();
            names.push(event.payload.event.unwrap());
        }
        assert_eq!(names, vec!["match.created", "match.updated", "match.deleted"]);
        handle.abort();
    }
}

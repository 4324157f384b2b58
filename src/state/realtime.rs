use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dto::realtime::ServerEvent;

/// Which clients an event is relevant to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Viewers of the match list and viewers of the match itself.
    MatchList,
    /// Only viewers of the affected match.
    MatchViewers,
}

/// Event flowing from the change feed to connected SSE clients.
#[derive(Debug, Clone)]
pub struct RealtimeEvent {
    pub match_id: Uuid,
    pub audience: Audience,
    pub payload: ServerEvent,
}

/// Stream a client subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    MatchList,
    Match(Uuid),
}

impl StreamKind {
    /// Whether `event` should be forwarded on this stream.
    pub fn accepts(&self, event: &RealtimeEvent) -> bool {
        match self {
            StreamKind::MatchList => event.audience == Audience::MatchList,
            StreamKind::Match(match_id) => event.match_id == *match_id,
        }
    }

    /// Label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            StreamKind::MatchList => "matches",
            StreamKind::Match(_) => "match",
        }
    }
}

/// Broadcast hub shared by every realtime stream; each stream filters what it needs.
#[derive(Clone)]
pub struct RealtimeHub {
    sender: broadcast::Sender<RealtimeEvent>,
}

impl RealtimeHub {
    /// Construct a hub buffering `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring the absence of listeners.
    pub fn broadcast(&self, event: RealtimeEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of connected subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(match_id: Uuid, audience: Audience) -> RealtimeEvent {
        RealtimeEvent {
            match_id,
            audience,
            payload: ServerEvent::new(Some("match.updated".into()), "{}".into()),
        }
    }

    #[test]
    fn match_list_only_sees_list_level_events() {
        let id = Uuid::new_v4();
        assert!(StreamKind::MatchList.accepts(&event(id, Audience::MatchList)));
        assert!(!StreamKind::MatchList.accepts(&event(id, Audience::MatchViewers)));
    }

    #[test]
    fn match_stream_filters_on_match_id() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let stream = StreamKind::Match(id);
        assert!(stream.accepts(&event(id, Audience::MatchList)));
        assert!(stream.accepts(&event(id, Audience::MatchViewers)));
        assert!(!stream.accepts(&event(other, Audience::MatchViewers)));
    }

    #[tokio::test]
    async fn subscribers_receive_events_in_broadcast_order() {
        let hub = RealtimeHub::new(8);
        let mut receiver = hub.subscribe();
        let id = Uuid::new_v4();
        hub.broadcast(event(id, Audience::MatchList));
        hub.broadcast(RealtimeEvent {
            payload: ServerEvent::new(Some("message.created".into()), "{}".into()),
            ..event(id, Audience::MatchViewers)
        });

        let first = receiver.recv().await.unwrap();
        let second = receiver.recv().await.unwrap();
        assert_eq!(first.payload.event.as_deref(), Some("match.updated"));
        assert_eq!(second.payload.event.as_deref(), Some("message.created"));
    }
}

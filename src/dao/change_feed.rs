//! Row-level change notifications emitted by record stores after each committed write.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dao::models::{ChatMessageEntity, JoinRequestEntity, MatchEntity};

/// Tables observed by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Matches,
    JoinRequests,
    Messages,
}

/// Kind of write that produced a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// Row image carried by a change (the last known image for deletions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeRecord {
    Match(MatchEntity),
    JoinRequest(JoinRequestEntity),
    Message(ChatMessageEntity),
}

/// One committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub op: ChangeOp,
    pub record: ChangeRecord,
}

impl ChangeEvent {
    /// Table the changed row belongs to.
    pub fn table(&self) -> Table {
        match self.record {
            ChangeRecord::Match(_) => Table::Matches,
            ChangeRecord::JoinRequest(_) => Table::JoinRequests,
            ChangeRecord::Message(_) => Table::Messages,
        }
    }

    /// Match affected by the change.
    pub fn match_id(&self) -> Uuid {
        match &self.record {
            ChangeRecord::Match(entity) => entity.id,
            ChangeRecord::JoinRequest(entity) => entity.match_id,
            ChangeRecord::Message(entity) => entity.match_id,
        }
    }

    /// Primary key of the changed row.
    pub fn record_id(&self) -> Uuid {
        match &self.record {
            ChangeRecord::Match(entity) => entity.id,
            ChangeRecord::JoinRequest(entity) => entity.id,
            ChangeRecord::Message(entity) => entity.id,
        }
    }
}

/// Broadcast wrapper shared by the store backends.
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    /// Create a feed buffering at most `capacity` changes per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a subscriber receiving every subsequent change.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Publish a change; having no subscriber is not an error.
    pub fn publish(&self, op: ChangeOp, record: ChangeRecord) {
        let _ = self.sender.send(ChangeEvent { op, record });
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

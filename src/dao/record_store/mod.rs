pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dao::{
    change_feed::ChangeEvent,
    models::{
        ChatMessageEntity, JoinRequestEntity, JoinRequestStatus, MatchEntity,
        NotificationEntity, PlayerProfileEntity, PushSubscriptionEntity,
    },
    storage::StorageResult,
};

pub use self::memory::InMemoryRecordStore;

/// Compare-and-set of a join request status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTransition {
    pub request_id: Uuid,
    /// Status the request must still have for the write to apply.
    pub expected: JoinRequestStatus,
    pub next: JoinRequestStatus,
    /// User recorded as `reviewed_by`.
    pub actor: Uuid,
    pub at: SystemTime,
    /// When set, the write only applies while the match has fewer occupied seats than this.
    pub seat_limit: Option<usize>,
}

/// Result of a [`RequestTransition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied(JoinRequestEntity),
    NotFound,
    /// Another writer moved the request away from the expected status.
    StatusChanged(JoinRequestStatus),
    /// The seat limit was reached; nothing was written.
    CapacityExceeded { occupied: usize },
}

/// Result of inserting a join request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertRequestOutcome {
    Created(JoinRequestEntity),
    /// An active request already exists for the same match and user.
    Duplicate(JoinRequestEntity),
}

/// Atomic hand-over of an approved seat from one user to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotTransfer {
    pub match_id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub actor: Uuid,
    pub at: SystemTime,
}

/// Result of a [`SpotTransfer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Applied {
        /// Former seat holder's request, now withdrawn.
        released: JoinRequestEntity,
        /// Receiver's request, now approved.
        granted: JoinRequestEntity,
    },
    /// The source user holds no approved seat.
    SourceNotSeated,
    /// The receiver already holds an approved seat.
    TargetAlreadySeated,
}

/// Flags a recipient can raise on a notification row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationFlags {
    pub read: bool,
    pub clicked: bool,
}

/// Transactional record store with a change feed for matches, requests and messages.
pub trait RecordStore: Send + Sync {
    fn insert_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Replace an existing match; `false` when it no longer exists.
    fn update_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<bool>>;
    fn set_sos(
        &self,
        match_id: Uuid,
        active: bool,
    ) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    /// Remove a match, returning its last image. Requests and messages stay orphaned.
    fn delete_match(&self, match_id: Uuid)
    -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    fn find_match(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    /// Matches ordered by start time, optionally only those starting after `after`.
    fn list_matches(
        &self,
        after: Option<SystemTime>,
    ) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>>;

    fn insert_join_request(
        &self,
        entity: JoinRequestEntity,
    ) -> BoxFuture<'static, StorageResult<InsertRequestOutcome>>;
    fn find_join_request(
        &self,
        request_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<JoinRequestEntity>>>;
    /// Requests of a match in submission order.
    fn list_join_requests(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<JoinRequestEntity>>>;
    fn find_active_request(
        &self,
        match_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<JoinRequestEntity>>>;
    fn count_approved(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<usize>>;
    /// Apply a status compare-and-set. Moving a request to `red_carded` bumps the player's
    /// red card counter in the same write.
    fn transition_request(
        &self,
        transition: RequestTransition,
    ) -> BoxFuture<'static, StorageResult<TransitionOutcome>>;
    fn transfer_spot(
        &self,
        transfer: SpotTransfer,
    ) -> BoxFuture<'static, StorageResult<TransferOutcome>>;

    /// Insert or refresh a subscription keyed by its endpoint.
    fn upsert_push_subscription(
        &self,
        subscription: PushSubscriptionEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Remove a subscription; restricted to `owner` when given.
    fn delete_push_subscription(
        &self,
        endpoint: String,
        owner: Option<Uuid>,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    fn list_push_subscriptions(
        &self,
        user_ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<PushSubscriptionEntity>>>;

    fn insert_notifications(
        &self,
        rows: Vec<NotificationEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Notifications of a user, newest first.
    fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
    ) -> BoxFuture<'static, StorageResult<Vec<NotificationEntity>>>;
    fn raise_notification_flags(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
        flags: NotificationFlags,
    ) -> BoxFuture<'static, StorageResult<Option<NotificationEntity>>>;
    fn mark_all_notifications_read(&self, user_id: Uuid)
    -> BoxFuture<'static, StorageResult<u64>>;
    fn delete_notification(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    fn insert_message(&self, message: ChatMessageEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Messages of a match in insertion order.
    fn list_messages(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>>;

    fn find_profile(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerProfileEntity>>>;
    fn upsert_profile(&self, profile: PlayerProfileEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Increment the red-card counter, creating the profile if needed; returns the new total.
    fn increment_red_cards(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<u32>>;
    /// Users opted in to SOS broadcasts.
    fn list_sos_candidates(&self) -> BoxFuture<'static, StorageResult<Vec<Uuid>>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Subscribe to committed changes of matches, requests and messages.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;
}

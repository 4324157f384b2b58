//! Process-local record store. Every write runs inside one async mutex critical section,
//! so compare-and-set operations are atomic with respect to each other.

use std::{collections::HashMap, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

use super::{
    InsertRequestOutcome, NotificationFlags, RecordStore, RequestTransition, SpotTransfer,
    TransferOutcome, TransitionOutcome,
};
use crate::{
    dao::{
        change_feed::{ChangeEvent, ChangeFeed, ChangeOp, ChangeRecord},
        models::{
            ChatMessageEntity, JoinRequestEntity, JoinRequestStatus, MatchEntity,
            NotificationEntity, PlayerProfileEntity, PushSubscriptionEntity,
        },
        storage::StorageResult,
    },
    state::capacity,
};

#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    tables: Mutex<Tables>,
    feed: ChangeFeed,
}

#[derive(Default)]
struct Tables {
    matches: IndexMap<Uuid, MatchEntity>,
    requests: IndexMap<Uuid, JoinRequestEntity>,
    subscriptions: IndexMap<String, PushSubscriptionEntity>,
    notifications: IndexMap<Uuid, NotificationEntity>,
    messages: IndexMap<Uuid, ChatMessageEntity>,
    profiles: HashMap<Uuid, PlayerProfileEntity>,
}

impl Tables {
    fn approved_count(&self, match_id: Uuid) -> usize {
        self.requests
            .values()
            .filter(|request| request.match_id == match_id && request.status.holds_seat())
            .count()
    }

    fn bump_red_cards(&mut self, user_id: Uuid) -> u32 {
        let profile = self
            .profiles
            .entry(user_id)
            .or_insert_with(|| PlayerProfileEntity::new(user_id));
        profile.red_cards += 1;
        profile.updated_at = SystemTime::now();
        profile.red_cards
    }

    fn active_request(&self, match_id: Uuid, user_id: Uuid) -> Option<&JoinRequestEntity> {
        self.requests.values().find(|request| {
            request.match_id == match_id && request.user_id == user_id && request.status.is_active()
        })
    }
}

impl InMemoryRecordStore {
    /// Create an empty store with its own change feed.
    pub fn new() -> Self {
        Self::default()
    }

    fn publish(&self, op: ChangeOp, record: ChangeRecord) {
        self.inner.feed.publish(op, record);
    }

    async fn insert_match(&self, entity: MatchEntity) -> StorageResult<()> {
        let mut tables = self.inner.tables.lock().await;
        tables.matches.insert(entity.id, entity.clone());
        self.publish(ChangeOp::Insert, ChangeRecord::Match(entity));
        Ok(())
    }

    async fn update_match(&self, entity: MatchEntity) -> StorageResult<bool> {
        let mut tables = self.inner.tables.lock().await;
        let Some(slot) = tables.matches.get_mut(&entity.id) else {
            return Ok(false);
        };
        *slot = entity.clone();
        self.publish(ChangeOp::Update, ChangeRecord::Match(entity));
        Ok(true)
    }

    async fn set_sos(&self, match_id: Uuid, active: bool) -> StorageResult<Option<MatchEntity>> {
        let mut tables = self.inner.tables.lock().await;
        let Some(entity) = tables.matches.get_mut(&match_id) else {
            return Ok(None);
        };
        entity.sos_active = active;
        entity.updated_at = SystemTime::now();
        let updated = entity.clone();
        self.publish(ChangeOp::Update, ChangeRecord::Match(updated.clone()));
        Ok(Some(updated))
    }

    async fn delete_match(&self, match_id: Uuid) -> StorageResult<Option<MatchEntity>> {
        let mut tables = self.inner.tables.lock().await;
        let removed = tables.matches.shift_remove(&match_id);
        if let Some(entity) = &removed {
            self.publish(ChangeOp::Delete, ChangeRecord::Match(entity.clone()));
        }
        Ok(removed)
    }

    async fn find_match(&self, match_id: Uuid) -> StorageResult<Option<MatchEntity>> {
        let tables = self.inner.tables.lock().await;
        Ok(tables.matches.get(&match_id).cloned())
    }

    async fn list_matches(&self, after: Option<SystemTime>) -> StorageResult<Vec<MatchEntity>> {
        let tables = self.inner.tables.lock().await;
        let mut matches: Vec<MatchEntity> = tables
            .matches
            .values()
            .filter(|entity| after.is_none_or(|after| entity.starts_at > after))
            .cloned()
            .collect();
        matches.sort_by_key(|entity| entity.starts_at);
        Ok(matches)
    }

    async fn insert_join_request(
        &self,
        entity: JoinRequestEntity,
    ) -> StorageResult<InsertRequestOutcome> {
        let mut tables = self.inner.tables.lock().await;
        if let Some(existing) = tables.active_request(entity.match_id, entity.user_id) {
            return Ok(InsertRequestOutcome::Duplicate(existing.clone()));
        }
        tables.requests.insert(entity.id, entity.clone());
        self.publish(ChangeOp::Insert, ChangeRecord::JoinRequest(entity.clone()));
        Ok(InsertRequestOutcome::Created(entity))
    }

    async fn find_join_request(&self, request_id: Uuid) -> StorageResult<Option<JoinRequestEntity>> {
        let tables = self.inner.tables.lock().await;
        Ok(tables.requests.get(&request_id).cloned())
    }

    async fn list_join_requests(&self, match_id: Uuid) -> StorageResult<Vec<JoinRequestEntity>> {
        let tables = self.inner.tables.lock().await;
        Ok(tables
            .requests
            .values()
            .filter(|request| request.match_id == match_id)
            .cloned()
            .collect())
    }

    async fn find_active_request(
        &self,
        match_id: Uuid,
        user_id: Uuid,
    ) -> StorageResult<Option<JoinRequestEntity>> {
        let tables = self.inner.tables.lock().await;
        Ok(tables.active_request(match_id, user_id).cloned())
    }

    async fn count_approved(&self, match_id: Uuid) -> StorageResult<usize> {
        let tables = self.inner.tables.lock().await;
        Ok(tables.approved_count(match_id))
    }

    async fn transition_request(
        &self,
        transition: RequestTransition,
    ) -> StorageResult<TransitionOutcome> {
        let mut tables = self.inner.tables.lock().await;
        let Some(current) = tables.requests.get(&transition.request_id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if current.status != transition.expected {
            return Ok(TransitionOutcome::StatusChanged(current.status));
        }

        if let Some(limit) = transition.seat_limit {
            let approved = tables.approved_count(current.match_id);
            if !capacity::admits_one_more(approved, limit) {
                return Ok(TransitionOutcome::CapacityExceeded {
                    occupied: capacity::occupied(approved),
                });
            }
        }

        let Some(request) = tables.requests.get_mut(&transition.request_id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        request.status = transition.next;
        request.reviewed_at = Some(transition.at);
        request.reviewed_by = Some(transition.actor);
        let updated = request.clone();
        if updated.status == JoinRequestStatus::RedCarded {
            tables.bump_red_cards(updated.user_id);
        }
        self.publish(ChangeOp::Update, ChangeRecord::JoinRequest(updated.clone()));
        Ok(TransitionOutcome::Applied(updated))
    }

    async fn transfer_spot(&self, transfer: SpotTransfer) -> StorageResult<TransferOutcome> {
        let mut tables = self.inner.tables.lock().await;

        let source_id = match tables.active_request(transfer.match_id, transfer.from_user_id) {
            Some(request) if request.status.holds_seat() => request.id,
            _ => return Ok(TransferOutcome::SourceNotSeated),
        };
        let target = tables
            .active_request(transfer.match_id, transfer.to_user_id)
            .cloned();
        if target.as_ref().is_some_and(|request| request.status.holds_seat()) {
            return Ok(TransferOutcome::TargetAlreadySeated);
        }

        let granted = match target {
            Some(mut pending) => {
                pending.status = JoinRequestStatus::Approved;
                pending.reviewed_at = Some(transfer.at);
                pending.reviewed_by = Some(transfer.actor);
                pending
            }
            None => JoinRequestEntity {
                id: Uuid::new_v4(),
                match_id: transfer.match_id,
                user_id: transfer.to_user_id,
                status: JoinRequestStatus::Approved,
                mood: None,
                created_at: transfer.at,
                reviewed_at: Some(transfer.at),
                reviewed_by: Some(transfer.actor),
            },
        };
        let granted_is_new = !tables.requests.contains_key(&granted.id);

        let Some(source) = tables.requests.get_mut(&source_id) else {
            return Ok(TransferOutcome::SourceNotSeated);
        };
        source.status = JoinRequestStatus::Withdrawn;
        source.reviewed_at = Some(transfer.at);
        source.reviewed_by = Some(transfer.actor);
        let released = source.clone();
        tables.requests.insert(granted.id, granted.clone());

        self.publish(ChangeOp::Update, ChangeRecord::JoinRequest(released.clone()));
        let op = if granted_is_new {
            ChangeOp::Insert
        } else {
            ChangeOp::Update
        };
        self.publish(op, ChangeRecord::JoinRequest(granted.clone()));

        Ok(TransferOutcome::Applied { released, granted })
    }

    async fn upsert_push_subscription(&self, subscription: PushSubscriptionEntity) -> StorageResult<()> {
        let mut tables = self.inner.tables.lock().await;
        tables
            .subscriptions
            .insert(subscription.endpoint.clone(), subscription);
        Ok(())
    }

    async fn delete_push_subscription(
        &self,
        endpoint: String,
        owner: Option<Uuid>,
    ) -> StorageResult<bool> {
        let mut tables = self.inner.tables.lock().await;
        let owned = tables
            .subscriptions
            .get(&endpoint)
            .is_some_and(|subscription| owner.is_none_or(|owner| subscription.user_id == owner));
        if owned {
            tables.subscriptions.shift_remove(&endpoint);
        }
        Ok(owned)
    }

    async fn list_push_subscriptions(
        &self,
        user_ids: Vec<Uuid>,
    ) -> StorageResult<Vec<PushSubscriptionEntity>> {
        let tables = self.inner.tables.lock().await;
        Ok(tables
            .subscriptions
            .values()
            .filter(|subscription| user_ids.contains(&subscription.user_id))
            .cloned()
            .collect())
    }

    async fn insert_notifications(&self, rows: Vec<NotificationEntity>) -> StorageResult<()> {
        let mut tables = self.inner.tables.lock().await;
        for row in rows {
            tables.notifications.insert(row.id, row);
        }
        Ok(())
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
    ) -> StorageResult<Vec<NotificationEntity>> {
        let tables = self.inner.tables.lock().await;
        let mut rows: Vec<NotificationEntity> = tables
            .notifications
            .values()
            .filter(|row| row.user_id == user_id && (!unread_only || !row.read))
            .cloned()
            .collect();
        // Newest insertion first among rows sharing a timestamp.
        rows.reverse();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn raise_notification_flags(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
        flags: NotificationFlags,
    ) -> StorageResult<Option<NotificationEntity>> {
        let mut tables = self.inner.tables.lock().await;
        let Some(row) = tables
            .notifications
            .get_mut(&notification_id)
            .filter(|row| row.user_id == user_id)
        else {
            return Ok(None);
        };
        row.read |= flags.read;
        row.clicked |= flags.clicked;
        Ok(Some(row.clone()))
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> StorageResult<u64> {
        let mut tables = self.inner.tables.lock().await;
        let mut updated = 0;
        for row in tables.notifications.values_mut() {
            if row.user_id == user_id && !row.read {
                row.read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_notification(&self, notification_id: Uuid, user_id: Uuid) -> StorageResult<bool> {
        let mut tables = self.inner.tables.lock().await;
        let owned = tables
            .notifications
            .get(&notification_id)
            .is_some_and(|row| row.user_id == user_id);
        if owned {
            tables.notifications.shift_remove(&notification_id);
        }
        Ok(owned)
    }

    async fn insert_message(&self, message: ChatMessageEntity) -> StorageResult<()> {
        let mut tables = self.inner.tables.lock().await;
        tables.messages.insert(message.id, message.clone());
        self.publish(ChangeOp::Insert, ChangeRecord::Message(message));
        Ok(())
    }

    async fn list_messages(&self, match_id: Uuid) -> StorageResult<Vec<ChatMessageEntity>> {
        let tables = self.inner.tables.lock().await;
        Ok(tables
            .messages
            .values()
            .filter(|message| message.match_id == match_id)
            .cloned()
            .collect())
    }

    async fn find_profile(&self, user_id: Uuid) -> StorageResult<Option<PlayerProfileEntity>> {
        let tables = self.inner.tables.lock().await;
        Ok(tables.profiles.get(&user_id).cloned())
    }

    async fn upsert_profile(&self, profile: PlayerProfileEntity) -> StorageResult<()> {
        let mut tables = self.inner.tables.lock().await;
        tables.profiles.insert(profile.user_id, profile);
        Ok(())
    }

    async fn increment_red_cards(&self, user_id: Uuid) -> StorageResult<u32> {
        let mut tables = self.inner.tables.lock().await;
        Ok(tables.bump_red_cards(user_id))
    }

    async fn list_sos_candidates(&self) -> StorageResult<Vec<Uuid>> {
        let tables = self.inner.tables.lock().await;
        Ok(tables
            .profiles
            .values()
            .filter(|profile| profile.sos_opt_in)
            .map(|profile| profile.user_id)
            .collect())
    }
}

impl RecordStore for InMemoryRecordStore {
    fn insert_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_match(entity).await })
    }

    fn update_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.update_match(entity).await })
    }

    fn set_sos(
        &self,
        match_id: Uuid,
        active: bool,
    ) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.set_sos(match_id, active).await })
    }

    fn delete_match(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.delete_match(match_id).await })
    }

    fn find_match(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_match(match_id).await })
    }

    fn list_matches(
        &self,
        after: Option<SystemTime>,
    ) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_matches(after).await })
    }

    fn insert_join_request(
        &self,
        entity: JoinRequestEntity,
    ) -> BoxFuture<'static, StorageResult<InsertRequestOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.insert_join_request(entity).await })
    }

    fn find_join_request(
        &self,
        request_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<JoinRequestEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_join_request(request_id).await })
    }

    fn list_join_requests(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<JoinRequestEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_join_requests(match_id).await })
    }

    fn find_active_request(
        &self,
        match_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<JoinRequestEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_active_request(match_id, user_id).await })
    }

    fn count_approved(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move { store.count_approved(match_id).await })
    }

    fn transition_request(
        &self,
        transition: RequestTransition,
    ) -> BoxFuture<'static, StorageResult<TransitionOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.transition_request(transition).await })
    }

    fn transfer_spot(
        &self,
        transfer: SpotTransfer,
    ) -> BoxFuture<'static, StorageResult<TransferOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.transfer_spot(transfer).await })
    }

    fn upsert_push_subscription(
        &self,
        subscription: PushSubscriptionEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_push_subscription(subscription).await })
    }

    fn delete_push_subscription(
        &self,
        endpoint: String,
        owner: Option<Uuid>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_push_subscription(endpoint, owner).await })
    }

    fn list_push_subscriptions(
        &self,
        user_ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<PushSubscriptionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_push_subscriptions(user_ids).await })
    }

    fn insert_notifications(
        &self,
        rows: Vec<NotificationEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_notifications(rows).await })
    }

    fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
    ) -> BoxFuture<'static, StorageResult<Vec<NotificationEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_notifications(user_id, unread_only).await })
    }

    fn raise_notification_flags(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
        flags: NotificationFlags,
    ) -> BoxFuture<'static, StorageResult<Option<NotificationEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .raise_notification_flags(notification_id, user_id, flags)
                .await
        })
    }

    fn mark_all_notifications_read(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.mark_all_notifications_read(user_id).await })
    }

    fn delete_notification(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_notification(notification_id, user_id).await })
    }

    fn insert_message(&self, message: ChatMessageEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_message(message).await })
    }

    fn list_messages(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_messages(match_id).await })
    }

    fn find_profile(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_profile(user_id).await })
    }

    fn upsert_profile(&self, profile: PlayerProfileEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_profile(profile).await })
    }

    fn increment_red_cards(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<u32>> {
        let store = self.clone();
        Box::pin(async move { store.increment_red_cards(user_id).await })
    }

    fn list_sos_candidates(&self) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
        let store = self.clone();
        Box::pin(async move { store.list_sos_candidates().await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dao::{change_feed::Table, models::MatchLevel};

    fn sample_match(organizer_id: Uuid) -> MatchEntity {
        let now = SystemTime::now();
        MatchEntity {
            id: Uuid::new_v4(),
            club_id: "club-centre".into(),
            starts_at: now + Duration::from_secs(3_600),
            duration_minutes: 90,
            level: MatchLevel::Intermediate,
            organizer_id,
            price_per_player_cents: None,
            players_needed: 3,
            sos_active: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn pending_request(match_id: Uuid, user_id: Uuid) -> JoinRequestEntity {
        JoinRequestEntity {
            id: Uuid::new_v4(),
            match_id,
            user_id,
            status: JoinRequestStatus::Pending,
            mood: None,
            created_at: SystemTime::now(),
            reviewed_at: None,
            reviewed_by: None,
        }
    }

    fn approve(request_id: Uuid, actor: Uuid) -> RequestTransition {
        RequestTransition {
            request_id,
            expected: JoinRequestStatus::Pending,
            next: JoinRequestStatus::Approved,
            actor,
            at: SystemTime::now(),
            seat_limit: Some(capacity::MATCH_CAPACITY),
        }
    }

    #[tokio::test]
    async fn duplicate_active_request_returns_existing_row() {
        let store = InMemoryRecordStore::new();
        let entity = sample_match(Uuid::new_v4());
        store.insert_match(entity.clone()).await.unwrap();
        let user = Uuid::new_v4();

        let first = pending_request(entity.id, user);
        let created = store.insert_join_request(first.clone()).await.unwrap();
        assert_eq!(created, InsertRequestOutcome::Created(first.clone()));

        let second = store
            .insert_join_request(pending_request(entity.id, user))
            .await
            .unwrap();
        assert_eq!(second, InsertRequestOutcome::Duplicate(first));
        assert_eq!(store.list_join_requests(entity.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn approval_is_refused_once_the_seat_limit_is_reached() {
        let store = InMemoryRecordStore::new();
        let organizer = Uuid::new_v4();
        let entity = sample_match(organizer);
        store.insert_match(entity.clone()).await.unwrap();

        let mut ids = Vec::new();
        for _ in 0..4 {
            let request = pending_request(entity.id, Uuid::new_v4());
            ids.push(request.id);
            store.insert_join_request(request).await.unwrap();
        }

        for id in &ids[..3] {
            let outcome = store.transition_request(approve(*id, organizer)).await.unwrap();
            assert!(matches!(outcome, TransitionOutcome::Applied(_)));
        }
        let outcome = store
            .transition_request(approve(ids[3], organizer))
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::CapacityExceeded { occupied: 4 });
        assert_eq!(store.count_approved(entity.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn stale_expected_status_is_reported() {
        let store = InMemoryRecordStore::new();
        let organizer = Uuid::new_v4();
        let entity = sample_match(organizer);
        store.insert_match(entity.clone()).await.unwrap();
        let request = pending_request(entity.id, Uuid::new_v4());
        store.insert_join_request(request.clone()).await.unwrap();

        store
            .transition_request(approve(request.id, organizer))
            .await
            .unwrap();
        let outcome = store
            .transition_request(approve(request.id, organizer))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::StatusChanged(JoinRequestStatus::Approved)
        );
    }

    #[tokio::test]
    async fn red_card_transition_bumps_the_counter_in_the_same_write() {
        let store = InMemoryRecordStore::new();
        let organizer = Uuid::new_v4();
        let entity = sample_match(organizer);
        store.insert_match(entity.clone()).await.unwrap();
        let user = Uuid::new_v4();
        let request = pending_request(entity.id, user);
        store.insert_join_request(request.clone()).await.unwrap();
        store
            .transition_request(approve(request.id, organizer))
            .await
            .unwrap();

        let red_card = RequestTransition {
            request_id: request.id,
            expected: JoinRequestStatus::Approved,
            next: JoinRequestStatus::RedCarded,
            actor: organizer,
            at: SystemTime::now(),
            seat_limit: None,
        };
        let outcome = store.transition_request(red_card.clone()).await.unwrap();
        assert!(matches!(outcome, TransitionOutcome::Applied(_)));
        let outcome = store.transition_request(red_card).await.unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::StatusChanged(JoinRequestStatus::RedCarded)
        );

        let profile = store.find_profile(user).await.unwrap().unwrap();
        assert_eq!(profile.red_cards, 1);
        assert_eq!(store.count_approved(entity.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn transfer_promotes_a_pending_request_of_the_receiver() {
        let store = InMemoryRecordStore::new();
        let organizer = Uuid::new_v4();
        let entity = sample_match(organizer);
        store.insert_match(entity.clone()).await.unwrap();

        let (from, to) = (Uuid::new_v4(), Uuid::new_v4());
        let seated = pending_request(entity.id, from);
        store.insert_join_request(seated.clone()).await.unwrap();
        store
            .transition_request(approve(seated.id, organizer))
            .await
            .unwrap();
        let waiting = pending_request(entity.id, to);
        store.insert_join_request(waiting.clone()).await.unwrap();

        let outcome = store
            .transfer_spot(SpotTransfer {
                match_id: entity.id,
                from_user_id: from,
                to_user_id: to,
                actor: from,
                at: SystemTime::now(),
            })
            .await
            .unwrap();

        let TransferOutcome::Applied { released, granted } = outcome else {
            panic!("expected transfer to apply, got {outcome:?}");
        };
        assert_eq!(released.status, JoinRequestStatus::Withdrawn);
        assert_eq!(granted.id, waiting.id);
        assert_eq!(granted.status, JoinRequestStatus::Approved);
        assert_eq!(store.count_approved(entity.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn writes_are_published_on_the_change_feed() {
        let store = InMemoryRecordStore::new();
        let mut changes = store.changes();
        let entity = sample_match(Uuid::new_v4());
        store.insert_match(entity.clone()).await.unwrap();
        store
            .insert_message(ChatMessageEntity {
                id: Uuid::new_v4(),
                match_id: entity.id,
                sender_id: entity.organizer_id,
                text: "see you there".into(),
                created_at: SystemTime::now(),
            })
            .await
            .unwrap();

        let first = changes.recv().await.unwrap();
        assert_eq!(first.table(), Table::Matches);
        assert_eq!(first.op, ChangeOp::Insert);
        let second = changes.recv().await.unwrap();
        assert_eq!(second.table(), Table::Messages);
        assert_eq!(second.match_id(), entity.id);
    }

    #[tokio::test]
    async fn subscriptions_are_keyed_by_endpoint() {
        let store = InMemoryRecordStore::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let subscription = PushSubscriptionEntity {
            user_id: alice,
            endpoint: "https://push.example/device-1".into(),
            public_key: "key".into(),
            auth_secret: "secret".into(),
            updated_at: SystemTime::now(),
        };
        store
            .upsert_push_subscription(subscription.clone())
            .await
            .unwrap();
        store
            .upsert_push_subscription(PushSubscriptionEntity {
                user_id: bob,
                ..subscription.clone()
            })
            .await
            .unwrap();

        assert!(store.list_push_subscriptions(vec![alice]).await.unwrap().is_empty());
        assert!(
            !store
                .delete_push_subscription(subscription.endpoint.clone(), Some(alice))
                .await
                .unwrap()
        );
        assert!(
            store
                .delete_push_subscription(subscription.endpoint, Some(bob))
                .await
                .unwrap()
        );
    }
}

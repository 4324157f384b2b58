use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database, IndexModel,
    bson::{Bson, DateTime, Document, doc},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::{RwLock, broadcast};
use tracing::{error, info};
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{
        JOIN_REQUESTS, JoinRequestDocument, MATCHES, MESSAGES, MatchDocument, MessageDocument,
        NOTIFICATIONS, NotificationDocument, PROFILES, PUSH_SUBSCRIPTIONS, ProfileDocument,
        PushSubscriptionDocument, key,
    },
};
use crate::{
    dao::{
        change_feed::{ChangeEvent, ChangeFeed, ChangeOp, ChangeRecord},
        models::{
            ChatMessageEntity, JoinRequestEntity, JoinRequestStatus, MatchEntity,
            NotificationEntity, PlayerProfileEntity, PushSubscriptionEntity,
        },
        record_store::{
            InsertRequestOutcome, NotificationFlags, RecordStore, RequestTransition, SpotTransfer,
            TransferOutcome, TransitionOutcome,
        },
        storage::StorageResult,
    },
    state::capacity,
};

/// Record store persisted in MongoDB. Writes are echoed on an in-process change feed
/// once acknowledged by the server.
#[derive(Clone)]
pub struct MongoRecordStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
    feed: ChangeFeed,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (_client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        *self.database.write().await = database;
        Ok(())
    }
}

fn set_status(status: JoinRequestStatus, actor: Uuid, at: SystemTime) -> Document {
    doc! {
        "$set": {
            "status": status.as_str(),
            "active": status.is_active(),
            "reviewed_at": DateTime::from_system_time(at),
            "reviewed_by": key(actor),
        }
    }
}

impl MongoRecordStore {
    /// Connect to MongoDB and ensure the indexes the store relies on exist.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (_client, database) =
            establish_connection(&config.options, &config.database_name).await?;
        info!(database = %config.database_name, "connected to MongoDB");

        let store = Self {
            inner: Arc::new(MongoInner {
                database: RwLock::new(database),
                config,
                feed: ChangeFeed::default(),
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        // One active request per (match, user); withdrawn and reviewed rows are exempt.
        self.ensure_index(
            JOIN_REQUESTS,
            "active_request_idx",
            doc! { "match_id": 1, "user_id": 1 },
            IndexOptions::builder()
                .name(Some("active_request_idx".to_owned()))
                .unique(Some(true))
                .partial_filter_expression(Some(doc! { "active": true }))
                .build(),
        )
        .await?;
        self.ensure_index(
            JOIN_REQUESTS,
            "match_requests_idx",
            doc! { "match_id": 1, "created_at": 1 },
            IndexOptions::builder()
                .name(Some("match_requests_idx".to_owned()))
                .build(),
        )
        .await?;
        self.ensure_index(
            MATCHES,
            "match_start_idx",
            doc! { "starts_at": 1 },
            IndexOptions::builder()
                .name(Some("match_start_idx".to_owned()))
                .build(),
        )
        .await?;
        self.ensure_index(
            NOTIFICATIONS,
            "user_notifications_idx",
            doc! { "user_id": 1, "created_at": -1 },
            IndexOptions::builder()
                .name(Some("user_notifications_idx".to_owned()))
                .build(),
        )
        .await?;
        self.ensure_index(
            PUSH_SUBSCRIPTIONS,
            "subscription_user_idx",
            doc! { "user_id": 1 },
            IndexOptions::builder()
                .name(Some("subscription_user_idx".to_owned()))
                .build(),
        )
        .await?;
        self.ensure_index(
            MESSAGES,
            "match_messages_idx",
            doc! { "match_id": 1, "created_at": 1 },
            IndexOptions::builder()
                .name(Some("match_messages_idx".to_owned()))
                .build(),
        )
        .await
    }

    async fn ensure_index(
        &self,
        collection: &'static str,
        index: &'static str,
        keys: Document,
        options: IndexOptions,
    ) -> MongoResult<()> {
        let model = IndexModel::builder().keys(keys).options(options).build();
        self.collection::<Document>(collection)
            .await
            .create_index(model)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection,
                index,
                source,
            })?;
        Ok(())
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.inner.database.read().await.collection::<T>(name)
    }

    fn publish(&self, op: ChangeOp, record: ChangeRecord) {
        self.inner.feed.publish(op, record);
    }

    async fn insert_match(&self, entity: MatchEntity) -> MongoResult<()> {
        self.collection::<MatchDocument>(MATCHES)
            .await
            .insert_one(MatchDocument::new(&entity))
            .await
            .map_err(MongoDaoError::operation(MATCHES, "insert"))?;
        self.publish(ChangeOp::Insert, ChangeRecord::Match(entity));
        Ok(())
    }

    async fn update_match(&self, entity: MatchEntity) -> MongoResult<bool> {
        // `approved_count` is owned by the request writes and left untouched.
        let update = doc! {
            "$set": {
                "club_id": entity.club_id.as_str(),
                "starts_at": DateTime::from_system_time(entity.starts_at),
                "duration_minutes": i32::from(entity.duration_minutes),
                "level": entity.level.as_str(),
                "price_per_player_cents": entity.price_per_player_cents.map(i64::from),
                "players_needed": i32::from(entity.players_needed),
                "sos_active": entity.sos_active,
                "updated_at": DateTime::from_system_time(entity.updated_at),
            }
        };
        let result = self
            .collection::<MatchDocument>(MATCHES)
            .await
            .update_one(doc! { "_id": key(entity.id) }, update)
            .await
            .map_err(MongoDaoError::operation(MATCHES, "update"))?;
        if result.matched_count == 0 {
            return Ok(false);
        }
        self.publish(ChangeOp::Update, ChangeRecord::Match(entity));
        Ok(true)
    }

    async fn set_sos(&self, match_id: Uuid, active: bool) -> MongoResult<Option<MatchEntity>> {
        let updated = self
            .collection::<MatchDocument>(MATCHES)
            .await
            .find_one_and_update(
                doc! { "_id": key(match_id) },
                doc! { "$set": { "sos_active": active, "updated_at": DateTime::now() } },
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(MongoDaoError::operation(MATCHES, "set sos"))?;
        let Some(document) = updated else {
            return Ok(None);
        };
        let entity = document.into_entity()?;
        self.publish(ChangeOp::Update, ChangeRecord::Match(entity.clone()));
        Ok(Some(entity))
    }

    async fn delete_match(&self, match_id: Uuid) -> MongoResult<Option<MatchEntity>> {
        let removed = self
            .collection::<MatchDocument>(MATCHES)
            .await
            .find_one_and_delete(doc! { "_id": key(match_id) })
            .await
            .map_err(MongoDaoError::operation(MATCHES, "delete"))?;
        let Some(document) = removed else {
            return Ok(None);
        };
        let entity = document.into_entity()?;
        self.publish(ChangeOp::Delete, ChangeRecord::Match(entity.clone()));
        Ok(Some(entity))
    }

    async fn find_match(&self, match_id: Uuid) -> MongoResult<Option<MatchEntity>> {
        self.collection::<MatchDocument>(MATCHES)
            .await
            .find_one(doc! { "_id": key(match_id) })
            .await
            .map_err(MongoDaoError::operation(MATCHES, "find"))?
            .map(MatchDocument::into_entity)
            .transpose()
    }

    async fn list_matches(&self, after: Option<SystemTime>) -> MongoResult<Vec<MatchEntity>> {
        let filter = match after {
            Some(after) => doc! { "starts_at": { "$gt": DateTime::from_system_time(after) } },
            None => doc! {},
        };
        let documents: Vec<MatchDocument> = self
            .collection::<MatchDocument>(MATCHES)
            .await
            .find(filter)
            .sort(doc! { "starts_at": 1 })
            .await
            .map_err(MongoDaoError::operation(MATCHES, "list"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::operation(MATCHES, "list"))?;
        documents
            .into_iter()
            .map(MatchDocument::into_entity)
            .collect()
    }

    /// Approved count stored on the match document.
    async fn approved_count(&self, match_id: Uuid) -> MongoResult<usize> {
        let document = self
            .collection::<MatchDocument>(MATCHES)
            .await
            .find_one(doc! { "_id": key(match_id) })
            .await
            .map_err(MongoDaoError::operation(MATCHES, "read seats"))?;
        Ok(document
            .map(|document| usize::try_from(document.approved_count).unwrap_or(0))
            .unwrap_or(0))
    }

    /// Take one seat if the match stays under `limit` occupied seats.
    async fn reserve_seat(&self, match_id: Uuid, limit: usize) -> MongoResult<bool> {
        let max_approved = i64::try_from(limit.saturating_sub(capacity::ORGANIZER_SEATS))
            .unwrap_or(i64::MAX);
        let reserved = self
            .collection::<MatchDocument>(MATCHES)
            .await
            .find_one_and_update(
                doc! { "_id": key(match_id), "approved_count": { "$lt": max_approved } },
                doc! { "$inc": { "approved_count": 1 } },
            )
            .await
            .map_err(MongoDaoError::operation(MATCHES, "reserve seat"))?;
        Ok(reserved.is_some())
    }

    async fn adjust_seats(&self, match_id: Uuid, delta: i64) -> MongoResult<()> {
        self.collection::<MatchDocument>(MATCHES)
            .await
            .update_one(
                doc! { "_id": key(match_id) },
                doc! { "$inc": { "approved_count": delta } },
            )
            .await
            .map_err(MongoDaoError::operation(MATCHES, "adjust seats"))?;
        Ok(())
    }

    async fn insert_join_request(
        &self,
        entity: JoinRequestEntity,
    ) -> MongoResult<InsertRequestOutcome> {
        let inserted = self
            .collection::<JoinRequestDocument>(JOIN_REQUESTS)
            .await
            .insert_one(JoinRequestDocument::from(&entity))
            .await;
        match inserted {
            Ok(_) => {
                self.publish(ChangeOp::Insert, ChangeRecord::JoinRequest(entity.clone()));
                Ok(InsertRequestOutcome::Created(entity))
            }
            Err(err) if is_duplicate_key(&err) => {
                match self
                    .find_active_request(entity.match_id, entity.user_id)
                    .await?
                {
                    Some(existing) => Ok(InsertRequestOutcome::Duplicate(existing)),
                    // the conflicting request was closed in between
                    None => Err(MongoDaoError::operation(JOIN_REQUESTS, "insert")(err)),
                }
            }
            Err(err) => Err(MongoDaoError::operation(JOIN_REQUESTS, "insert")(err)),
        }
    }

    async fn find_request_document(
        &self,
        request_id: Uuid,
    ) -> MongoResult<Option<JoinRequestDocument>> {
        self.collection::<JoinRequestDocument>(JOIN_REQUESTS)
            .await
            .find_one(doc! { "_id": key(request_id) })
            .await
            .map_err(MongoDaoError::operation(JOIN_REQUESTS, "find"))
    }

    async fn find_join_request(&self, request_id: Uuid) -> MongoResult<Option<JoinRequestEntity>> {
        self.find_request_document(request_id)
            .await?
            .map(JoinRequestEntity::try_from)
            .transpose()
    }

    async fn list_join_requests(&self, match_id: Uuid) -> MongoResult<Vec<JoinRequestEntity>> {
        let documents: Vec<JoinRequestDocument> = self
            .collection::<JoinRequestDocument>(JOIN_REQUESTS)
            .await
            .find(doc! { "match_id": key(match_id) })
            .sort(doc! { "created_at": 1 })
            .await
            .map_err(MongoDaoError::operation(JOIN_REQUESTS, "list"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::operation(JOIN_REQUESTS, "list"))?;
        documents
            .into_iter()
            .map(JoinRequestEntity::try_from)
            .collect()
    }

    async fn find_active_request(
        &self,
        match_id: Uuid,
        user_id: Uuid,
    ) -> MongoResult<Option<JoinRequestEntity>> {
        self.collection::<JoinRequestDocument>(JOIN_REQUESTS)
            .await
            .find_one(doc! { "match_id": key(match_id), "user_id": key(user_id), "active": true })
            .await
            .map_err(MongoDaoError::operation(JOIN_REQUESTS, "find active"))?
            .map(JoinRequestEntity::try_from)
            .transpose()
    }

    async fn count_approved(&self, match_id: Uuid) -> MongoResult<usize> {
        let count = self
            .collection::<JoinRequestDocument>(JOIN_REQUESTS)
            .await
            .count_documents(doc! {
                "match_id": key(match_id),
                "status": JoinRequestStatus::Approved.as_str(),
            })
            .await
            .map_err(MongoDaoError::operation(JOIN_REQUESTS, "count approved"))?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    async fn transition_request(
        &self,
        transition: RequestTransition,
    ) -> MongoResult<TransitionOutcome> {
        let Some(current) = self.find_request_document(transition.request_id).await? else {
            return Ok(TransitionOutcome::NotFound);
        };
        if current.status != transition.expected {
            return Ok(TransitionOutcome::StatusChanged(current.status));
        }
        let previous = JoinRequestEntity::try_from(current)?;
        let match_id = previous.match_id;

        let seat_delta: i64 = match (
            transition.expected.holds_seat(),
            transition.next.holds_seat(),
        ) {
            (false, true) => 1,
            (true, false) => -1,
            _ => 0,
        };
        if seat_delta > 0 {
            match transition.seat_limit {
                Some(limit) => {
                    if !self.reserve_seat(match_id, limit).await? {
                        let approved = self.approved_count(match_id).await?;
                        return Ok(TransitionOutcome::CapacityExceeded {
                            occupied: capacity::occupied(approved),
                        });
                    }
                }
                None => self.adjust_seats(match_id, 1).await?,
            }
        }

        let updated = self
            .collection::<JoinRequestDocument>(JOIN_REQUESTS)
            .await
            .find_one_and_update(
                doc! {
                    "_id": key(transition.request_id),
                    "status": transition.expected.as_str(),
                },
                set_status(transition.next, transition.actor, transition.at),
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(MongoDaoError::operation(JOIN_REQUESTS, "transition"));

        let updated = match updated {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                // lost the race: give the seat back and report what the winner wrote
                if seat_delta > 0 {
                    self.release_seat(match_id).await;
                }
                return Ok(match self.find_request_document(transition.request_id).await? {
                    Some(document) => TransitionOutcome::StatusChanged(document.status),
                    None => TransitionOutcome::NotFound,
                });
            }
            Err(err) => {
                // the write may still have landed; only hand the seat back when it did not
                if seat_delta > 0
                    && self
                        .has_status(transition.request_id, transition.expected)
                        .await
                {
                    self.release_seat(match_id).await;
                }
                return Err(err);
            }
        };

        if let Err(err) = self.settle_transition(&transition, &previous, seat_delta).await {
            self.revert_transition(&transition, &previous).await;
            return Err(err);
        }

        let entity = JoinRequestEntity::try_from(updated)?;
        self.publish(ChangeOp::Update, ChangeRecord::JoinRequest(entity.clone()));
        Ok(TransitionOutcome::Applied(entity))
    }

    /// Follow-up writes of a committed status change: the freed seat and the red card
    /// counter. Either both land or neither does.
    async fn settle_transition(
        &self,
        transition: &RequestTransition,
        previous: &JoinRequestEntity,
        seat_delta: i64,
    ) -> MongoResult<()> {
        if seat_delta < 0 {
            self.adjust_seats(previous.match_id, -1).await?;
        }
        if transition.next != JoinRequestStatus::RedCarded {
            return Ok(());
        }
        let Err(err) = self.increment_red_cards(previous.user_id).await else {
            return Ok(());
        };
        if seat_delta < 0 {
            let restored = self.adjust_seats(previous.match_id, 1).await;
            if let Err(restore) = restored {
                error!(
                    match_id = %previous.match_id,
                    error = %restore,
                    "failed to restore seat count"
                );
            }
        }
        Err(err)
    }

    /// Put a request back to the status it had before `transition` was committed.
    async fn revert_transition(
        &self,
        transition: &RequestTransition,
        previous: &JoinRequestEntity,
    ) {
        let reverted = self
            .collection::<JoinRequestDocument>(JOIN_REQUESTS)
            .await
            .update_one(
                doc! { "_id": key(previous.id), "status": transition.next.as_str() },
                doc! {
                    "$set": {
                        "status": previous.status.as_str(),
                        "active": previous.status.is_active(),
                        "reviewed_at": previous.reviewed_at.map(DateTime::from_system_time),
                        "reviewed_by": previous.reviewed_by.map(key),
                    }
                },
            )
            .await;
        if let Err(err) = reverted {
            error!(request_id = %previous.id, error = %err, "failed to revert join request");
        }
    }

    async fn has_status(&self, request_id: Uuid, status: JoinRequestStatus) -> bool {
        matches!(
            self.find_request_document(request_id).await,
            Ok(Some(document)) if document.status == status
        )
    }

    /// Hand back a seat reserved for a write that did not happen.
    async fn release_seat(&self, match_id: Uuid) {
        if let Err(err) = self.adjust_seats(match_id, -1).await {
            error!(match_id = %match_id, error = %err, "failed to release reserved seat");
        }
    }

    async fn transfer_spot(&self, transfer: SpotTransfer) -> MongoResult<TransferOutcome> {
        let source = self
            .find_active_request(transfer.match_id, transfer.from_user_id)
            .await?;
        let Some(source) = source.filter(|request| request.status.holds_seat()) else {
            return Ok(TransferOutcome::SourceNotSeated);
        };
        let target = self
            .find_active_request(transfer.match_id, transfer.to_user_id)
            .await?;
        if target
            .as_ref()
            .is_some_and(|request| request.status.holds_seat())
        {
            return Ok(TransferOutcome::TargetAlreadySeated);
        }

        let requests = self
            .collection::<JoinRequestDocument>(JOIN_REQUESTS)
            .await;
        let released = requests
            .find_one_and_update(
                doc! {
                    "_id": key(source.id),
                    "status": JoinRequestStatus::Approved.as_str(),
                },
                set_status(JoinRequestStatus::Withdrawn, transfer.actor, transfer.at),
            )
            .return_document(ReturnDocument::After)
            .await
            .map_err(MongoDaoError::operation(JOIN_REQUESTS, "release seat"))?;
        let Some(released) = released else {
            return Ok(TransferOutcome::SourceNotSeated);
        };
        let released = JoinRequestEntity::try_from(released)?;

        let Some((granted, op)) = self.grant_seat(&transfer, target).await? else {
            // the receiver got seated concurrently: hand the seat back to its holder
            requests
                .update_one(
                    doc! { "_id": key(source.id) },
                    doc! {
                        "$set": {
                            "status": JoinRequestStatus::Approved.as_str(),
                            "active": true,
                            "reviewed_at": source.reviewed_at.map(DateTime::from_system_time),
                            "reviewed_by": source.reviewed_by.map(key),
                        }
                    },
                )
                .await
                .map_err(MongoDaoError::operation(JOIN_REQUESTS, "restore seat"))?;
            return Ok(TransferOutcome::TargetAlreadySeated);
        };

        self.publish(ChangeOp::Update, ChangeRecord::JoinRequest(released.clone()));
        self.publish(op, ChangeRecord::JoinRequest(granted.clone()));
        Ok(TransferOutcome::Applied { released, granted })
    }

    /// Approve the receiver's pending request, or create an approved one. `None` when the
    /// receiver already holds a seat.
    async fn grant_seat(
        &self,
        transfer: &SpotTransfer,
        pending: Option<JoinRequestEntity>,
    ) -> MongoResult<Option<(JoinRequestEntity, ChangeOp)>> {
        let requests = self
            .collection::<JoinRequestDocument>(JOIN_REQUESTS)
            .await;

        if let Some(pending) = pending {
            let promoted = requests
                .find_one_and_update(
                    doc! {
                        "_id": key(pending.id),
                        "status": JoinRequestStatus::Pending.as_str(),
                    },
                    set_status(JoinRequestStatus::Approved, transfer.actor, transfer.at),
                )
                .return_document(ReturnDocument::After)
                .await
                .map_err(MongoDaoError::operation(JOIN_REQUESTS, "grant seat"))?;
            if let Some(promoted) = promoted {
                return Ok(Some((JoinRequestEntity::try_from(promoted)?, ChangeOp::Update)));
            }
        }

        let granted = JoinRequestEntity {
            id: Uuid::new_v4(),
            match_id: transfer.match_id,
            user_id: transfer.to_user_id,
            status: JoinRequestStatus::Approved,
            mood: None,
            created_at: transfer.at,
            reviewed_at: Some(transfer.at),
            reviewed_by: Some(transfer.actor),
        };
        match requests
            .insert_one(JoinRequestDocument::from(&granted))
            .await
        {
            Ok(_) => Ok(Some((granted, ChangeOp::Insert))),
            Err(err) if is_duplicate_key(&err) => Ok(None),
            Err(err) => Err(MongoDaoError::operation(JOIN_REQUESTS, "grant seat")(err)),
        }
    }

    async fn upsert_push_subscription(
        &self,
        subscription: PushSubscriptionEntity,
    ) -> MongoResult<()> {
        self.collection::<PushSubscriptionDocument>(PUSH_SUBSCRIPTIONS)
            .await
            .replace_one(
                doc! { "_id": subscription.endpoint.as_str() },
                PushSubscriptionDocument::from(&subscription),
            )
            .upsert(true)
            .await
            .map_err(MongoDaoError::operation(PUSH_SUBSCRIPTIONS, "upsert"))?;
        Ok(())
    }

    async fn delete_push_subscription(
        &self,
        endpoint: String,
        owner: Option<Uuid>,
    ) -> MongoResult<bool> {
        let mut filter = doc! { "_id": endpoint };
        if let Some(owner) = owner {
            filter.insert("user_id", key(owner));
        }
        let result = self
            .collection::<PushSubscriptionDocument>(PUSH_SUBSCRIPTIONS)
            .await
            .delete_one(filter)
            .await
            .map_err(MongoDaoError::operation(PUSH_SUBSCRIPTIONS, "delete"))?;
        Ok(result.deleted_count > 0)
    }

    async fn list_push_subscriptions(
        &self,
        user_ids: Vec<Uuid>,
    ) -> MongoResult<Vec<PushSubscriptionEntity>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = user_ids.into_iter().map(key).collect();
        let documents: Vec<PushSubscriptionDocument> = self
            .collection::<PushSubscriptionDocument>(PUSH_SUBSCRIPTIONS)
            .await
            .find(doc! { "user_id": { "$in": keys } })
            .await
            .map_err(MongoDaoError::operation(PUSH_SUBSCRIPTIONS, "list"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::operation(PUSH_SUBSCRIPTIONS, "list"))?;
        documents
            .into_iter()
            .map(PushSubscriptionEntity::try_from)
            .collect()
    }

    async fn insert_notifications(&self, rows: Vec<NotificationEntity>) -> MongoResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let documents: Vec<NotificationDocument> =
            rows.iter().map(NotificationDocument::from).collect();
        self.collection::<NotificationDocument>(NOTIFICATIONS)
            .await
            .insert_many(documents)
            .await
            .map_err(MongoDaoError::operation(NOTIFICATIONS, "insert"))?;
        Ok(())
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
    ) -> MongoResult<Vec<NotificationEntity>> {
        let mut filter = doc! { "user_id": key(user_id) };
        if unread_only {
            filter.insert("read", false);
        }
        let documents: Vec<NotificationDocument> = self
            .collection::<NotificationDocument>(NOTIFICATIONS)
            .await
            .find(filter)
            .sort(doc! { "created_at": -1 })
            .await
            .map_err(MongoDaoError::operation(NOTIFICATIONS, "list"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::operation(NOTIFICATIONS, "list"))?;
        documents
            .into_iter()
            .map(NotificationEntity::try_from)
            .collect()
    }

    async fn raise_notification_flags(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
        flags: NotificationFlags,
    ) -> MongoResult<Option<NotificationEntity>> {
        let filter = doc! { "_id": key(notification_id), "user_id": key(user_id) };
        let mut raised = Document::new();
        if flags.read {
            raised.insert("read", true);
        }
        if flags.clicked {
            raised.insert("clicked", true);
        }

        let collection = self
            .collection::<NotificationDocument>(NOTIFICATIONS)
            .await;
        let found = if raised.is_empty() {
            collection.find_one(filter).await
        } else {
            collection
                .find_one_and_update(filter, doc! { "$set": raised })
                .return_document(ReturnDocument::After)
                .await
        };
        let document = found.map_err(MongoDaoError::operation(NOTIFICATIONS, "raise flags"))?;
        document.map(NotificationEntity::try_from).transpose()
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> MongoResult<u64> {
        let result = self
            .collection::<NotificationDocument>(NOTIFICATIONS)
            .await
            .update_many(
                doc! { "user_id": key(user_id), "read": false },
                doc! { "$set": { "read": true } },
            )
            .await
            .map_err(MongoDaoError::operation(NOTIFICATIONS, "mark all read"))?;
        Ok(result.modified_count)
    }

    async fn delete_notification(&self, notification_id: Uuid, user_id: Uuid) -> MongoResult<bool> {
        let result = self
            .collection::<NotificationDocument>(NOTIFICATIONS)
            .await
            .delete_one(doc! { "_id": key(notification_id), "user_id": key(user_id) })
            .await
            .map_err(MongoDaoError::operation(NOTIFICATIONS, "delete"))?;
        Ok(result.deleted_count > 0)
    }

    async fn insert_message(&self, message: ChatMessageEntity) -> MongoResult<()> {
        self.collection::<MessageDocument>(MESSAGES)
            .await
            .insert_one(MessageDocument::from(&message))
            .await
            .map_err(MongoDaoError::operation(MESSAGES, "insert"))?;
        self.publish(ChangeOp::Insert, ChangeRecord::Message(message));
        Ok(())
    }

    async fn list_messages(&self, match_id: Uuid) -> MongoResult<Vec<ChatMessageEntity>> {
        let documents: Vec<MessageDocument> = self
            .collection::<MessageDocument>(MESSAGES)
            .await
            .find(doc! { "match_id": key(match_id) })
            .sort(doc! { "created_at": 1 })
            .await
            .map_err(MongoDaoError::operation(MESSAGES, "list"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::operation(MESSAGES, "list"))?;
        documents
            .into_iter()
            .map(ChatMessageEntity::try_from)
            .collect()
    }

    async fn find_profile(&self, user_id: Uuid) -> MongoResult<Option<PlayerProfileEntity>> {
        self.collection::<ProfileDocument>(PROFILES)
            .await
            .find_one(doc! { "_id": key(user_id) })
            .await
            .map_err(MongoDaoError::operation(PROFILES, "find"))?
            .map(PlayerProfileEntity::try_from)
            .transpose()
    }

    async fn upsert_profile(&self, profile: PlayerProfileEntity) -> MongoResult<()> {
        self.collection::<ProfileDocument>(PROFILES)
            .await
            .replace_one(
                doc! { "_id": key(profile.user_id) },
                ProfileDocument::from(&profile),
            )
            .upsert(true)
            .await
            .map_err(MongoDaoError::operation(PROFILES, "upsert"))?;
        Ok(())
    }

    async fn increment_red_cards(&self, user_id: Uuid) -> MongoResult<u32> {
        let document = self
            .collection::<ProfileDocument>(PROFILES)
            .await
            .find_one_and_update(
                doc! { "_id": key(user_id) },
                doc! {
                    "$inc": { "red_cards": 1_i64 },
                    "$set": { "updated_at": DateTime::now() },
                    "$setOnInsert": { "display_name": Bson::Null, "sos_opt_in": false },
                },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(MongoDaoError::operation(PROFILES, "increment red cards"))?
            .ok_or_else(|| MongoDaoError::Corrupted {
                collection: PROFILES,
                message: format!("profile `{user_id}` missing after upsert"),
            })?;
        Ok(PlayerProfileEntity::try_from(document)?.red_cards)
    }

    async fn list_sos_candidates(&self) -> MongoResult<Vec<Uuid>> {
        let documents: Vec<ProfileDocument> = self
            .collection::<ProfileDocument>(PROFILES)
            .await
            .find(doc! { "sos_opt_in": true })
            .await
            .map_err(MongoDaoError::operation(PROFILES, "list sos candidates"))?
            .try_collect()
            .await
            .map_err(MongoDaoError::operation(PROFILES, "list sos candidates"))?;
        documents
            .into_iter()
            .map(|document| PlayerProfileEntity::try_from(document).map(|p| p.user_id))
            .collect()
    }
}

impl RecordStore for MongoRecordStore {
    fn insert_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_match(entity).await.map_err(Into::into) })
    }

    fn update_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.update_match(entity).await.map_err(Into::into) })
    }

    fn set_sos(
        &self,
        match_id: Uuid,
        active: bool,
    ) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.set_sos(match_id, active).await.map_err(Into::into) })
    }

    fn delete_match(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.delete_match(match_id).await.map_err(Into::into) })
    }

    fn find_match(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_match(match_id).await.map_err(Into::into) })
    }

    fn list_matches(
        &self,
        after: Option<SystemTime>,
    ) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_matches(after).await.map_err(Into::into) })
    }

    fn insert_join_request(
        &self,
        entity: JoinRequestEntity,
    ) -> BoxFuture<'static, StorageResult<InsertRequestOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.insert_join_request(entity).await.map_err(Into::into) })
    }

    fn find_join_request(
        &self,
        request_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<JoinRequestEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_join_request(request_id).await.map_err(Into::into) })
    }

    fn list_join_requests(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<JoinRequestEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_join_requests(match_id).await.map_err(Into::into) })
    }

    fn find_active_request(
        &self,
        match_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<JoinRequestEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_active_request(match_id, user_id)
                .await
                .map_err(Into::into)
        })
    }

    fn count_approved(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move { store.count_approved(match_id).await.map_err(Into::into) })
    }

    fn transition_request(
        &self,
        transition: RequestTransition,
    ) -> BoxFuture<'static, StorageResult<TransitionOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.transition_request(transition).await.map_err(Into::into) })
    }

    fn transfer_spot(
        &self,
        transfer: SpotTransfer,
    ) -> BoxFuture<'static, StorageResult<TransferOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.transfer_spot(transfer).await.map_err(Into::into) })
    }

    fn upsert_push_subscription(
        &self,
        subscription: PushSubscriptionEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert_push_subscription(subscription)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_push_subscription(
        &self,
        endpoint: String,
        owner: Option<Uuid>,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_push_subscription(endpoint, owner)
                .await
                .map_err(Into::into)
        })
    }

    fn list_push_subscriptions(
        &self,
        user_ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<PushSubscriptionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_push_subscriptions(user_ids)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_notifications(
        &self,
        rows: Vec<NotificationEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_notifications(rows).await.map_err(Into::into) })
    }

    fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
    ) -> BoxFuture<'static, StorageResult<Vec<NotificationEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_notifications(user_id, unread_only)
                .await
                .map_err(Into::into)
        })
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
                .map_err(Into::into)
        })
    }

    fn mark_all_notifications_read(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .mark_all_notifications_read(user_id)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_notification(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_notification(notification_id, user_id)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_message(&self, message: ChatMessageEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_message(message).await.map_err(Into::into) })
    }

    fn list_messages(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_messages(match_id).await.map_err(Into::into) })
    }

    fn find_profile(
        &self,
        user_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_profile(user_id).await.map_err(Into::into) })
    }

    fn upsert_profile(&self, profile: PlayerProfileEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_profile(profile).await.map_err(Into::into) })
    }

    fn increment_red_cards(&self, user_id: Uuid) -> BoxFuture<'static, StorageResult<u32>> {
        let store = self.clone();
        Box::pin(async move { store.increment_red_cards(user_id).await.map_err(Into::into) })
    }

    fn list_sos_candidates(&self) -> BoxFuture<'static, StorageResult<Vec<Uuid>>> {
        let store = self.clone();
        Box::pin(async move { store.list_sos_candidates().await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.feed.subscribe()
    }
}

//! Notification fan-out: persist one in-app row per recipient, pick the latest device of
//! each recipient and push to those devices concurrently. Delivery never fails the
//! action that triggered it; outcomes are logged and published as [`DeliveryReport`]s.

use std::{sync::Arc, time::SystemTime};

use futures::{StreamExt, stream};
use indexmap::{IndexMap, IndexSet};
use tokio::{sync::broadcast, task::JoinHandle, time::timeout};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    config::FanoutConfig,
    dao::{
        models::{NotificationEntity, NotificationKind, PushSubscriptionEntity},
        record_store::RecordStore,
    },
    services::push_transport::{DeliveryFailure, PushPayload, PushTarget, PushTransport},
};

/// One logical notification addressed to a set of users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
}

impl Notice {
    /// Build a notice with the default title of its kind.
    pub fn new(kind: NotificationKind, body: impl Into<String>) -> Self {
        let title = default_title(&kind).to_string();
        Self {
            kind,
            title,
            body: body.into(),
        }
    }

    fn payload(&self) -> PushPayload {
        PushPayload {
            kind: self.kind.tag().to_string(),
            match_id: self.kind.match_id(),
            title: self.title.clone(),
            body: self.body.clone(),
            url: self.kind.url(),
            urgent: self.kind.is_urgent(),
        }
    }
}

fn default_title(kind: &NotificationKind) -> &'static str {
    match kind {
        NotificationKind::JoinRequested { .. } => "New join request",
        NotificationKind::RequestApproved { .. } => "You're in!",
        NotificationKind::RequestRejected { .. } => "Join request declined",
        NotificationKind::PlayerJoined { .. } => "A player joined your match",
        NotificationKind::RedCarded { .. } => "You received a red card",
        NotificationKind::RequestWithdrawn { .. } => "A player left your match",
        NotificationKind::SpotTransferred { .. } => "A spot was transferred",
        NotificationKind::MatchUpdated { .. } => "Match updated",
        NotificationKind::MatchCancelled { .. } => "Match cancelled",
        NotificationKind::SosAlert { .. } => "SOS: a match needs a player",
        NotificationKind::ChatMessage { .. } => "New message",
        NotificationKind::MatchEndingSoon { .. } => "Match ending soon",
        NotificationKind::MatchEnded { .. } => "Match finished",
    }
}

/// Summary of one fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub kind: &'static str,
    pub match_id: Uuid,
    /// Distinct users addressed.
    pub recipients: usize,
    /// Notification rows written.
    pub persisted: usize,
    /// Pushes accepted by the transport.
    pub sent: usize,
    pub failures: Vec<DeliveryFailure>,
    /// Subscriptions removed after a permanent failure.
    pub pruned: usize,
}

impl DeliveryReport {
    /// Number of deliveries that did not go through.
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Keep only the most recently updated subscription of each user.
pub fn latest_device_per_user(
    subscriptions: Vec<PushSubscriptionEntity>,
) -> Vec<PushSubscriptionEntity> {
    let mut latest: IndexMap<Uuid, PushSubscriptionEntity> = IndexMap::new();
    for subscription in subscriptions {
        match latest.get(&subscription.user_id) {
            Some(current) if current.updated_at >= subscription.updated_at => {}
            _ => {
                latest.insert(subscription.user_id, subscription);
            }
        }
    }
    latest.into_values().collect()
}

/// Fan-out engine shared by every service that notifies users.
pub struct NotificationFanout {
    transport: Arc<dyn PushTransport>,
    config: FanoutConfig,
    reports: broadcast::Sender<DeliveryReport>,
}

impl NotificationFanout {
    /// Fan-out engine pushing through `transport`. Reports are buffered up to
    /// `config.report_capacity`.
    pub fn new(transport: Arc<dyn PushTransport>, config: FanoutConfig) -> Self {
        let (reports, _receiver) = broadcast::channel(config.report_capacity.max(1));
        Self {
            transport,
            config,
            reports,
        }
    }

    /// Observe the reports of every completed fan-out.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<DeliveryReport> {
        self.reports.subscribe()
    }

    /// Run [`Self::notify`] in the background. The caller never waits on delivery.
    pub fn dispatch<I>(
        self: &Arc<Self>,
        store: Arc<dyn RecordStore>,
        recipients: I,
        notice: Notice,
    ) -> JoinHandle<DeliveryReport>
    where
        I: IntoIterator<Item = Uuid>,
    {
        let recipients: Vec<Uuid> = recipients.into_iter().collect();
        let fanout = Arc::clone(self);
        tokio::spawn(async move { fanout.notify(store.as_ref(), recipients, notice).await })
    }

    /// Persist, resolve devices, deliver and report.
    pub async fn notify(
        &self,
        store: &dyn RecordStore,
        recipients: Vec<Uuid>,
        notice: Notice,
    ) -> DeliveryReport {
        let recipients: IndexSet<Uuid> = recipients.into_iter().collect();
        let mut report = DeliveryReport {
            kind: notice.kind.tag(),
            match_id: notice.kind.match_id(),
            recipients: recipients.len(),
            persisted: 0,
            sent: 0,
            failures: Vec::new(),
            pruned: 0,
        };
        if recipients.is_empty() {
            return report;
        }

        let now = SystemTime::now();
        let rows: Vec<NotificationEntity> = recipients
            .iter()
            .map(|user_id| NotificationEntity {
                id: Uuid::new_v4(),
                user_id: *user_id,
                kind: notice.kind.clone(),
                title: notice.title.clone(),
                body: notice.body.clone(),
                read: false,
                clicked: false,
                created_at: now,
            })
            .collect();
        let row_count = rows.len();
        match store.insert_notifications(rows).await {
            Ok(()) => report.persisted = row_count,
            Err(err) => error!(
                kind = report.kind,
                match_id = %report.match_id,
                error = %err,
                "failed to persist notification rows"
            ),
        }

        let subscriptions = match store
            .list_push_subscriptions(recipients.iter().copied().collect())
            .await
        {
            Ok(subscriptions) => latest_device_per_user(subscriptions),
            Err(err) => {
                warn!(
                    kind = report.kind,
                    error = %err,
                    "failed to resolve push subscriptions; skipping push delivery"
                );
                Vec::new()
            }
        };

        let payload = notice.payload();
        let push_timeout = self.config.push_timeout();
        let outcomes: Vec<(Uuid, Result<(), DeliveryFailure>)> = stream::iter(subscriptions)
            .map(|subscription| {
                let transport = Arc::clone(&self.transport);
                let payload = payload.clone();
                async move {
                    let target = PushTarget::from(&subscription);
                    let endpoint = target.endpoint.clone();
                    let outcome = match timeout(push_timeout, transport.deliver(target, payload)).await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => Err(DeliveryFailure::transient(endpoint, "delivery timed out")),
                    };
                    (subscription.user_id, outcome)
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for (user_id, outcome) in outcomes {
            match outcome {
                Ok(()) => report.sent += 1,
                Err(failure) => {
                    warn!(
                        transport = self.transport.name(),
                        user_id = %user_id,
                        endpoint = %failure.endpoint,
                        permanent = failure.permanent,
                        error = %failure.message,
                        "push delivery failed"
                    );
                    if failure.permanent {
                        match store
                            .delete_push_subscription(failure.endpoint.clone(), Some(user_id))
                            .await
                        {
                            Ok(true) => report.pruned += 1,
                            Ok(false) => {}
                            Err(err) => warn!(
                                endpoint = %failure.endpoint,
                                error = %err,
                                "failed to prune expired push subscription"
                            ),
                        }
                    }
                    report.failures.push(failure);
                }
            }
        }

        info!(
            kind = report.kind,
            match_id = %report.match_id,
            recipients = report.recipients,
            persisted = report.persisted,
            sent = report.sent,
            failed = report.failed(),
            pruned = report.pruned,
            "notification fan-out completed"
        );
        let _ = self.reports.send(report.clone());
        report
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::HashSet,
        sync::Mutex,
        time::Duration,
    };

    use futures::future::BoxFuture;

    use super::*;
    use crate::dao::record_store::InMemoryRecordStore;

    /// Transport recording every delivery; endpoints listed in `gone` fail permanently
    /// and endpoints in `flaky` fail transiently.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub delivered: Mutex<Vec<(String, PushPayload)>>,
        pub gone: HashSet<String>,
        pub flaky: HashSet<String>,
    }

    impl RecordingTransport {
        pub fn endpoints(&self) -> Vec<String> {
            let delivered = self.delivered.lock().unwrap();
            delivered.iter().map(|(endpoint, _)| endpoint.clone()).collect()
        }
    }

    impl PushTransport for RecordingTransport {
        fn deliver(
            &self,
            target: PushTarget,
            payload: PushPayload,
        ) -> BoxFuture<'static, Result<(), DeliveryFailure>> {
            let outcome = if self.gone.contains(&target.endpoint) {
                Err(DeliveryFailure::permanent(&target.endpoint, "gone"))
            } else if self.flaky.contains(&target.endpoint) {
                Err(DeliveryFailure::transient(&target.endpoint, "unreachable"))
            } else {
                self.delivered
                    .lock()
                    .unwrap()
                    .push((target.endpoint.clone(), payload));
                Ok(())
            };
            Box::pin(async move { outcome })
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn subscription(user_id: Uuid, endpoint: &str, age_secs: u64) -> PushSubscriptionEntity {
        PushSubscriptionEntity {
            user_id,
            endpoint: endpoint.to_string(),
            public_key: "pk".into(),
            auth_secret: "auth".into(),
            updated_at: SystemTime::now() - Duration::from_secs(age_secs),
        }
    }

    fn chat_notice(match_id: Uuid) -> Notice {
        Notice::new(
            NotificationKind::ChatMessage {
                match_id,
                message_id: Uuid::new_v4(),
                sender_id: Uuid::new_v4(),
            },
            "hello",
        )
    }

    #[test]
    fn latest_device_wins_per_user() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let picked = latest_device_per_user(vec![
            subscription(alice, "alice-old", 300),
            subscription(bob, "bob", 10),
            subscription(alice, "alice-new", 5),
        ]);
        let endpoints: Vec<_> = picked.iter().map(|s| s.endpoint.as_str()).collect();
        assert_eq!(endpoints, vec!["alice-new", "bob"]);
    }

    #[tokio::test]
    async fn one_push_per_user_to_the_latest_device() {
        let store = InMemoryRecordStore::new();
        let user = Uuid::new_v4();
        store
            .upsert_push_subscription(subscription(user, "t1", 120))
            .await
            .unwrap();
        store
            .upsert_push_subscription(subscription(user, "t2", 1))
            .await
            .unwrap();

        let transport = Arc::new(RecordingTransport::default());
        let fanout = NotificationFanout::new(transport.clone(), FanoutConfig::default());
        let report = fanout
            .notify(&store, vec![user, user], chat_notice(Uuid::new_v4()))
            .await;

        assert_eq!(transport.endpoints(), vec!["t2".to_string()]);
        assert_eq!(report.recipients, 1);
        assert_eq!(report.persisted, 1);
        assert_eq!(report.sent, 1);
    }

    #[tokio::test]
    async fn failures_are_isolated_and_expired_devices_pruned() {
        let store = InMemoryRecordStore::new();
        let ok_user = Uuid::new_v4();
        let gone_user = Uuid::new_v4();
        let flaky_user = Uuid::new_v4();
        for (user, endpoint) in [(ok_user, "ok"), (gone_user, "gone"), (flaky_user, "flaky")] {
            store
                .upsert_push_subscription(subscription(user, endpoint, 1))
                .await
                .unwrap();
        }

        let transport = Arc::new(RecordingTransport {
            gone: HashSet::from(["gone".to_string()]),
            flaky: HashSet::from(["flaky".to_string()]),
            ..Default::default()
        });
        let fanout = NotificationFanout::new(transport.clone(), FanoutConfig::default());
        let report = fanout
            .notify(
                &store,
                vec![ok_user, gone_user, flaky_user],
                chat_notice(Uuid::new_v4()),
            )
            .await;

        assert_eq!(report.persisted, 3);
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.pruned, 1);

        let remaining = store
            .list_push_subscriptions(vec![ok_user, gone_user, flaky_user])
            .await
            .unwrap();
        let mut endpoints: Vec<_> = remaining.into_iter().map(|s| s.endpoint).collect();
        endpoints.sort();
        assert_eq!(endpoints, vec!["flaky".to_string(), "ok".to_string()]);

        for user in [ok_user, gone_user, flaky_user] {
            let rows = store.list_notifications(user, true).await.unwrap();
            assert_eq!(rows.len(), 1);
        }
    }

    #[tokio::test]
    async fn dispatch_publishes_a_report() {
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
        let fanout = Arc::new(NotificationFanout::new(
            Arc::new(RecordingTransport::default()),
            FanoutConfig::default(),
        ));
        let mut reports = fanout.subscribe_reports();
        let match_id = Uuid::new_v4();

        fanout.dispatch(store, [Uuid::new_v4(), Uuid::new_v4()], chat_notice(match_id));

        let report = reports.recv().await.unwrap();
        assert_eq!(report.kind, "chat_message");
        assert_eq!(report.match_id, match_id);
        assert_eq!(report.persisted, 2);
        assert_eq!(report.sent, 0);
    }

    #[tokio::test]
    async fn empty_recipient_sets_write_nothing() {
        let store = InMemoryRecordStore::new();
        let fanout = NotificationFanout::new(
            Arc::new(RecordingTransport::default()),
            FanoutConfig::default(),
        );
        let report = fanout.notify(&store, Vec::new(), chat_notice(Uuid::new_v4())).await;
        assert_eq!(report.recipients, 0);
        assert_eq!(report.persisted, 0);
    }
}

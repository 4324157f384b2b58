pub mod capacity;
pub mod join_request;
pub mod realtime;
pub mod reminders;

use std::sync::Arc;

use tokio::{
    sync::{Mutex, RwLock, watch},
    task::JoinHandle,
};

use crate::{
    config::AppConfig,
    dao::record_store::RecordStore,
    error::ServiceError,
    services::{
        notification_service::NotificationFanout, push_transport::PushTransport,
        realtime_service,
    },
};

pub use self::realtime::RealtimeHub;
use self::reminders::ReminderScheduler;

pub type SharedState = Arc<AppState>;

/// Central application state: the installed record store, realtime hub, fan-out engine
/// and reminder timers.
pub struct AppState {
    config: AppConfig,
    store: RwLock<Option<Arc<dyn RecordStore>>>,
    degraded: watch::Sender<bool>,
    realtime: RealtimeHub,
    fanout: Arc<NotificationFanout>,
    reminders: ReminderScheduler,
    propagator: Mutex<Option<JoinHandle<()>>>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a record store is installed.
    pub fn new(config: AppConfig, transport: Arc<dyn PushTransport>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            realtime: RealtimeHub::new(config.realtime.channel_capacity),
            fanout: Arc::new(NotificationFanout::new(transport, config.fanout.clone())),
            reminders: ReminderScheduler::new(),
            store: RwLock::new(None),
            degraded: degraded_tx,
            propagator: Mutex::new(None),
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current record store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn RecordStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current record store or [`ServiceError::Degraded`].
    pub async fn require_store(&self) -> Result<Arc<dyn RecordStore>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a record store, start propagating its changes and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn RecordStore>) {
        let handle = realtime_service::spawn_propagator(store.changes(), self.realtime.clone());
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        if let Some(previous) = self.propagator.lock().await.replace(handle) {
            previous.abort();
        }
        self.update_degraded(false);
    }

    /// Remove the current record store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        if let Some(previous) = self.propagator.lock().await.take() {
            previous.abort();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Broadcast hub feeding the SSE streams.
    pub fn realtime(&self) -> &RealtimeHub {
        &self.realtime
    }

    /// Notification fan-out engine.
    pub fn fanout(&self) -> &Arc<NotificationFanout> {
        &self.fanout
    }

    /// End-of-match reminder timers.
    pub fn reminders(&self) -> &ReminderScheduler {
        &self.reminders
    }
}

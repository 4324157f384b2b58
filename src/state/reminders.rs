//! End-of-match reminder timers keyed by signature.
//!
//! Each timer is a spawned task sleeping until its fire time. Scheduling a signature that
//! is already pending is a no-op; finished timers remove their own entry.

use std::{
    fmt,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::SystemTime,
};

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::{task::AbortHandle, time::sleep};
use tracing::debug;
use uuid::Uuid;

/// Reminder emitted around the end of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderKind {
    /// Fires a few minutes before the scheduled end.
    EndingSoon,
    /// Fires at the scheduled end.
    Ended,
}

impl ReminderKind {
    /// Label used in logs and task signatures.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::EndingSoon => "ending_soon",
            ReminderKind::Ended => "ended",
        }
    }
}

/// Identity of a scheduled reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReminderSignature {
    pub match_id: Uuid,
    pub kind: ReminderKind,
    pub fire_at: SystemTime,
}

impl fmt::Display for ReminderSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self
            .fire_at
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        write!(f, "{}:{}:{}", self.match_id, self.kind.as_str(), secs)
    }
}

/// Result of [`ReminderScheduler::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled,
    /// A timer with the same signature is still pending.
    AlreadyScheduled,
    /// The fire time has already passed; nothing was scheduled.
    InPast,
}

struct PendingTimer {
    generation: u64,
    handle: AbortHandle,
}

/// Owner of every pending reminder timer.
pub struct ReminderScheduler {
    timers: Arc<DashMap<ReminderSignature, PendingTimer>>,
    generation: AtomicU64,
}

impl Default for ReminderScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ReminderScheduler {
    /// Empty scheduler; nothing is pending until [`Self::schedule`] is called.
    pub fn new() -> Self {
        Self {
            timers: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Run `action` at `signature.fire_at` unless the same signature is already pending.
    pub fn schedule<F>(&self, signature: ReminderSignature, action: F) -> ScheduleOutcome
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(delay) = signature.fire_at.duration_since(SystemTime::now()) else {
            return ScheduleOutcome::InPast;
        };

        match self.timers.entry(signature) {
            Entry::Occupied(_) => ScheduleOutcome::AlreadyScheduled,
            Entry::Vacant(slot) => {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                let timers = Arc::clone(&self.timers);
                let task = tokio::spawn(async move {
                    sleep(delay).await;
                    debug!(reminder = %signature, "firing reminder");
                    action.await;
                    timers.remove_if(&signature, |_, timer| timer.generation == generation);
                });
                slot.insert(PendingTimer {
                    generation,
                    handle: task.abort_handle(),
                });
                ScheduleOutcome::Scheduled
            }
        }
    }

    /// Cancel one pending reminder; `false` when it was not pending.
    pub fn cancel(&self, signature: &ReminderSignature) -> bool {
        match self.timers.remove(signature) {
            Some((_, timer)) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending reminder of a match, returning how many were cancelled.
    pub fn cancel_match(&self, match_id: Uuid) -> usize {
        let mut cancelled = 0;
        self.timers.retain(|signature, timer| {
            if signature.match_id == match_id {
                timer.handle.abort();
                cancelled += 1;
                false
            } else {
                true
            }
        });
        cancelled
    }

    pub fn is_scheduled(&self, signature: &ReminderSignature) -> bool {
        self.timers.contains_key(signature)
    }

    /// Number of pending reminders.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        for timer in self.timers.iter() {
            timer.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;

    fn signature(match_id: Uuid, kind: ReminderKind, in_secs: u64) -> ReminderSignature {
        ReminderSignature {
            match_id,
            kind,
            fire_at: SystemTime::now() + Duration::from_secs(in_secs),
        }
    }

    fn counting_action(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + use<> {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn identical_signature_is_a_noop() {
        let scheduler = ReminderScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let sig = signature(Uuid::new_v4(), ReminderKind::Ended, 60);

        assert_eq!(
            scheduler.schedule(sig, counting_action(&fired)),
            ScheduleOutcome::Scheduled
        );
        assert_eq!(
            scheduler.schedule(sig, counting_action(&fired)),
            ScheduleOutcome::AlreadyScheduled
        );
        assert_eq!(scheduler.len(), 1);

        sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_reminders_never_fire() {
        let scheduler = ReminderScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let sig = signature(Uuid::new_v4(), ReminderKind::EndingSoon, 30);

        scheduler.schedule(sig, counting_action(&fired));
        assert!(scheduler.cancel(&sig));
        assert!(!scheduler.cancel(&sig));

        sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_match_only_touches_that_match() {
        let scheduler = ReminderScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let target = Uuid::new_v4();
        let other = Uuid::new_v4();

        scheduler.schedule(signature(target, ReminderKind::EndingSoon, 10), counting_action(&fired));
        scheduler.schedule(signature(target, ReminderKind::Ended, 20), counting_action(&fired));
        scheduler.schedule(signature(other, ReminderKind::Ended, 20), counting_action(&fired));

        assert_eq!(scheduler.cancel_match(target), 2);
        assert_eq!(scheduler.len(), 1);

        sleep(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn past_fire_times_are_skipped() {
        let scheduler = ReminderScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let sig = ReminderSignature {
            match_id: Uuid::new_v4(),
            kind: ReminderKind::Ended,
            fire_at: SystemTime::now() - Duration::from_secs(1),
        };
        assert_eq!(
            scheduler.schedule(sig, counting_action(&fired)),
            ScheduleOutcome::InPast
        );
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn a_signature_can_be_rescheduled_after_cancel() {
        let scheduler = ReminderScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let sig = signature(Uuid::new_v4(), ReminderKind::Ended, 5);

        scheduler.schedule(sig, counting_action(&fired));
        scheduler.cancel(&sig);
        assert_eq!(
            scheduler.schedule(sig, counting_action(&fired)),
            ScheduleOutcome::Scheduled
        );
        assert!(scheduler.is_scheduled(&sig));
    }
}

//! # Sync Queue
//!
//! Durable queue of user actions awaiting delivery to the remote API.
//!
//! ## Action lifecycle
//!
//! ```text
//! Pending ──dispatch──▶ Succeeded            (removed)
//!    ▲                  Failed, retries < max (Pending, retry_count + 1)
//!    └──────────────────┘
//!                       Failed, retries == max (removed, announced)
//! ```
//!
//! Every action is written to the store before `enqueue` returns, so a
//! restart never loses pending work. A drain pass attempts actions in
//! enqueue order; one failure does not stop the pass. Passes are gated by
//! connectivity, a cooldown measured from the previous pass, and a single
//! in-flight pass at a time.

use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::action::{CacheInvalidation, SyncAction, SyncPayload};
use crate::dispatcher::{dispatch, SyncDispatcher};
use crate::error::Result;
use crate::repository::SyncQueueRepository;

/// Why a drain request did not run a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainSkip {
    Offline,
    CoolingDown,
    AlreadyDraining,
}

/// Counts for one drain pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub succeeded: usize,
    pub failed: usize,
    pub dropped: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Skipped(DrainSkip),
    Completed(DrainReport),
}

impl DrainOutcome {
    pub fn ran(&self) -> bool {
        matches!(self, DrainOutcome::Completed(_))
    }
}

/// Result of an action submitted for immediate delivery
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Delivered,
    Queued(SyncAction),
}

struct QueueInner {
    repository: Arc<dyn SyncQueueRepository>,
    dispatcher: Arc<dyn SyncDispatcher>,
    connectivity: watch::Receiver<bool>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
    event_bus: EventBus,
    pending: Mutex<Vec<SyncAction>>,
    last_sync_attempt: StdMutex<Option<DateTime<Utc>>>,
    draining: AtomicBool,
}

/// Handle to the queue; clones share state.
#[derive(Clone)]
pub struct SyncQueue {
    inner: Arc<QueueInner>,
}

/// Clears the draining flag when a pass ends, however it ends
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncQueue {
    /// Restore the queue from the repository and sweep expired actions.
    ///
    /// # Errors
    ///
    /// Returns an error if the pending actions cannot be read.
    pub async fn load(
        repository: Arc<dyn SyncQueueRepository>,
        dispatcher: Arc<dyn SyncDispatcher>,
        connectivity: watch::Receiver<bool>,
        clock: Arc<dyn Clock>,
        settings: SyncSettings,
        event_bus: EventBus,
    ) -> Result<Self> {
        let pending = repository.load_all().await?;
        info!(pending = pending.len(), "Sync queue loaded");

        let queue = Self {
            inner: Arc::new(QueueInner {
                repository,
                dispatcher,
                connectivity,
                clock,
                settings,
                event_bus,
                pending: Mutex::new(pending),
                last_sync_attempt: StdMutex::new(None),
                draining: AtomicBool::new(false),
            }),
        };

        queue.sweep_expired().await?;

        // Restored actions would otherwise wait for the next offline/online flip
        if queue.is_online() && !queue.is_empty().await {
            queue.spawn_drain();
        }
        Ok(queue)
    }

    pub fn is_online(&self) -> bool {
        *self.inner.connectivity.borrow()
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    pub async fn len(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.pending.lock().await.is_empty()
    }

    /// Snapshot of the pending actions in enqueue order
    pub async fn pending(&self) -> Vec<SyncAction> {
        self.inner.pending.lock().await.clone()
    }

    pub fn last_sync_attempt(&self) -> Option<DateTime<Utc>> {
        *self
            .inner
            .last_sync_attempt
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn cooling_down(&self) -> bool {
        let Some(last) = self.last_sync_attempt() else {
            return false;
        };

        match (self.inner.clock.now() - last).to_std() {
            Ok(elapsed) => elapsed < self.inner.settings.cooldown,
            // The clock went backwards; wait for it to catch up
            Err(_) => true,
        }
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.inner.event_bus.emit(CoreEvent::Sync(event));
    }

    /// Persist a new action and, when possible, start a drain in the
    /// background.
    ///
    /// # Errors
    ///
    /// Returns an error if the action cannot be persisted; it is then not
    /// queued at all.
    pub async fn enqueue(&self, payload: SyncPayload) -> Result<SyncAction> {
        let action = SyncAction::new(payload, self.inner.clock.now());
        self.inner.repository.insert(&action).await?;

        let queue_len = {
            let mut pending = self.inner.pending.lock().await;
            pending.push(action.clone());
            pending.len()
        };

        debug!(action_id = %action.id, kind = %action.kind(), queue_len, "Action queued");
        self.emit(SyncEvent::ActionQueued {
            action_id: action.id.clone(),
            kind: action.kind().to_string(),
            queue_len,
        });

        if self.is_online() && !self.cooling_down() {
            self.spawn_drain();
        }

        Ok(action)
    }

    /// Deliver now when online; queue on failure or when offline
    pub async fn submit(&self, payload: SyncPayload) -> Result<SubmitOutcome> {
        if !self.is_online() {
            return self.enqueue(payload).await.map(SubmitOutcome::Queued);
        }

        self.deliver_or_enqueue(payload).await
    }

    /// Ask the remote side to drop its cached view of a course.
    ///
    /// Dispatches immediately, ignoring connectivity and cooldown; a failed
    /// attempt is queued like any other action.
    pub async fn force_invalidate_cache(&self, course_type: &str) -> Result<SubmitOutcome> {
        let payload = SyncPayload::CacheInvalidation(CacheInvalidation {
            course_type: course_type.to_string(),
        });
        self.deliver_or_enqueue(payload).await
    }

    async fn deliver_or_enqueue(&self, payload: SyncPayload) -> Result<SubmitOutcome> {
        match dispatch(self.inner.dispatcher.as_ref(), &payload).await {
            Ok(()) => {
                debug!(kind = %payload.kind(), "Action delivered immediately");
                Ok(SubmitOutcome::Delivered)
            }
            Err(e) => {
                warn!(kind = %payload.kind(), error = %e, "Immediate delivery failed; queueing");
                self.enqueue(payload).await.map(SubmitOutcome::Queued)
            }
        }
    }

    /// Run one pass if online, outside the cooldown window, and no other pass
    /// is in flight
    pub async fn drain(&self) -> Result<DrainOutcome> {
        self.drain_pass(false).await
    }

    /// Like [`drain`](Self::drain) but ignores the cooldown
    pub async fn force_drain(&self) -> Result<DrainOutcome> {
        self.drain_pass(true).await
    }

    #[instrument(skip(self), fields(pending = tracing::field::Empty))]
    async fn drain_pass(&self, force: bool) -> Result<DrainOutcome> {
        if !self.is_online() {
            debug!("Drain skipped: offline");
            return Ok(DrainOutcome::Skipped(DrainSkip::Offline));
        }

        if self
            .inner
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Drain skipped: pass already running");
            return Ok(DrainOutcome::Skipped(DrainSkip::AlreadyDraining));
        }
        let _guard = DrainGuard(&self.inner.draining);

        if !force && self.cooling_down() {
            debug!("Drain skipped: cooling down");
            return Ok(DrainOutcome::Skipped(DrainSkip::CoolingDown));
        }

        *self
            .inner
            .last_sync_attempt
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(self.inner.clock.now());

        let batch = self.pending().await;
        tracing::Span::current().record("pending", batch.len() as u64);
        self.emit(SyncEvent::DrainStarted {
            pending: batch.len(),
        });

        let mut report = DrainReport::default();
        for action in batch {
            match dispatch(self.inner.dispatcher.as_ref(), &action.payload).await {
                Ok(()) => {
                    self.remove(&action.id).await?;
                    report.succeeded += 1;
                    debug!(action_id = %action.id, kind = %action.kind(), "Action delivered");
                }
                Err(e) => {
                    if self.record_failure(&action, &e.to_string()).await? {
                        report.dropped += 1;
                    } else {
                        report.failed += 1;
                    }
                }
            }
        }

        report.remaining = self.len().await;
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            dropped = report.dropped,
            remaining = report.remaining,
            "Drain pass completed"
        );
        self.emit(SyncEvent::DrainCompleted {
            succeeded: report.succeeded,
            failed: report.failed,
            dropped: report.dropped,
            remaining: report.remaining,
        });

        Ok(DrainOutcome::Completed(report))
    }

    /// Count a failed attempt. Returns `true` when the action hit the
    /// ceiling and was removed.
    async fn record_failure(&self, action: &SyncAction, error: &str) -> Result<bool> {
        let retry_count = action.retry_count + 1;
        let max_retries = self.inner.settings.max_retries;

        if retry_count >= max_retries {
            self.remove(&action.id).await?;
            warn!(
                action_id = %action.id,
                kind = %action.kind(),
                max_retries,
                error,
                "Dropping action after max retries"
            );
            self.emit(SyncEvent::ActionDropped {
                action_id: action.id.clone(),
                kind: action.kind().to_string(),
                max_retries,
            });
            return Ok(true);
        }

        self.inner
            .repository
            .update_retry_count(&action.id, retry_count)
            .await?;
        if let Some(pending) = self
            .inner
            .pending
            .lock()
            .await
            .iter_mut()
            .find(|pending| pending.id == action.id)
        {
            pending.retry_count = retry_count;
        }

        debug!(
            action_id = %action.id,
            kind = %action.kind(),
            retry_count,
            error,
            "Dispatch failed; will retry"
        );
        Ok(false)
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.inner.repository.remove(id).await?;
        self.inner.pending.lock().await.retain(|action| action.id != id);
        Ok(())
    }

    /// Remove actions older than the retention window, whatever their retry
    /// state. Returns how many were removed.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let Ok(max_age) = chrono::Duration::from_std(self.inner.settings.max_action_age) else {
            return Ok(0);
        };
        let cutoff = self.inner.clock.now() - max_age;

        let removed = self.inner.repository.remove_older_than(cutoff).await?;
        if removed.is_empty() {
            return Ok(0);
        }

        self.inner
            .pending
            .lock()
            .await
            .retain(|action| !removed.contains(&action.id));

        info!(count = removed.len(), cutoff = %cutoff, "Expired sync actions removed");
        self.emit(SyncEvent::ActionsExpired {
            count: removed.len(),
        });
        Ok(removed.len())
    }

    fn spawn_drain(&self) {
        let queue = self.clone();
        tokio::spawn(async move {
            if let Err(e) = queue.drain().await {
                warn!(error = %e, "Background drain failed");
            }
        });
    }

    fn from_weak(inner: &Weak<QueueInner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    /// Drain whenever connectivity comes back.
    ///
    /// The task holds only a weak reference and stops once every queue
    /// handle is dropped or the connectivity channel closes.
    pub fn spawn_reconnect_listener(&self) -> JoinHandle<()> {
        let mut connectivity = self.inner.connectivity.clone();
        connectivity.borrow_and_update();
        let inner = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            while connectivity.changed().await.is_ok() {
                let online = *connectivity.borrow_and_update();
                if !online {
                    continue;
                }

                let Some(queue) = Self::from_weak(&inner) else {
                    break;
                };
                info!("Connectivity restored; draining sync queue");
                match queue.drain().await {
                    Ok(DrainOutcome::Skipped(reason)) => {
                        debug!(?reason, "Reconnect drain skipped");
                    }
                    Ok(DrainOutcome::Completed(_)) => {}
                    Err(e) => warn!(error = %e, "Reconnect drain failed"),
                }
            }
            debug!("Sync reconnect listener stopped");
        })
    }

    /// Run [`sweep_expired`](Self::sweep_expired) on the configured interval
    pub fn spawn_retention_sweep(&self) -> JoinHandle<()> {
        let period = self.inner.settings.retention_sweep_interval;
        let inner = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately; loading already swept
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(queue) = Self::from_weak(&inner) else {
                    break;
                };
                if let Err(e) = queue.sweep_expired().await {
                    warn!(error = %e, "Retention sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{
        CommentPost, FavoriteToggle, ProfileUpdate, ProgressCompletion, Rating, StepPlayback,
        StepStatusChange,
    };
    use crate::error::SyncError;
    use crate::repository::SqliteSyncQueueRepository;
    use async_trait::async_trait;
    use bridge_traits::time::ManualClock;
    use core_store::create_test_pool;
    use mockall::mock;
    use std::time::Duration;

    mock! {
        pub Dispatcher {}

        #[async_trait]
        impl SyncDispatcher for Dispatcher {
            async fn progress_completion(&self, payload: &ProgressCompletion) -> Result<()>;
            async fn profile_update(&self, payload: &ProfileUpdate) -> Result<()>;
            async fn comment(&self, payload: &CommentPost) -> Result<()>;
            async fn rating(&self, payload: &Rating) -> Result<()>;
            async fn step_status_change(&self, payload: &StepStatusChange) -> Result<()>;
            async fn step_pause(&self, payload: &StepPlayback) -> Result<()>;
            async fn step_resume(&self, payload: &StepPlayback) -> Result<()>;
            async fn cache_invalidation(&self, payload: &CacheInvalidation) -> Result<()>;
            async fn favorite_toggle(&self, payload: &FavoriteToggle) -> Result<()>;
        }
    }

    fn favorite(step: &str) -> SyncPayload {
        SyncPayload::FavoriteToggle(FavoriteToggle {
            step_id: step.to_string(),
            favorite: true,
        })
    }

    fn unreachable() -> SyncError {
        SyncError::Dispatch {
            kind: "favorite_toggle".to_string(),
            message: "unreachable".to_string(),
        }
    }

    struct Harness {
        queue: SyncQueue,
        online: watch::Sender<bool>,
        clock: ManualClock,
    }

    async fn harness(dispatcher: MockDispatcher, settings: SyncSettings) -> Harness {
        let pool = create_test_pool().await.unwrap();
        let (online, connectivity) = watch::channel(false);
        let clock = ManualClock::default();

        let queue = SyncQueue::load(
            Arc::new(SqliteSyncQueueRepository::new(pool)),
            Arc::new(dispatcher),
            connectivity,
            Arc::new(clock.clone()),
            settings,
            EventBus::default(),
        )
        .await
        .unwrap();

        Harness {
            queue,
            online,
            clock,
        }
    }

    fn after_cooldown(h: &Harness) {
        h.clock.advance(
            chrono::Duration::from_std(h.queue.settings().cooldown).unwrap()
                + chrono::Duration::seconds(1),
        );
    }

    #[tokio::test]
    async fn test_always_failing_action_is_dropped_at_ceiling() {
        let mut dispatcher = MockDispatcher::new();
        dispatcher
            .expect_favorite_toggle()
            .times(3)
            .returning(|_| Err(unreachable()));

        let settings = SyncSettings {
            max_retries: 3,
            ..SyncSettings::default()
        };
        let h = harness(dispatcher, settings).await;

        h.queue.enqueue(favorite("s1")).await.unwrap();
        h.online.send(true).unwrap();

        let mut lengths = vec![h.queue.len().await];
        for _ in 0..3 {
            after_cooldown(&h);
            assert!(h.queue.drain().await.unwrap().ran());
            lengths.push(h.queue.len().await);
        }

        assert_eq!(lengths, vec![1, 1, 1, 0]);
    }

    #[tokio::test]
    async fn test_retry_count_grows_only_on_failure() {
        let mut dispatcher = MockDispatcher::new();
        dispatcher
            .expect_favorite_toggle()
            .times(1)
            .returning(|_| Err(unreachable()));

        let h = harness(dispatcher, SyncSettings::default()).await;
        h.queue.enqueue(favorite("s1")).await.unwrap();
        assert_eq!(h.queue.pending().await[0].retry_count, 0);

        h.online.send(true).unwrap();
        let outcome = h.queue.drain().await.unwrap();

        assert_eq!(
            outcome,
            DrainOutcome::Completed(DrainReport {
                succeeded: 0,
                failed: 1,
                dropped: 0,
                remaining: 1,
            })
        );
        assert_eq!(h.queue.pending().await[0].retry_count, 1);
    }

    #[tokio::test]
    async fn test_two_drains_inside_cooldown_run_one_pass() {
        let mut dispatcher = MockDispatcher::new();
        dispatcher
            .expect_favorite_toggle()
            .times(1)
            .returning(|_| Err(unreachable()));

        let h = harness(dispatcher, SyncSettings::default()).await;
        h.queue.enqueue(favorite("s1")).await.unwrap();
        h.online.send(true).unwrap();

        assert!(h.queue.drain().await.unwrap().ran());
        assert_eq!(
            h.queue.drain().await.unwrap(),
            DrainOutcome::Skipped(DrainSkip::CoolingDown)
        );
    }

    #[tokio::test]
    async fn test_force_drain_ignores_cooldown() {
        let mut dispatcher = MockDispatcher::new();
        dispatcher
            .expect_favorite_toggle()
            .times(2)
            .returning(|_| Err(unreachable()));

        let h = harness(dispatcher, SyncSettings::default()).await;
        h.queue.enqueue(favorite("s1")).await.unwrap();
        h.online.send(true).unwrap();

        assert!(h.queue.drain().await.unwrap().ran());
        assert!(h.queue.force_drain().await.unwrap().ran());
        assert_eq!(h.queue.pending().await[0].retry_count, 2);
    }

    #[tokio::test]
    async fn test_drain_offline_is_noop() {
        let h = harness(MockDispatcher::new(), SyncSettings::default()).await;
        h.queue.enqueue(favorite("s1")).await.unwrap();

        assert_eq!(
            h.queue.drain().await.unwrap(),
            DrainOutcome::Skipped(DrainSkip::Offline)
        );
        assert_eq!(h.queue.len().await, 1);
        assert!(h.queue.last_sync_attempt().is_none());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_the_rest() {
        let mut dispatcher = MockDispatcher::new();
        dispatcher
            .expect_favorite_toggle()
            .returning(|_| Err(unreachable()));
        dispatcher.expect_rating().times(1).returning(|_| Ok(()));

        let h = harness(dispatcher, SyncSettings::default()).await;
        h.queue.enqueue(favorite("s1")).await.unwrap();
        h.queue
            .enqueue(SyncPayload::Rating(Rating {
                course_type: "yoga".to_string(),
                step_id: "s2".to_string(),
                score: 4,
            }))
            .await
            .unwrap();
        h.online.send(true).unwrap();

        let DrainOutcome::Completed(report) = h.queue.drain().await.unwrap() else {
            panic!("drain should have run");
        };
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);

        let pending = h.queue.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload, favorite("s1"));
    }

    #[tokio::test]
    async fn test_submit_offline_queues() {
        let h = harness(MockDispatcher::new(), SyncSettings::default()).await;

        let outcome = h.queue.submit(favorite("s1")).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Queued(_)));
        assert_eq!(h.queue.len().await, 1);
    }

    #[tokio::test]
    async fn test_submit_online_delivers() {
        let mut dispatcher = MockDispatcher::new();
        dispatcher
            .expect_favorite_toggle()
            .times(1)
            .returning(|_| Ok(()));

        let h = harness(dispatcher, SyncSettings::default()).await;
        h.online.send(true).unwrap();

        assert_eq!(
            h.queue.submit(favorite("s1")).await.unwrap(),
            SubmitOutcome::Delivered
        );
        assert!(h.queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_force_invalidate_bypasses_offline_gate() {
        let mut dispatcher = MockDispatcher::new();
        dispatcher
            .expect_cache_invalidation()
            .withf(|p| p.course_type == "yoga")
            .times(1)
            .returning(|_| Ok(()));

        let h = harness(dispatcher, SyncSettings::default()).await;

        assert_eq!(
            h.queue.force_invalidate_cache("yoga").await.unwrap(),
            SubmitOutcome::Delivered
        );
    }

    #[tokio::test]
    async fn test_sweep_removes_old_actions_regardless_of_retries() {
        let h = harness(MockDispatcher::new(), SyncSettings::default()).await;
        h.queue.enqueue(favorite("old")).await.unwrap();

        h.clock.advance(chrono::Duration::days(6));
        h.queue.enqueue(favorite("recent")).await.unwrap();

        h.clock.advance(chrono::Duration::days(2));
        assert_eq!(h.queue.sweep_expired().await.unwrap(), 1);

        let pending = h.queue.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload, favorite("recent"));
    }

    #[tokio::test]
    async fn test_reconnect_triggers_drain() {
        let mut dispatcher = MockDispatcher::new();
        dispatcher
            .expect_favorite_toggle()
            .times(1)
            .returning(|_| Ok(()));

        let h = harness(dispatcher, SyncSettings::default()).await;
        h.queue.enqueue(favorite("s1")).await.unwrap();
        let listener = h.queue.spawn_reconnect_listener();

        h.online.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !h.queue.is_empty().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        listener.abort();
    }

    #[tokio::test]
    async fn test_reconnect_inside_cooldown_waits_for_it_to_pass() {
        use std::sync::atomic::AtomicUsize;

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let mut dispatcher = MockDispatcher::new();
        dispatcher.expect_favorite_toggle().returning(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            Err(unreachable())
        });

        let h = harness(dispatcher, SyncSettings::default()).await;
        h.queue.enqueue(favorite("s1")).await.unwrap();
        let listener = h.queue.spawn_reconnect_listener();

        let wait_for_retries = |n: u32| {
            let queue = h.queue.clone();
            async move {
                tokio::time::timeout(Duration::from_secs(2), async {
                    while queue.pending().await[0].retry_count < n {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                })
                .await
                .unwrap();
            }
        };

        h.online.send(true).unwrap();
        wait_for_retries(1).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Flapping inside the cooldown window does not dispatch again
        h.online.send(false).unwrap();
        h.online.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        after_cooldown(&h);
        h.online.send(false).unwrap();
        h.online.send(true).unwrap();
        wait_for_retries(2).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        listener.abort();
    }
}

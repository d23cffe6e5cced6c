//! Restart behaviour of the sync queue against a file-backed database.

use async_trait::async_trait;
use bridge_traits::time::ManualClock;
use core_runtime::config::SyncSettings;
use core_runtime::events::EventBus;
use core_store::{create_pool, DatabaseConfig};
use core_sync::{
    CacheInvalidation, CommentPost, FavoriteToggle, ProfileUpdate, ProgressCompletion, Rating,
    SqliteSyncQueueRepository, StepPlayback, StepStatusChange, SyncDispatcher, SyncError,
    SyncPayload, SyncQueue,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;

/// Counts attempts; a down backend fails every call
struct CountingDispatcher {
    calls: AtomicUsize,
    reachable: bool,
}

impl CountingDispatcher {
    fn down() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reachable: false,
        }
    }

    fn up() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reachable: true,
        }
    }

    fn respond(&self) -> core_sync::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reachable {
            return Ok(());
        }
        Err(SyncError::Dispatch {
            kind: "any".to_string(),
            message: "503".to_string(),
        })
    }
}

#[async_trait]
impl SyncDispatcher for CountingDispatcher {
    async fn progress_completion(&self, _: &ProgressCompletion) -> core_sync::Result<()> {
        self.respond()
    }
    async fn profile_update(&self, _: &ProfileUpdate) -> core_sync::Result<()> {
        self.respond()
    }
    async fn comment(&self, _: &CommentPost) -> core_sync::Result<()> {
        self.respond()
    }
    async fn rating(&self, _: &Rating) -> core_sync::Result<()> {
        self.respond()
    }
    async fn step_status_change(&self, _: &StepStatusChange) -> core_sync::Result<()> {
        self.respond()
    }
    async fn step_pause(&self, _: &StepPlayback) -> core_sync::Result<()> {
        self.respond()
    }
    async fn step_resume(&self, _: &StepPlayback) -> core_sync::Result<()> {
        self.respond()
    }
    async fn cache_invalidation(&self, _: &CacheInvalidation) -> core_sync::Result<()> {
        self.respond()
    }
    async fn favorite_toggle(&self, _: &FavoriteToggle) -> core_sync::Result<()> {
        self.respond()
    }
}

async fn open_queue(
    path: &Path,
    online: bool,
    clock: &ManualClock,
    dispatcher: Arc<CountingDispatcher>,
) -> (SyncQueue, watch::Sender<bool>) {
    let pool = create_pool(DatabaseConfig::new(path)).await.unwrap();
    let (tx, rx) = watch::channel(online);

    let queue = SyncQueue::load(
        Arc::new(SqliteSyncQueueRepository::new(pool)),
        dispatcher,
        rx,
        Arc::new(clock.clone()),
        SyncSettings::default(),
        EventBus::default(),
    )
    .await
    .unwrap();

    (queue, tx)
}

#[tokio::test]
async fn test_pending_action_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("offline.db");
    let clock = ManualClock::default();
    let dispatcher = Arc::new(CountingDispatcher::down());

    let payload = SyncPayload::StepPause(StepPlayback {
        course_type: "mindfulness".to_string(),
        step_id: "step-3".to_string(),
        position_seconds: 97,
    });

    let enqueued = {
        let (queue, online) = open_queue(&path, false, &clock, dispatcher.clone()).await;
        queue.enqueue(payload.clone()).await.unwrap();

        // One failed pass so the retry count is non-zero before the restart
        online.send(true).unwrap();
        assert!(queue.drain().await.unwrap().ran());
        queue.pending().await.remove(0)
    };
    assert_eq!(enqueued.retry_count, 1);
    assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 1);

    let (reopened, _online) = open_queue(&path, false, &clock, dispatcher).await;
    let pending = reopened.pending().await;

    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, enqueued.id);
    assert_eq!(pending[0].payload, payload);
    assert_eq!(pending[0].retry_count, 1);
    assert_eq!(
        pending[0].enqueued_at.timestamp_millis(),
        enqueued.enqueued_at.timestamp_millis()
    );
}

#[tokio::test]
async fn test_expired_actions_are_swept_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("offline.db");
    let clock = ManualClock::default();
    let dispatcher = Arc::new(CountingDispatcher::down());

    {
        let (queue, _online) = open_queue(&path, false, &clock, dispatcher.clone()).await;
        queue
            .enqueue(SyncPayload::FavoriteToggle(FavoriteToggle {
                step_id: "s1".to_string(),
                favorite: true,
            }))
            .await
            .unwrap();
    }

    clock.advance(chrono::Duration::days(8));
    let (reopened, _online) = open_queue(&path, false, &clock, dispatcher).await;

    assert!(reopened.is_empty().await);
}

#[tokio::test]
async fn test_restored_actions_drain_when_reopened_online() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("offline.db");
    let clock = ManualClock::default();

    {
        let (queue, _online) =
            open_queue(&path, false, &clock, Arc::new(CountingDispatcher::down())).await;
        for step in ["s1", "s2"] {
            queue
                .enqueue(SyncPayload::FavoriteToggle(FavoriteToggle {
                    step_id: step.to_string(),
                    favorite: true,
                }))
                .await
                .unwrap();
        }
    }

    let dispatcher = Arc::new(CountingDispatcher::up());
    let (reopened, _online) = open_queue(&path, true, &clock, dispatcher.clone()).await;

    tokio::time::timeout(std::time::Duration::from_secs(2), async {
        while !reopened.is_empty().await {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(dispatcher.calls.load(Ordering::SeqCst), 2);
}

//! The offline context: one object owning the store, connectivity, sync queue,
//! resolver and downloader, plus the background tasks that keep them moving.

use bridge_traits::http::HttpClient;
use core_download::{CourseDownloader, DownloadReport, HttpContentSource, PageCaptureReport};
use core_media::{DisplayRef, MediaResolver, ServedMedia};
use core_runtime::config::OfflineConfig;
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus, EventSeverity, EventStream, RecvError};
use core_store::{create_pool, DatabaseConfig, SnapshotStore, SnapshotSummary, SqliteSnapshotStore};
use core_sync::{
    ConnectivityMonitor, HttpSyncDispatcher, MonitoredHttpClient, SqliteSyncQueueRepository,
    SubmitOutcome, SyncDispatcher, SyncPayload, SyncQueue,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::CoreDependencies;

pub struct OfflineContext {
    config: OfflineConfig,
    event_bus: EventBus,
    store: Arc<dyn SnapshotStore>,
    connectivity: Arc<ConnectivityMonitor>,
    sync_queue: SyncQueue,
    resolver: MediaResolver,
    downloader: CourseDownloader,
    tasks: Vec<JoinHandle<()>>,
}

impl OfflineContext {
    /// Open the store, restore the sync queue and start the background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, when the database cannot be opened or
    /// migrated, or when the persisted queue cannot be read.
    #[instrument(skip_all, fields(database = %config.database_path.display()))]
    pub async fn start(config: OfflineConfig, deps: CoreDependencies) -> Result<Self> {
        config.validate()?;

        let pool = create_pool(DatabaseConfig::new(config.database_path.clone())).await?;
        let store: Arc<dyn SnapshotStore> = Arc::new(SqliteSnapshotStore::new(pool.clone()));
        let event_bus = EventBus::default();
        let mut tasks = vec![spawn_event_log(&event_bus)];

        let (connectivity, platform_listener) =
            ConnectivityMonitor::start_with_platform(deps.network_monitor.clone(), event_bus.clone())
                .await;
        match platform_listener {
            Ok(task) => tasks.push(task),
            Err(e) => warn!(error = %e, "Platform connectivity notifications unavailable"),
        }

        let http: Arc<dyn HttpClient> = Arc::new(MonitoredHttpClient::new(
            deps.http_client.clone(),
            connectivity.clone(),
        ));

        let mut dispatcher = HttpSyncDispatcher::new(http.clone(), config.api_base_url.clone());
        if let Some(token) = &deps.auth_token {
            dispatcher = dispatcher.with_auth_token(token.as_str());
        }
        let dispatcher: Arc<dyn SyncDispatcher> = Arc::new(dispatcher);

        let sync_queue = SyncQueue::load(
            Arc::new(SqliteSyncQueueRepository::new(pool)),
            dispatcher,
            connectivity.subscribe(),
            deps.clock.clone(),
            config.sync.clone(),
            event_bus.clone(),
        )
        .await?;
        tasks.push(sync_queue.spawn_reconnect_listener());
        tasks.push(sync_queue.spawn_retention_sweep());

        let resolver = MediaResolver::new(
            store.clone(),
            connectivity.subscribe(),
            config.resolver.clone(),
        );

        let mut source = HttpContentSource::new(
            http,
            config.api_base_url.clone(),
            config.download.request_timeout,
        );
        if let Some(token) = &deps.auth_token {
            source = source.with_auth_token(token.as_str());
        }
        let downloader = CourseDownloader::new(
            Arc::new(source),
            store.clone(),
            deps.clock.clone(),
            event_bus.clone(),
            config.resolver.clone(),
            config.download.clone(),
        );

        let pending_actions = sync_queue.len().await;
        info!(
            online = connectivity.is_online(),
            pending_actions,
            "Offline context started"
        );

        Ok(Self {
            config,
            event_bus,
            store,
            connectivity,
            sync_queue,
            resolver,
            downloader,
            tasks,
        })
    }

    pub fn config(&self) -> &OfflineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn store(&self) -> Arc<dyn SnapshotStore> {
        self.store.clone()
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn sync_queue(&self) -> &SyncQueue {
        &self.sync_queue
    }

    pub fn resolver(&self) -> &MediaResolver {
        &self.resolver
    }

    pub fn downloader(&self) -> &CourseDownloader {
        &self.downloader
    }

    pub fn is_online(&self) -> bool {
        self.connectivity.is_online()
    }

    pub async fn download_course(&self, course_type: &str) -> Result<DownloadReport> {
        Ok(self.downloader.download(course_type).await?)
    }

    pub async fn capture_pages(
        &self,
        course_type: &str,
        paths: &[&str],
    ) -> Result<PageCaptureReport> {
        Ok(self.downloader.capture_pages(course_type, paths).await?)
    }

    /// What a UI should display for `url`; never fails
    pub async fn resolve(&self, course_type: &str, url: &str) -> DisplayRef {
        self.resolver.resolve(course_type, url).await
    }

    pub async fn serve_virtual(&self, path: &str) -> Result<Option<ServedMedia>> {
        Ok(self.resolver.serve_virtual(path).await?)
    }

    pub async fn submit(&self, payload: SyncPayload) -> Result<SubmitOutcome> {
        Ok(self.sync_queue.submit(payload).await?)
    }

    pub async fn list_courses(&self) -> Result<Vec<SnapshotSummary>> {
        Ok(self.store.list_snapshots().await?)
    }

    /// Remove a downloaded course and all of its media
    pub async fn delete_course(&self, course_id: &str) -> Result<bool> {
        let removed = self.store.delete(course_id).await?;
        if removed {
            info!(course_id, "Offline course deleted");
        }
        Ok(removed)
    }

    /// Approximate bytes held by the offline store
    pub async fn size_estimate(&self) -> Result<u64> {
        Ok(self.store.size_estimate().await?)
    }

    /// Stop the background tasks. Pending actions stay persisted.
    pub fn shutdown(mut self) {
        self.abort_tasks();
        info!("Offline context stopped");
    }

    fn abort_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// Mirror bus events into the log at their severity. Per-item download
/// progress is left out.
fn spawn_event_log(bus: &EventBus) -> JoinHandle<()> {
    let mut events = EventStream::new(bus.subscribe())
        .filter(|event| !matches!(event, CoreEvent::Download(DownloadEvent::Progress { .. })));

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match event.severity() {
                    EventSeverity::Error => error!(?event, "{}", event.description()),
                    EventSeverity::Warning => warn!(?event, "{}", event.description()),
                    EventSeverity::Info => info!(?event, "{}", event.description()),
                    EventSeverity::Debug => debug!(?event, "{}", event.description()),
                },
                Err(RecvError::Lagged(missed)) => debug!(missed, "Event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

impl Drop for OfflineContext {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

//! # Course Snapshot Downloader
//!
//! Captures a whole course for offline use.
//!
//! ## Workflow
//!
//! 1. Fetch the content tree. Failure here is fatal and nothing is written.
//! 2. Collect the deduplicated media index.
//! 3. Fetch images and PDFs; individual failures are recorded, not fatal.
//! 4. Capture every video as an HLS asset. A failed capture keeps whatever
//!    asset was stored for that URL before.
//! 5. Write the snapshot and all captured media in one store transaction.
//!
//! Progress is published on the event bus as [`DownloadEvent`]s.

use bridge_traits::time::Clock;
use core_media::{KeyNormalizer, MediaKind};
use core_runtime::config::{DownloadSettings, ResolverSettings};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use core_store::{
    CachedPage, MediaBlob, MediaIndex, Snapshot, SnapshotMedia, SnapshotStore,
};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::capture::HlsCapture;
use crate::error::{DownloadError, Result};
use crate::source::ContentSource;

/// A media item that could not be captured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFailure {
    pub url: String,
    pub kind: MediaKind,
    pub reason: String,
}

/// Outcome of a successful download run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub course_id: String,
    pub course_type: String,
    pub version: String,
    pub images_stored: usize,
    pub pdfs_stored: usize,
    pub videos_stored: usize,
    /// Videos whose capture failed but which kept a previously stored asset
    pub videos_retained: usize,
    pub failures: Vec<MediaFailure>,
}

impl DownloadReport {
    pub fn media_stored(&self) -> usize {
        self.images_stored + self.pdfs_stored + self.videos_stored
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of a page capture run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCaptureReport {
    pub stored: Vec<String>,
    pub failures: Vec<(String, String)>,
}

struct Progress<'a> {
    course_type: &'a str,
    completed: usize,
    total: usize,
}

pub struct CourseDownloader {
    source: Arc<dyn ContentSource>,
    store: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    normalizer: KeyNormalizer,
    settings: DownloadSettings,
}

impl CourseDownloader {
    pub fn new(
        source: Arc<dyn ContentSource>,
        store: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
        resolver_settings: ResolverSettings,
        settings: DownloadSettings,
    ) -> Self {
        Self {
            source,
            store,
            clock,
            event_bus,
            normalizer: KeyNormalizer::new(resolver_settings),
            settings,
        }
    }

    fn emit(&self, event: DownloadEvent) {
        let _ = self.event_bus.emit(CoreEvent::Download(event));
    }

    fn concurrency(&self) -> usize {
        self.settings.max_concurrent_fetches.max(1)
    }

    fn advance(&self, progress: &mut Progress<'_>) {
        progress.completed += 1;
        self.emit(DownloadEvent::Progress {
            course_type: progress.course_type.to_string(),
            completed: progress.completed,
            total: progress.total,
        });
    }

    fn record_failure(
        &self,
        course_type: &str,
        failures: &mut Vec<MediaFailure>,
        url: String,
        kind: MediaKind,
        reason: String,
    ) {
        warn!(course_type, url = %url, ?kind, reason = %reason, "Media capture failed");
        self.emit(DownloadEvent::MediaFailed {
            course_type: course_type.to_string(),
            url: url.clone(),
            reason: reason.clone(),
        });
        failures.push(MediaFailure { url, kind, reason });
    }

    /// Capture the current course of `course_type` into the store.
    ///
    /// # Errors
    ///
    /// Fails when the content tree cannot be fetched or the snapshot cannot
    /// be written. Media failures are reported in the returned
    /// [`DownloadReport`] instead.
    #[instrument(skip(self), fields(course_id = tracing::field::Empty))]
    pub async fn download(&self, course_type: &str) -> Result<DownloadReport> {
        info!("Starting course download");
        self.emit(DownloadEvent::Started {
            course_type: course_type.to_string(),
        });

        match self.run(course_type).await {
            Ok(report) => {
                info!(
                    media_stored = report.media_stored(),
                    media_failed = report.failures.len(),
                    "Course download completed"
                );
                self.emit(DownloadEvent::Completed {
                    course_type: course_type.to_string(),
                    course_id: report.course_id.clone(),
                    media_stored: report.media_stored(),
                    media_failed: report.failures.len(),
                });
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "Course download failed");
                self.emit(DownloadEvent::Failed {
                    course_type: course_type.to_string(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run(&self, course_type: &str) -> Result<DownloadReport> {
        let course = self.source.fetch_course(course_type).await.map_err(|e| {
            DownloadError::ContentUnavailable {
                course_type: course_type.to_string(),
                message: e.to_string(),
            }
        })?;
        if course.course_id.trim().is_empty() {
            return Err(DownloadError::InvalidContent(
                "course has no id".to_string(),
            ));
        }
        tracing::Span::current().record("course_id", course.course_id.as_str());

        let mut content = course.content;
        content.normalize_order();
        let index = MediaIndex::from_content(&content);

        self.emit(DownloadEvent::ContentFetched {
            course_type: course_type.to_string(),
            course_id: course.course_id.clone(),
            media_total: index.len(),
        });

        let mut progress = Progress {
            course_type,
            completed: 0,
            total: index.len(),
        };
        let mut failures = Vec::new();

        let images = self
            .fetch_blobs(&index.images, MediaKind::Image, &mut progress, &mut failures)
            .await;
        let pdfs = self
            .fetch_blobs(&index.pdfs, MediaKind::Pdf, &mut progress, &mut failures)
            .await;

        let previous_hls = self.store.hls_keys(&course.course_id).await?;
        let mut media = SnapshotMedia {
            images,
            pdfs,
            ..SnapshotMedia::default()
        };
        let mut videos_retained = 0;

        let capture = HlsCapture {
            source: self.source.as_ref(),
            normalizer: &self.normalizer,
            max_variant_bandwidth: self.settings.max_variant_bandwidth,
            concurrency: self.concurrency(),
        };
        let now = self.clock.now();

        // Videos one at a time; segments of each are fetched concurrently
        for url in &index.videos {
            match capture.capture(url, now).await {
                Ok(asset) => {
                    if media.hls_assets.iter().any(|a| a.video_id == asset.video_id) {
                        warn!(
                            url = %url,
                            video_id = %asset.video_id,
                            "Video already captured under another URL; skipping"
                        );
                        continue;
                    }
                    media.hls_assets.push(asset);
                }
                Err(e) => {
                    if previous_hls.contains(url) {
                        debug!(url = %url, "Keeping previously stored HLS asset");
                        media.retained_hls.insert(url.clone());
                        videos_retained += 1;
                    }
                    self.record_failure(
                        course_type,
                        &mut failures,
                        url.clone(),
                        MediaKind::Video,
                        e.to_string(),
                    );
                }
            }
            self.advance(&mut progress);
        }

        let snapshot = Snapshot {
            course_id: course.course_id,
            course_type: course_type.to_string(),
            version: course.version,
            downloaded_at: now,
            content,
            media_index: index,
        };
        self.store.put(&snapshot, &media).await?;

        Ok(DownloadReport {
            course_id: snapshot.course_id,
            course_type: snapshot.course_type,
            version: snapshot.version,
            images_stored: media.images.len(),
            pdfs_stored: media.pdfs.len(),
            videos_stored: media.hls_assets.len(),
            videos_retained,
            failures,
        })
    }

    async fn fetch_blobs(
        &self,
        urls: &[String],
        kind: MediaKind,
        progress: &mut Progress<'_>,
        failures: &mut Vec<MediaFailure>,
    ) -> Vec<MediaBlob> {
        let source = self.source.as_ref();
        let mut results = stream::iter(urls.iter().cloned())
            .map(move |url| async move {
                let fetched = source.fetch_media(&url).await;
                (url, fetched)
            })
            .buffer_unordered(self.concurrency());

        let mut blobs = Vec::with_capacity(urls.len());
        while let Some((url, fetched)) = results.next().await {
            match fetched {
                Ok(fetched) => blobs.push(MediaBlob {
                    url,
                    content_type: fetched.content_type,
                    bytes: fetched.bytes,
                }),
                Err(e) => {
                    self.record_failure(progress.course_type, failures, url, kind, e.to_string())
                }
            }
            self.advance(progress);
        }

        blobs.sort_by(|a, b| a.url.cmp(&b.url));
        blobs
    }

    /// Store rendered supporting pages for the current course of a type.
    ///
    /// Each page is upserted on its own; a failed page does not affect the
    /// others.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::NotDownloaded`] when no snapshot of the type
    /// exists yet, and store errors as they occur.
    #[instrument(skip(self, paths), fields(pages = paths.len()))]
    pub async fn capture_pages(
        &self,
        course_type: &str,
        paths: &[&str],
    ) -> Result<PageCaptureReport> {
        let course_id = self
            .store
            .course_id_for_type(course_type)
            .await?
            .ok_or_else(|| DownloadError::NotDownloaded(course_type.to_string()))?;

        let mut report = PageCaptureReport::default();
        for path in paths {
            match self.source.fetch_page(course_type, path).await {
                Ok(fetched) => {
                    let page = CachedPage {
                        course_id: course_id.clone(),
                        path: path.to_string(),
                        body: String::from_utf8_lossy(&fetched.bytes).into_owned(),
                        content_type: fetched.content_type,
                        cached_at: self.clock.now(),
                    };
                    self.store.put_page(&page).await?;
                    report.stored.push(path.to_string());
                }
                Err(e) => {
                    warn!(path, error = %e, "Page capture failed");
                    report.failures.push((path.to_string(), e.to_string()));
                }
            }
        }

        info!(
            stored = report.stored.len(),
            failed = report.failures.len(),
            "Page capture finished"
        );
        Ok(report)
    }
}

//! # Media Resolver
//!
//! Maps a logical media URL from the content tree to what the UI should load.
//!
//! - Online: the URL itself, always.
//! - Offline video: a stable virtual path for the cached HLS asset, found
//!   through exact key, normalized key, then extracted video id.
//! - Offline image/PDF: a transient local handle for the cached blob.
//!
//! Any miss or failure degrades to the original URL. `resolve` never returns
//! an error.

use crate::error::{MediaError, Result};
use crate::handles::{HandleRegistry, MediaHandle};
use crate::hls::{self, ValidationReport};
use crate::normalize::KeyNormalizer;
use core_runtime::config::ResolverSettings;
use core_runtime::logging::redact_url;
use core_store::{HlsAssetIndex, MediaNamespace, SnapshotStore};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

pub const MANIFEST_FILE_NAME: &str = "manifest.m3u8";
pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

// ============================================================================
// Media kinds and results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Image,
    Pdf,
}

impl MediaKind {
    /// Infer the kind from the URL's file extension
    pub fn from_url(url: &str) -> Option<Self> {
        let end = url.find(['?', '#']).unwrap_or(url.len());
        let path = &url[..end];
        let file = path.rsplit('/').next().unwrap_or(path);
        let ext = file.rsplit_once('.')?.1.to_ascii_lowercase();

        match ext.as_str() {
            "m3u8" | "mp4" | "m4v" | "mov" | "webm" => Some(MediaKind::Video),
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "avif" => Some(MediaKind::Image),
            "pdf" => Some(MediaKind::Pdf),
            _ => None,
        }
    }

    fn namespace(&self) -> Option<MediaNamespace> {
        match self {
            MediaKind::Image => Some(MediaNamespace::Images),
            MediaKind::Pdf => Some(MediaNamespace::Pdfs),
            MediaKind::Video => None,
        }
    }
}

/// What the UI should load for a media reference
#[derive(Debug, PartialEq, Eq)]
pub enum DisplayRef {
    /// The original remote URL
    Remote(String),
    /// A local handle over cached bytes; released when dropped
    Local(MediaHandle),
    /// A virtual path answered by the offline HLS serving layer
    Virtual(String),
}

impl DisplayRef {
    pub fn as_str(&self) -> &str {
        match self {
            DisplayRef::Remote(url) => url,
            DisplayRef::Local(handle) => handle.uri(),
            DisplayRef::Virtual(path) => path,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, DisplayRef::Remote(_))
    }
}

// ============================================================================
// Virtual paths
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualResource {
    Manifest,
    Segment(String),
}

/// `{prefix}/{course_type}/{video_id}/manifest.m3u8` or
/// `{prefix}/{course_type}/{video_id}/{segment}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualPath {
    pub course_type: String,
    pub video_id: String,
    pub resource: VirtualResource,
}

fn is_path_segment(value: &str) -> bool {
    !value.is_empty() && !value.contains('/') && value != "." && value != ".."
}

impl VirtualPath {
    pub fn manifest(course_type: &str, video_id: &str) -> Result<Self> {
        Self::checked(course_type, video_id, VirtualResource::Manifest)
    }

    pub fn segment(course_type: &str, video_id: &str, name: &str) -> Result<Self> {
        if !is_path_segment(name) {
            return Err(MediaError::InvalidVirtualPath(format!("bad segment name '{}'", name)));
        }
        Self::checked(course_type, video_id, VirtualResource::Segment(name.to_string()))
    }

    fn checked(course_type: &str, video_id: &str, resource: VirtualResource) -> Result<Self> {
        if !is_path_segment(course_type) || !is_path_segment(video_id) {
            return Err(MediaError::InvalidVirtualPath(format!(
                "course type '{}' and video id '{}' must be single path segments",
                course_type, video_id
            )));
        }
        Ok(Self {
            course_type: course_type.to_string(),
            video_id: video_id.to_string(),
            resource,
        })
    }

    pub fn to_path(&self, prefix: &str) -> String {
        let leaf = match &self.resource {
            VirtualResource::Manifest => MANIFEST_FILE_NAME,
            VirtualResource::Segment(name) => name.as_str(),
        };
        format!("{}/{}/{}/{}", prefix, self.course_type, self.video_id, leaf)
    }

    pub fn parse(prefix: &str, path: &str) -> Result<Self> {
        let invalid = || MediaError::InvalidVirtualPath(path.to_string());

        let rest = path
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(invalid)?;
        let rest = &rest[..rest.find(['?', '#']).unwrap_or(rest.len())];

        let parts: Vec<&str> = rest.split('/').collect();
        let [course_type, video_id, leaf] = parts.as_slice() else {
            return Err(invalid());
        };

        if *leaf == MANIFEST_FILE_NAME {
            Self::manifest(course_type, video_id)
        } else {
            Self::segment(course_type, video_id, leaf)
        }
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_path(core_runtime::config::DEFAULT_VIRTUAL_PATH_PREFIX))
    }
}

/// Bytes answering a virtual path request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedMedia {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

fn segment_content_type(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "ts" => "video/mp2t",
        Some(ext) if ext == "m4s" || ext == "mp4" => "video/mp4",
        Some(ext) if ext == "aac" => "audio/aac",
        Some(ext) if ext == "vtt" => "text/vtt",
        _ => "application/octet-stream",
    }
}

// ============================================================================
// Resolver
// ============================================================================

pub struct MediaResolver {
    store: Arc<dyn SnapshotStore>,
    online: watch::Receiver<bool>,
    normalizer: KeyNormalizer,
    registry: HandleRegistry,
}

impl MediaResolver {
    /// `online` is the connectivity signal, usually
    /// `ConnectivityMonitor::subscribe()`
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        online: watch::Receiver<bool>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            store,
            online,
            normalizer: KeyNormalizer::new(settings),
            registry: HandleRegistry::new(),
        }
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    pub fn normalizer(&self) -> &KeyNormalizer {
        &self.normalizer
    }

    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    fn virtual_prefix(&self) -> &str {
        &self.normalizer.settings().virtual_path_prefix
    }

    /// Resolve with the media kind inferred from the URL
    pub async fn resolve(&self, course_type: &str, url: &str) -> DisplayRef {
        self.resolve_as(course_type, url, MediaKind::from_url(url)).await
    }

    /// Resolve with an explicit media kind (`None` when unknown)
    #[instrument(skip(self, url), fields(url = %redact_url(url)))]
    pub async fn resolve_as(
        &self,
        course_type: &str,
        url: &str,
        kind: Option<MediaKind>,
    ) -> DisplayRef {
        if self.is_online() {
            return DisplayRef::Remote(url.to_string());
        }

        let Some(kind) = kind else {
            debug!("Unknown media kind, using remote URL");
            return DisplayRef::Remote(url.to_string());
        };

        let resolved = match kind {
            MediaKind::Video => self
                .resolve_video(course_type, url)
                .await
                .map(|path| path.map(DisplayRef::Virtual)),
            MediaKind::Image | MediaKind::Pdf => self
                .resolve_blob(course_type, url, kind)
                .await
                .map(|handle| handle.map(DisplayRef::Local)),
        };

        match resolved {
            Ok(Some(display)) => display,
            Ok(None) => DisplayRef::Remote(url.to_string()),
            Err(e) => {
                warn!(error = %e, "Offline media lookup failed, using remote URL");
                DisplayRef::Remote(url.to_string())
            }
        }
    }

    async fn resolve_blob(
        &self,
        course_type: &str,
        url: &str,
        kind: MediaKind,
    ) -> Result<Option<MediaHandle>> {
        let Some(namespace) = kind.namespace() else {
            return Ok(None);
        };
        let Some(course_id) = self.store.course_id_for_type(course_type).await? else {
            return Ok(None);
        };

        let blob = self.store.get_blob(&course_id, namespace, url).await?;
        if blob.is_none() {
            debug!(namespace = %namespace, "No cached blob");
        }

        Ok(blob.map(|blob| self.registry.acquire(blob.content_type, blob.bytes)))
    }

    async fn resolve_video(&self, course_type: &str, url: &str) -> Result<Option<String>> {
        let Some(course_id) = self.store.course_id_for_type(course_type).await? else {
            debug!("No snapshot for course type");
            return Ok(None);
        };

        let keys = self.store.hls_keys(&course_id).await?;

        // (i) exact key
        if keys.iter().any(|key| key == url) {
            if let Some(path) = self.usable_asset(course_type, &course_id, url).await? {
                return Ok(Some(path));
            }
        }

        // (ii) normalized key
        let target = self.normalizer.normalize(url);
        for key in keys.iter().filter(|key| key.as_str() != url) {
            if self.normalizer.normalize(key) == target {
                if let Some(path) = self.usable_asset(course_type, &course_id, key).await? {
                    debug!(matched = %redact_url(key), "Resolved video by normalized key");
                    return Ok(Some(path));
                }
            }
        }

        // (iii) extracted video id
        if let Some(video_id) = self.normalizer.extract_video_id(url) {
            if let Some(index) = self.store.find_hls_by_video_id(&course_id, &video_id).await? {
                if let Some(path) = self.check(course_type, &index) {
                    debug!(video_id = %video_id, "Resolved video by id");
                    return Ok(Some(path));
                }
            }
        }

        warn!(
            course_type,
            available_keys = ?keys.iter().map(|k| redact_url(k)).collect::<Vec<_>>(),
            "No usable offline video for URL"
        );
        Ok(None)
    }

    async fn usable_asset(
        &self,
        course_type: &str,
        course_id: &str,
        manifest_url: &str,
    ) -> Result<Option<String>> {
        let index = self.store.hls_asset_index(course_id, manifest_url).await?;
        Ok(index.and_then(|index| self.check(course_type, &index)))
    }

    /// Virtual path for an asset that passes validation
    fn check(&self, course_type: &str, index: &HlsAssetIndex) -> Option<String> {
        let ValidationReport {
            is_valid, errors, ..
        } = hls::validate(index);

        if !is_valid {
            warn!(video_id = %index.video_id, errors = ?errors, "Cached video failed validation");
            return None;
        }

        match VirtualPath::manifest(course_type, &index.video_id) {
            Ok(path) => Some(path.to_path(self.virtual_prefix())),
            Err(e) => {
                warn!(error = %e, "Cannot build virtual path");
                None
            }
        }
    }

    /// Answer a virtual path request from the store.
    ///
    /// Used by the serving layer that intercepts `/offline-hls/…` requests.
    /// `Ok(None)` means the path is well-formed but nothing is cached for it.
    pub async fn serve_virtual(&self, path: &str) -> Result<Option<ServedMedia>> {
        let virtual_path = VirtualPath::parse(self.virtual_prefix(), path)?;

        let Some(course_id) = self
            .store
            .course_id_for_type(&virtual_path.course_type)
            .await?
        else {
            return Ok(None);
        };
        let Some(index) = self
            .store
            .find_hls_by_video_id(&course_id, &virtual_path.video_id)
            .await?
        else {
            return Ok(None);
        };

        match virtual_path.resource {
            VirtualResource::Manifest => Ok(Some(ServedMedia {
                content_type: MANIFEST_CONTENT_TYPE.to_string(),
                bytes: index.manifest_text.into_bytes(),
            })),
            VirtualResource::Segment(name) => {
                let bytes = self
                    .store
                    .get_segment(&course_id, &index.source_manifest_url, &name)
                    .await?;
                Ok(bytes.map(|bytes| ServedMedia {
                    content_type: segment_content_type(&name).to_string(),
                    bytes,
                }))
            }
        }
    }
}

// ============================================================================
// Per-component slot
// ============================================================================

/// Holds the current [`DisplayRef`] of one UI component.
///
/// Loading a new reference releases the previous handle first; dropping the
/// slot releases the last one.
#[derive(Debug, Default)]
pub struct MediaSlot {
    current: Option<DisplayRef>,
}

impl MediaSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(
        &mut self,
        resolver: &MediaResolver,
        course_type: &str,
        url: &str,
    ) -> &DisplayRef {
        self.current = None;
        let resolved = resolver.resolve(course_type, url).await;
        self.current.insert(resolved)
    }

    pub fn current(&self) -> Option<&DisplayRef> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_from_url() {
        assert_eq!(
            MediaKind::from_url("https://cdn.example/video/abc/hls/playlist.m3u8"),
            Some(MediaKind::Video)
        );
        assert_eq!(
            MediaKind::from_url("https://cdn.example/img/Cover.JPG?w=200"),
            Some(MediaKind::Image)
        );
        assert_eq!(MediaKind::from_url("https://cdn.example/doc.pdf"), Some(MediaKind::Pdf));
        assert_eq!(MediaKind::from_url("https://cdn.example/page"), None);
        assert_eq!(MediaKind::from_url(""), None);
    }

    #[test]
    fn test_virtual_path_round_trip() {
        let path = VirtualPath::manifest("onboarding", "abc").unwrap();
        let text = path.to_path("/offline-hls");
        assert_eq!(text, "/offline-hls/onboarding/abc/manifest.m3u8");
        assert_eq!(VirtualPath::parse("/offline-hls", &text).unwrap(), path);

        let segment = VirtualPath::parse("/offline-hls", "/offline-hls/onboarding/abc/seg-001.ts")
            .unwrap();
        assert_eq!(segment.resource, VirtualResource::Segment("seg-001.ts".to_string()));
    }

    #[test]
    fn test_virtual_path_rejects_bad_shapes() {
        assert!(VirtualPath::parse("/offline-hls", "/other/onboarding/abc/manifest.m3u8").is_err());
        assert!(VirtualPath::parse("/offline-hls", "/offline-hls/onboarding/manifest.m3u8").is_err());
        assert!(VirtualPath::parse("/offline-hls", "/offline-hls/a/b/c/d.ts").is_err());
        assert!(VirtualPath::parse("/offline-hls", "/offline-hls/a/../seg.ts").is_err());
        assert!(VirtualPath::manifest("a/b", "abc").is_err());
    }

    #[test]
    fn test_segment_content_type() {
        assert_eq!(segment_content_type("seg-000.ts"), "video/mp2t");
        assert_eq!(segment_content_type("chunk.m4s"), "video/mp4");
        assert_eq!(segment_content_type("blob"), "application/octet-stream");
    }
}

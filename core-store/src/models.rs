//! Domain models for persisted course snapshots
//!
//! The content tree types double as the wire shape returned by the remote
//! content API, so they use camelCase field names when serialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// =============================================================================
// Content tree
// =============================================================================

/// Kind of a course step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Video,
    Text,
    Pdf,
    Quiz,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Video => "video",
            StepKind::Text => "text",
            StepKind::Pdf => "pdf",
            StepKind::Quiz => "quiz",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a course day, with everything needed to render it offline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub position: u32,
    pub title: String,
    pub kind: StepKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Day {
    pub id: String,
    pub position: u32,
    pub title: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Ordered days of a course, each with ordered steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseContent {
    #[serde(default)]
    pub days: Vec<Day>,
}

impl CourseContent {
    /// Sort days and steps by position. The remote API does not guarantee order.
    pub fn normalize_order(&mut self) {
        self.days.sort_by_key(|day| day.position);
        for day in &mut self.days {
            day.steps.sort_by_key(|step| step.position);
        }
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.days.iter().flat_map(|day| day.steps.iter())
    }

    pub fn step_count(&self) -> usize {
        self.days.iter().map(|day| day.steps.len()).sum()
    }
}

/// Deduplicated media references found in a content tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaIndex {
    pub images: Vec<String>,
    pub pdfs: Vec<String>,
    pub videos: Vec<String>,
}

impl MediaIndex {
    /// Collect every media URL referenced by `content`, deduplicated and sorted
    pub fn from_content(content: &CourseContent) -> Self {
        let mut images = BTreeSet::new();
        let mut pdfs = BTreeSet::new();
        let mut videos = BTreeSet::new();

        fn push(set: &mut BTreeSet<String>, url: &Option<String>) {
            if let Some(url) = url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
                set.insert(url.to_string());
            }
        }

        for day in &content.days {
            push(&mut images, &day.image_url);
            for step in &day.steps {
                push(&mut images, &step.image_url);
                push(&mut pdfs, &step.pdf_url);
                push(&mut videos, &step.video_url);
            }
        }

        Self {
            images: images.into_iter().collect(),
            pdfs: pdfs.into_iter().collect(),
            videos: videos.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.images.len() + self.pdfs.len() + self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Metadata and content tree of one locally persisted course.
///
/// Media bytes are not carried here; they are written alongside through
/// [`SnapshotMedia`] and read back through the store's media lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub course_id: String,
    pub course_type: String,
    /// Opaque monotonic token supplied by the remote API
    pub version: String,
    pub downloaded_at: DateTime<Utc>,
    pub content: CourseContent,
    pub media_index: MediaIndex,
}

/// Namespace partitioning blob keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaNamespace {
    Images,
    Pdfs,
}

impl MediaNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaNamespace::Images => "images",
            MediaNamespace::Pdfs => "pdfs",
        }
    }
}

impl fmt::Display for MediaNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image or PDF bytes keyed by the original URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBlob {
    pub url: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A captured HLS media playlist with all of its segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlsAsset {
    /// URL as referenced by the content tree; the asset's key
    pub source_manifest_url: String,
    pub video_id: String,
    /// Manifest rewritten to reference bare segment names
    pub manifest_text: String,
    pub segments: BTreeMap<String, Vec<u8>>,
    pub version: Option<String>,
    pub downloaded_at: Option<DateTime<Utc>>,
}

/// An HLS asset without segment bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlsAssetIndex {
    pub source_manifest_url: String,
    pub video_id: String,
    pub manifest_text: String,
    pub segment_names: BTreeSet<String>,
    pub version: Option<String>,
    pub downloaded_at: Option<DateTime<Utc>>,
}

impl From<&HlsAsset> for HlsAssetIndex {
    fn from(asset: &HlsAsset) -> Self {
        Self {
            source_manifest_url: asset.source_manifest_url.clone(),
            video_id: asset.video_id.clone(),
            manifest_text: asset.manifest_text.clone(),
            segment_names: asset.segments.keys().cloned().collect(),
            version: asset.version.clone(),
            downloaded_at: asset.downloaded_at,
        }
    }
}

/// Media written together with a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotMedia {
    pub images: Vec<MediaBlob>,
    pub pdfs: Vec<MediaBlob>,
    pub hls_assets: Vec<HlsAsset>,
    /// Manifest keys whose previously stored asset must survive this write
    /// (re-capture failed)
    pub retained_hls: BTreeSet<String>,
}

impl SnapshotMedia {
    pub fn blob_count(&self) -> usize {
        self.images.len() + self.pdfs.len()
    }
}

/// Snapshot metadata for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub course_id: String,
    pub course_type: String,
    pub version: String,
    pub downloaded_at: DateTime<Utc>,
}

/// A rendered supporting page cached next to a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPage {
    pub course_id: String,
    pub path: String,
    pub body: String,
    pub content_type: String,
    pub cached_at: DateTime<Utc>,
}

//! # HLS Playlist Helpers and Integrity Validation
//!
//! Pure functions over playlist text. Nothing here performs I/O.
//!
//! A stored asset is usable only when its manifest is structurally sound and
//! every segment it references is present. [`validate`] works on anything
//! implementing [`SegmentInventory`], so the resolver can check an asset's
//! index without loading segment bytes.

use crate::error::{MediaError, Result};
use core_store::{HlsAsset, HlsAssetIndex};
use std::collections::HashSet;
use url::Url;

pub const PLAYLIST_HEADER: &str = "#EXTM3U";
pub const SEGMENT_TAG: &str = "#EXTINF";
pub const VERSION_TAG: &str = "#EXT-X-VERSION";
pub const STREAM_INF_TAG: &str = "#EXT-X-STREAM-INF";

/// Missing segment names listed in a validation error before truncating
pub const MISSING_SEGMENTS_LISTED: usize = 5;

/// What the validator needs to know about a captured asset
pub trait SegmentInventory {
    fn manifest_text(&self) -> &str;
    fn has_segment(&self, name: &str) -> bool;
    fn has_download_timestamp(&self) -> bool;
}

impl SegmentInventory for HlsAsset {
    fn manifest_text(&self) -> &str {
        &self.manifest_text
    }

    fn has_segment(&self, name: &str) -> bool {
        self.segments.contains_key(name)
    }

    fn has_download_timestamp(&self) -> bool {
        self.downloaded_at.is_some()
    }
}

impl SegmentInventory for HlsAssetIndex {
    fn manifest_text(&self) -> &str {
        &self.manifest_text
    }

    fn has_segment(&self, name: &str) -> bool {
        self.segment_names.contains(name)
    }

    fn has_download_timestamp(&self) -> bool {
        self.downloaded_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Check structure and segment completeness of a captured asset.
///
/// `is_valid` is true exactly when `errors` is empty.
pub fn validate<A: SegmentInventory + ?Sized>(asset: &A) -> ValidationReport {
    let manifest = asset.manifest_text();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if manifest.trim().is_empty() {
        errors.push("Manifest is empty".to_string());
        return ValidationReport {
            is_valid: false,
            errors,
            warnings,
        };
    }

    if !has_tag(manifest, PLAYLIST_HEADER) {
        errors.push(format!("Manifest is missing the {} header", PLAYLIST_HEADER));
    }

    if !has_tag(manifest, SEGMENT_TAG) {
        errors.push(format!("Manifest declares no segments ({})", SEGMENT_TAG));
    }

    let missing: Vec<String> = segment_references(manifest)
        .into_iter()
        .filter(|name| !asset.has_segment(name))
        .collect();

    if !missing.is_empty() {
        errors.push(missing_segments_message(&missing));
    }

    if !has_tag(manifest, VERSION_TAG) {
        warnings.push(format!("Manifest has no {} tag", VERSION_TAG));
    }

    if !asset.has_download_timestamp() {
        warnings.push("Asset has no download timestamp".to_string());
    }

    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn missing_segments_message(missing: &[String]) -> String {
    let listed = missing
        .iter()
        .take(MISSING_SEGMENTS_LISTED)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    if missing.len() > MISSING_SEGMENTS_LISTED {
        format!(
            "Missing segments: {} (+{} more)",
            listed,
            missing.len() - MISSING_SEGMENTS_LISTED
        )
    } else {
        format!("Missing segments: {}", listed)
    }
}

fn has_tag(manifest: &str, tag: &str) -> bool {
    manifest.lines().any(|line| line.trim_start().starts_with(tag))
}

/// URI lines of a playlist: every non-empty line that is not a tag or comment
fn uri_lines(manifest: &str) -> impl Iterator<Item = &str> {
    manifest
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Bare segment name of a playlist URI line: last path component, with the
/// query and fragment removed.
pub fn segment_name(line: &str) -> Option<String> {
    let line = line.trim();
    let end = line.find(['?', '#']).unwrap_or(line.len());
    let path = &line[..end];
    let name = path.rsplit('/').next().unwrap_or(path);

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Unique segment names referenced by a media playlist, in playlist order
pub fn segment_references(manifest: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    uri_lines(manifest)
        .filter_map(segment_name)
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Raw URI lines of a media playlist, in order, for fetching
pub fn segment_uris(manifest: &str) -> Vec<String> {
    uri_lines(manifest).map(String::from).collect()
}

/// Value of `#EXT-X-VERSION`, if declared
pub fn version_tag(manifest: &str) -> Option<String> {
    manifest.lines().find_map(|line| {
        line.trim()
            .strip_prefix(VERSION_TAG)
            .and_then(|rest| rest.strip_prefix(':'))
            .map(|v| v.trim().to_string())
    })
}

/// Rewrite every URI line to its bare segment name so the manifest can be
/// served next to its segments from any base path.
pub fn rewrite_to_segment_names(manifest: &str) -> String {
    let mut out = String::with_capacity(manifest.len());
    for line in manifest.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            out.push_str(trimmed);
        } else {
            match segment_name(trimmed) {
                Some(name) => out.push_str(&name),
                None => out.push_str(trimmed),
            }
        }
        out.push('\n');
    }
    out
}

/// A master playlist lists variant streams instead of segments
pub fn is_master_playlist(manifest: &str) -> bool {
    has_tag(manifest, STREAM_INF_TAG)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub uri: String,
    pub bandwidth: Option<u64>,
    pub resolution: Option<String>,
}

/// Variant streams of a master playlist, in declaration order
pub fn parse_variants(manifest: &str) -> Vec<Variant> {
    let mut variants = Vec::new();
    let mut pending: Option<(Option<u64>, Option<String>)> = None;

    for line in manifest.lines().map(str::trim) {
        if let Some(attrs) = line
            .strip_prefix(STREAM_INF_TAG)
            .and_then(|rest| rest.strip_prefix(':'))
        {
            pending = Some((
                attribute(attrs, "BANDWIDTH").and_then(|v| v.parse().ok()),
                attribute(attrs, "RESOLUTION"),
            ));
        } else if !line.is_empty() && !line.starts_with('#') {
            if let Some((bandwidth, resolution)) = pending.take() {
                variants.push(Variant {
                    uri: line.to_string(),
                    bandwidth,
                    resolution,
                });
            }
        }
    }

    variants
}

/// Read one attribute from an HLS attribute list. Quoted values may contain
/// commas.
fn attribute(attrs: &str, key: &str) -> Option<String> {
    let mut rest = attrs;
    while !rest.is_empty() {
        let (name, after_eq) = rest.split_once('=')?;
        let (value, remainder) = if let Some(quoted) = after_eq.strip_prefix('"') {
            let close = quoted.find('"')?;
            let remainder = quoted[close + 1..].trim_start_matches(',');
            (&quoted[..close], remainder)
        } else {
            match after_eq.split_once(',') {
                Some((value, remainder)) => (value, remainder),
                None => (after_eq, ""),
            }
        };

        if name.trim().eq_ignore_ascii_case(key) {
            return Some(value.trim().to_string());
        }
        rest = remainder;
    }
    None
}

/// Pick the best variant not above `max_bandwidth`.
///
/// Without a cap the highest bandwidth wins. When every variant is above the
/// cap the lowest one is used. Variants without a declared bandwidth rank
/// lowest.
pub fn select_variant(variants: &[Variant], max_bandwidth: Option<u64>) -> Option<&Variant> {
    let rank = |v: &Variant| v.bandwidth.unwrap_or(0);

    let within_cap = variants
        .iter()
        .filter(|v| max_bandwidth.map_or(true, |cap| rank(v) <= cap))
        .max_by_key(|v| rank(v));

    within_cap.or_else(|| variants.iter().min_by_key(|v| rank(v)))
}

/// Resolve a playlist URI against the URL of the playlist that contains it
pub fn resolve_uri(base: &str, reference: &str) -> Result<String> {
    let base_url = Url::parse(base).map_err(|e| MediaError::InvalidUrl {
        url: base.to_string(),
        message: e.to_string(),
    })?;

    base_url
        .join(reference)
        .map(|u| u.to_string())
        .map_err(|e| MediaError::InvalidManifest(format!("bad URI '{}': {}", reference, e)))
}

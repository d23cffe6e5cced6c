//! HLS capture: playlist, chosen variant and every segment, assembled into
//! one self-contained [`HlsAsset`].

use chrono::{DateTime, Utc};
use core_media::hls::{
    is_master_playlist, parse_variants, resolve_uri, rewrite_to_segment_names, segment_name,
    segment_uris, select_variant, validate, version_tag,
};
use core_media::KeyNormalizer;
use core_store::HlsAsset;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{DownloadError, Result};
use crate::source::ContentSource;

pub struct HlsCapture<'a> {
    pub source: &'a dyn ContentSource,
    pub normalizer: &'a KeyNormalizer,
    pub max_variant_bandwidth: Option<u64>,
    pub concurrency: usize,
}

impl HlsCapture<'_> {
    /// Capture the video referenced by `video_url`.
    ///
    /// The asset is keyed by `video_url` itself so the resolver finds it by
    /// exact match. Any failed fetch, or an assembled asset that does not
    /// validate, fails the whole capture.
    pub async fn capture(&self, video_url: &str, now: DateTime<Utc>) -> Result<HlsAsset> {
        let playlist_url = self.normalizer.manifest_location(video_url);
        let playlist = self.source.fetch_media(&playlist_url).await?.into_text()?;

        let (media_url, media_playlist) = if is_master_playlist(&playlist) {
            let variants = parse_variants(&playlist);
            let chosen = select_variant(&variants, self.max_variant_bandwidth).ok_or_else(|| {
                DownloadError::InvalidContent(format!(
                    "master playlist {} lists no variants",
                    playlist_url
                ))
            })?;
            debug!(
                url = %playlist_url,
                variant = %chosen.uri,
                bandwidth = ?chosen.bandwidth,
                "Selected HLS variant"
            );

            let url = resolve_uri(&playlist_url, &chosen.uri)?;
            let text = self.source.fetch_media(&url).await?.into_text()?;
            (url, text)
        } else {
            (playlist_url, playlist)
        };

        let mut targets = Vec::new();
        for uri in segment_uris(&media_playlist) {
            let Some(name) = segment_name(&uri) else {
                continue;
            };
            if targets.iter().any(|(existing, _)| existing == &name) {
                continue;
            }
            targets.push((name, resolve_uri(&media_url, &uri)?));
        }

        let source = self.source;
        let segments: BTreeMap<String, Vec<u8>> = stream::iter(targets)
            .map(move |(name, url)| async move {
                let fetched = source.fetch_media(&url).await?;
                Ok::<_, DownloadError>((name, fetched.bytes))
            })
            .buffer_unordered(self.concurrency.max(1))
            .try_collect()
            .await?;

        let video_id = self
            .normalizer
            .extract_video_id(video_url)
            .or_else(|| self.normalizer.extract_video_id(&media_url))
            .unwrap_or_else(|| fallback_video_id(&self.normalizer.normalize(video_url)));

        let asset = HlsAsset {
            source_manifest_url: video_url.to_string(),
            video_id,
            manifest_text: rewrite_to_segment_names(&media_playlist),
            version: version_tag(&media_playlist),
            segments,
            downloaded_at: Some(now),
        };

        let report = validate(&asset);
        if !report.is_valid {
            return Err(DownloadError::InvalidContent(report.errors.join("; ")));
        }

        debug!(
            url = %video_url,
            video_id = %asset.video_id,
            segments = asset.segments.len(),
            "HLS asset captured"
        );
        Ok(asset)
    }
}

/// Identifier-shaped id for URLs that match none of the known shapes
fn fallback_video_id(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_video_id_is_single_segment() {
        let id = fallback_video_id("media/clips/intro v2.m3u8");
        assert_eq!(id, "media_clips_intro_v2_m3u8");
        assert!(!id.contains('/'));
    }
}

//! Canonical keys and video ids for media URLs.
//!
//! The same video can be referenced through several historical URL forms
//! (signed storage links, the original upload, the packaged HLS playlist).
//! The rules here are a fixed, enumerated set driven by [`ResolverSettings`];
//! nothing is inferred beyond them.

use core_runtime::config::{ResolverSettings, UrlShape};
use url::Url;

#[derive(Debug, Clone)]
pub struct KeyNormalizer {
    settings: ResolverSettings,
}

impl KeyNormalizer {
    pub fn new(settings: ResolverSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Canonical key of a media URL.
    ///
    /// Drops query and fragment, strips a configured storage-host prefix and
    /// path namespace, then rewrites `…/{id}/original.mp4` and
    /// `…/{video_folder}/{id}.mp4` to `…/{id}/{manifest_suffix}`.
    pub fn normalize(&self, url: &str) -> String {
        let mut key = strip_query_and_fragment(url.trim()).to_string();

        if let Some(prefix) = self
            .settings
            .storage_host_prefixes
            .iter()
            .find(|prefix| !prefix.is_empty() && key.starts_with(prefix.as_str()))
        {
            key = key[prefix.len()..].to_string();
        }

        let trimmed = key.trim_start_matches('/');
        if let Some(namespace) = self
            .settings
            .path_namespaces
            .iter()
            .find(|ns| !ns.is_empty() && trimmed.starts_with(ns.as_str()))
        {
            key = trimmed[namespace.len()..].trim_start_matches('/').to_string();
        }

        self.rewrite_suffix(&key)
    }

    /// Location of the packaged HLS playlist for a video URL.
    ///
    /// Playlist URLs are returned as given. Upload URLs (`…/original.mp4`,
    /// `…/{video_folder}/{id}.mp4`) are rewritten in place, keeping the host
    /// and dropping any signature query.
    pub fn manifest_location(&self, url: &str) -> String {
        let url = url.trim();
        let path = strip_query_and_fragment(url);
        if path.ends_with(".m3u8") {
            return url.to_string();
        }
        self.rewrite_suffix(path)
    }

    fn rewrite_suffix(&self, key: &str) -> String {
        let original = format!("/{}", self.settings.original_file_name);
        if let Some(stem) = key.strip_suffix(original.as_str()) {
            return format!("{}/{}", stem, self.settings.manifest_suffix);
        }

        // `{video_folder}/{id}.mp4` → `{video_folder}/{id}/{manifest_suffix}`
        if let Some((head, file)) = key.rsplit_once('/') {
            let folder = head.rsplit('/').next().unwrap_or(head);
            if folder == self.settings.video_folder {
                if let Some(id) = file.strip_suffix(".mp4").filter(|id| !id.is_empty()) {
                    return format!("{}/{}/{}", head, id, self.settings.manifest_suffix);
                }
            }
        }

        key.to_string()
    }

    /// Extract a video id using the configured URL shapes, in order.
    ///
    /// Matching is case-sensitive and returns the id exactly as it appears.
    pub fn extract_video_id(&self, url: &str) -> Option<String> {
        let path = url_path(url);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        self.settings
            .url_shapes
            .shapes
            .iter()
            .find_map(|shape| match shape {
                UrlShape::ApiVideo => api_video_id(&segments),
                UrlShape::NestedDirectory => {
                    nested_directory_id(&segments, &self.settings.video_folder)
                }
                UrlShape::IdentifierBeforeSuffix => self.identifier_before_suffix(&segments),
            })
    }

    fn known_suffixes(&self) -> Vec<Vec<&str>> {
        [
            self.settings.manifest_suffix.as_str(),
            self.settings.original_file_name.as_str(),
        ]
        .iter()
        .map(|suffix| suffix.split('/').filter(|s| !s.is_empty()).collect())
        .collect()
    }

    fn identifier_before_suffix(&self, segments: &[&str]) -> Option<String> {
        let suffixes = self.known_suffixes();

        (0..segments.len()).rev().find_map(|i| {
            let candidate = segments[i];
            let rest = &segments[i + 1..];
            let follows_suffix = suffixes.iter().any(|suffix| suffix.as_slice() == rest);

            (follows_suffix && is_identifier(candidate)).then(|| candidate.to_string())
        })
    }
}

/// `/video/{id}/…`
fn api_video_id(segments: &[&str]) -> Option<String> {
    segments
        .windows(3)
        .find(|w| w[0] == "video" && is_identifier(w[1]))
        .map(|w| w[1].to_string())
}

/// `/{video_folder}/{id}/…` or `/{video_folder}/{id}.mp4`
fn nested_directory_id(segments: &[&str], video_folder: &str) -> Option<String> {
    let pos = segments.iter().position(|s| *s == video_folder)?;
    let next = *segments.get(pos + 1)?;
    let has_more = segments.len() > pos + 2;

    let id = if has_more {
        next
    } else {
        next.strip_suffix(".mp4")?
    };

    is_identifier(id).then(|| id.to_string())
}

/// Opaque id shape: ASCII alphanumerics, `-` and `_`
fn is_identifier(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn strip_query_and_fragment(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Path portion of an absolute URL, or the input itself stripped of query
/// and fragment when it does not parse
fn url_path(url: &str) -> String {
    match Url::parse(url.trim()) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => strip_query_and_fragment(url.trim()).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_runtime::config::UrlShapeSet;

    fn normalizer() -> KeyNormalizer {
        KeyNormalizer::new(ResolverSettings {
            storage_host_prefixes: vec!["https://storage.example.com/".to_string()],
            path_namespaces: vec!["course-media/".to_string()],
            ..ResolverSettings::default()
        })
    }

    #[test]
    fn test_original_and_playlist_share_key() {
        let n = normalizer();
        let original = "https://cdn.example/videocourses/v42/original.mp4";
        let playlist = "https://cdn.example/videocourses/v42/hls/playlist.m3u8";

        assert_eq!(n.normalize(original), n.normalize(playlist));
    }

    #[test]
    fn test_bare_file_under_video_folder() {
        let n = normalizer();

        assert_eq!(
            n.normalize("https://cdn.example/videocourses/v42.mp4"),
            n.normalize("https://cdn.example/videocourses/v42/hls/playlist.m3u8")
        );
        // Outside the known folder nothing is rewritten
        assert_eq!(
            n.normalize("https://cdn.example/uploads/v42.mp4"),
            "https://cdn.example/uploads/v42.mp4"
        );
    }

    #[test]
    fn test_strips_query_host_and_namespace() {
        let n = normalizer();

        assert_eq!(
            n.normalize(
                "https://storage.example.com/course-media/videocourses/v42/original.mp4?X-Goog-Signature=abc#t=10"
            ),
            "videocourses/v42/hls/playlist.m3u8"
        );
        assert_eq!(
            n.normalize("https://storage.example.com/course-media/videocourses/v42/original.mp4"),
            n.normalize("https://storage.example.com/videocourses/v42/hls/playlist.m3u8")
        );
    }

    #[test]
    fn test_manifest_location_keeps_host() {
        let n = normalizer();

        assert_eq!(
            n.manifest_location("https://cdn.example/videocourses/v42/original.mp4?sig=1"),
            "https://cdn.example/videocourses/v42/hls/playlist.m3u8"
        );
        assert_eq!(
            n.manifest_location("https://cdn.example/video/abc/hls/playlist.m3u8?token=x"),
            "https://cdn.example/video/abc/hls/playlist.m3u8?token=x"
        );
    }

    #[test]
    fn test_normalize_never_panics_on_garbage() {
        let n = normalizer();
        for input in ["", "?", "#", "/", "original.mp4", "/original.mp4", ".mp4", "videocourses/.mp4", "💥/videocourses/é.mp4"] {
            let _ = n.normalize(input);
            let _ = n.extract_video_id(input);
        }
    }

    #[test]
    fn test_extract_api_video_id() {
        let n = normalizer();
        assert_eq!(
            n.extract_video_id("https://cdn.example/video/abc/hls/playlist.m3u8").as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn test_extract_nested_directory_id() {
        let n = normalizer();
        assert_eq!(
            n.extract_video_id("https://cdn.example/videocourses/Xy12/hls/playlist.m3u8?x=1")
                .as_deref(),
            Some("Xy12")
        );
        assert_eq!(
            n.extract_video_id("https://cdn.example/videocourses/Xy12.mp4").as_deref(),
            Some("Xy12")
        );
    }

    #[test]
    fn test_extract_identifier_before_suffix() {
        let n = normalizer();
        assert_eq!(
            n.extract_video_id("https://cdn.example/assets/lesson_7/original.mp4").as_deref(),
            Some("lesson_7")
        );
        assert_eq!(n.extract_video_id("https://cdn.example/assets/lesson_7/poster.jpg"), None);
    }

    #[test]
    fn test_shapes_are_limited_to_the_configured_set() {
        let n = KeyNormalizer::new(ResolverSettings {
            url_shapes: UrlShapeSet {
                version: 1,
                shapes: vec![UrlShape::ApiVideo],
            },
            ..ResolverSettings::default()
        });

        assert_eq!(
            n.extract_video_id("https://cdn.example/videocourses/Xy12/hls/playlist.m3u8"),
            None
        );
    }
}

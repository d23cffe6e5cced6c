//! # Core Configuration Module
//!
//! Provides configuration management for the offline course core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct an
//! `OfflineConfig` holding every tunable of the offline subsystem: where the
//! store lives, which remote API the downloader and dispatchers talk to, the
//! sync retry ceiling and cooldown, and the URL shapes the media resolver is
//! allowed to recognise. Validation is fail-fast so that a misconfigured host
//! finds out at startup rather than at the first offline render.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::OfflineConfig;
//! use std::time::Duration;
//!
//! let config = OfflineConfig::builder()
//!     .database_path("/path/to/offline.db")
//!     .api_base_url("https://api.example.com")
//!     .max_retries(5)
//!     .sync_cooldown(Duration::from_secs(10))
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::OfflineConfig;
//!
//! // This will panic: no database path and no API base URL
//! let config = OfflineConfig::builder()
//!     .build()
//!     .expect("Should fail - missing required settings");
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default number of failed dispatches after which an action is dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default minimum spacing between two drain passes.
pub const DEFAULT_SYNC_COOLDOWN: Duration = Duration::from_secs(30);

/// Default age after which a queued action is discarded regardless of retries.
pub const DEFAULT_MAX_ACTION_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default prefix of the virtual HLS retrieval path.
pub const DEFAULT_VIRTUAL_PATH_PREFIX: &str = "/offline-hls";

/// Configuration for the offline course core.
///
/// Use [`OfflineConfigBuilder`] to construct instances.
#[derive(Debug, Clone)]
pub struct OfflineConfig {
    /// Path to the SQLite database file holding snapshots and the sync queue
    pub database_path: PathBuf,

    /// Base URL of the remote content / dispatch API
    pub api_base_url: String,

    /// Sync queue tunables
    pub sync: SyncSettings,

    /// Media resolver tunables
    pub resolver: ResolverSettings,

    /// Snapshot downloader tunables
    pub download: DownloadSettings,
}

impl OfflineConfig {
    /// Creates a new builder for constructing an `OfflineConfig`.
    pub fn builder() -> OfflineConfigBuilder {
        OfflineConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.api_base_url.is_empty() {
            return Err(Error::Config("API base URL cannot be empty".to_string()));
        }

        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "API base URL must be http(s): {}",
                self.api_base_url
            )));
        }

        self.sync.validate()?;
        self.resolver.validate()?;
        self.download.validate()?;

        Ok(())
    }
}

/// Sync queue settings.
///
/// Retry ceiling and cooldown are deployment configuration rather than
/// constants so hosts can tune them per environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Failed dispatches after which an action is dropped
    pub max_retries: u32,

    /// Minimum time between the start of two drain passes
    pub cooldown: Duration,

    /// Actions older than this are swept regardless of retry state
    pub max_action_age: Duration,

    /// How often the retention sweep runs
    pub retention_sweep_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            cooldown: DEFAULT_SYNC_COOLDOWN,
            max_action_age: DEFAULT_MAX_ACTION_AGE,
            retention_sweep_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl SyncSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::Config(
                "max_retries must be at least 1".to_string(),
            ));
        }

        if self.max_action_age.is_zero() {
            return Err(Error::Config(
                "max_action_age must be greater than 0".to_string(),
            ));
        }

        if self.retention_sweep_interval.is_zero() {
            return Err(Error::Config(
                "retention_sweep_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// A legacy URL shape the resolver may use to extract a video id.
///
/// The list is closed on purpose: adding a shape means adding a variant and
/// bumping [`UrlShapeSet::version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlShape {
    /// `/video/{id}/...`
    ApiVideo,
    /// `/{video_folder}/{id}/...`
    NestedDirectory,
    /// any identifier-shaped segment directly followed by a known suffix
    IdentifierBeforeSuffix,
}

/// Versioned, enumerated set of URL shapes understood by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlShapeSet {
    pub version: u32,
    pub shapes: Vec<UrlShape>,
}

impl UrlShapeSet {
    /// The first published set of shapes.
    pub fn v1() -> Self {
        Self {
            version: 1,
            shapes: vec![
                UrlShape::ApiVideo,
                UrlShape::NestedDirectory,
                UrlShape::IdentifierBeforeSuffix,
            ],
        }
    }

    pub fn contains(&self, shape: UrlShape) -> bool {
        self.shapes.contains(&shape)
    }
}

impl Default for UrlShapeSet {
    fn default() -> Self {
        Self::v1()
    }
}

/// Media resolver settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Storage host prefixes stripped during key normalization
    /// (e.g. `https://storage.example.com/`)
    pub storage_host_prefixes: Vec<String>,

    /// Leading path namespaces stripped during key normalization
    /// (e.g. `course-media/`)
    pub path_namespaces: Vec<String>,

    /// Folder that holds per-video directories (`videocourses`)
    pub video_folder: String,

    /// File name of the original upload inside a video directory
    pub original_file_name: String,

    /// Canonical streaming manifest suffix inside a video directory
    pub manifest_suffix: String,

    /// URL shapes used for identifier extraction
    pub url_shapes: UrlShapeSet,

    /// Prefix of the virtual retrieval path
    pub virtual_path_prefix: String,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            storage_host_prefixes: Vec::new(),
            path_namespaces: Vec::new(),
            video_folder: "videocourses".to_string(),
            original_file_name: "original.mp4".to_string(),
            manifest_suffix: "hls/playlist.m3u8".to_string(),
            url_shapes: UrlShapeSet::v1(),
            virtual_path_prefix: DEFAULT_VIRTUAL_PATH_PREFIX.to_string(),
        }
    }
}

impl ResolverSettings {
    pub fn validate(&self) -> Result<()> {
        if self.video_folder.is_empty() || self.video_folder.contains('/') {
            return Err(Error::Config(
                "video_folder must be a single non-empty path segment".to_string(),
            ));
        }

        if self.original_file_name.is_empty() || self.manifest_suffix.is_empty() {
            return Err(Error::Config(
                "original_file_name and manifest_suffix cannot be empty".to_string(),
            ));
        }

        if !self.virtual_path_prefix.starts_with('/') || self.virtual_path_prefix.ends_with('/') {
            return Err(Error::Config(format!(
                "virtual_path_prefix must start with '/' and not end with one: {}",
                self.virtual_path_prefix
            )));
        }

        Ok(())
    }
}

/// Snapshot downloader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    /// Highest variant bandwidth (bits/s) picked from a master playlist;
    /// `None` picks the highest available
    pub max_variant_bandwidth: Option<u64>,

    /// Timeout for each individual fetch
    pub request_timeout: Duration,

    /// Concurrent media/segment fetches
    pub max_concurrent_fetches: usize,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_variant_bandwidth: None,
            request_timeout: Duration::from_secs(60),
            max_concurrent_fetches: 4,
        }
    }
}

impl DownloadSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_fetches == 0 {
            return Err(Error::Config(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(Error::Config(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`OfflineConfig`].
#[derive(Debug, Default)]
pub struct OfflineConfigBuilder {
    database_path: Option<PathBuf>,
    api_base_url: Option<String>,
    sync: SyncSettings,
    resolver: ResolverSettings,
    download: DownloadSettings,
}

impl OfflineConfigBuilder {
    /// Sets the SQLite database path.
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the remote API base URL (trailing slashes are trimmed).
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.api_base_url = Some(url.trim_end_matches('/').to_string());
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.sync.max_retries = retries;
        self
    }

    pub fn sync_cooldown(mut self, cooldown: Duration) -> Self {
        self.sync.cooldown = cooldown;
        self
    }

    pub fn max_action_age(mut self, age: Duration) -> Self {
        self.sync.max_action_age = age;
        self
    }

    pub fn sync_settings(mut self, sync: SyncSettings) -> Self {
        self.sync = sync;
        self
    }

    pub fn storage_host_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.resolver.storage_host_prefixes.push(prefix.into());
        self
    }

    pub fn path_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.resolver.path_namespaces.push(namespace.into());
        self
    }

    pub fn resolver_settings(mut self, resolver: ResolverSettings) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn download_settings(mut self, download: DownloadSettings) -> Self {
        self.download = download;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<OfflineConfig> {
        let database_path = self
            .database_path
            .ok_or_else(|| Error::Config("Database path is required".to_string()))?;
        let api_base_url = self
            .api_base_url
            .ok_or_else(|| Error::Config("API base URL is required".to_string()))?;

        let config = OfflineConfig {
            database_path,
            api_base_url,
            sync: self.sync,
            resolver: self.resolver,
            download: self.download,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> OfflineConfigBuilder {
        OfflineConfig::builder()
            .database_path("/tmp/offline.db")
            .api_base_url("https://api.example.com/")
    }

    #[test]
    fn test_defaults() {
        let config = base().build().unwrap();

        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.sync.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.sync.cooldown, DEFAULT_SYNC_COOLDOWN);
        assert_eq!(config.resolver.virtual_path_prefix, "/offline-hls");
        assert_eq!(config.resolver.url_shapes.version, 1);
    }

    #[test]
    fn test_missing_required_settings() {
        let err = OfflineConfig::builder()
            .api_base_url("https://api.example.com")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Database path"));

        let err = OfflineConfig::builder()
            .database_path("/tmp/offline.db")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("API base URL"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(base().max_retries(0).build().is_err());
        assert!(base().api_base_url("ftp://example.com").build().is_err());

        let resolver = ResolverSettings {
            virtual_path_prefix: "offline-hls/".to_string(),
            ..ResolverSettings::default()
        };
        assert!(base().resolver_settings(resolver).build().is_err());

        let download = DownloadSettings {
            max_concurrent_fetches: 0,
            ..DownloadSettings::default()
        };
        assert!(base().download_settings(download).build().is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let config = base()
            .max_retries(5)
            .sync_cooldown(Duration::from_secs(5))
            .storage_host_prefix("https://storage.example.com/")
            .path_namespace("course-media/")
            .build()
            .unwrap();

        assert_eq!(config.sync.max_retries, 5);
        assert_eq!(config.sync.cooldown, Duration::from_secs(5));
        assert_eq!(
            config.resolver.storage_host_prefixes,
            vec!["https://storage.example.com/".to_string()]
        );
        assert_eq!(config.resolver.path_namespaces, vec!["course-media/".to_string()]);
    }

    #[test]
    fn test_url_shape_set() {
        let shapes = UrlShapeSet::v1();
        assert!(shapes.contains(UrlShape::ApiVideo));
        assert!(shapes.contains(UrlShape::NestedDirectory));
        assert!(shapes.contains(UrlShape::IdentifierBeforeSuffix));
    }
}

//! # Snapshot Store
//!
//! Durable storage of course snapshots, their media blobs, captured HLS
//! assets and cached pages.
//!
//! Every method is its own transaction scope; there is no transaction that
//! spans calls. `put` and `delete` touch several tables and run inside a
//! single SQLite transaction so a failure never leaves a half-written course.

use crate::models::{
    CachedPage, HlsAsset, HlsAssetIndex, MediaBlob, MediaNamespace, Snapshot, SnapshotMedia,
    SnapshotSummary,
};
use crate::{Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, instrument};

// ============================================================================
// Store Trait
// ============================================================================

/// Persistent store of offline course data
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Create or overwrite the snapshot keyed by `snapshot.course_id`,
    /// replacing its media. HLS keys in `media.retained_hls` keep their
    /// previously stored asset.
    async fn put(&self, snapshot: &Snapshot, media: &SnapshotMedia) -> Result<()>;

    async fn get_by_id(&self, course_id: &str) -> Result<Option<Snapshot>>;

    /// Most recently downloaded snapshot of the given type
    async fn get_by_type(&self, course_type: &str) -> Result<Option<Snapshot>>;

    /// Id of the current snapshot for `course_type` without loading content
    async fn course_id_for_type(&self, course_type: &str) -> Result<Option<String>>;

    /// Remove a snapshot and all of its media. Returns `false` if nothing
    /// was stored under `course_id`.
    async fn delete(&self, course_id: &str) -> Result<bool>;

    /// Approximate bytes used by all stored data. Diagnostics only.
    async fn size_estimate(&self) -> Result<u64>;

    async fn list_snapshots(&self) -> Result<Vec<SnapshotSummary>>;

    async fn get_blob(
        &self,
        course_id: &str,
        namespace: MediaNamespace,
        url: &str,
    ) -> Result<Option<MediaBlob>>;

    /// Manifest URLs of every stored HLS asset of a course
    async fn hls_keys(&self, course_id: &str) -> Result<Vec<String>>;

    /// Manifest and segment names of an asset, without segment bytes
    async fn hls_asset_index(
        &self,
        course_id: &str,
        manifest_url: &str,
    ) -> Result<Option<HlsAssetIndex>>;

    async fn find_hls_by_video_id(
        &self,
        course_id: &str,
        video_id: &str,
    ) -> Result<Option<HlsAssetIndex>>;

    /// Full asset including segment bytes
    async fn get_hls_asset(&self, course_id: &str, manifest_url: &str)
        -> Result<Option<HlsAsset>>;

    async fn get_segment(
        &self,
        course_id: &str,
        manifest_url: &str,
        name: &str,
    ) -> Result<Option<Vec<u8>>>;

    /// Insert or replace one cached page
    async fn put_page(&self, page: &CachedPage) -> Result<()>;

    async fn get_page(&self, course_id: &str, path: &str) -> Result<Option<CachedPage>>;

    async fn list_pages(&self, course_id: &str) -> Result<Vec<CachedPage>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn put_blobs(
        tx: &mut Transaction<'_, Sqlite>,
        course_id: &str,
        namespace: MediaNamespace,
        blobs: &[MediaBlob],
    ) -> Result<()> {
        for blob in blobs {
            sqlx::query(
                r#"
                INSERT INTO media_blobs (course_id, namespace, url, content_type, bytes)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (course_id, namespace, url) DO UPDATE SET
                    content_type = excluded.content_type,
                    bytes = excluded.bytes
                "#,
            )
            .bind(course_id)
            .bind(namespace.as_str())
            .bind(&blob.url)
            .bind(&blob.content_type)
            .bind(&blob.bytes)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn remove_hls_asset(
        tx: &mut Transaction<'_, Sqlite>,
        course_id: &str,
        manifest_url: &str,
    ) -> Result<()> {
        sqlx::query("DELETE FROM hls_segments WHERE course_id = ? AND manifest_url = ?")
            .bind(course_id)
            .bind(manifest_url)
            .execute(&mut **tx)
            .await?;
        sqlx::query("DELETE FROM hls_assets WHERE course_id = ? AND manifest_url = ?")
            .bind(course_id)
            .bind(manifest_url)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Drop whatever a fresh capture replaces: the same manifest URL, or
    /// another manifest carrying the same video id
    async fn displace_hls_asset(
        tx: &mut Transaction<'_, Sqlite>,
        course_id: &str,
        asset: &HlsAsset,
    ) -> Result<()> {
        let same_video: Vec<(String,)> = sqlx::query_as(
            "SELECT manifest_url FROM hls_assets WHERE course_id = ? AND video_id = ?",
        )
        .bind(course_id)
        .bind(&asset.video_id)
        .fetch_all(&mut **tx)
        .await?;

        for (manifest_url,) in same_video {
            if manifest_url != asset.source_manifest_url {
                debug!(
                    video_id = %asset.video_id,
                    replaced = %manifest_url,
                    "Fresh capture replaces asset with the same video id"
                );
                Self::remove_hls_asset(tx, course_id, &manifest_url).await?;
            }
        }
        Self::remove_hls_asset(tx, course_id, &asset.source_manifest_url).await
    }

    async fn insert_hls_asset(
        tx: &mut Transaction<'_, Sqlite>,
        course_id: &str,
        asset: &HlsAsset,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO hls_assets (
                course_id, manifest_url, video_id, manifest_text, version_tag, downloaded_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(course_id)
        .bind(&asset.source_manifest_url)
        .bind(&asset.video_id)
        .bind(&asset.manifest_text)
        .bind(&asset.version)
        .bind(asset.downloaded_at.map(|t| t.timestamp_millis()))
        .execute(&mut **tx)
        .await?;

        for (name, bytes) in &asset.segments {
            sqlx::query(
                "INSERT INTO hls_segments (course_id, manifest_url, name, bytes) VALUES (?, ?, ?, ?)",
            )
            .bind(course_id)
            .bind(&asset.source_manifest_url)
            .bind(name)
            .bind(bytes)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn segment_names(&self, course_id: &str, manifest_url: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM hls_segments WHERE course_id = ? AND manifest_url = ? ORDER BY name",
        )
        .bind(course_id)
        .bind(manifest_url)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn index_from_row(&self, course_id: &str, row: HlsAssetRow) -> Result<HlsAssetIndex> {
        let names = self.segment_names(course_id, &row.manifest_url).await?;

        Ok(HlsAssetIndex {
            segment_names: names.into_iter().collect(),
            downloaded_at: row
                .downloaded_at
                .map(|ms| millis_to_datetime("hls_assets", ms))
                .transpose()?,
            source_manifest_url: row.manifest_url,
            video_id: row.video_id,
            manifest_text: row.manifest_text,
            version: row.version_tag,
        })
    }
}

fn millis_to_datetime(table: &str, ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| StoreError::Corrupt {
        table: table.to_string(),
        message: format!("timestamp out of range: {}", ms),
    })
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StoreError::InvalidInput {
            field: field.to_string(),
            message: "must not be empty".to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, FromRow)]
struct SnapshotRow {
    course_id: String,
    course_type: String,
    version: String,
    downloaded_at: i64,
    content: String,
    media_index: String,
}

impl TryFrom<SnapshotRow> for Snapshot {
    type Error = StoreError;

    fn try_from(row: SnapshotRow) -> Result<Self> {
        Ok(Snapshot {
            downloaded_at: millis_to_datetime("snapshots", row.downloaded_at)?,
            content: serde_json::from_str(&row.content)?,
            media_index: serde_json::from_str(&row.media_index)?,
            course_id: row.course_id,
            course_type: row.course_type,
            version: row.version,
        })
    }
}

#[derive(Debug, FromRow)]
struct HlsAssetRow {
    manifest_url: String,
    video_id: String,
    manifest_text: String,
    version_tag: Option<String>,
    downloaded_at: Option<i64>,
}

#[derive(Debug, FromRow)]
struct PageRow {
    course_id: String,
    path: String,
    body: String,
    content_type: String,
    cached_at: i64,
}

impl TryFrom<PageRow> for CachedPage {
    type Error = StoreError;

    fn try_from(row: PageRow) -> Result<Self> {
        Ok(CachedPage {
            cached_at: millis_to_datetime("cached_pages", row.cached_at)?,
            course_id: row.course_id,
            path: row.path,
            body: row.body,
            content_type: row.content_type,
        })
    }
}

const SNAPSHOT_COLUMNS: &str =
    "course_id, course_type, version, downloaded_at, content, media_index";

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    #[instrument(skip(self, snapshot, media), fields(course_id = %snapshot.course_id))]
    async fn put(&self, snapshot: &Snapshot, media: &SnapshotMedia) -> Result<()> {
        require_non_empty("course_id", &snapshot.course_id)?;
        require_non_empty("course_type", &snapshot.course_type)?;

        let mut video_ids = HashSet::new();
        for asset in &media.hls_assets {
            if !video_ids.insert(asset.video_id.as_str()) {
                return Err(StoreError::InvalidInput {
                    field: "video_id".to_string(),
                    message: format!("{} is captured more than once", asset.video_id),
                });
            }
        }

        let content = serde_json::to_string(&snapshot.content)?;
        let media_index = serde_json::to_string(&snapshot.media_index)?;
        let course_id = snapshot.course_id.as_str();

        let mut tx = self.pool.begin().await?;

        // Upsert rather than REPLACE: REPLACE would cascade-delete cached pages
        sqlx::query(
            r#"
            INSERT INTO snapshots (course_id, course_type, version, downloaded_at, content, media_index)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (course_id) DO UPDATE SET
                course_type = excluded.course_type,
                version = excluded.version,
                downloaded_at = excluded.downloaded_at,
                content = excluded.content,
                media_index = excluded.media_index
            "#,
        )
        .bind(course_id)
        .bind(&snapshot.course_type)
        .bind(&snapshot.version)
        .bind(snapshot.downloaded_at.timestamp_millis())
        .bind(&content)
        .bind(&media_index)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM media_blobs WHERE course_id = ?")
            .bind(course_id)
            .execute(&mut *tx)
            .await?;
        Self::put_blobs(&mut tx, course_id, MediaNamespace::Images, &media.images).await?;
        Self::put_blobs(&mut tx, course_id, MediaNamespace::Pdfs, &media.pdfs).await?;

        let existing: Vec<(String,)> =
            sqlx::query_as("SELECT manifest_url FROM hls_assets WHERE course_id = ?")
                .bind(course_id)
                .fetch_all(&mut *tx)
                .await?;

        let mut retained = 0usize;
        for (manifest_url,) in existing {
            if media.retained_hls.contains(&manifest_url) {
                retained += 1;
                continue;
            }
            Self::remove_hls_asset(&mut tx, course_id, &manifest_url).await?;
        }

        for asset in &media.hls_assets {
            // A fresh capture always wins over a retained one
            Self::displace_hls_asset(&mut tx, course_id, asset).await?;
            Self::insert_hls_asset(&mut tx, course_id, asset).await?;
        }

        tx.commit().await?;

        info!(
            course_type = %snapshot.course_type,
            version = %snapshot.version,
            blobs = media.blob_count(),
            hls_assets = media.hls_assets.len(),
            hls_retained = retained,
            "Snapshot stored"
        );
        Ok(())
    }

    async fn get_by_id(&self, course_id: &str) -> Result<Option<Snapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {} FROM snapshots WHERE course_id = ?",
            SNAPSHOT_COLUMNS
        ))
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Snapshot::try_from).transpose()
    }

    async fn get_by_type(&self, course_type: &str) -> Result<Option<Snapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {} FROM snapshots WHERE course_type = ? ORDER BY downloaded_at DESC LIMIT 1",
            SNAPSHOT_COLUMNS
        ))
        .bind(course_type)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Snapshot::try_from).transpose()
    }

    async fn course_id_for_type(&self, course_type: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT course_id FROM snapshots WHERE course_type = ? ORDER BY downloaded_at DESC LIMIT 1",
        )
        .bind(course_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id,)| id))
    }

    #[instrument(skip(self))]
    async fn delete(&self, course_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        for table in ["hls_segments", "hls_assets", "media_blobs", "cached_pages"] {
            sqlx::query(&format!("DELETE FROM {} WHERE course_id = ?", table))
                .bind(course_id)
                .execute(&mut *tx)
                .await?;
        }

        let result = sqlx::query("DELETE FROM snapshots WHERE course_id = ?")
            .bind(course_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let deleted = result.rows_affected() > 0;
        debug!(deleted, "Snapshot delete finished");
        Ok(deleted)
    }

    async fn size_estimate(&self) -> Result<u64> {
        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COALESCE(SUM(LENGTH(CAST(content AS BLOB)) + LENGTH(CAST(media_index AS BLOB))), 0) FROM snapshots)
              + (SELECT COALESCE(SUM(LENGTH(bytes)), 0) FROM media_blobs)
              + (SELECT COALESCE(SUM(LENGTH(CAST(manifest_text AS BLOB))), 0) FROM hls_assets)
              + (SELECT COALESCE(SUM(LENGTH(bytes)), 0) FROM hls_segments)
              + (SELECT COALESCE(SUM(LENGTH(CAST(body AS BLOB))), 0) FROM cached_pages)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(total.max(0) as u64)
    }

    async fn list_snapshots(&self) -> Result<Vec<SnapshotSummary>> {
        let rows: Vec<(String, String, String, i64)> = sqlx::query_as(
            "SELECT course_id, course_type, version, downloaded_at FROM snapshots ORDER BY downloaded_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(course_id, course_type, version, downloaded_at)| {
                Ok(SnapshotSummary {
                    course_id,
                    course_type,
                    version,
                    downloaded_at: millis_to_datetime("snapshots", downloaded_at)?,
                })
            })
            .collect()
    }

    async fn get_blob(
        &self,
        course_id: &str,
        namespace: MediaNamespace,
        url: &str,
    ) -> Result<Option<MediaBlob>> {
        let row: Option<(String, Vec<u8>)> = sqlx::query_as(
            "SELECT content_type, bytes FROM media_blobs WHERE course_id = ? AND namespace = ? AND url = ?",
        )
        .bind(course_id)
        .bind(namespace.as_str())
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(content_type, bytes)| MediaBlob {
            url: url.to_string(),
            content_type,
            bytes,
        }))
    }

    async fn hls_keys(&self, course_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT manifest_url FROM hls_assets WHERE course_id = ? ORDER BY manifest_url",
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(url,)| url).collect())
    }

    async fn hls_asset_index(
        &self,
        course_id: &str,
        manifest_url: &str,
    ) -> Result<Option<HlsAssetIndex>> {
        let row = sqlx::query_as::<_, HlsAssetRow>(
            r#"
            SELECT manifest_url, video_id, manifest_text, version_tag, downloaded_at
            FROM hls_assets
            WHERE course_id = ? AND manifest_url = ?
            "#,
        )
        .bind(course_id)
        .bind(manifest_url)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.index_from_row(course_id, row).await?)),
            None => Ok(None),
        }
    }

    async fn find_hls_by_video_id(
        &self,
        course_id: &str,
        video_id: &str,
    ) -> Result<Option<HlsAssetIndex>> {
        let row = sqlx::query_as::<_, HlsAssetRow>(
            r#"
            SELECT manifest_url, video_id, manifest_text, version_tag, downloaded_at
            FROM hls_assets
            WHERE course_id = ? AND video_id = ?
            "#,
        )
        .bind(course_id)
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.index_from_row(course_id, row).await?)),
            None => Ok(None),
        }
    }

    async fn get_hls_asset(
        &self,
        course_id: &str,
        manifest_url: &str,
    ) -> Result<Option<HlsAsset>> {
        let Some(index) = self.hls_asset_index(course_id, manifest_url).await? else {
            return Ok(None);
        };

        let rows: Vec<(String, Vec<u8>)> = sqlx::query_as(
            "SELECT name, bytes FROM hls_segments WHERE course_id = ? AND manifest_url = ?",
        )
        .bind(course_id)
        .bind(manifest_url)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(HlsAsset {
            source_manifest_url: index.source_manifest_url,
            video_id: index.video_id,
            manifest_text: index.manifest_text,
            segments: rows.into_iter().collect::<BTreeMap<_, _>>(),
            version: index.version,
            downloaded_at: index.downloaded_at,
        }))
    }

    async fn get_segment(
        &self,
        course_id: &str,
        manifest_url: &str,
        name: &str,
    ) -> Result<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as(
            "SELECT bytes FROM hls_segments WHERE course_id = ? AND manifest_url = ? AND name = ?",
        )
        .bind(course_id)
        .bind(manifest_url)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(bytes,)| bytes))
    }

    async fn put_page(&self, page: &CachedPage) -> Result<()> {
        require_non_empty("path", &page.path)?;

        sqlx::query(
            r#"
            INSERT INTO cached_pages (course_id, path, body, content_type, cached_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (course_id, path) DO UPDATE SET
                body = excluded.body,
                content_type = excluded.content_type,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(&page.course_id)
        .bind(&page.path)
        .bind(&page.body)
        .bind(&page.content_type)
        .bind(page.cached_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_page(&self, course_id: &str, path: &str) -> Result<Option<CachedPage>> {
        let row = sqlx::query_as::<_, PageRow>(
            r#"
            SELECT course_id, path, body, content_type, cached_at
            FROM cached_pages
            WHERE course_id = ? AND path = ?
            "#,
        )
        .bind(course_id)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CachedPage::try_from).transpose()
    }

    async fn list_pages(&self, course_id: &str) -> Result<Vec<CachedPage>> {
        let rows = sqlx::query_as::<_, PageRow>(
            r#"
            SELECT course_id, path, body, content_type, cached_at
            FROM cached_pages
            WHERE course_id = ?
            ORDER BY path
            "#,
        )
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CachedPage::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::{CourseContent, Day, MediaIndex, Step, StepKind};
    use chrono::Duration;

    const MANIFEST_URL: &str = "https://cdn.example/video/abc/hls/playlist.m3u8";

    async fn store() -> SqliteSnapshotStore {
        SqliteSnapshotStore::new(create_test_pool().await.unwrap())
    }

    fn snapshot(course_id: &str, course_type: &str, downloaded_at: DateTime<Utc>) -> Snapshot {
        let content = CourseContent {
            days: vec![Day {
                id: "day-1".to_string(),
                position: 1,
                title: "Welcome".to_string(),
                image_url: None,
                steps: vec![Step {
                    id: "step-1".to_string(),
                    position: 1,
                    title: "Intro video".to_string(),
                    kind: StepKind::Video,
                    description: None,
                    body: None,
                    video_url: Some(MANIFEST_URL.to_string()),
                    image_url: Some("https://cdn.example/img/cover.png".to_string()),
                    pdf_url: None,
                    duration: Some(90),
                }],
            }],
        };

        Snapshot {
            course_id: course_id.to_string(),
            course_type: course_type.to_string(),
            version: "v1".to_string(),
            downloaded_at,
            media_index: MediaIndex::from_content(&content),
            content,
        }
    }

    fn hls_asset(segments: &[&str]) -> HlsAsset {
        HlsAsset {
            source_manifest_url: MANIFEST_URL.to_string(),
            video_id: "abc".to_string(),
            manifest_text: "#EXTM3U\n#EXTINF:4.0,\nseg-000.ts\n".to_string(),
            segments: segments
                .iter()
                .map(|name| (name.to_string(), vec![0u8; 16]))
                .collect(),
            version: Some("3".to_string()),
            downloaded_at: Some(Utc::now()),
        }
    }

    fn media() -> SnapshotMedia {
        SnapshotMedia {
            images: vec![MediaBlob {
                url: "https://cdn.example/img/cover.png".to_string(),
                content_type: "image/png".to_string(),
                bytes: vec![1, 2, 3],
            }],
            pdfs: vec![],
            hls_assets: vec![hls_asset(&["seg-000.ts", "seg-001.ts"])],
            retained_hls: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get_by_id() {
        let store = store().await;
        let snap = snapshot("course-1", "onboarding", Utc::now());

        store.put(&snap, &media()).await.unwrap();

        let loaded = store.get_by_id("course-1").await.unwrap().unwrap();
        assert_eq!(loaded.course_type, "onboarding");
        assert_eq!(loaded.content, snap.content);
        assert_eq!(loaded.media_index, snap.media_index);
        assert_eq!(
            loaded.downloaded_at.timestamp_millis(),
            snap.downloaded_at.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_missing_lookups_are_none() {
        let store = store().await;

        assert!(store.get_by_id("nope").await.unwrap().is_none());
        assert!(store.get_by_type("nope").await.unwrap().is_none());
        assert!(store
            .get_blob("nope", MediaNamespace::Images, "x")
            .await
            .unwrap()
            .is_none());
        assert!(store.hls_asset_index("nope", MANIFEST_URL).await.unwrap().is_none());
        assert!(!store.delete("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_by_type_prefers_latest_download() {
        let store = store().await;
        let now = Utc::now();

        store
            .put(&snapshot("old", "onboarding", now - Duration::days(1)), &SnapshotMedia::default())
            .await
            .unwrap();
        store
            .put(&snapshot("new", "onboarding", now), &SnapshotMedia::default())
            .await
            .unwrap();

        let current = store.get_by_type("onboarding").await.unwrap().unwrap();
        assert_eq!(current.course_id, "new");
        assert_eq!(
            store.course_id_for_type("onboarding").await.unwrap().as_deref(),
            Some("new")
        );
    }

    #[tokio::test]
    async fn test_media_lookups() {
        let store = store().await;
        store
            .put(&snapshot("course-1", "onboarding", Utc::now()), &media())
            .await
            .unwrap();

        let blob = store
            .get_blob("course-1", MediaNamespace::Images, "https://cdn.example/img/cover.png")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(blob.content_type, "image/png");
        assert!(store
            .get_blob("course-1", MediaNamespace::Pdfs, "https://cdn.example/img/cover.png")
            .await
            .unwrap()
            .is_none());

        assert_eq!(store.hls_keys("course-1").await.unwrap(), vec![MANIFEST_URL.to_string()]);

        let index = store.find_hls_by_video_id("course-1", "abc").await.unwrap().unwrap();
        assert_eq!(index.segment_names.len(), 2);
        assert!(store.find_hls_by_video_id("course-1", "ABC").await.unwrap().is_none());

        let asset = store.get_hls_asset("course-1", MANIFEST_URL).await.unwrap().unwrap();
        assert_eq!(asset.segments.len(), 2);
        assert_eq!(asset.version.as_deref(), Some("3"));

        let segment = store
            .get_segment("course-1", MANIFEST_URL, "seg-001.ts")
            .await
            .unwrap();
        assert_eq!(segment, Some(vec![0u8; 16]));
    }

    #[tokio::test]
    async fn test_overwrite_replaces_media_but_keeps_retained_hls() {
        let store = store().await;
        let snap = snapshot("course-1", "onboarding", Utc::now());
        store.put(&snap, &media()).await.unwrap();

        // Re-download where the video capture failed and the image is gone
        let mut retained = SnapshotMedia::default();
        retained.retained_hls.insert(MANIFEST_URL.to_string());
        store.put(&snap, &retained).await.unwrap();

        assert!(store
            .get_blob("course-1", MediaNamespace::Images, "https://cdn.example/img/cover.png")
            .await
            .unwrap()
            .is_none());
        let asset = store.get_hls_asset("course-1", MANIFEST_URL).await.unwrap().unwrap();
        assert_eq!(asset.segments.len(), 2);

        // Without retention the stale asset goes away
        store.put(&snap, &SnapshotMedia::default()).await.unwrap();
        assert!(store.hls_keys("course-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_everything() {
        let store = store().await;
        store
            .put(&snapshot("course-1", "onboarding", Utc::now()), &media())
            .await
            .unwrap();
        store
            .put_page(&CachedPage {
                course_id: "course-1".to_string(),
                path: "/day/1".to_string(),
                body: "<html></html>".to_string(),
                content_type: "text/html".to_string(),
                cached_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(store.size_estimate().await.unwrap() > 0);
        assert!(store.delete("course-1").await.unwrap());

        assert!(store.get_by_id("course-1").await.unwrap().is_none());
        assert!(store.hls_keys("course-1").await.unwrap().is_empty());
        assert!(store.list_pages("course-1").await.unwrap().is_empty());
        assert_eq!(store.size_estimate().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_page_upsert() {
        let store = store().await;
        store
            .put(&snapshot("course-1", "onboarding", Utc::now()), &SnapshotMedia::default())
            .await
            .unwrap();

        let mut page = CachedPage {
            course_id: "course-1".to_string(),
            path: "/day/1".to_string(),
            body: "first".to_string(),
            content_type: "text/html".to_string(),
            cached_at: Utc::now(),
        };
        store.put_page(&page).await.unwrap();
        page.body = "second".to_string();
        store.put_page(&page).await.unwrap();

        let pages = store.list_pages("course-1").await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].body, "second");

        // Pages survive a snapshot overwrite
        store
            .put(&snapshot("course-1", "onboarding", Utc::now()), &SnapshotMedia::default())
            .await
            .unwrap();
        assert!(store.get_page("course-1", "/day/1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_put_rejects_duplicate_video_ids() {
        let store = store().await;
        let mut second = hls_asset(&["seg-000.ts"]);
        second.source_manifest_url = "https://cdn.example/video/abc.mp4".to_string();

        let mut media = media();
        media.hls_assets.push(second);

        let err = store
            .put(&snapshot("course-1", "onboarding", Utc::now()), &media)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput { ref field, .. } if field == "video_id"));
        assert!(store.get_by_id("course-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fresh_capture_displaces_retained_asset_with_same_video_id() {
        let store = store().await;
        let snap = snapshot("course-1", "onboarding", Utc::now());
        store.put(&snap, &media()).await.unwrap();

        let mut moved = hls_asset(&["seg-000.ts"]);
        moved.source_manifest_url = "https://cdn.example/video/abc/v2.m3u8".to_string();
        let mut next = SnapshotMedia {
            hls_assets: vec![moved],
            ..SnapshotMedia::default()
        };
        next.retained_hls.insert(MANIFEST_URL.to_string());
        store.put(&snap, &next).await.unwrap();

        assert_eq!(
            store.hls_keys("course-1").await.unwrap(),
            vec!["https://cdn.example/video/abc/v2.m3u8".to_string()]
        );
        let index = store.find_hls_by_video_id("course-1", "abc").await.unwrap().unwrap();
        assert_eq!(index.segment_names.len(), 1);
        assert!(index.segment_names.contains("seg-000.ts"));
    }

    #[tokio::test]
    async fn test_put_rejects_empty_ids() {
        let store = store().await;
        let snap = snapshot("", "onboarding", Utc::now());

        let err = store.put(&snap, &SnapshotMedia::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput { .. }));
    }
}

//! # Sync Queue Repository
//!
//! Durable storage for pending actions in the `sync_actions` table.
//!
//! Rows are ordered by an autoincrement sequence, so enqueue order survives a
//! restart even when two actions share a timestamp. The table is created by
//! the `core_store` migrations, so the pool handed to
//! [`SqliteSyncQueueRepository::new`] must come from `core_store::create_pool`
//! (or `create_test_pool`).

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::warn;

use crate::action::{SyncAction, SyncActionKind, SyncPayload};
use crate::error::{Result, SyncError};

#[async_trait]
pub trait SyncQueueRepository: Send + Sync {
    /// Append an action
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn insert(&self, action: &SyncAction) -> Result<()>;

    /// All pending actions in enqueue order
    ///
    /// Rows that no longer decode are deleted and left out of the result.
    async fn load_all(&self) -> Result<Vec<SyncAction>>;

    /// Persist a new retry count
    async fn update_retry_count(&self, id: &str, retry_count: u32) -> Result<()>;

    /// Remove one action; `false` when it was already gone
    async fn remove(&self, id: &str) -> Result<bool>;

    /// Remove every action enqueued before `cutoff`, returning their ids
    async fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>>;

    async fn count(&self) -> Result<usize>;
}

/// `SyncQueueRepository` over the `sync_actions` table of a `core_store` pool
pub struct SqliteSyncQueueRepository {
    pool: SqlitePool,
}

impl SqliteSyncQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct SyncActionRow {
    id: String,
    kind: String,
    payload: String,
    enqueued_at: i64,
    retry_count: i64,
}

impl TryFrom<SyncActionRow> for SyncAction {
    type Error = SyncError;

    fn try_from(row: SyncActionRow) -> Result<Self> {
        let kind: SyncActionKind = row.kind.parse()?;
        let payload: SyncPayload = serde_json::from_str(&row.payload)?;
        if payload.kind() != kind {
            return Err(SyncError::Database(format!(
                "Action {} stored as {} but payload is {}",
                row.id,
                kind,
                payload.kind()
            )));
        }

        let enqueued_at = Utc
            .timestamp_millis_opt(row.enqueued_at)
            .single()
            .ok_or_else(|| {
                SyncError::Database(format!("Invalid enqueued_at: {}", row.enqueued_at))
            })?;

        Ok(SyncAction {
            id: row.id,
            payload,
            enqueued_at,
            retry_count: u32::try_from(row.retry_count).unwrap_or(0),
        })
    }
}

#[async_trait]
impl SyncQueueRepository for SqliteSyncQueueRepository {
    async fn insert(&self, action: &SyncAction) -> Result<()> {
        let payload = serde_json::to_string(&action.payload)?;

        sqlx::query(
            r#"
            INSERT INTO sync_actions (id, kind, payload, enqueued_at, retry_count)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&action.id)
        .bind(action.kind().as_str())
        .bind(payload)
        .bind(action.enqueued_at.timestamp_millis())
        .bind(i64::from(action.retry_count))
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<SyncAction>> {
        let rows = sqlx::query_as::<_, SyncActionRow>(
            r#"
            SELECT id, kind, payload, enqueued_at, retry_count
            FROM sync_actions
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        let mut actions = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            match SyncAction::try_from(row) {
                Ok(action) => actions.push(action),
                Err(e) => {
                    warn!(action_id = %id, error = %e, "Discarding undecodable sync action");
                    self.remove(&id).await?;
                }
            }
        }

        Ok(actions)
    }

    async fn update_retry_count(&self, id: &str, retry_count: u32) -> Result<()> {
        sqlx::query("UPDATE sync_actions SET retry_count = ? WHERE id = ?")
            .bind(i64::from(retry_count))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sync_actions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM sync_actions WHERE enqueued_at < ? ORDER BY seq")
                .bind(cutoff.timestamp_millis())
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| SyncError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM sync_actions WHERE enqueued_at < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&mut *tx)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(ids)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_actions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(count as usize)
    }
}

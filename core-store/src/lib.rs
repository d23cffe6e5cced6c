//! # Offline Store
//!
//! SQLite-backed persistence for the offline course subsystem: course
//! snapshots keyed by course id (with a secondary index by course type),
//! image/PDF blobs, captured HLS assets, cached pages, and the table the sync
//! queue persists into.
//!
//! ```rust,ignore
//! use core_store::{create_pool, DatabaseConfig, SnapshotStore, SqliteSnapshotStore};
//!
//! let pool = create_pool(DatabaseConfig::new("offline.db")).await?;
//! let store = SqliteSnapshotStore::new(pool);
//! let current = store.get_by_type("onboarding").await?;
//! ```

pub mod db;
pub mod error;
pub mod models;
pub mod store;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{Result, StoreError};
pub use models::{
    CachedPage, CourseContent, Day, HlsAsset, HlsAssetIndex, MediaBlob, MediaIndex,
    MediaNamespace, Snapshot, SnapshotMedia, SnapshotSummary, Step, StepKind,
};
pub use store::{SnapshotStore, SqliteSnapshotStore};

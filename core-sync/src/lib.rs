//! # Offline Sync
//!
//! Delivery of user actions taken while the remote API is unreachable.
//!
//! ## Components
//!
//! - **Connectivity Monitor** (`connectivity`): tracked online state fed by
//!   platform events and request outcomes, plus the HTTP decorator that
//!   reports those outcomes
//! - **Actions** (`action`): the closed set of queued action kinds
//! - **Dispatcher** (`dispatcher`): one remote call per kind
//! - **Repository** (`repository`): SQLite persistence of pending actions
//! - **Sync Queue** (`queue`): cooldown-gated draining with bounded retries
//!   and a retention sweep
//!
//! The queue observes the monitor through a `watch::Receiver<bool>` and
//! drains when the state flips back to online.

pub mod action;
pub mod connectivity;
pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod repository;

pub use action::{
    CacheInvalidation, CommentPost, FavoriteToggle, ProfileUpdate, ProgressCompletion, Rating,
    StepPlayback, StepStatus, StepStatusChange, SyncAction, SyncActionKind, SyncPayload,
};
pub use connectivity::{ConnectivityMonitor, MonitoredHttpClient};
pub use dispatcher::{dispatch, HttpSyncDispatcher, SyncDispatcher};
pub use error::{Result, SyncError};
pub use queue::{DrainOutcome, DrainReport, DrainSkip, SubmitOutcome, SyncQueue};
pub use repository::{SqliteSyncQueueRepository, SyncQueueRepository};

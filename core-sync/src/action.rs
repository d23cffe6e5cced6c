//! Queued user actions.
//!
//! The set of kinds is closed: every payload is a variant of [`SyncPayload`],
//! so dispatch is an exhaustive match and a new kind cannot be queued without
//! a dispatcher for it.
//!
//! Payloads describe the desired end state wherever the remote API allows
//! it. Delivering the same action twice (a crash between remote success and
//! queue removal) converges on the same remote state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::SyncError;

/// Mark a step as completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressCompletion {
    pub course_type: String,
    pub day_id: Option<String>,
    pub step_id: String,
    pub completed_at: DateTime<Utc>,
}

/// Partial profile update; fields are overwritten, never merged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// A comment on a step. `client_id` lets the remote side drop duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPost {
    pub client_id: String,
    pub step_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl CommentPost {
    pub fn new(step_id: impl Into<String>, body: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            client_id: Uuid::new_v4().to_string(),
            step_id: step_id.into(),
            body: body.into(),
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub course_type: String,
    pub step_id: String,
    pub score: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStatusChange {
    pub course_type: String,
    pub step_id: String,
    pub status: StepStatus,
}

/// Playback position of a video step, shared by pause and resume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepPlayback {
    pub course_type: String,
    pub step_id: String,
    pub position_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInvalidation {
    pub course_type: String,
}

/// Carries the desired state rather than a flip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteToggle {
    pub step_id: String,
    pub favorite: bool,
}

/// Payload of a queued action, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SyncPayload {
    ProgressCompletion(ProgressCompletion),
    ProfileUpdate(ProfileUpdate),
    Comment(CommentPost),
    Rating(Rating),
    StepStatusChange(StepStatusChange),
    StepPause(StepPlayback),
    StepResume(StepPlayback),
    CacheInvalidation(CacheInvalidation),
    FavoriteToggle(FavoriteToggle),
}

impl SyncPayload {
    pub fn kind(&self) -> SyncActionKind {
        match self {
            SyncPayload::ProgressCompletion(_) => SyncActionKind::ProgressCompletion,
            SyncPayload::ProfileUpdate(_) => SyncActionKind::ProfileUpdate,
            SyncPayload::Comment(_) => SyncActionKind::Comment,
            SyncPayload::Rating(_) => SyncActionKind::Rating,
            SyncPayload::StepStatusChange(_) => SyncActionKind::StepStatusChange,
            SyncPayload::StepPause(_) => SyncActionKind::StepPause,
            SyncPayload::StepResume(_) => SyncActionKind::StepResume,
            SyncPayload::CacheInvalidation(_) => SyncActionKind::CacheInvalidation,
            SyncPayload::FavoriteToggle(_) => SyncActionKind::FavoriteToggle,
        }
    }
}

/// Discriminant of [`SyncPayload`], stored alongside the payload for
/// diagnostics and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncActionKind {
    ProgressCompletion,
    ProfileUpdate,
    Comment,
    Rating,
    StepStatusChange,
    StepPause,
    StepResume,
    CacheInvalidation,
    FavoriteToggle,
}

impl SyncActionKind {
    pub const ALL: [SyncActionKind; 9] = [
        SyncActionKind::ProgressCompletion,
        SyncActionKind::ProfileUpdate,
        SyncActionKind::Comment,
        SyncActionKind::Rating,
        SyncActionKind::StepStatusChange,
        SyncActionKind::StepPause,
        SyncActionKind::StepResume,
        SyncActionKind::CacheInvalidation,
        SyncActionKind::FavoriteToggle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncActionKind::ProgressCompletion => "progress_completion",
            SyncActionKind::ProfileUpdate => "profile_update",
            SyncActionKind::Comment => "comment",
            SyncActionKind::Rating => "rating",
            SyncActionKind::StepStatusChange => "step_status_change",
            SyncActionKind::StepPause => "step_pause",
            SyncActionKind::StepResume => "step_resume",
            SyncActionKind::CacheInvalidation => "cache_invalidation",
            SyncActionKind::FavoriteToggle => "favorite_toggle",
        }
    }
}

impl fmt::Display for SyncActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncActionKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SyncError::InvalidKind(s.to_string()))
    }
}

/// One pending remote mutation
#[derive(Debug, Clone, PartialEq)]
pub struct SyncAction {
    pub id: String,
    pub payload: SyncPayload,
    pub enqueued_at: DateTime<Utc>,
    /// Failed dispatch attempts so far; only a failed dispatch increments it
    pub retry_count: u32,
}

impl SyncAction {
    pub fn new(payload: SyncPayload, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            payload,
            enqueued_at,
            retry_count: 0,
        }
    }

    pub fn kind(&self) -> SyncActionKind {
        self.payload.kind()
    }
}

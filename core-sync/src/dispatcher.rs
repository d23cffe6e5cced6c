//! Per-kind delivery of queued actions to the remote API.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::action::{
    CacheInvalidation, CommentPost, FavoriteToggle, ProfileUpdate, ProgressCompletion, Rating,
    StepPlayback, StepStatusChange, SyncPayload,
};
use crate::error::Result;

/// One remote call per action kind.
///
/// Implementations must be safe to call more than once with the same payload.
/// Any error is treated as retryable by the queue.
#[async_trait]
pub trait SyncDispatcher: Send + Sync {
    async fn progress_completion(&self, payload: &ProgressCompletion) -> Result<()>;

    async fn profile_update(&self, payload: &ProfileUpdate) -> Result<()>;

    async fn comment(&self, payload: &CommentPost) -> Result<()>;

    async fn rating(&self, payload: &Rating) -> Result<()>;

    async fn step_status_change(&self, payload: &StepStatusChange) -> Result<()>;

    async fn step_pause(&self, payload: &StepPlayback) -> Result<()>;

    async fn step_resume(&self, payload: &StepPlayback) -> Result<()>;

    async fn cache_invalidation(&self, payload: &CacheInvalidation) -> Result<()>;

    async fn favorite_toggle(&self, payload: &FavoriteToggle) -> Result<()>;
}

/// Route a payload to the dispatcher method for its kind
pub async fn dispatch(dispatcher: &dyn SyncDispatcher, payload: &SyncPayload) -> Result<()> {
    match payload {
        SyncPayload::ProgressCompletion(p) => dispatcher.progress_completion(p).await,
        SyncPayload::ProfileUpdate(p) => dispatcher.profile_update(p).await,
        SyncPayload::Comment(p) => dispatcher.comment(p).await,
        SyncPayload::Rating(p) => dispatcher.rating(p).await,
        SyncPayload::StepStatusChange(p) => dispatcher.step_status_change(p).await,
        SyncPayload::StepPause(p) => dispatcher.step_pause(p).await,
        SyncPayload::StepResume(p) => dispatcher.step_resume(p).await,
        SyncPayload::CacheInvalidation(p) => dispatcher.cache_invalidation(p).await,
        SyncPayload::FavoriteToggle(p) => dispatcher.favorite_toggle(p).await,
    }
}

/// [`SyncDispatcher`] over the platform HTTP client.
///
/// Keyed writes use `PUT` so a repeated delivery overwrites instead of
/// appending.
pub struct HttpSyncDispatcher {
    http: Arc<dyn HttpClient>,
    base_url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpSyncDispatcher {
    pub fn new(http: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn send<T: Serialize + Sync>(&self, method: HttpMethod, path: &str, body: &T) -> Result<()> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = HttpRequest::new(method, url.as_str())
            .timeout(self.timeout)
            .json(body)?;
        if let Some(token) = &self.auth_token {
            request = request.bearer_token(token.as_str());
        }

        let response = self.http.execute(request).await?.error_for_status()?;
        debug!(url = %url, status = response.status, "Sync call delivered");
        Ok(())
    }
}

#[async_trait]
impl SyncDispatcher for HttpSyncDispatcher {
    async fn progress_completion(&self, payload: &ProgressCompletion) -> Result<()> {
        let path = format!("progress/{}/steps/{}", payload.course_type, payload.step_id);
        self.send(HttpMethod::Put, &path, payload).await
    }

    async fn profile_update(&self, payload: &ProfileUpdate) -> Result<()> {
        self.send(HttpMethod::Patch, "profile", &payload.fields).await
    }

    async fn comment(&self, payload: &CommentPost) -> Result<()> {
        let path = format!("comments/{}", payload.client_id);
        self.send(HttpMethod::Put, &path, payload).await
    }

    async fn rating(&self, payload: &Rating) -> Result<()> {
        let path = format!("ratings/{}/steps/{}", payload.course_type, payload.step_id);
        self.send(HttpMethod::Put, &path, payload).await
    }

    async fn step_status_change(&self, payload: &StepStatusChange) -> Result<()> {
        let path = format!("steps/{}/status", payload.step_id);
        self.send(HttpMethod::Put, &path, payload).await
    }

    async fn step_pause(&self, payload: &StepPlayback) -> Result<()> {
        let path = format!("steps/{}/pause", payload.step_id);
        self.send(HttpMethod::Put, &path, payload).await
    }

    async fn step_resume(&self, payload: &StepPlayback) -> Result<()> {
        let path = format!("steps/{}/resume", payload.step_id);
        self.send(HttpMethod::Put, &path, payload).await
    }

    async fn cache_invalidation(&self, payload: &CacheInvalidation) -> Result<()> {
        self.send(HttpMethod::Post, "cache/invalidate", payload).await
    }

    async fn favorite_toggle(&self, payload: &FavoriteToggle) -> Result<()> {
        let path = format!("favorites/{}", payload.step_id);
        self.send(HttpMethod::Put, &path, payload).await
    }
}

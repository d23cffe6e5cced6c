//! Remote content and media the downloader reads from.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest};
use core_store::CourseContent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{DownloadError, Result};

/// Course as returned by the content API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCourse {
    pub course_id: String,
    /// Opaque token that grows with every content revision
    pub version: String,
    #[serde(flatten)]
    pub content: CourseContent,
}

/// Raw bytes of one fetched resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FetchedMedia {
    pub fn into_text(self) -> Result<String> {
        String::from_utf8(self.bytes)
            .map_err(|e| DownloadError::InvalidContent(format!("not UTF-8 text: {}", e)))
    }
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Full day/step tree of the current course of a type
    async fn fetch_course(&self, course_type: &str) -> Result<RemoteCourse>;

    /// Bytes of an image, PDF, playlist or segment, by absolute URL
    async fn fetch_media(&self, url: &str) -> Result<FetchedMedia>;

    /// A rendered supporting page of a course
    async fn fetch_page(&self, course_type: &str, path: &str) -> Result<FetchedMedia>;
}

/// [`ContentSource`] over the platform HTTP client
pub struct HttpContentSource {
    http: Arc<dyn HttpClient>,
    base_url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpContentSource {
    pub fn new(http: Arc<dyn HttpClient>, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
            timeout,
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    async fn get(&self, url: &str, authenticated: bool) -> Result<FetchedMedia> {
        let mut request = HttpRequest::get(url).timeout(self.timeout);
        if authenticated {
            if let Some(token) = &self.auth_token {
                request = request.bearer_token(token.as_str());
            }
        }

        let response = self.http.execute(request).await?.error_for_status()?;
        let content_type = response
            .header("Content-Type")
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| guess_content_type(url).to_string());

        debug!(url, bytes = response.body.len(), "Fetched");
        Ok(FetchedMedia {
            content_type,
            bytes: response.body.to_vec(),
        })
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn fetch_course(&self, course_type: &str) -> Result<RemoteCourse> {
        let url = format!("{}/courses/{}/content", self.base_url, course_type);
        let fetched = self.get(&url, true).await?;

        let text = fetched.into_text()?;
        let course: RemoteCourse = serde_json::from_str(&text)
            .map_err(|e| DownloadError::InvalidContent(e.to_string()))?;
        Ok(course)
    }

    async fn fetch_media(&self, url: &str) -> Result<FetchedMedia> {
        // Media URLs point at storage hosts that carry their own signatures
        self.get(url, false).await
    }

    async fn fetch_page(&self, course_type: &str, path: &str) -> Result<FetchedMedia> {
        let url = format!(
            "{}/courses/{}/pages/{}",
            self.base_url,
            course_type,
            path.trim_start_matches('/')
        );
        self.get(&url, true).await
    }
}

/// Content type from the file extension, for servers that omit the header
pub fn guess_content_type(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let extension = path
        .rsplit('/')
        .next()
        .and_then(|file| file.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("avif") => "image/avif",
        Some("pdf") => "application/pdf",
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("ts") => "video/mp2t",
        Some("m4s") | Some("mp4") => "video/mp4",
        Some("html") | Some("htm") => "text/html",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("https://cdn.example/a/b.JPG?x=1"), "image/jpeg");
        assert_eq!(guess_content_type("https://cdn.example/doc.pdf#page=2"), "application/pdf");
        assert_eq!(guess_content_type("seg-001.ts"), "video/mp2t");
        assert_eq!(guess_content_type("https://cdn.example/blob"), "application/octet-stream");
    }

    #[test]
    fn test_remote_course_shape() {
        let json = r#"{
            "courseId": "c-1",
            "version": "17",
            "days": [{
                "id": "d1", "position": 1, "title": "Day 1",
                "steps": [{"id": "s1", "position": 1, "title": "Intro", "kind": "text"}]
            }]
        }"#;

        let course: RemoteCourse = serde_json::from_str(json).unwrap();
        assert_eq!(course.course_id, "c-1");
        assert_eq!(course.content.step_count(), 1);
    }
}

use bridge_traits::BridgeError;
use core_media::MediaError;
use core_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Course content for '{course_type}' is unavailable: {message}")]
    ContentUnavailable { course_type: String, message: String },

    #[error("Invalid course content: {0}")]
    InvalidContent(String),

    #[error("No snapshot stored for course type '{0}'")]
    NotDownloaded(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

pub type Result<T> = std::result::Result<T, DownloadError>;

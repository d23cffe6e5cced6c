use core_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Invalid virtual path: {0}")]
    InvalidVirtualPath(String),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),
}

pub type Result<T> = std::result::Result<T, MediaError>;

//! # Course Snapshot Downloader
//!
//! Fetches a course's content tree and every media item it references
//! (images, PDFs and HLS video) and writes them to the offline store as one
//! snapshot.
//!
//! ```rust,ignore
//! use core_download::{CourseDownloader, HttpContentSource};
//!
//! let report = downloader.download("onboarding").await?;
//! for failure in &report.failures {
//!     println!("{} could not be saved: {}", failure.url, failure.reason);
//! }
//! ```

pub mod capture;
pub mod downloader;
pub mod error;
pub mod source;

pub use downloader::{CourseDownloader, DownloadReport, MediaFailure, PageCaptureReport};
pub use error::{DownloadError, Result};
pub use source::{ContentSource, FetchedMedia, HttpContentSource, RemoteCourse};

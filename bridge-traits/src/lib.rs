//! # Host Bridge Traits
//!
//! What the offline course core needs from its host, as traits:
//!
//! - [`HttpClient`](http::HttpClient) for the course API and media hosts
//! - [`NetworkMonitor`](network::NetworkMonitor) for the platform's
//!   online/offline notifications
//! - [`Clock`](time::Clock) so cooldowns and retention windows can be tested
//!   without waiting
//!
//! ## Errors
//!
//! Everything returns [`BridgeError`]. Implementations must report failures
//! that never reached a server as `BridgeError::Transport` and non-success
//! statuses as `BridgeError::Status`: the connectivity monitor treats only
//! the former as a hint that the device may be offline.
//!
//! All traits are `Send + Sync`; handles are shared across tasks as
//! `Arc<dyn Trait>`.

pub mod error;
pub mod http;
pub mod network;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use time::{Clock, ManualClock, SystemClock};

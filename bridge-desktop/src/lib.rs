//! # Desktop Bridge Implementations
//!
//! Bridge traits for desktop hosts (macOS, Windows, Linux):
//! - [`ReqwestHttpClient`]: `HttpClient` over `reqwest` with rustls and retry
//! - [`HostNetworkMonitor`]: `NetworkMonitor` fed by the shell's own
//!   online/offline notifications
//!
//! ```ignore
//! use bridge_desktop::{HostNetworkMonitor, ReqwestHttpClient};
//! use bridge_traits::network::NetworkStatus;
//!
//! let http = ReqwestHttpClient::new()?;
//! let network = HostNetworkMonitor::new(NetworkStatus::Connected);
//!
//! // From the shell's offline callback
//! network.set_status(NetworkStatus::Disconnected);
//! ```

mod http;
mod network;

pub use http::ReqwestHttpClient;
pub use network::HostNetworkMonitor;

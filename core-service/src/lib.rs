//! Offline core façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP client,
//! network monitor, clock) into the offline course subsystem and hands the
//! host a single [`OfflineContext`]. Desktop apps typically enable the
//! `desktop-shims` feature (which depends on `bridge-desktop`) and build
//! their dependencies with [`CoreDependencies::desktop`].
//!
//! ```rust,ignore
//! use core_runtime::config::OfflineConfig;
//! use core_service::{CoreDependencies, OfflineContext};
//!
//! let config = OfflineConfig::builder()
//!     .database_path("/data/offline.db")
//!     .api_base_url("https://api.example.com")
//!     .build()?;
//! let (deps, network) = CoreDependencies::desktop()?;
//! let context = OfflineContext::start(config, deps).await?;
//!
//! // Host shell forwards OS notifications
//! network.set_status(bridge_traits::network::NetworkStatus::Disconnected);
//! ```

pub mod context;
pub mod error;

pub use context::OfflineContext;
pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{
    http::HttpClient,
    network::NetworkMonitor,
    time::{Clock, SystemClock},
};

/// Aggregated handle to all bridge dependencies the core requires.
#[derive(Clone)]
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub network_monitor: Arc<dyn NetworkMonitor>,
    pub clock: Arc<dyn Clock>,
    /// Bearer token for the content and sync APIs
    pub auth_token: Option<String>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        network_monitor: Arc<dyn NetworkMonitor>,
    ) -> Self {
        Self {
            http_client,
            network_monitor,
            clock: Arc::new(SystemClock),
            auth_token: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

#[cfg(feature = "desktop-shims")]
impl CoreDependencies {
    /// Desktop bundle over `reqwest` and a host-fed network monitor.
    ///
    /// The returned [`bridge_desktop::HostNetworkMonitor`] is the handle the
    /// host shell forwards OS online/offline notifications through.
    pub fn desktop() -> Result<(Self, bridge_desktop::HostNetworkMonitor)> {
        let http = bridge_desktop::ReqwestHttpClient::new()
            .map_err(|err| CoreError::InitializationFailed(err.to_string()))?;
        let network = bridge_desktop::HostNetworkMonitor::default();

        Ok((Self::new(Arc::new(http), Arc::new(network.clone())), network))
    }
}

//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus},
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Network monitor driven by the host shell.
///
/// Desktop shells (Tauri, Electron-style webviews, native toolkits) already
/// receive OS online/offline notifications; they forward them through
/// [`HostNetworkMonitor::set_status`]. Subscribers are woken only on change.
#[derive(Clone)]
pub struct HostNetworkMonitor {
    sender: Arc<watch::Sender<NetworkInfo>>,
}

impl HostNetworkMonitor {
    /// Create a new monitor seeded with the status known at startup
    pub fn new(initial: NetworkStatus) -> Self {
        let (sender, _) = watch::channel(NetworkInfo::with_status(initial));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Record a platform notification
    pub fn set_status(&self, status: NetworkStatus) {
        let changed = self.sender.send_if_modified(|info| {
            if info.status == status {
                false
            } else {
                *info = NetworkInfo::with_status(status);
                true
            }
        });

        if changed {
            debug!(status = ?status, "Host network status changed");
        }
    }

    pub fn current_status(&self) -> NetworkStatus {
        self.sender.borrow().status
    }
}

impl Default for HostNetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkStatus::Indeterminate)
    }
}

#[async_trait]
impl NetworkMonitor for HostNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        Ok(self.sender.borrow().clone())
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        let mut receiver = self.sender.subscribe();
        // Only deliver transitions that happen after subscribing
        receiver.mark_unchanged();
        Ok(Box::new(HostNetworkChangeStream { receiver }))
    }
}

/// Change stream backed by the monitor's watch channel
struct HostNetworkChangeStream {
    receiver: watch::Receiver<NetworkInfo>,
}

#[async_trait]
impl NetworkChangeStream for HostNetworkChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        self.receiver.changed().await.ok()?;
        let info = self.receiver.borrow_and_update().clone();
        Some(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_status() {
        let monitor = HostNetworkMonitor::new(NetworkStatus::Connected);
        let info = monitor.get_network_info().await.unwrap();

        assert_eq!(info.status, NetworkStatus::Connected);
        assert!(monitor.is_connected().await);
        assert!(!monitor.reports_disconnected().await);
    }

    #[tokio::test]
    async fn test_change_stream_emits_transitions() {
        let monitor = HostNetworkMonitor::new(NetworkStatus::Connected);
        let mut changes = monitor.subscribe_changes().await.unwrap();

        monitor.set_status(NetworkStatus::Disconnected);
        let info = changes.next().await.unwrap();
        assert_eq!(info.status, NetworkStatus::Disconnected);

        monitor.set_status(NetworkStatus::Connected);
        let info = changes.next().await.unwrap();
        assert_eq!(info.status, NetworkStatus::Connected);
    }

    #[tokio::test]
    async fn test_repeated_status_is_not_a_change() {
        let monitor = HostNetworkMonitor::new(NetworkStatus::Connected);
        let mut changes = monitor.subscribe_changes().await.unwrap();

        monitor.set_status(NetworkStatus::Connected);
        monitor.set_status(NetworkStatus::Disconnected);

        let info = changes.next().await.unwrap();
        assert_eq!(info.status, NetworkStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_stream_closes_with_monitor() {
        let monitor = HostNetworkMonitor::new(NetworkStatus::Connected);
        let mut changes = monitor.subscribe_changes().await.unwrap();
        drop(monitor);

        assert!(changes.next().await.is_none());
    }
}

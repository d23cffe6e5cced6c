//! # Connectivity Monitor
//!
//! Tracks whether the subsystem should behave as online.
//!
//! The platform's own notifications are the source of truth. Observed request
//! outcomes only adjust the tracked state in two cases:
//!
//! - a transport failure while the platform also reports `Disconnected`
//!   moves the state offline; a transport failure alone (one broken endpoint)
//!   leaves it untouched
//! - any completed HTTP exchange while tracked offline moves it back online
//!
//! Changes are published on a `watch` channel. Nothing here polls.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::network::{NetworkChangeStream, NetworkMonitor, NetworkStatus};
use core_runtime::events::{ConnectivityEvent, CoreEvent, EventBus};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct ConnectivityMonitor {
    state: watch::Sender<bool>,
    network: Arc<dyn NetworkMonitor>,
    event_bus: EventBus,
}

impl ConnectivityMonitor {
    pub fn new(network: Arc<dyn NetworkMonitor>, initially_online: bool, event_bus: EventBus) -> Self {
        let (state, _) = watch::channel(initially_online);
        Self {
            state,
            network,
            event_bus,
        }
    }

    /// Seed the tracked state from the platform.
    ///
    /// Only an explicit `Disconnected` starts offline; an indeterminate
    /// platform is treated as online until proven otherwise.
    pub async fn from_platform(network: Arc<dyn NetworkMonitor>, event_bus: EventBus) -> Self {
        let online = !network.reports_disconnected().await;
        Self::new(network, online, event_bus)
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Receiver that observes every transition
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Apply an explicit platform notification
    pub fn set_platform_online(&self, online: bool) {
        self.transition(online, "platform");
    }

    /// A request never produced a response.
    ///
    /// Goes offline only when the platform agrees.
    pub async fn report_transport_failure(&self) {
        if !self.is_online() {
            return;
        }

        if self.network.reports_disconnected().await {
            self.transition(false, "transport failure");
        } else {
            debug!("Transport failure while platform reports online; state unchanged");
        }
    }

    /// A request completed, whatever its status
    pub fn report_success(&self) {
        if !self.is_online() {
            self.transition(true, "request succeeded");
        }
    }

    fn transition(&self, online: bool, source: &'static str) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            info!(online, source, "Connectivity changed");
            let event = if online {
                ConnectivityEvent::Online
            } else {
                ConnectivityEvent::Offline
            };
            let _ = self.event_bus.emit(CoreEvent::Connectivity(event));
        }

        changed
    }

    /// Seed from the platform and follow its notifications.
    ///
    /// Subscribes before reading the current status, so a change landing
    /// between the two still reaches the tracked state. When the platform
    /// offers no change stream the monitor is returned with the error and
    /// only request outcomes move it afterwards.
    pub async fn start_with_platform(
        network: Arc<dyn NetworkMonitor>,
        event_bus: EventBus,
    ) -> (Arc<Self>, BridgeResult<JoinHandle<()>>) {
        let changes = network.subscribe_changes().await;
        let monitor = Arc::new(Self::from_platform(network, event_bus).await);

        let listener = changes.map(|changes| monitor.listen(changes));
        (monitor, listener)
    }

    /// Forward platform change notifications into the tracked state.
    ///
    /// Subscribes before returning, so no notification sent after this call
    /// is missed. The task ends when the platform stream closes or the
    /// monitor is dropped.
    pub async fn spawn_platform_listener(self: &Arc<Self>) -> BridgeResult<JoinHandle<()>> {
        let changes = self.network.subscribe_changes().await?;
        Ok(self.listen(changes))
    }

    fn listen(self: &Arc<Self>, mut changes: Box<dyn NetworkChangeStream>) -> JoinHandle<()> {
        let monitor = Arc::downgrade(self);

        tokio::spawn(async move {
            while let Some(info) = changes.next().await {
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };

                match info.status {
                    NetworkStatus::Connected => {
                        monitor.transition(true, "platform");
                    }
                    NetworkStatus::Disconnected => {
                        monitor.transition(false, "platform");
                    }
                    NetworkStatus::Indeterminate => {
                        debug!("Platform connectivity indeterminate; state unchanged");
                    }
                }
            }
            debug!("Platform connectivity listener stopped");
        })
    }
}

/// [`HttpClient`] decorator that reports request outcomes to a
/// [`ConnectivityMonitor`].
///
/// The subsystem routes all of its traffic through one of these so that
/// request failures feed the tracked state.
pub struct MonitoredHttpClient {
    inner: Arc<dyn HttpClient>,
    monitor: Arc<ConnectivityMonitor>,
}

impl MonitoredHttpClient {
    pub fn new(inner: Arc<dyn HttpClient>, monitor: Arc<ConnectivityMonitor>) -> Self {
        Self { inner, monitor }
    }

    async fn observe(&self, result: BridgeResult<HttpResponse>) -> BridgeResult<HttpResponse> {
        match &result {
            Ok(_) => self.monitor.report_success(),
            Err(err @ BridgeError::Transport(_)) => {
                warn!(error = %err, "Request failed below the HTTP layer");
                self.monitor.report_transport_failure().await;
            }
            Err(_) => {}
        }
        result
    }
}

#[async_trait]
impl HttpClient for MonitoredHttpClient {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let result = self.inner.execute(request).await;
        self.observe(result).await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> BridgeResult<HttpResponse> {
        let result = self.inner.execute_with_retry(request, policy).await;
        self.observe(result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::HostNetworkMonitor;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::time::Duration;

    fn monitor_with(status: NetworkStatus, online: bool) -> (HostNetworkMonitor, ConnectivityMonitor) {
        let host = HostNetworkMonitor::new(status);
        let monitor = ConnectivityMonitor::new(Arc::new(host.clone()), online, EventBus::default());
        (host, monitor)
    }

    #[tokio::test]
    async fn test_transport_failure_alone_keeps_online() {
        let (_host, monitor) = monitor_with(NetworkStatus::Connected, true);

        monitor.report_transport_failure().await;
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn test_transport_failure_with_platform_offline_goes_offline() {
        let (_host, monitor) = monitor_with(NetworkStatus::Disconnected, true);
        let mut rx = monitor.subscribe();

        monitor.report_transport_failure().await;
        assert!(!monitor.is_online());
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn test_indeterminate_platform_is_not_offline() {
        let (_host, monitor) = monitor_with(NetworkStatus::Indeterminate, true);

        monitor.report_transport_failure().await;
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn test_from_platform_seeds_state() {
        let host = HostNetworkMonitor::new(NetworkStatus::Disconnected);
        let monitor = ConnectivityMonitor::from_platform(Arc::new(host), EventBus::default()).await;
        assert!(!monitor.is_online());

        let host = HostNetworkMonitor::new(NetworkStatus::Indeterminate);
        let monitor = ConnectivityMonitor::from_platform(Arc::new(host), EventBus::default()).await;
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn test_transitions_are_announced_once() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let host = HostNetworkMonitor::new(NetworkStatus::Connected);
        let monitor = ConnectivityMonitor::new(Arc::new(host), true, bus);

        monitor.set_platform_online(false);
        monitor.set_platform_online(false);
        monitor.set_platform_online(true);

        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Connectivity(ConnectivityEvent::Offline)
        );
        assert_eq!(
            events.recv().await.unwrap(),
            CoreEvent::Connectivity(ConnectivityEvent::Online)
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_platform_listener_follows_host() {
        let host = HostNetworkMonitor::new(NetworkStatus::Connected);
        let monitor = Arc::new(ConnectivityMonitor::new(
            Arc::new(host.clone()),
            true,
            EventBus::default(),
        ));
        let mut rx = monitor.subscribe();
        let listener = monitor.spawn_platform_listener().await.unwrap();

        host.set_status(NetworkStatus::Disconnected);
        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(!*rx.borrow_and_update());

        host.set_status(NetworkStatus::Connected);
        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(*rx.borrow_and_update());

        listener.abort();
    }

    /// Reports the host's status, then flips it right after the read
    struct FlipAfterRead {
        host: HostNetworkMonitor,
        next: NetworkStatus,
    }

    #[async_trait]
    impl NetworkMonitor for FlipAfterRead {
        async fn get_network_info(&self) -> BridgeResult<bridge_traits::network::NetworkInfo> {
            let info = self.host.get_network_info().await;
            self.host.set_status(self.next);
            info
        }

        async fn subscribe_changes(&self) -> BridgeResult<Box<dyn NetworkChangeStream>> {
            self.host.subscribe_changes().await
        }
    }

    #[tokio::test]
    async fn test_change_during_seeding_is_not_lost() {
        let network = Arc::new(FlipAfterRead {
            host: HostNetworkMonitor::new(NetworkStatus::Connected),
            next: NetworkStatus::Disconnected,
        });

        let (monitor, listener) =
            ConnectivityMonitor::start_with_platform(network, EventBus::default()).await;
        let listener = listener.unwrap();

        let mut rx = monitor.subscribe();
        tokio::time::timeout(Duration::from_secs(1), async {
            while *rx.borrow_and_update() {
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
        assert!(!monitor.is_online());

        listener.abort();
    }

    struct ScriptedHttp {
        fail_transport: bool,
    }

    #[async_trait]
    impl HttpClient for ScriptedHttp {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            if self.fail_transport {
                Err(BridgeError::Transport("connection refused".to_string()))
            } else {
                Ok(HttpResponse {
                    status: 500,
                    headers: HashMap::new(),
                    body: Bytes::new(),
                })
            }
        }
    }

    #[tokio::test]
    async fn test_monitored_client_reports_outcomes() {
        let host = HostNetworkMonitor::new(NetworkStatus::Disconnected);
        let monitor = Arc::new(ConnectivityMonitor::new(
            Arc::new(host.clone()),
            true,
            EventBus::default(),
        ));

        let failing = MonitoredHttpClient::new(
            Arc::new(ScriptedHttp {
                fail_transport: true,
            }),
            Arc::clone(&monitor),
        );
        assert!(failing.execute(HttpRequest::get("https://api.example")).await.is_err());
        assert!(!monitor.is_online());

        // A server error is still a completed exchange
        let answering = MonitoredHttpClient::new(
            Arc::new(ScriptedHttp {
                fail_transport: false,
            }),
            Arc::clone(&monitor),
        );
        let response = answering
            .execute(HttpRequest::get("https://api.example"))
            .await
            .unwrap();
        assert_eq!(response.status, 500);
        assert!(monitor.is_online());
    }
}

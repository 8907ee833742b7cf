//! # Network Binder
//!
//! Resolves a Wi-Fi network by SSID and records it as the bound network.
//! Every HTTP client and raw socket created afterwards binds its local end to
//! that network before connecting, until another bind overwrites it.
//!
//! The bound network lives in a [`BoundNetworkRegistry`]: a single setter
//! (the binder) and any number of readers that take a snapshot at connection
//! time.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bridge_traits::network::{NetworkEnumerator, NetworkHandle};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::NetworkError;

/// Process-wide (per service) record of the bound network. Last bind wins.
#[derive(Clone)]
pub struct BoundNetworkRegistry {
    sender: Arc<watch::Sender<Option<NetworkHandle>>>,
}

impl BoundNetworkRegistry {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn set(&self, handle: NetworkHandle) {
        self.sender.send_replace(Some(handle));
    }

    pub fn clear(&self) -> Option<NetworkHandle> {
        self.sender.send_replace(None)
    }

    /// Snapshot of the bound network.
    pub fn current(&self) -> Option<NetworkHandle> {
        self.sender.borrow().clone()
    }

    /// Observe binding changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<NetworkHandle>> {
        self.sender.subscribe()
    }
}

impl Default for BoundNetworkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BoundNetworkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundNetworkRegistry")
            .field("current", &*self.sender.borrow())
            .finish()
    }
}

/// Binds the bridge to a Wi-Fi network by SSID.
pub struct NetworkBinder {
    enumerator: Arc<dyn NetworkEnumerator>,
    registry: BoundNetworkRegistry,
}

impl NetworkBinder {
    pub fn new(enumerator: Arc<dyn NetworkEnumerator>, registry: BoundNetworkRegistry) -> Self {
        Self {
            enumerator,
            registry,
        }
    }

    pub fn registry(&self) -> &BoundNetworkRegistry {
        &self.registry
    }

    /// Find the connected Wi-Fi network named `ssid` and make it the bound
    /// network.
    ///
    /// Matching is exact and case-sensitive against the platform SSID with its
    /// quote characters removed. On any failure the previous binding is kept.
    #[instrument(skip(self))]
    pub async fn bind(&self, ssid: &str) -> Result<NetworkHandle, NetworkError> {
        if ssid.is_empty() {
            return Err(NetworkError::MissingSsid);
        }

        let networks = self.enumerator.connected_networks().await.map_err(|e| {
            warn!(error = %e, "Network enumeration failed");
            NetworkError::EnumerationFailed {
                ssid: ssid.to_string(),
                message: e.to_string(),
            }
        })?;

        let matched = networks.into_iter().find(|network| {
            network.is_connected_wifi()
                && network
                    .ssid
                    .as_deref()
                    .map(strip_ssid_quotes)
                    .is_some_and(|candidate| candidate == ssid)
        });

        match matched {
            Some(network) => {
                info!(network = %network.handle, "Bound to network for SSID");
                self.registry.set(network.handle.clone());
                Ok(network.handle)
            }
            None => {
                debug!("No connected Wi-Fi network matched");
                Err(NetworkError::NotFound {
                    ssid: ssid.to_string(),
                })
            }
        }
    }

    /// Drop the binding; new connections use the default route again.
    pub fn unbind(&self) -> Option<NetworkHandle> {
        let previous = self.registry.clear();
        if let Some(handle) = &previous {
            info!(network = %handle, "Network unbound");
        }
        previous
    }

    pub fn current(&self) -> Option<NetworkHandle> {
        self.registry.current()
    }
}

/// Platforms report SSIDs wrapped in double quotes (`"Home"`).
pub fn strip_ssid_quotes(ssid: &str) -> String {
    ssid.replace('"', "")
}

/// Open a TCP connection whose local end is bound to `network`.
///
/// Resolved addresses of a different family than the network's local address
/// are skipped. Without a local address the socket is left unbound.
pub async fn connect_via(network: &NetworkHandle, host: &str, port: u16) -> io::Result<TcpStream> {
    let mut last_error = None;

    for addr in lookup_host((host, port)).await? {
        if let Some(local) = network.local_addr {
            if local.is_ipv4() != addr.is_ipv4() {
                continue;
            }
        }

        match connect_one(network, addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(%addr, error = %e, "Connect attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("No address of {} is reachable through {}", host, network),
        )
    }))
}

async fn connect_one(network: &NetworkHandle, addr: SocketAddr) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    if let Some(local) = network.local_addr {
        socket.bind(SocketAddr::new(local, 0))?;
    }

    let stream = socket.connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::network::{ConnectedNetwork, NetworkTransport};
    use mockall::mock;
    use std::net::{IpAddr, Ipv4Addr};

    mock! {
        Enumerator {}

        #[async_trait]
        impl NetworkEnumerator for Enumerator {
            async fn connected_networks(&self) -> BridgeResult<Vec<ConnectedNetwork>>;
        }
    }

    fn wifi(handle: u64, ssid: &str, connected: bool) -> ConnectedNetwork {
        ConnectedNetwork {
            handle: NetworkHandle::new(handle, format!("wlan{}", handle))
                .with_local_addr(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            transport: NetworkTransport::WiFi,
            connected,
            ssid: Some(ssid.to_string()),
        }
    }

    fn binder_with(networks: Vec<ConnectedNetwork>) -> NetworkBinder {
        let mut enumerator = MockEnumerator::new();
        enumerator
            .expect_connected_networks()
            .returning(move || Ok(networks.clone()));
        NetworkBinder::new(Arc::new(enumerator), BoundNetworkRegistry::new())
    }

    #[tokio::test]
    async fn test_bind_strips_platform_quotes() {
        let binder = binder_with(vec![wifi(7, "\"Home\"", true)]);

        let handle = binder.bind("Home").await.unwrap();

        assert_eq!(handle.handle, 7);
        assert_eq!(binder.current(), Some(handle));
    }

    #[tokio::test]
    async fn test_bind_is_case_sensitive() {
        let binder = binder_with(vec![wifi(1, "Home", true)]);

        let err = binder.bind("home").await.unwrap_err();

        assert!(matches!(err, NetworkError::NotFound { .. }));
        assert_eq!(
            err.to_string(),
            "No matching Wi-Fi network found for SSID: home"
        );
    }

    #[tokio::test]
    async fn test_bind_ignores_disconnected_and_non_wifi() {
        let mut ethernet = wifi(2, "Office", true);
        ethernet.transport = NetworkTransport::Ethernet;
        let binder = binder_with(vec![wifi(1, "Office", false), ethernet]);

        assert!(binder.bind("Office").await.is_err());
        assert!(binder.current().is_none());
    }

    #[tokio::test]
    async fn test_failed_bind_keeps_previous_binding() {
        let binder = binder_with(vec![wifi(1, "Home", true)]);
        let bound = binder.bind("Home").await.unwrap();

        assert!(binder.bind("Elsewhere").await.is_err());
        assert_eq!(binder.current(), Some(bound));
    }

    #[tokio::test]
    async fn test_last_bind_wins() {
        let binder = binder_with(vec![wifi(1, "Home", true), wifi(2, "Lab", true)]);

        binder.bind("Home").await.unwrap();
        binder.bind("Lab").await.unwrap();

        assert_eq!(binder.current().map(|h| h.handle), Some(2));
    }

    #[tokio::test]
    async fn test_empty_ssid_is_rejected_without_enumerating() {
        let mut enumerator = MockEnumerator::new();
        enumerator.expect_connected_networks().never();
        let binder = NetworkBinder::new(Arc::new(enumerator), BoundNetworkRegistry::new());

        assert!(matches!(
            binder.bind("").await,
            Err(NetworkError::MissingSsid)
        ));
    }

    #[tokio::test]
    async fn test_enumeration_failure_is_reported_as_not_found() {
        let mut enumerator = MockEnumerator::new();
        enumerator
            .expect_connected_networks()
            .returning(|| Err(BridgeError::NotAvailable("Wi-Fi service".to_string())));
        let binder = NetworkBinder::new(Arc::new(enumerator), BoundNetworkRegistry::new());

        let err = binder.bind("Home").await.unwrap_err();
        assert!(err.to_string().contains("Wi-Fi service"));
    }

    #[tokio::test]
    async fn test_unbind() {
        let binder = binder_with(vec![wifi(1, "Home", true)]);
        binder.bind("Home").await.unwrap();

        assert!(binder.unbind().is_some());
        assert!(binder.current().is_none());
        assert!(binder.unbind().is_none());
    }

    #[tokio::test]
    async fn test_registry_notifies_subscribers() {
        let registry = BoundNetworkRegistry::new();
        let mut changes = registry.subscribe();

        registry.set(NetworkHandle::new(4, "wlan0"));

        changes.changed().await.unwrap();
        assert_eq!(changes.borrow().as_ref().map(|h| h.handle), Some(4));
    }

    #[tokio::test]
    async fn test_connect_via_binds_local_address() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let network =
            NetworkHandle::new(1, "lo").with_local_addr(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let stream = connect_via(&network, "127.0.0.1", port).await.unwrap();
        let (_accepted, peer) = listener.accept().await.unwrap();

        assert_eq!(stream.local_addr().unwrap().ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(peer, stream.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_connect_via_skips_other_family() {
        let network = NetworkHandle::new(1, "lo6").with_local_addr("::1".parse().unwrap());

        let err = connect_via(&network, "127.0.0.1", 9).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrNotAvailable);
    }
}

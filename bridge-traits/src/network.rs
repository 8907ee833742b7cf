//! Network Enumeration Abstraction
//!
//! Lets the core discover the physical networks the host is currently attached
//! to so outgoing connections can be pinned to one of them.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Network transport type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkTransport {
    /// Wi-Fi connection
    WiFi,
    /// Cellular/mobile data connection
    Cellular,
    /// Ethernet connection
    Ethernet,
    /// Other or unknown transport
    Other,
}

/// Opaque identifier of a physical network.
///
/// `handle` is the platform's own identifier (an Android `Network` handle, an
/// interface index on desktop). `local_addr` is the address outgoing sockets
/// bind to before connecting so that traffic leaves through this network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkHandle {
    pub handle: u64,
    pub interface: String,
    pub local_addr: Option<IpAddr>,
}

impl NetworkHandle {
    pub fn new(handle: u64, interface: impl Into<String>) -> Self {
        Self {
            handle,
            interface: interface.into(),
            local_addr: None,
        }
    }

    pub fn with_local_addr(mut self, addr: IpAddr) -> Self {
        self.local_addr = Some(addr);
        self
    }
}

impl fmt::Display for NetworkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.local_addr {
            Some(addr) => write!(f, "{}#{} ({})", self.interface, self.handle, addr),
            None => write!(f, "{}#{}", self.interface, self.handle),
        }
    }
}

/// A network the host currently knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedNetwork {
    pub handle: NetworkHandle,
    pub transport: NetworkTransport,
    /// Whether the link is up and usable
    pub connected: bool,
    /// SSID as reported by the platform. May still carry the surrounding quote
    /// characters some platforms add.
    pub ssid: Option<String>,
}

impl ConnectedNetwork {
    pub fn is_connected_wifi(&self) -> bool {
        self.connected && self.transport == NetworkTransport::WiFi
    }
}

/// Network enumerator trait
///
/// # Platform Support
///
/// - **Desktop**: interface enumeration plus NetworkManager for SSIDs
/// - **Android**: `ConnectivityManager.allNetworks` + `WifiManager.connectionInfo`
/// - **iOS**: `NEHotspotNetwork.fetchCurrent`
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::NetworkEnumerator;
///
/// async fn wifi_count(enumerator: &dyn NetworkEnumerator) -> usize {
///     enumerator
///         .connected_networks()
///         .await
///         .map(|networks| networks.iter().filter(|n| n.is_connected_wifi()).count())
///         .unwrap_or(0)
/// }
/// ```
#[async_trait::async_trait]
pub trait NetworkEnumerator: Send + Sync {
    /// List every network the host is attached to.
    async fn connected_networks(&self) -> Result<Vec<ConnectedNetwork>>;
}

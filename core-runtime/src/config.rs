//! # Bridge Configuration Module
//!
//! Provides configuration management for the native network bridge.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `BridgeConfig` holding the platform adapters and tuning values the network
//! core needs. It enforces fail-fast validation so a misconfigured host finds
//! out at startup rather than on the first socket it opens.
//!
//! ## Required Dependencies
//!
//! - `NetworkEnumerator` - Lists attached networks for Wi-Fi binding
//!   (desktop default: `DesktopNetworkEnumerator` with the `desktop-shims` feature)
//!
//! ## Tunables (with defaults)
//!
//! | Setting | Default |
//! |---------|---------|
//! | HTTP connect/read/write timeout | 10 s each |
//! | Progress interval | 500 ms |
//! | Socket connect timeout | 5 s |
//! | Socket send queue capacity | 256 buffers |
//! | Socket receive buffer | 1024 bytes |
//! | Event buffer size | 1024 events |
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::BridgeConfig;
//! use std::time::Duration;
//!
//! let config = BridgeConfig::builder()
//!     .network_enumerator(Arc::new(MyAndroidEnumerator::new(env)))
//!     .progress_interval(Duration::from_millis(250))
//!     .send_queue_capacity(64)
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::BridgeConfig;
//!
//! // Rejected: a zero-sized send queue could never accept a buffer.
//! let config = BridgeConfig::builder()
//!     .send_queue_capacity(0)
//!     .build()
//!     .expect("Should fail - invalid queue capacity");
//! ```

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::NetworkEnumerator;

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_SOCKET_CONNECT_TIMEOUT: Duration = Duration::from_millis(5_000);
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 1024;

const MAX_EVENT_BUFFER_SIZE: usize = 65_536;
const MAX_RECEIVE_BUFFER_SIZE: usize = 1024 * 1024;

/// Timeouts applied to HTTP requests that do not specify their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_HTTP_TIMEOUT,
            read: DEFAULT_HTTP_TIMEOUT,
            write: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// Socket session tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketSettings {
    /// Used when `openSocket` carries no timeout
    pub connect_timeout: Duration,
    /// Buffers a session accepts before `send` fails with a full queue
    pub send_queue_capacity: usize,
    /// Upper bound of bytes per `data` event
    pub receive_buffer_size: usize,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_SOCKET_CONNECT_TIMEOUT,
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
        }
    }
}

/// Configuration for the native network bridge.
///
/// Use [`BridgeConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct BridgeConfig {
    /// Lists attached networks (required)
    pub network_enumerator: Arc<dyn NetworkEnumerator>,

    /// Capacity of the broadcast side of the event bus (in-process streams). Attached listeners are unbounded.
    pub event_buffer_size: usize,

    /// Default HTTP timeouts
    pub http_timeouts: HttpTimeouts,

    /// Minimum spacing of non-terminal progress events
    pub progress_interval: Duration,

    /// Socket session tuning
    pub socket: SocketSettings,

    /// `User-Agent` sent when the request does not set one
    pub user_agent: Option<String>,
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("network_enumerator", &"NetworkEnumerator { ... }")
            .field("event_buffer_size", &self.event_buffer_size)
            .field("http_timeouts", &self.http_timeouts)
            .field("progress_interval", &self.progress_interval)
            .field("socket", &self.socket)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl BridgeConfig {
    /// Creates a new builder for constructing a `BridgeConfig`.
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Event buffer size is within 1..=65536
    /// - HTTP and socket timeouts are non-zero
    /// - Send queue capacity is non-zero
    /// - Receive buffer size is within 1 byte..=1 MiB
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 || self.event_buffer_size > MAX_EVENT_BUFFER_SIZE {
            return Err(Error::Config(format!(
                "Event buffer size must be between 1 and {}",
                MAX_EVENT_BUFFER_SIZE
            )));
        }

        let HttpTimeouts {
            connect,
            read,
            write,
        } = self.http_timeouts;
        if connect.is_zero() || read.is_zero() || write.is_zero() {
            return Err(Error::Config(
                "HTTP timeouts must be greater than zero".to_string(),
            ));
        }

        if self.socket.connect_timeout.is_zero() {
            return Err(Error::Config(
                "Socket connect timeout must be greater than zero".to_string(),
            ));
        }

        if self.socket.send_queue_capacity == 0 {
            return Err(Error::Config(
                "Send queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.socket.receive_buffer_size == 0
            || self.socket.receive_buffer_size > MAX_RECEIVE_BUFFER_SIZE
        {
            return Err(Error::Config(format!(
                "Receive buffer size must be between 1 and {} bytes",
                MAX_RECEIVE_BUFFER_SIZE
            )));
        }

        if let Some(user_agent) = &self.user_agent {
            if user_agent.trim().is_empty() {
                return Err(Error::Config(
                    "User agent cannot be blank. Omit it to use the client default.".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn network_enumerator_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "NetworkEnumerator".to_string(),
        message: "NetworkEnumerator implementation is required for Wi-Fi network binding. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default DesktopNetworkEnumerator. \
                 Mobile: inject the platform adapter (ConnectivityManager/NEHotspotNetwork)."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_network_enumerator() -> Result<Arc<dyn NetworkEnumerator>> {
    use bridge_desktop::DesktopNetworkEnumerator;

    let enumerator: Arc<dyn NetworkEnumerator> = Arc::new(DesktopNetworkEnumerator::new());
    Ok(enumerator)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_network_enumerator() -> Result<Arc<dyn NetworkEnumerator>> {
    Err(network_enumerator_missing_error())
}

/// Builder for [`BridgeConfig`].
#[derive(Default)]
pub struct BridgeConfigBuilder {
    network_enumerator: Option<Arc<dyn NetworkEnumerator>>,
    event_buffer_size: Option<usize>,
    http_timeouts: Option<HttpTimeouts>,
    progress_interval: Option<Duration>,
    socket: SocketSettings,
    user_agent: Option<String>,
}

impl BridgeConfigBuilder {
    /// Sets the network enumerator used to resolve SSIDs.
    pub fn network_enumerator(mut self, enumerator: Arc<dyn NetworkEnumerator>) -> Self {
        self.network_enumerator = Some(enumerator);
        self
    }

    /// Sets the event bus capacity.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the default HTTP timeouts.
    pub fn http_timeouts(mut self, timeouts: HttpTimeouts) -> Self {
        self.http_timeouts = Some(timeouts);
        self
    }

    /// Sets the minimum spacing of non-terminal progress events.
    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = Some(interval);
        self
    }

    pub fn socket_connect_timeout(mut self, timeout: Duration) -> Self {
        self.socket.connect_timeout = timeout;
        self
    }

    pub fn send_queue_capacity(mut self, capacity: usize) -> Self {
        self.socket.send_queue_capacity = capacity;
        self
    }

    pub fn receive_buffer_size(mut self, size: usize) -> Self {
        self.socket.receive_buffer_size = size;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Builds the final `BridgeConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns an error if:
    /// - No `NetworkEnumerator` was provided and no platform default exists
    /// - Configuration values are invalid
    pub fn build(self) -> Result<BridgeConfig> {
        let network_enumerator = match self.network_enumerator {
            Some(enumerator) => enumerator,
            None => provide_default_network_enumerator()?,
        };

        let config = BridgeConfig {
            network_enumerator,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            http_timeouts: self.http_timeouts.unwrap_or_default(),
            progress_interval: self.progress_interval.unwrap_or(DEFAULT_PROGRESS_INTERVAL),
            socket: self.socket,
            user_agent: self.user_agent,
        };

        config.validate()?;

        Ok(config)
    }
}

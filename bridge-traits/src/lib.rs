//! # Host Bridge Traits
//!
//! Platform abstraction traits that each host platform implements for the
//! native network bridge.
//!
//! ## Overview
//!
//! This crate defines the contract between the network core and
//! platform-specific code. The core needs to know which physical networks are
//! attached (to pin connections to a Wi-Fi network), where to deliver
//! asynchronous events, and where to mirror its logs.
//!
//! ## Traits
//!
//! - [`NetworkEnumerator`](network::NetworkEnumerator) - Lists attached networks with transport and SSID
//! - [`EventListener`](listener::EventListener) - Host sink for progress and socket events
//! - [`LoggerSink`](logger::LoggerSink) - Forward structured logs to host logging
//!
//! ## Implementations
//!
//! `bridge-desktop` provides a Linux [`NetworkEnumerator`](network::NetworkEnumerator)
//! backed by NetworkManager (`nmcli`). Mobile hosts inject their own adapters
//! (ConnectivityManager on Android, NWPathMonitor on iOS).
//!
//! ## Fail-Fast Strategy
//!
//! The core fails with a descriptive error when a required capability is
//! missing:
//!
//! ```ignore
//! let enumerator = builder.network_enumerator
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "NetworkEnumerator".to_string(),
//!         message: "Desktop: enable the 'desktop-shims' feature. \
//!                   Mobile: inject the platform adapter.".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert platform errors into it and keep the message actionable.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`; the core calls them from Tokio
//! worker threads.

pub mod error;
pub mod listener;
pub mod logger;
pub mod network;

pub use error::BridgeError;

// Re-export commonly used types
pub use listener::EventListener;
pub use logger::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use network::{ConnectedNetwork, NetworkEnumerator, NetworkHandle, NetworkTransport};

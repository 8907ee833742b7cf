//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms.
//!
//! ## Overview
//!
//! - `NetworkEnumerator` using `if-addrs` for interfaces and NetworkManager's
//!   `nmcli` for Wi-Fi SSIDs (Linux)
//!
//! The host event listener and logger sink have no desktop default: hosts
//! attach their own, or use `bridge_traits::ConsoleLogger`.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::DesktopNetworkEnumerator;
//! use bridge_traits::NetworkEnumerator;
//!
//! #[tokio::main]
//! async fn main() {
//!     let enumerator = DesktopNetworkEnumerator::new();
//!     for network in enumerator.connected_networks().await.unwrap_or_default() {
//!         println!("{} {:?} {:?}", network.handle, network.transport, network.ssid);
//!     }
//! }
//! ```

mod network;

pub use network::DesktopNetworkEnumerator;

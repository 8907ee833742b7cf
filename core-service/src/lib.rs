//! Command surface of the native network bridge.
//!
//! [`NativeNetworkService`] wires the network binder, the HTTP engine, the
//! socket session manager and the event dispatcher around one shared bound
//! network. Hosts either call its typed methods or feed JSON commands through
//! [`NativeNetworkService::handle_json`]. Desktop builds enable the
//! `desktop-shims` feature to get the default `DesktopNetworkEnumerator`.
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use core_runtime::config::BridgeConfig;
//! use core_service::NativeNetworkService;
//!
//! let service = NativeNetworkService::new(BridgeConfig::builder().build()?);
//! let reply = service
//!     .handle_json(r#"{"method": "bindToWiFiNetwork", "args": {"ssid": "Camera-AP"}}"#)
//!     .await;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod error;
mod service;

pub use command::{Command, CommandReply, RawCommand};
pub use error::{CommandError, ErrorCode, Result};
pub use service::NativeNetworkService;

pub use core_network::{HttpMethod, HttpRequestSpec, HttpResult};
pub use core_runtime::config::BridgeConfig;
pub use core_runtime::events::EventChannel;

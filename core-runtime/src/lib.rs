//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the network core and the service façade:
//! - Logging and tracing initialization
//! - Configuration management
//! - Event bus and host event dispatcher
//!
//! ## Overview
//!
//! Nothing in here touches the network. The crate fixes how the other crates
//! are configured, how they log and how their asynchronous notifications reach
//! the host.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{BridgeConfig, BridgeConfigBuilder, HttpTimeouts, SocketSettings};
pub use error::{Error, Result};
pub use events::{BridgeEvent, EventBus, EventChannel, EventDispatcher, SocketEvent, TransferEvent};

//! # Core Network
//!
//! Network binding, HTTP execution with transfer progress, and raw TCP socket
//! sessions.
//!
//! All three share a [`BoundNetworkRegistry`]: the [`NetworkBinder`] writes it,
//! the [`HttpEngine`] and the [`SocketManager`] read it whenever they open a
//! connection. Asynchronous results (progress, socket data, errors and
//! disconnects) are published on the `core_runtime` event bus.

pub mod binder;
pub mod error;
pub mod http;
pub mod progress;
pub mod socket;

pub use binder::{connect_via, strip_ssid_quotes, BoundNetworkRegistry, NetworkBinder};
pub use error::{HttpError, NetworkError, SocketError, TransportErrorKind};
pub use http::{HttpEngine, HttpMethod, HttpRequestSpec, HttpResult, ResponseHeaders};
pub use progress::{Direction, ProgressEmitter, RateLimiter};
pub use socket::{OpenAck, SessionState, SocketManager};

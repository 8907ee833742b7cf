use std::fmt;

use thiserror::Error;

/// Failures of the Wi-Fi network binder.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("SSID is required")]
    MissingSsid,

    #[error("No matching Wi-Fi network found for SSID: {ssid}")]
    NotFound { ssid: String },

    #[error("No matching Wi-Fi network found for SSID: {ssid} ({message})")]
    EnumerationFailed { ssid: String, message: String },
}

/// Transport failure classes reported for HTTP requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Dns,
    Tls,
    Network,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect_error",
            TransportErrorKind::Dns => "dns_error",
            TransportErrorKind::Tls => "ssl_error",
            TransportErrorKind::Network => "network_error",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of the HTTP request engine.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("HTTP method {0} is not supported")]
    UnsupportedMethod(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// `label` names the underlying error type, `message` is its text.
    #[error("{message}")]
    Transport {
        kind: TransportErrorKind,
        label: String,
        message: String,
    },

    #[error("{0}")]
    Download(String),
}

impl HttpError {
    pub(crate) fn transport(
        kind: TransportErrorKind,
        label: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        HttpError::Transport {
            kind,
            label: label.into(),
            message: message.into(),
        }
    }
}

/// Failures of the socket session manager that surface synchronously.
///
/// Runtime failures of an open session are never returned; they arrive as
/// `error` and `disconnected` socket events.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("No bound network. Bind to a Wi-Fi network before opening a socket.")]
    NoBoundNetwork,

    #[error("Socket {0} is already open or connecting")]
    InUse(String),

    #[error("No connection for socketId: {0}")]
    NoConnection(String),

    #[error("Failed to add write queue, queue or connection may be closed.")]
    QueueFull(String),

    #[error("Socket runtime unavailable: {0}")]
    Runtime(String),
}


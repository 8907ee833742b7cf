use std::fmt;

use core_network::{HttpError, NetworkError, SocketError, TransportErrorKind};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Machine-readable failure codes reported to the managed layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "MISSING_SSID")]
    MissingSsid,
    #[serde(rename = "NETWORK_NOT_FOUND")]
    NetworkNotFound,
    #[serde(rename = "UNSUPPORTED_METHOD")]
    UnsupportedMethod,
    #[serde(rename = "DOWNLOAD_ERROR")]
    DownloadError,
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "connect_error")]
    ConnectError,
    #[serde(rename = "dns_error")]
    DnsError,
    #[serde(rename = "ssl_error")]
    SslError,
    #[serde(rename = "network_error")]
    NetworkError,
    #[serde(rename = "NO_BOUND_NETWORK")]
    NoBoundNetwork,
    #[serde(rename = "ADD_QUEUE_FAILED")]
    AddQueueFailed,
    #[serde(rename = "NO_CONNECTION")]
    NoConnection,
    #[serde(rename = "SOCKET_IN_USE")]
    SocketInUse,
    #[serde(rename = "INVALID_ARGUMENT")]
    InvalidArgument,
    #[serde(rename = "NOT_IMPLEMENTED")]
    NotImplemented,
    #[serde(rename = "INTERNAL")]
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingSsid => "MISSING_SSID",
            ErrorCode::NetworkNotFound => "NETWORK_NOT_FOUND",
            ErrorCode::UnsupportedMethod => "UNSUPPORTED_METHOD",
            ErrorCode::DownloadError => "DOWNLOAD_ERROR",
            ErrorCode::Timeout => "timeout",
            ErrorCode::ConnectError => "connect_error",
            ErrorCode::DnsError => "dns_error",
            ErrorCode::SslError => "ssl_error",
            ErrorCode::NetworkError => "network_error",
            ErrorCode::NoBoundNetwork => "NO_BOUND_NETWORK",
            ErrorCode::AddQueueFailed => "ADD_QUEUE_FAILED",
            ErrorCode::NoConnection => "NO_CONNECTION",
            ErrorCode::SocketInUse => "SOCKET_IN_USE",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TransportErrorKind> for ErrorCode {
    fn from(kind: TransportErrorKind) -> Self {
        match kind {
            TransportErrorKind::Timeout => ErrorCode::Timeout,
            TransportErrorKind::Connect => ErrorCode::ConnectError,
            TransportErrorKind::Dns => ErrorCode::DnsError,
            TransportErrorKind::Tls => ErrorCode::SslError,
            TransportErrorKind::Network => ErrorCode::NetworkError,
        }
    }
}

/// Uniform failure shape of every command.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{code}: {message}")]
pub struct CommandError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<Value>,
}

impl CommandError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn not_implemented(method: &str) -> Self {
        Self::new(
            ErrorCode::NotImplemented,
            format!("Method {} is not implemented", method),
        )
    }
}

impl From<NetworkError> for CommandError {
    fn from(error: NetworkError) -> Self {
        let code = match &error {
            NetworkError::MissingSsid => ErrorCode::MissingSsid,
            NetworkError::NotFound { .. } | NetworkError::EnumerationFailed { .. } => {
                ErrorCode::NetworkNotFound
            }
        };
        CommandError::new(code, error.to_string())
    }
}

impl From<HttpError> for CommandError {
    fn from(error: HttpError) -> Self {
        match error {
            HttpError::UnsupportedMethod(_) => {
                CommandError::new(ErrorCode::UnsupportedMethod, error.to_string())
            }
            HttpError::InvalidRequest(message) => CommandError::invalid_argument(message),
            HttpError::Transport {
                kind,
                label,
                message,
            } => CommandError::new(kind.into(), message.as_str())
                .with_details(json!({ "exception": label, "message": message })),
            HttpError::Download(message) => CommandError::new(ErrorCode::DownloadError, message),
        }
    }
}

impl From<SocketError> for CommandError {
    fn from(error: SocketError) -> Self {
        let (code, socket_id) = match &error {
            SocketError::NoBoundNetwork => (ErrorCode::NoBoundNetwork, None),
            SocketError::InUse(id) => (ErrorCode::SocketInUse, Some(id.clone())),
            SocketError::NoConnection(id) => (ErrorCode::NoConnection, Some(id.clone())),
            SocketError::QueueFull(id) => (ErrorCode::AddQueueFailed, Some(id.clone())),
            SocketError::Runtime(_) => (ErrorCode::Internal, None),
        };
        let command_error = CommandError::new(code, error.to_string());
        match socket_id {
            Some(id) => command_error.with_details(json!({ "socketId": id })),
            None => command_error,
        }
    }
}

impl From<core_runtime::Error> for CommandError {
    fn from(error: core_runtime::Error) -> Self {
        CommandError::new(ErrorCode::Internal, error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binder_codes() {
        assert_eq!(
            CommandError::from(NetworkError::MissingSsid).code,
            ErrorCode::MissingSsid
        );

        let not_found = CommandError::from(NetworkError::NotFound {
            ssid: "Lab".to_string(),
        });
        assert_eq!(not_found.code, ErrorCode::NetworkNotFound);
        assert_eq!(not_found.message, "No matching Wi-Fi network found for SSID: Lab");
    }

    #[test]
    fn test_transport_details() {
        let error = CommandError::from(HttpError::Transport {
            kind: TransportErrorKind::Dns,
            label: "reqwest::Error".to_string(),
            message: "dns error".to_string(),
        });

        assert_eq!(error.code.as_str(), "dns_error");
        assert_eq!(
            error.details,
            Some(json!({"exception": "reqwest::Error", "message": "dns error"}))
        );
    }

    #[test]
    fn test_socket_codes_carry_socket_id() {
        let error = CommandError::from(SocketError::QueueFull("printer".to_string()));

        assert_eq!(error.code, ErrorCode::AddQueueFailed);
        assert_eq!(
            error.message,
            "Failed to add write queue, queue or connection may be closed."
        );
        assert_eq!(error.details, Some(json!({"socketId": "printer"})));

        let error = CommandError::from(SocketError::NoBoundNetwork);
        assert_eq!(error.code, ErrorCode::NoBoundNetwork);
        assert!(error.details.is_none());
    }

    #[test]
    fn test_wire_shape() {
        let error = CommandError::from(HttpError::UnsupportedMethod("PATCH".to_string()));

        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({
                "code": "UNSUPPORTED_METHOD",
                "message": "HTTP method PATCH is not supported",
                "details": null,
            })
        );
    }

    #[test]
    fn test_serialized_codes_match_as_str() {
        for code in [
            ErrorCode::Timeout,
            ErrorCode::SslError,
            ErrorCode::SocketInUse,
            ErrorCode::NotImplemented,
        ] {
            assert_eq!(serde_json::to_value(code).unwrap(), json!(code.as_str()));
        }
    }
}

//! JSON command channel.
//!
//! Commands arrive as `{"method": "...", "args": {...}}` and are answered with
//! `{"ok": value}` or `{"error": {"code", "message", "details"}}`.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use core_network::{HttpMethod, HttpRequestSpec};
use serde::de::{self, DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{CommandError, Result};

/// Envelope of one command before its arguments are decoded.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCommand {
    pub method: String,
    #[serde(default)]
    pub args: Value,
}

/// A decoded command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetPlatformVersion,
    BindToWiFiNetwork(BindArgs),
    HttpRequest(HttpRequestArgs),
    OpenSocket(OpenSocketArgs),
    SendSocket(SendSocketArgs),
    CloseSocket(SocketIdArgs),
}

impl Command {
    /// Decode a command. Unknown methods fail with `NOT_IMPLEMENTED`, bad
    /// arguments with `INVALID_ARGUMENT`.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawCommand = serde_json::from_str(json)
            .map_err(|e| CommandError::invalid_argument(format!("Malformed command: {}", e)))?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawCommand) -> Result<Self> {
        let RawCommand { method, args } = raw;
        let command = match method.as_str() {
            "getPlatformVersion" => Command::GetPlatformVersion,
            "bindToWiFiNetwork" => Command::BindToWiFiNetwork(decode(&method, args)?),
            "httpRequest" => Command::HttpRequest(decode(&method, args)?),
            "openSocket" => Command::OpenSocket(decode(&method, args)?),
            "sendSocket" => Command::SendSocket(decode(&method, args)?),
            "closeSocket" => Command::CloseSocket(decode(&method, args)?),
            _ => return Err(CommandError::not_implemented(&method)),
        };
        Ok(command)
    }

    pub fn method(&self) -> &'static str {
        match self {
            Command::GetPlatformVersion => "getPlatformVersion",
            Command::BindToWiFiNetwork(_) => "bindToWiFiNetwork",
            Command::HttpRequest(_) => "httpRequest",
            Command::OpenSocket(_) => "openSocket",
            Command::SendSocket(_) => "sendSocket",
            Command::CloseSocket(_) => "closeSocket",
        }
    }
}

fn decode<T: DeserializeOwned>(method: &str, args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| {
        CommandError::invalid_argument(format!("Invalid arguments for {}: {}", method, e))
    })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BindArgs {
    #[serde(default)]
    pub ssid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestArgs {
    #[serde(default)]
    pub request_id: Option<String>,
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: Option<HeaderList>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub connect_timeout: Option<u64>,
    #[serde(default)]
    pub read_timeout: Option<u64>,
    #[serde(default)]
    pub write_timeout: Option<u64>,
}

impl HttpRequestArgs {
    /// Fails with `UNSUPPORTED_METHOD` before anything touches the network.
    pub fn into_spec(self) -> Result<HttpRequestSpec> {
        let method: HttpMethod = self.method.parse()?;

        let mut builder = HttpRequestSpec::builder(self.url)
            .method(method)
            .headers(self.headers.unwrap_or_default().0);
        if let Some(id) = self.request_id {
            builder = builder.request_id(id);
        }
        if let Some(body) = self.body {
            builder = builder.body(Bytes::from(body));
        }
        if let Some(path) = self.file_path {
            builder = builder.file_path(path);
        }
        if let Some(ms) = self.connect_timeout {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.read_timeout {
            builder = builder.read_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.write_timeout {
            builder = builder.write_timeout(Duration::from_millis(ms));
        }
        Ok(builder.build())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSocketArgs {
    pub socket_id: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub connection_timeout_milliseconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendSocketArgs {
    pub socket_id: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketIdArgs {
    pub socket_id: String,
}

/// Request headers in the order the JSON object lists them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList(pub Vec<(String, String)>);

impl<'de> Deserialize<'de> for HeaderList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct HeaderVisitor;

        impl<'de> Visitor<'de> for HeaderVisitor {
            type Value = HeaderList;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of header names to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<HeaderList, A::Error> {
                let mut headers = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, value)) = map.next_entry::<String, String>()? {
                    if name.is_empty() {
                        return Err(de::Error::custom("header name cannot be empty"));
                    }
                    headers.push((name, value));
                }
                Ok(HeaderList(headers))
            }
        }

        deserializer.deserialize_map(HeaderVisitor)
    }
}

/// Reply to one command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandReply {
    Ok(Value),
    Error(CommandError),
}

impl From<Result<Value>> for CommandReply {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(value) => CommandReply::Ok(value),
            Err(error) => CommandReply::Error(error),
        }
    }
}

impl CommandReply {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"error":{{"code":"INTERNAL","message":"Failed to encode reply: {}","details":null}}}}"#,
                e.to_string().replace('"', "'")
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_decode_platform_version_with_or_without_args() {
        let command = Command::from_json(r#"{"method": "getPlatformVersion"}"#).unwrap();
        assert_eq!(command, Command::GetPlatformVersion);

        let command = Command::from_json(r#"{"method": "getPlatformVersion", "args": {}}"#).unwrap();
        assert_eq!(command.method(), "getPlatformVersion");
    }

    #[test]
    fn test_bind_without_ssid_decodes() {
        let command = Command::from_json(r#"{"method": "bindToWiFiNetwork", "args": {}}"#).unwrap();
        assert_eq!(command, Command::BindToWiFiNetwork(BindArgs { ssid: None }));
    }

    #[test]
    fn test_decode_open_socket() {
        let command = Command::from_json(
            r#"{"method": "openSocket", "args": {"socketId": "printer", "host": "10.0.0.5", "port": 9100}}"#,
        )
        .unwrap();

        assert_eq!(
            command,
            Command::OpenSocket(OpenSocketArgs {
                socket_id: "printer".to_string(),
                host: "10.0.0.5".to_string(),
                port: 9100,
                connection_timeout_milliseconds: None,
            })
        );
    }

    #[test]
    fn test_http_headers_keep_json_order() {
        let command = Command::from_json(
            r#"{"method": "httpRequest", "args": {
                "url": "http://cam.local/cmd",
                "method": "post",
                "headers": {"Z-Last": "1", "A-First": "2", "M-Middle": "3"},
                "body": "{}",
                "readTimeout": 2500
            }}"#,
        )
        .unwrap();

        let Command::HttpRequest(args) = command else {
            panic!("expected httpRequest");
        };
        let spec = args.into_spec().unwrap();

        let names: Vec<&str> = spec.headers.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["Z-Last", "A-First", "M-Middle"]);
        assert_eq!(spec.method, HttpMethod::Post);
        assert_eq!(spec.read_timeout, Some(Duration::from_millis(2500)));
        assert!(spec.connect_timeout.is_none());
        assert_eq!(spec.body.as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn test_unsupported_http_method() {
        let args = HttpRequestArgs {
            request_id: None,
            url: "http://a".to_string(),
            method: "patch".to_string(),
            headers: None,
            body: None,
            file_path: None,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
        };

        let err = args.into_spec().unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedMethod);
        assert_eq!(err.message, "HTTP method PATCH is not supported");
    }

    #[test]
    fn test_unknown_method() {
        let err = Command::from_json(r#"{"method": "scanNetworks", "args": {}}"#).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotImplemented);
    }

    #[test]
    fn test_bad_arguments() {
        let err = Command::from_json(r#"{"method": "sendSocket", "args": {"socketId": "s"}}"#)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);

        let err = Command::from_json("not json").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_reply_shapes() {
        assert_eq!(
            CommandReply::from(Ok(json!("printer"))).to_json(),
            r#"{"ok":"printer"}"#
        );

        let reply = CommandReply::from(Err(CommandError::not_implemented("x")));
        let value: Value = serde_json::from_str(&reply.to_json()).unwrap();
        assert_eq!(value["error"]["code"], "NOT_IMPLEMENTED");
        assert_eq!(value["error"]["details"], Value::Null);
    }
}

use std::error::Error as StdError;
use std::io;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use core_runtime::config::{BridgeConfig, HttpTimeouts};
use core_runtime::events::EventBus;
use core_runtime::logging::strip_path;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client, RequestBuilder, Response};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument, warn};

use super::request::HttpRequestSpec;
use super::response::{content_length, HttpResult, ResponseHeaders};
use super::upload::{StallWatch, UploadStream, UPLOAD_CHUNK_SIZE};
use crate::binder::BoundNetworkRegistry;
use crate::error::{HttpError, TransportErrorKind};
use crate::progress::{Direction, ProgressEmitter};

/// Executes one HTTP request per call.
///
/// A fresh client is built for every request so the bound network and the
/// request's timeouts are applied at connection time.
pub struct HttpEngine {
    registry: BoundNetworkRegistry,
    bus: EventBus,
    defaults: HttpTimeouts,
    progress_interval: Duration,
    user_agent: Option<String>,
}

impl HttpEngine {
    pub fn new(registry: BoundNetworkRegistry, bus: EventBus, config: &BridgeConfig) -> Self {
        Self {
            registry,
            bus,
            defaults: config.http_timeouts,
            progress_interval: config.progress_interval,
            user_agent: config.user_agent.clone(),
        }
    }

    /// Run `spec` to completion.
    ///
    /// Any response the server sends is a result; only transport and
    /// download failures are errors.
    #[instrument(
        skip(self, spec),
        fields(request_id = %spec.request_id, method = %spec.method)
    )]
    pub async fn execute(&self, spec: HttpRequestSpec) -> Result<HttpResult, HttpError> {
        let client = self.client_for(&spec)?;
        let method = spec.method.to_reqwest()?;

        let mut request = client.request(method, spec.url.as_str());
        for (name, value) in &spec.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        if spec.is_download() {
            return self.download(&spec, request).await;
        }

        let response = if spec.is_upload() {
            self.upload(&spec, request).await?
        } else {
            let request = match (&spec.method, &spec.body) {
                (method, Some(body)) if method.sends_body() => request.body(body.clone()),
                (method, None) if method.sends_body() => request.body(Bytes::new()),
                _ => request,
            };
            request.send().await.map_err(|e| classify(&e))?
        };

        let status_code = response.status().as_u16();
        let headers = ResponseHeaders::from(response.headers());
        let content_length = content_length(response.headers());
        let body = response.bytes().await.map_err(|e| classify(&e))?;

        debug!(status_code, bytes = body.len(), "HTTP request completed");
        Ok(HttpResult {
            status_code,
            body,
            content_length,
            headers,
            file_path: None,
        })
    }

    fn client_for(&self, spec: &HttpRequestSpec) -> Result<Client, HttpError> {
        let mut builder = Client::builder()
            .connect_timeout(spec.connect_timeout.unwrap_or(self.defaults.connect))
            .read_timeout(spec.read_timeout.unwrap_or(self.defaults.read))
            .no_proxy();

        if let Some(network) = self.registry.current() {
            debug!(network = %network, "Pinning request to bound network");
            builder = builder.local_address(network.local_addr);
        }
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        builder
            .build()
            .map_err(|e| HttpError::InvalidRequest(error_chain(&e)))
    }

    async fn upload(
        &self,
        spec: &HttpRequestSpec,
        request: RequestBuilder,
    ) -> Result<Response, HttpError> {
        let path = spec.file_path.as_deref().unwrap_or_else(|| Path::new(""));
        let file = File::open(path).await.map_err(upload_source_error)?;
        let total = file.metadata().await.map_err(upload_source_error)?.len();

        info!(file = %strip_path(&path.to_string_lossy()), total, "Uploading file");

        let mut emitter = ProgressEmitter::new(
            self.bus.clone(),
            spec.request_id.as_str(),
            Direction::Upload,
            total as i64,
            self.progress_interval,
        );
        if total == 0 {
            emitter.finish();
        }

        let write_timeout = spec.write_timeout.unwrap_or(self.defaults.write);
        let watch = StallWatch::new(write_timeout);
        let stream = UploadStream::new(
            ReaderStream::with_capacity(file, UPLOAD_CHUNK_SIZE),
            total,
            emitter,
            watch.clone(),
        );

        let mut request = request.body(Body::wrap_stream(stream));
        if spec.header(CONTENT_LENGTH.as_str()).is_none() {
            request = request.header(CONTENT_LENGTH, total);
        }
        if spec.header(CONTENT_TYPE.as_str()).is_none() {
            request = request.header(CONTENT_TYPE, "application/octet-stream");
        }

        tokio::select! {
            result = request.send() => result.map_err(|e| classify(&e)),
            _ = watch.stalled() => {
                warn!(timeout_ms = write_timeout.as_millis() as u64, "Upload stalled");
                Err(HttpError::transport(
                    TransportErrorKind::Timeout,
                    "WriteTimeout",
                    format!("Upload made no progress for {} ms", write_timeout.as_millis()),
                ))
            }
        }
    }

    async fn download(
        &self,
        spec: &HttpRequestSpec,
        request: RequestBuilder,
    ) -> Result<HttpResult, HttpError> {
        let path = spec.file_path.as_deref().unwrap_or_else(|| Path::new(""));

        let response = request.send().await.map_err(|e| classify(&e))?;
        let status_code = response.status().as_u16();
        let headers = ResponseHeaders::from(response.headers());
        let content_length = content_length(response.headers());

        let mut emitter = ProgressEmitter::new(
            self.bus.clone(),
            spec.request_id.as_str(),
            Direction::Download,
            content_length,
            self.progress_interval,
        );

        // The destination is created or truncated once the body starts.
        let mut file: Option<File> = None;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(download_error)?;
            if file.is_none() {
                file = Some(File::create(path).await.map_err(download_error)?);
            }
            if let Some(sink) = file.as_mut() {
                sink.write_all(&chunk).await.map_err(download_error)?;
            }
            emitter.on_bytes(chunk.len());
        }
        let mut file = match file {
            Some(file) => file,
            None => File::create(path).await.map_err(download_error)?,
        };
        file.flush().await.map_err(download_error)?;
        emitter.finish();

        info!(
            file = %strip_path(&path.to_string_lossy()),
            bytes = emitter.transferred(),
            status_code,
            "Download completed"
        );

        Ok(HttpResult {
            status_code,
            body: Bytes::new(),
            content_length,
            headers,
            file_path: Some(path.to_string_lossy().into_owned()),
        })
    }
}

fn upload_source_error(error: io::Error) -> HttpError {
    HttpError::transport(
        TransportErrorKind::Network,
        io_label(&error),
        error.to_string(),
    )
}

fn download_error<E: StdError>(error: E) -> HttpError {
    HttpError::Download(error_chain(&error))
}

/// Map a reqwest failure to its transport class.
pub(crate) fn classify(error: &reqwest::Error) -> HttpError {
    let message = error_chain(error);
    let timed_out = error.is_timeout() || find_io(error).map(|e| e.kind()) == Some(io::ErrorKind::TimedOut);
    let kind = kind_of(timed_out, error.is_connect(), &message);
    let label = find_io(error)
        .map(io_label)
        .unwrap_or_else(|| "reqwest::Error".to_string());

    HttpError::transport(kind, label, message)
}

fn kind_of(timed_out: bool, connect: bool, message: &str) -> TransportErrorKind {
    const DNS_MARKERS: &[&str] = &[
        "dns error",
        "failed to lookup address",
        "name or service not known",
        "nodename nor servname",
        "no such host",
        "temporary failure in name resolution",
    ];
    const TLS_MARKERS: &[&str] = &["certificate", "tls", "handshake", "invalid peer"];

    let lower = message.to_ascii_lowercase();
    if timed_out {
        TransportErrorKind::Timeout
    } else if DNS_MARKERS.iter().any(|m| lower.contains(m)) {
        TransportErrorKind::Dns
    } else if TLS_MARKERS.iter().any(|m| lower.contains(m)) {
        TransportErrorKind::Tls
    } else if connect {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Network
    }
}

fn find_io<'a>(error: &'a (dyn StdError + 'static)) -> Option<&'a io::Error> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = current {
        if let Some(io_error) = err.downcast_ref::<io::Error>() {
            return Some(io_error);
        }
        current = err.source();
    }
    None
}

fn io_label(error: &io::Error) -> String {
    format!("std::io::Error({:?})", error.kind())
}

/// `outer: inner: innermost`, skipping repeated messages.
fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(err) = source {
        let text = err.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = err.source();
    }
    message
}

impl std::fmt::Debug for HttpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEngine")
            .field("defaults", &self.defaults)
            .field("progress_interval", &self.progress_interval)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_of_timeout_wins() {
        assert_eq!(
            kind_of(true, true, "dns error: timed out"),
            TransportErrorKind::Timeout
        );
    }

    #[test]
    fn test_kind_of_dns_before_connect() {
        assert_eq!(
            kind_of(false, true, "error sending request: dns error: failed to lookup address information"),
            TransportErrorKind::Dns
        );
    }

    #[test]
    fn test_kind_of_tls() {
        assert_eq!(
            kind_of(false, true, "client error (Connect): invalid peer certificate: UnknownIssuer"),
            TransportErrorKind::Tls
        );
    }

    #[test]
    fn test_kind_of_connect_and_fallback() {
        assert_eq!(
            kind_of(false, true, "tcp connect error: Connection refused (os error 111)"),
            TransportErrorKind::Connect
        );
        assert_eq!(
            kind_of(false, false, "connection closed before message completed"),
            TransportErrorKind::Network
        );
    }

    #[test]
    fn test_error_chain_joins_sources() {
        let inner = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let outer = io::Error::new(io::ErrorKind::Other, inner);

        assert_eq!(error_chain(&outer), "denied");
        assert_eq!(io_label(&outer), "std::io::Error(Other)");
    }

    #[test]
    fn test_find_io_in_chain() {
        let error = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert_eq!(find_io(&error).map(|e| e.kind()), Some(io::ErrorKind::TimedOut));
    }
}

//! # Logging
//!
//! Installs the global `tracing` subscriber for the bridge: an [`EnvFilter`],
//! one `fmt` output layer and a [`LoggerSinkLayer`] that mirrors every event
//! passing the filter into the host's [`LoggerSink`] (Logcat, os_log).
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use bridge_traits::logger::{ConsoleLogger, LogLevel};
//! use std::sync::Arc;
//!
//! let config = LoggingConfig::default()
//!     .with_format(LogFormat::Compact)
//!     .with_level(LogLevel::Debug)
//!     .with_logger_sink(Arc::new(ConsoleLogger::default()));
//! init_logging(config)?;
//!
//! tracing::info!(socket_id = "printer", "Socket opened");
//! ```
//!
//! Fields mirrored to the sink are redacted unless `redact_pii` is turned off:
//! credentials become `[REDACTED]` and `path`/`file_path`/`file` keep only
//! their basename. The `fmt` layer prints fields as given, so call sites that
//! log header values or paths use [`redact_if_sensitive`] and [`strip_path`].

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use bridge_traits::logger::{LogEntry, LogLevel, LoggerSink};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::error::{Error, Result};

/// Crates whose events follow the configured level when no custom filter is set.
const BRIDGE_CRATES: &[&str] = &[
    "native_network",
    "core_runtime",
    "core_network",
    "core_service",
    "bridge_desktop",
];

/// HTTP and TLS internals, kept at `warn`.
const TRANSPORT_CRATES: &[&str] = &["h2", "hyper", "hyper_util", "reqwest", "rustls"];

/// Field names whose values never reach the host sink in clear text.
const SENSITIVE_FIELDS: &[&str] = &[
    "authorization",
    "cookie",
    "token",
    "secret",
    "password",
    "api_key",
    "bearer",
];

const REDACTED: &str = "[REDACTED]";

/// Output format of the `fmt` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, colored. Default in debug builds.
    Pretty,
    /// One JSON object per line. Default in release builds.
    Json,
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Level applied to the bridge crates.
    pub level: LogLevel,
    /// Full `EnvFilter` directive string, replacing the per-crate default.
    pub filter: Option<String>,
    pub redact_pii: bool,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    /// Log span open/close on the `fmt` layer and include spans in JSON.
    pub enable_spans: bool,
    pub display_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            redact_pii: true,
            logger_sink: None,
            enable_spans: false,
            display_target: true,
        }
    }
}

impl fmt::Debug for LoggingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingConfig")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("filter", &self.filter)
            .field("redact_pii", &self.redact_pii)
            .field("has_logger_sink", &self.logger_sink.is_some())
            .field("enable_spans", &self.enable_spans)
            .field("display_target", &self.display_target)
            .finish()
    }
}

impl LoggingConfig {
    pub fn with_format(self, format: LogFormat) -> Self {
        Self { format, ..self }
    }

    pub fn with_level(self, level: LogLevel) -> Self {
        Self { level, ..self }
    }

    pub fn with_filter(self, filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
            ..self
        }
    }

    pub fn with_pii_redaction(self, redact_pii: bool) -> Self {
        Self { redact_pii, ..self }
    }

    pub fn with_logger_sink(self, sink: Arc<dyn LoggerSink>) -> Self {
        Self {
            logger_sink: Some(sink),
            ..self
        }
    }

    pub fn with_spans(self, enable_spans: bool) -> Self {
        Self {
            enable_spans,
            ..self
        }
    }

    pub fn with_target(self, display_target: bool) -> Self {
        Self {
            display_target,
            ..self
        }
    }
}

/// Install the global subscriber.
///
/// Only the first call in a process succeeds; later calls fail with
/// `Error::Logging`.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;
    let mirror = LoggerSinkLayer::new(config.logger_sink.clone(), config.redact_pii);

    tracing_subscriber::registry()
        .with(output_layer(&config))
        .with(filter)
        .with(mirror)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

fn output_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let span_events = if config.enable_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };
    let base = tracing_subscriber::fmt::layer()
        .with_target(config.display_target)
        .with_span_events(span_events)
        .with_writer(io::stdout);

    match config.format {
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
        LogFormat::Json => base
            .json()
            .flatten_event(true)
            .with_current_span(config.enable_spans)
            .with_span_list(config.enable_spans)
            .boxed(),
    }
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directives = match &config.filter {
        Some(custom) => custom.clone(),
        None => {
            let level = config.level.as_str();
            BRIDGE_CRATES
                .iter()
                .map(|krate| format!("{krate}={level}"))
                .chain(TRANSPORT_CRATES.iter().map(|krate| format!("{krate}=warn")))
                .collect::<Vec<_>>()
                .join(",")
        }
    };

    EnvFilter::try_new(&directives)
        .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directives, e)))
}

/// Mirrors events into a host [`LoggerSink`].
///
/// Inside a Tokio runtime delivery is spawned; elsewhere it blocks the
/// logging thread until the sink returns.
struct LoggerSinkLayer {
    sink: Option<Arc<dyn LoggerSink>>,
    redact: bool,
}

impl LoggerSinkLayer {
    fn new(sink: Option<Arc<dyn LoggerSink>>, redact: bool) -> Self {
        Self { sink, redact }
    }

    fn entry_for(&self, event: &Event<'_>, level: LogLevel) -> LogEntry {
        let metadata = event.metadata();
        let mut fields = FieldCollector::default();
        event.record(&mut fields);

        let message = fields
            .message
            .take()
            .unwrap_or_else(|| metadata.name().to_owned());
        let mut entry = LogEntry::new(level, metadata.target(), message);
        entry.fields = if self.redact {
            fields
                .values
                .into_iter()
                .map(|(name, value)| {
                    let value = scrub(&name, value);
                    (name, value)
                })
                .collect()
        } else {
            fields.values
        };
        entry
    }
}

impl<S> Layer<S> for LoggerSinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(sink) = &self.sink else {
            return;
        };
        let level = log_level(*event.metadata().level());
        if level < sink.min_level() {
            return;
        }

        let mut entry = self.entry_for(event, level);
        entry.span_id = ctx.lookup_current().map(|span| span.name().to_owned());
        deliver(Arc::clone(sink), entry);
    }
}

fn deliver(sink: Arc<dyn LoggerSink>, entry: LogEntry) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                if let Err(e) = sink.log(entry).await {
                    eprintln!("host log sink rejected entry: {e}");
                }
            });
        }
        Err(_) => {
            if let Err(e) = futures::executor::block_on(sink.log(entry)) {
                eprintln!("host log sink rejected entry: {e}");
            }
        }
    }
}

fn scrub(name: &str, value: String) -> String {
    if matches!(name, "path" | "file_path" | "file") {
        strip_path(&value).to_owned()
    } else {
        redact_if_sensitive(name, &value)
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    values: HashMap<String, String>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name => {
                self.values.insert(name.to_owned(), value);
            }
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_owned());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, value.to_string());
    }

    // Numbers and bools land here; their Debug form is their plain value.
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }
}

fn log_level(level: Level) -> LogLevel {
    if level == Level::ERROR {
        LogLevel::Error
    } else if level == Level::WARN {
        LogLevel::Warn
    } else if level == Level::INFO {
        LogLevel::Info
    } else if level == Level::DEBUG {
        LogLevel::Debug
    } else {
        LogLevel::Trace
    }
}

/// Returns `[REDACTED]` for credential-bearing fields and headers, `value`
/// otherwise.
///
/// A field is sensitive when its name contains one of the known credential
/// names (`authorization`, `cookie`, `token`, ...) or when the value itself
/// carries a `Bearer`/`Basic` scheme.
///
/// ```ignore
/// for (name, value) in &spec.headers {
///     tracing::trace!(header = %name, value = %redact_if_sensitive(name, value), "Request header");
/// }
/// ```
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    let name = field_name.to_ascii_lowercase();
    if SENSITIVE_FIELDS.iter().any(|s| name.contains(s)) || carries_credentials(value) {
        REDACTED.to_owned()
    } else {
        value.to_owned()
    }
}

fn carries_credentials(value: &str) -> bool {
    let Some((scheme, _)) = value.split_once(' ') else {
        return false;
    };
    scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("basic")
}

/// Last component of a `/` or `\` separated path.
///
/// `strip_path("/sdcard/Download/firmware.bin")` is `"firmware.bin"`.
pub fn strip_path(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(sep) => &path[sep + 1..],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as SinkResult;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingSink {
        entries: Mutex<Vec<LogEntry>>,
    }

    #[async_trait]
    impl LoggerSink for CapturingSink {
        async fn log(&self, entry: LogEntry) -> SinkResult<()> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }

        fn min_level(&self) -> LogLevel {
            LogLevel::Debug
        }
    }

    fn mirrored(redact: bool) -> (Arc<CapturingSink>, impl Subscriber + Send + Sync) {
        let sink = Arc::new(CapturingSink::default());
        let as_sink: Arc<dyn LoggerSink> = sink.clone();
        let subscriber =
            tracing_subscriber::registry().with(LoggerSinkLayer::new(Some(as_sink), redact));
        (sink, subscriber)
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = LoggingConfig::default()
            .with_format(LogFormat::Json)
            .with_level(LogLevel::Debug)
            .with_pii_redaction(false)
            .with_filter("core_network=trace")
            .with_spans(true)
            .with_target(false);

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.filter.as_deref(), Some("core_network=trace"));
        assert!(!config.redact_pii);
        assert!(config.enable_spans);
        assert!(!config.display_target);
    }

    #[test]
    fn test_default_filter_keeps_transport_quiet() {
        let config = LoggingConfig::default().with_level(LogLevel::Debug);
        let filter = build_filter(&config).unwrap().to_string();

        assert!(filter.contains("core_network=debug"));
        assert!(filter.contains("core_service=debug"));
        assert!(filter.contains("reqwest=warn"));
        assert!(!filter.contains("reqwest=debug"));
    }

    #[test]
    fn test_custom_filter_replaces_default() {
        let config = LoggingConfig::default().with_filter("core_network=trace,hyper=debug");
        let filter = build_filter(&config).unwrap().to_string();

        assert!(filter.contains("core_network=trace"));
        assert!(!filter.contains("core_service"));
    }

    #[test]
    fn test_invalid_filter_is_config_error() {
        let config = LoggingConfig::default().with_filter("core_network=notalevel[");
        assert!(matches!(build_filter(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_scrub() {
        assert_eq!(scrub("path", "/tmp/upload/file.bin".into()), "file.bin");
        assert_eq!(scrub("authorization", "Bearer abc".into()), REDACTED);
        assert_eq!(scrub("socket_id", "printer".into()), "printer");
    }

    #[test]
    fn test_credential_scheme_detection() {
        assert!(carries_credentials("Bearer abc"));
        assert!(carries_credentials("basic dXNlcg=="));
        assert!(!carries_credentials("Bearer"));
        assert!(!carries_credentials("text/plain; charset=utf-8"));
    }

    #[test]
    fn test_event_is_mirrored_with_redaction() {
        let (sink, subscriber) = mirrored(true);
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::info!(
            target: "core_network::http",
            request_id = "r-1",
            bytes = 512u64,
            path = "/home/me/dump.bin",
            "Download finished"
        );

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.target, "core_network::http");
        assert_eq!(entry.message, "Download finished");
        assert_eq!(entry.fields["request_id"], "r-1");
        assert_eq!(entry.fields["bytes"], "512");
        assert_eq!(entry.fields["path"], "dump.bin");
    }

    #[test]
    fn test_redaction_can_be_disabled() {
        let (sink, subscriber) = mirrored(false);
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::warn!(path = "/home/me/dump.bin", "Kept verbatim");

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries[0].fields["path"], "/home/me/dump.bin");
    }

    #[test]
    fn test_events_below_sink_level_are_skipped() {
        let (sink, subscriber) = mirrored(true);
        let _guard = tracing::subscriber::set_default(subscriber);

        tracing::trace!("below the sink level");

        assert!(sink.entries.lock().unwrap().is_empty());
    }
}

//! Integration tests for the logging system

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::logger::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig,
};

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for RecordingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

// The global subscriber can be installed once per process, so everything that
// depends on it lives in this single test.
#[test]
fn test_init_logging_once_and_mirror_to_sink() {
    let sink = Arc::new(RecordingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Info)
        .with_logger_sink(sink.clone());

    init_logging(config).unwrap();

    tracing::info!(
        target: "core_network::socket",
        socket_id = "printer",
        authorization = "Bearer abc",
        "Socket opened"
    );
    tracing::debug!(target: "core_network::socket", "filtered out by level");

    {
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "Socket opened");
        assert_eq!(entries[0].fields.get("socket_id"), Some(&"printer".to_string()));
        assert_eq!(
            entries[0].fields.get("authorization"),
            Some(&"[REDACTED]".to_string())
        );
    }

    let second = init_logging(LoggingConfig::default());
    assert!(second.is_err());
}

#[test]
fn test_redaction_of_credentials() {
    assert_eq!(redact_if_sensitive("Authorization", "Bearer abc"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("Cookie", "session=1"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("access_token", "xyz"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("x-custom", "Basic dXNlcjpwYXNz"), "[REDACTED]");
}

#[test]
fn test_redaction_passes_normal_values() {
    assert_eq!(redact_if_sensitive("Content-Type", "text/plain"), "text/plain");
    assert_eq!(redact_if_sensitive("request_id", "r-42"), "r-42");
    assert_eq!(redact_if_sensitive("ssid", "Home"), "Home");
}

#[test]
fn test_path_stripping() {
    // Unix paths
    assert_eq!(strip_path("/sdcard/Download/firmware.bin"), "firmware.bin");

    // Windows paths
    assert_eq!(strip_path("C:\\Users\\me\\upload.dat"), "upload.dat");

    // Already basename
    assert_eq!(strip_path("upload.dat"), "upload.dat");

    // Edge cases
    assert_eq!(strip_path("/var/log/"), "");
    assert_eq!(strip_path(""), "");
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Json);
}

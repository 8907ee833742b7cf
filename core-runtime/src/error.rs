use thiserror::Error;

/// Failures of the bridge runtime: configuration, logging and task setup.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid bridge configuration: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// An operation that spawns tasks was called outside a Tokio runtime.
    #[error("No Tokio runtime available: {0}")]
    NoRuntime(String),
}

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

/// Failures reported by host platform adapters.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The platform service is missing or disabled (no Wi-Fi, no permission).
    #[error("Platform capability not available: {0}")]
    NotAvailable(String),

    /// A platform tool or API returned something unusable.
    #[error("Platform query failed: {0}")]
    QueryFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

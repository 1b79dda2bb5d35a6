//! Error types for the tus client

use thiserror::Error;

use crate::store::StoreError;
use crate::transport::TransportError;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, TusError>;

/// Client error type
#[derive(Error, Debug)]
pub enum TusError {
    #[error("Server at {url} does not support tus {client_version} (server supports: {server_versions})")]
    VersionMismatch {
        url: String,
        client_version: &'static str,
        server_versions: String,
    },

    #[error("Upload of {size} bytes is too large for server at {url}")]
    TooLarge { url: String, size: u64 },

    #[error("Upload offset {offset} does not match the server state of {url}")]
    Conflict { url: String, offset: u64 },

    #[error("No stored upload for fingerprint '{0}'")]
    NotFound(String),

    #[error("Unexpected status {status} from {method} {url}")]
    UnexpectedStatus {
        method: String,
        url: String,
        status: u16,
    },

    #[error("Invalid {header} header from {url}: {value:?}")]
    InvalidHeader {
        header: &'static str,
        url: String,
        value: String,
    },

    #[error("Invalid request header {name}: {value:?}")]
    InvalidRequestHeader { name: String, value: String },

    #[error("Invalid metadata key {0:?}: keys must be non-empty without spaces or commas")]
    InvalidMetadataKey(String),

    #[error("Upload was aborted")]
    Aborted,

    #[error("Resuming is not enabled")]
    ResumeNotEnabled,

    #[error("Upload has no fingerprint")]
    FingerprintNotSet,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TusError {
    /// Whether a caller-side retry (through a fresh resume) can succeed.
    ///
    /// The client itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Conflict { .. } => true,
            Self::UnexpectedStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether this error is a local abort rather than a failure
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

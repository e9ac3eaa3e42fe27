use livemap_transit::TransitError;

/// Broad failure classes. None of them is fatal: each is recovered locally
/// (skip, discard, fall back) and at worst leaves a stale map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Network,
    Validation,
    Cache,
    ConnectionQuality,
}

#[derive(Debug, thiserror::Error)]
pub enum LiveMapError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Stream closed: {0}")]
    StreamClosed(String),

    #[error("Invalid data: {0}")]
    Validation(#[from] TransitError),

    #[error("Malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection degraded: {0}")]
    Degraded(String),
}

impl LiveMapError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(_) | Self::Status { .. } | Self::StreamClosed(_) => {
                ErrorCategory::Network
            }
            Self::Validation(_) | Self::Decode(_) => ErrorCategory::Validation,
            Self::Cache(_) | Self::Io(_) => ErrorCategory::Cache,
            Self::Degraded(_) => ErrorCategory::ConnectionQuality,
        }
    }
}

pub type Result<T> = std::result::Result<T, LiveMapError>;

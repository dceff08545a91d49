//! Weather-specific error types.

use skycast_core::{NetworkError, ReqwestErrorExt};
use thiserror::Error;

/// Coarse classification used to decide whether a failure is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connect/read failures and retryable HTTP statuses
    TransientNetwork,
    /// Validation or programming errors; never retried
    Permanent,
    /// A single request exceeded its deadline
    Timeout,
    /// The surrounding poll was cancelled
    Cancelled,
    /// A retry loop gave up
    RetriesExhausted,
}

/// Failure of one provider fetch.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    TransientNetwork(String),

    #[error("Request failed: {0}")]
    Permanent(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TransientNetwork(_) => ErrorKind::TransientNetwork,
            Self::Permanent(_) => ErrorKind::Permanent,
            Self::Timeout => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
        }
    }

    /// True for a single timed-out request and for an exhausted retry loop.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout | Self::RetriesExhausted { .. })
    }

    /// The error that ended the last attempt, if this wraps one.
    pub fn last_error(&self) -> Option<&FetchError> {
        match self {
            Self::RetriesExhausted { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The failure's message without its category prefix.
    pub fn message(&self) -> String {
        match self {
            Self::TransientNetwork(message) | Self::Permanent(message) => message.clone(),
            other => other.to_string(),
        }
    }

    /// User-friendly error message for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::TransientNetwork(_) => "Weather service unreachable. Please try again.",
            Self::Permanent(_) => "Weather service rejected the request.",
            Self::Timeout | Self::RetriesExhausted { .. } => {
                "Weather service is not responding. Please try again later."
            }
            Self::Cancelled => "Weather update was cancelled.",
        }
    }
}

impl From<NetworkError> for FetchError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::Timeout => Self::Timeout,
            other if other.is_transient() => Self::TransientNetwork(other.to_string()),
            other => Self::Permanent(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        err.into_network_error().into()
    }
}

/// Failure of one enrichment task. Always contained by the orchestrator.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No data: {0}")]
    NoData(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_classification() {
        assert!(matches!(
            FetchError::from(NetworkError::Timeout),
            FetchError::Timeout
        ));
        assert!(matches!(
            FetchError::from(NetworkError::ConnectionFailed("reset".into())),
            FetchError::TransientNetwork(_)
        ));
        assert!(matches!(
            FetchError::from(NetworkError::ServerError {
                status: 503,
                message: "down".into()
            }),
            FetchError::TransientNetwork(_)
        ));
        assert!(matches!(
            FetchError::from(NetworkError::ServerError {
                status: 404,
                message: "missing".into()
            }),
            FetchError::Permanent(_)
        ));
        assert!(matches!(
            FetchError::from(NetworkError::InvalidResponse("html".into())),
            FetchError::Permanent(_)
        ));
    }

    #[test]
    fn test_exhausted_wraps_last_error() {
        let err = FetchError::RetriesExhausted {
            attempts: 3,
            source: Box::new(FetchError::TransientNetwork("reset".into())),
        };
        assert!(err.is_timeout());
        assert_eq!(err.kind(), ErrorKind::RetriesExhausted);
        assert!(err.to_string().contains("3 attempts"));
        assert!(matches!(
            err.last_error(),
            Some(FetchError::TransientNetwork(msg)) if msg == "reset"
        ));
    }

    #[test]
    fn test_message_drops_category_prefix() {
        let err = FetchError::Permanent("bad api key".into());
        assert_eq!(err.to_string(), "Request failed: bad api key");
        assert_eq!(err.message(), "bad api key");
        assert_eq!(FetchError::Timeout.message(), "Request timed out");

        let exhausted = FetchError::RetriesExhausted {
            attempts: 2,
            source: Box::new(FetchError::TransientNetwork("reset".into())),
        };
        assert!(exhausted.message().starts_with("Gave up after 2 attempts"));
    }

    #[test]
    fn test_user_messages() {
        assert!(FetchError::Timeout.user_message().contains("not responding"));
        assert!(FetchError::Cancelled.user_message().contains("cancelled"));
    }
}

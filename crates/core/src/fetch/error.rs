//! Error types for remote fetches

use thiserror::Error;

/// Errors raised while talking to a remote data source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request did not complete within the configured timeout
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// The remote host could not be reached
    #[error("Connection to {url} failed: {message}")]
    Connection { url: String, message: String },

    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The response body could not be decoded
    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// Any other request failure
    #[error("Request failed: {0}")]
    Request(String),
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

impl FetchError {
    /// Create a decode error
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Check if retrying the same request later may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Connection { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Decode { .. } => true,
            FetchError::Request(_) => false,
        }
    }

    /// Map a reqwest error onto the fetch taxonomy
    #[cfg(feature = "http-source")]
    pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if e.is_connect() {
            FetchError::Connection {
                url: url.to_string(),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            FetchError::decode(url, e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }
        } else {
            FetchError::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FetchError::Status {
            status: 503,
            url: "https://data.ny.gov/resource/kv7t-n8in.json".to_string(),
        };
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("data.ny.gov"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(
            FetchError::Timeout {
                url: "u".to_string()
            }
            .is_recoverable()
        );
        assert!(
            FetchError::Status {
                status: 429,
                url: "u".to_string()
            }
            .is_recoverable()
        );
        assert!(
            !FetchError::Status {
                status: 400,
                url: "u".to_string()
            }
            .is_recoverable()
        );
        assert!(!FetchError::Request("bad builder".to_string()).is_recoverable());
    }
}

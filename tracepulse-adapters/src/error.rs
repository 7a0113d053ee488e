//! Error types for adapters.

use thiserror::Error;

/// Errors that can occur when building or fetching from a source.
///
/// Fetch errors mean the source is unavailable for this cycle; callers
/// retry the same window on the next one. [`SourceError::Config`] is only
/// returned by builders and is not retryable.
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The store rejected the query.
    #[error("Query failed: {0}")]
    Query(String),

    /// A returned row did not have the expected shape.
    #[error("Failed to decode row: {0}")]
    Decode(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// Reading a local source failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source panicked while fetching.
    #[error("Source panicked: {0}")]
    Panicked(String),

    /// The source could not be constructed from its parameters.
    #[error("Invalid source configuration: {0}")]
    Config(String),
}

impl SourceError {
    /// Whether retrying the same window later can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SourceError::Config(_))
    }
}

#[cfg(feature = "clickhouse")]
impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else if err.is_connect() {
            SourceError::Connection(err.to_string())
        } else {
            SourceError::Http(err.to_string())
        }
    }
}

/// Why a raw log line could not be structured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The line has fewer than four whitespace-separated tokens.
    #[error("expected at least 4 tokens, found {0}")]
    TooFewTokens(usize),

    /// The leading two tokens are not a `%Y-%m-%d %H:%M:%S` timestamp.
    #[error("invalid timestamp '{0}'")]
    Timestamp(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_errors_are_retryable() {
        assert!(SourceError::Timeout.is_retryable());
        assert!(SourceError::Query("Code: 60".into()).is_retryable());
        assert!(SourceError::Panicked("boom".into()).is_retryable());
    }

    #[test]
    fn config_errors_are_not_retryable() {
        let err = SourceError::Config("endpoint must be an http(s) URL: ftp://x".into());
        assert!(!err.is_retryable());
    }
}

//! Error types for the engine.

use std::time::Duration;

use thiserror::Error;
use tracepulse_adapters::SourceError;

/// Errors raised by the scheduler.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine was given parameters it cannot run with.
    #[error("invalid engine configuration: {0}")]
    Configuration(String),

    /// The data source failed; the cycle's window is retried next time.
    #[error("data source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),

    /// The fetch phase of a cycle did not finish in time.
    #[error("cycle timed out after {0:?}")]
    CycleTimeout(Duration),
}

impl EngineError {
    /// Whether the failure only affects the current cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Configuration(_) => false,
            EngineError::SourceUnavailable(e) => e.is_retryable(),
            EngineError::CycleTimeout(_) => true,
        }
    }
}

/// A subscriber failed to handle a result.
///
/// Faults are isolated: the registry logs them and keeps delivering to the
/// remaining subscribers.
#[derive(Debug, Error)]
pub enum SubscriberError {
    /// The subscriber reported a failure.
    #[error("subscriber failed: {0}")]
    Failed(String),

    /// Writing the result out failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The result could not be serialized.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The subscriber panicked while handling the result.
    #[error("subscriber panicked: {0}")]
    Panicked(String),
}

impl SubscriberError {
    /// Convenience constructor for ad-hoc failures.
    pub fn failed(msg: impl Into<String>) -> Self {
        SubscriberError::Failed(msg.into())
    }
}

//! Built-in subscribers that write results out.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{debug, info};

use tracepulse_types::{AnalysisName, AnalysisResult};

use crate::{Subscriber, SubscriberError};

/// Output destination for analysis results.
///
/// Every variant is a [`Subscriber`]; wrap it in an `Arc` and register it.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tracepulse_engine::{Output, SubscriberRegistry};
///
/// let registry = SubscriberRegistry::new();
/// registry.register(Arc::new(Output::stdout()));
/// registry.register(Arc::new(Output::file("analytics.jsonl")));
/// ```
#[derive(Debug)]
pub enum Output {
    /// Print one JSON object per line to standard output.
    Stdout,

    /// Append newline-delimited JSON to a file.
    ///
    /// The file is created if missing and never truncated.
    File(PathBuf),

    /// Send results through a channel.
    ///
    /// Use `Output::channel()` to create this variant and get the receiver.
    Channel(mpsc::Sender<AnalysisResult>),

    /// Emit each result as a structured `tracing` event at info level.
    Log,
}

impl Output {
    /// Create a stdout output.
    pub fn stdout() -> Self {
        Output::Stdout
    }

    /// Create a file output.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Output::File(path.into())
    }

    /// Create a channel output and return both the output and receiver.
    ///
    /// Sending is best effort: when the channel is full the result is
    /// dropped rather than stalling the engine.
    ///
    /// # Example
    ///
    /// ```rust
    /// use tracepulse_engine::Output;
    ///
    /// let (output, mut rx) = Output::channel(16);
    ///
    /// // Later, receive results
    /// // while let Some(result) = rx.recv().await {
    /// //     println!("{} at {}", result.name, result.computed_at);
    /// // }
    /// ```
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<AnalysisResult>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Output::Channel(tx), rx)
    }

    /// Create a log output.
    pub fn log() -> Self {
        Output::Log
    }
}

impl Subscriber for Output {
    fn on_result(&self, name: AnalysisName, result: &AnalysisResult) -> Result<(), SubscriberError> {
        match self {
            Output::Stdout => {
                let json = serde_json::to_string(result)?;
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{}", json)?;
            }
            Output::File(path) => {
                let json = serde_json::to_string(result)?;
                let mut file = OpenOptions::new().create(true).append(true).open(path)?;
                writeln!(file, "{}", json)?;
            }
            Output::Channel(tx) => {
                if let Err(e) = tx.try_send(result.clone()) {
                    debug!(analysis = %name, error = %e, "dropping result for channel output");
                }
            }
            Output::Log => {
                let payload = serde_json::to_string(&result.payload)?;
                info!(analysis = %name, computed_at = %result.computed_at, %payload, "analysis result");
            }
        }
        Ok(())
    }
}

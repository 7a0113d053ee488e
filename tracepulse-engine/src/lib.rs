//! # tracepulse-engine
//!
//! Polling analytics over observability records.
//!
//! On a fixed cadence the engine fetches every record newer than its window
//! from a [`RecordSource`](tracepulse_adapters::RecordSource), computes a set
//! of latency, error and throughput analyses over the spans, and hands each
//! result to the registered subscribers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tracepulse_adapters::LogFileSource;
//! use tracepulse_engine::{Output, Scheduler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Poll a log file every 10 seconds (the default)
//!     let scheduler = Scheduler::builder()
//!         .source(Arc::new(LogFileSource::new("logs/app.log")))
//!         .build()?;
//!
//!     // Print every result as a JSON line
//!     scheduler.registry().register(Arc::new(Output::stdout()));
//!
//!     // Or react to results directly
//!     scheduler.registry().register_fn(|name, result| {
//!         eprintln!("{} updated at {}", name, result.computed_at);
//!     });
//!
//!     // Start background polling (non-blocking)
//!     let handle = scheduler.start();
//!
//!     // ... your application runs ...
//!     tokio::signal::ctrl_c().await?;
//!     handle.stop();
//!     handle.join().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Incremental**: each cycle only fetches what is newer than the last
//!   successful one; failed cycles are retried over the same range
//! - **Pure analyses**: every computation in [`analysis`] is a deterministic
//!   function of the batch
//! - **Isolated subscribers**: a failing or panicking subscriber never stops
//!   delivery to the others
//! - **Testable time**: inject a [`Clock`] and run under tokio's paused timer

pub mod analysis;
mod clock;
mod error;
mod output;
mod registry;
mod scheduler;
mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{EngineError, SubscriberError};
pub use output::Output;
pub use registry::{DispatchReport, Subscriber, SubscriberId, SubscriberRegistry};
pub use scheduler::{CycleReport, EngineConfig, Scheduler, SchedulerBuilder, SchedulerState, StreamHandle};
pub use window::{WindowTracker, DEFAULT_BACKFILL};

// Re-export types for convenience
pub use tracepulse_types::{AnalysisName, AnalysisPayload, AnalysisResult};

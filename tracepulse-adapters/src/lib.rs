//! # tracepulse-adapters
//!
//! Record sources for the tracepulse analytics engine.
//!
//! A source answers one question: "give me every record of this kind newer
//! than this instant". The engine asks it once per polling cycle for each
//! [`RecordKind`](tracepulse_types::RecordKind).
//!
//! ## Available Sources
//!
//! - **ClickHouse** (`clickhouse` feature) - Queries the tables written by the
//!   OpenTelemetry Collector's ClickHouse exporter over HTTP
//! - **Log file** - Structures an unstructured text log with [`LogLineParser`]
//!   and serves the lines that carry a response time as spans
//! - **Memory** - Records pushed in by the embedding process
//!
//! ## Quick Start (log file)
//!
//! ```rust,no_run
//! use chrono::{Duration, Utc};
//! use tracepulse_adapters::{LogFileSource, RecordSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = LogFileSource::new("logs/app.log");
//!
//!     let batch = source.fetch_batch(Utc::now() - Duration::hours(1)).await?;
//!
//!     println!("Fetched {} spans from {}", batch.traces.len(), source.description());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logfile;
pub mod logline;
pub mod source;

#[cfg(feature = "clickhouse")]
pub mod clickhouse;

pub use error::{ParseError, SourceError};
pub use logfile::LogFileSource;
pub use logline::LogLineParser;
pub use source::{MemorySource, RecordSource, SourceBatch};

#[cfg(feature = "clickhouse")]
pub use clickhouse::{ClickHouseSource, ClickHouseSourceBuilder};

//! # tracepulse
//!
//! Command-line front end for the tracepulse analytics engine.
//!
//! The binary polls a trace store (or an unstructured log file), computes
//! latency, error and throughput analyses over each new batch of spans and
//! streams the results as JSON lines. This library holds the pieces the
//! binary is built from so they can be reused and tested:
//!
//! - **[`config`]**: layered TOML + environment configuration
//! - **[`duration`]**: human-friendly interval parsing for the CLI
//! - **[`report`]**: the one-shot `--export` report
//!
//! ## Usage
//!
//! ```bash
//! # Stream analyses from ClickHouse every 10 seconds
//! tracepulse --config tracepulse.toml
//!
//! # Analyze an application log file every 5 seconds, appending to a file
//! tracepulse --log-file logs/app.log --interval 5s --output analytics.jsonl
//!
//! # Write a single report of the last hour and exit
//! tracepulse --export report.json
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use std::path::Path;
//! use tracepulse::config::AppConfig;
//! use tracepulse::report::export_report;
//! use tracepulse_adapters::LogFileSource;
//!
//! # tokio_test::block_on(async {
//! let config = AppConfig::load(Some(Path::new("tracepulse.toml"))).unwrap();
//! let engine = config.engine_config().unwrap();
//!
//! let source = LogFileSource::new("logs/app.log");
//! export_report(&source, &engine, Path::new("report.json")).await.unwrap();
//! # });
//! ```

pub mod config;
pub mod duration;
pub mod report;

pub use config::AppConfig;

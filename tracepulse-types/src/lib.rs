//! # tracepulse-types
//!
//! Core types shared by every tracepulse crate: the records a data source
//! returns and the analyses the engine publishes.
//!
//! ## Features
//!
//! - `serde`: serialization for every type (timestamps through chrono)
//!
//! ## Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use tracepulse_types::{SpanStatus, StructuredRecord};
//!
//! let mut record = StructuredRecord::new(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 2).unwrap());
//! record.endpoint = Some("/users/42".to_string());
//! record.status_code = Some(200);
//! record.response_time_ms = Some(150);
//!
//! let span = record.to_span().unwrap();
//! assert_eq!(span.duration_ms, 150.0);
//! assert_eq!(span.status, SpanStatus::Ok);
//! ```

mod analysis;
mod duration;
mod record;

pub use analysis::*;
pub use duration::*;
pub use record::*;

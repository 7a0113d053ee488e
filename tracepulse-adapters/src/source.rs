//! Data source abstraction for fetching time-bounded record slices.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use tracepulse_types::{LogRecord, MetricSample, RecordKind, Records, TraceSpan};

use crate::SourceError;

/// Trait for fetching observability records newer than a point in time.
///
/// Implementations return records ordered ascending by timestamp, with
/// durations already normalized to milliseconds. An empty result is not an
/// error. Any connectivity or query problem is reported as a
/// [`SourceError`] so the caller can retry the same range later.
#[async_trait]
pub trait RecordSource: Send + Sync + Debug {
    /// Fetch all records of `kind` with a timestamp at or after `since`.
    async fn fetch(&self, kind: RecordKind, since: DateTime<Utc>) -> Result<Records, SourceError>;

    /// Returns a human-readable description of the source.
    fn description(&self) -> &str;

    /// Fetch every record kind for one polling cycle.
    ///
    /// Stops at the first failing kind; a partial batch is never returned.
    async fn fetch_batch(&self, since: DateTime<Utc>) -> Result<SourceBatch, SourceError> {
        let mut batch = SourceBatch::default();
        for kind in RecordKind::ALL {
            match self.fetch(kind, since).await? {
                Records::Traces(spans) => batch.traces = spans,
                Records::Logs(logs) => batch.logs = logs,
                Records::Metrics(samples) => batch.metrics.extend(samples),
            }
        }
        Ok(batch)
    }
}

/// Everything fetched in one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceBatch {
    pub traces: Vec<TraceSpan>,
    pub logs: Vec<LogRecord>,
    /// Histogram, gauge and sum samples, in that order.
    pub metrics: Vec<MetricSample>,
}

impl SourceBatch {
    /// Total number of records across all kinds.
    pub fn len(&self) -> usize {
        self.traces.len() + self.logs.len() + self.metrics.len()
    }

    /// Whether nothing at all was fetched.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An in-memory record source.
///
/// Useful for embedding the engine in a process that already has records
/// at hand, and for tests.
///
/// # Example
///
/// ```rust
/// use tracepulse_adapters::{MemorySource, RecordSource};
///
/// let source = MemorySource::new("fixtures");
/// assert_eq!(source.description(), "memory: fixtures");
/// ```
#[derive(Debug)]
pub struct MemorySource {
    description: String,
    traces: RwLock<Vec<TraceSpan>>,
    logs: RwLock<Vec<LogRecord>>,
    metrics: RwLock<Vec<MetricSample>>,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new(name: &str) -> Self {
        Self {
            description: format!("memory: {}", name),
            traces: RwLock::new(Vec::new()),
            logs: RwLock::new(Vec::new()),
            metrics: RwLock::new(Vec::new()),
        }
    }

    /// Add spans.
    pub fn push_traces(&self, spans: impl IntoIterator<Item = TraceSpan>) {
        let mut traces = self.traces.write();
        traces.extend(spans);
        traces.sort_by_key(|s| s.timestamp);
    }

    /// Add log entries.
    pub fn push_logs(&self, entries: impl IntoIterator<Item = LogRecord>) {
        let mut logs = self.logs.write();
        logs.extend(entries);
        logs.sort_by_key(|l| l.timestamp);
    }

    /// Add metric samples.
    pub fn push_metrics(&self, samples: impl IntoIterator<Item = MetricSample>) {
        let mut metrics = self.metrics.write();
        metrics.extend(samples);
        metrics.sort_by_key(|m| m.time);
    }

    /// Drop every stored record.
    pub fn clear(&self) {
        self.traces.write().clear();
        self.logs.write().clear();
        self.metrics.write().clear();
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn fetch(&self, kind: RecordKind, since: DateTime<Utc>) -> Result<Records, SourceError> {
        let records = match kind {
            RecordKind::Traces => Records::Traces(
                self.traces
                    .read()
                    .iter()
                    .filter(|s| s.timestamp >= since)
                    .cloned()
                    .collect(),
            ),
            RecordKind::Logs => Records::Logs(
                self.logs
                    .read()
                    .iter()
                    .filter(|l| l.timestamp >= since)
                    .cloned()
                    .collect(),
            ),
            _ => {
                let wanted = kind.metric_kind();
                Records::Metrics(
                    self.metrics
                        .read()
                        .iter()
                        .filter(|m| Some(m.kind) == wanted && m.time >= since)
                        .cloned()
                        .collect(),
                )
            }
        };
        Ok(records)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

//! Observability records as they leave a data source.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};

/// A log line after structuring.
///
/// Only the timestamp is guaranteed. Every other field is present only when
/// the line actually carried it; nothing is filled with a default.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StructuredRecord {
    /// When the line was written.
    pub timestamp: DateTime<Utc>,
    /// Emitting service.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub service: Option<String>,
    /// Free text after the service token.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub message: Option<String>,
    /// HTTP status reported in the message.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub status_code: Option<u16>,
    /// Response time in milliseconds.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub response_time_ms: Option<u64>,
    /// HTTP method of a received request.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub http_method: Option<String>,
    /// Request path.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub endpoint: Option<String>,
    /// Address of the calling client.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub client_ip: Option<String>,
    /// Named identifiers found in the message (`userID`, `orderID`, ...).
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "BTreeMap::is_empty"))]
    pub extra: BTreeMap<String, String>,
}

impl StructuredRecord {
    /// Create a record carrying only a timestamp.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            service: None,
            message: None,
            status_code: None,
            response_time_ms: None,
            http_method: None,
            endpoint: None,
            client_ip: None,
            extra: BTreeMap::new(),
        }
    }

    /// Convert a timed record into a span so text logs can feed the analyses.
    ///
    /// Returns `None` when the record has no response time. A status code of
    /// 400 or above maps to [`SpanStatus::Error`], any other code to
    /// [`SpanStatus::Ok`], and a missing code to [`SpanStatus::Unset`].
    pub fn to_span(&self) -> Option<TraceSpan> {
        let duration_ms = self.response_time_ms? as f64;
        let status = match self.status_code {
            Some(code) if code >= 400 => SpanStatus::Error,
            Some(_) => SpanStatus::Ok,
            None => SpanStatus::Unset,
        };

        Some(TraceSpan {
            timestamp: self.timestamp,
            trace_id: String::new(),
            span_id: String::new(),
            span_name: self
                .endpoint
                .clone()
                .or_else(|| self.message.clone())
                .unwrap_or_default(),
            service_name: self.service.clone().unwrap_or_default(),
            duration_ms,
            status,
            status_message: self.message.clone().unwrap_or_default(),
        })
    }
}

/// Outcome recorded on a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpanStatus {
    /// No status was set by the instrumentation.
    #[default]
    Unset,
    /// Explicitly successful.
    Ok,
    /// Failed.
    Error,
}

impl SpanStatus {
    /// Interpret a status code string from the store.
    ///
    /// Accepts the OpenTelemetry enum names (`STATUS_CODE_OK`) as well as the
    /// short forms (`Ok`, `Unset`, `Error`), case-insensitively. An empty
    /// string is `Unset`. Anything unrecognized counts as an error.
    pub fn from_code(code: &str) -> Self {
        let code = code.trim();
        let short = code
            .strip_prefix("STATUS_CODE_")
            .or_else(|| code.strip_prefix("status_code_"))
            .unwrap_or(code);

        if short.is_empty() || short.eq_ignore_ascii_case("unset") {
            SpanStatus::Unset
        } else if short.eq_ignore_ascii_case("ok") {
            SpanStatus::Ok
        } else {
            SpanStatus::Error
        }
    }

    /// Whether this status counts as a failed request.
    pub fn is_error(&self) -> bool {
        !matches!(self, SpanStatus::Unset | SpanStatus::Ok)
    }

    /// Short display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Unset => "Unset",
            SpanStatus::Ok => "Ok",
            SpanStatus::Error => "Error",
        }
    }
}

impl fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single timed operation within a distributed trace.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TraceSpan {
    /// Span start time.
    pub timestamp: DateTime<Utc>,
    /// Trace the span belongs to.
    pub trace_id: String,
    /// Span identifier.
    pub span_id: String,
    /// Operation name, usually the endpoint.
    pub span_name: String,
    /// Service that produced the span.
    pub service_name: String,
    /// Duration in milliseconds, already normalized by the source.
    pub duration_ms: f64,
    /// Outcome of the operation.
    pub status: SpanStatus,
    /// Status description, often empty.
    pub status_message: String,
}

impl TraceSpan {
    /// Whether the span failed.
    pub fn is_error(&self) -> bool {
        self.status.is_error()
    }
}

/// A log entry from the store's log table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogRecord {
    /// When the entry was emitted.
    pub timestamp: DateTime<Utc>,
    /// Correlated trace, empty if none.
    pub trace_id: String,
    /// Correlated span, empty if none.
    pub span_id: String,
    /// Emitting service.
    pub service_name: String,
    /// Log body.
    pub body: String,
    /// Severity text (`INFO`, `ERROR`, ...).
    pub severity: String,
}

/// Which metric table a sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MetricKind {
    /// Bucketed distribution.
    Histogram,
    /// Point-in-time value.
    Gauge,
    /// Monotonic or delta sum.
    Sum,
}

/// The value carried by a metric sample.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum MetricValue {
    /// Histogram aggregate.
    Histogram {
        /// Sum of all observations.
        sum: f64,
        /// Number of observations.
        count: u64,
        /// Smallest observation.
        min: f64,
        /// Largest observation.
        max: f64,
    },
    /// Gauge or sum value.
    Scalar(f64),
}

/// A metric data point.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricSample {
    /// Sample time.
    pub time: DateTime<Utc>,
    /// Reporting service.
    pub service_name: String,
    /// Metric name.
    pub metric_name: String,
    /// Source table.
    pub kind: MetricKind,
    /// Sample value.
    pub value: MetricValue,
    /// Data point attributes.
    pub attributes: BTreeMap<String, String>,
}

/// A class of records a source can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum RecordKind {
    /// Trace spans.
    Traces,
    /// Log entries.
    Logs,
    /// Histogram metrics.
    Histogram,
    /// Gauge metrics.
    Gauge,
    /// Sum metrics.
    Sum,
}

impl RecordKind {
    /// Every kind, in the order a polling cycle fetches them.
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Traces,
        RecordKind::Logs,
        RecordKind::Histogram,
        RecordKind::Gauge,
        RecordKind::Sum,
    ];

    /// The metric table kind, if this is a metric kind.
    pub fn metric_kind(&self) -> Option<MetricKind> {
        match self {
            RecordKind::Histogram => Some(MetricKind::Histogram),
            RecordKind::Gauge => Some(MetricKind::Gauge),
            RecordKind::Sum => Some(MetricKind::Sum),
            RecordKind::Traces | RecordKind::Logs => None,
        }
    }

    /// An empty result of the right shape for this kind.
    pub fn empty(&self) -> Records {
        match self {
            RecordKind::Traces => Records::Traces(Vec::new()),
            RecordKind::Logs => Records::Logs(Vec::new()),
            _ => Records::Metrics(Vec::new()),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Traces => "traces",
            RecordKind::Logs => "logs",
            RecordKind::Histogram => "histogram",
            RecordKind::Gauge => "gauge",
            RecordKind::Sum => "sum",
        };
        f.write_str(name)
    }
}

/// Records returned by one fetch, ascending by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub enum Records {
    /// Trace spans.
    Traces(Vec<TraceSpan>),
    /// Log entries.
    Logs(Vec<LogRecord>),
    /// Metric samples of one kind.
    Metrics(Vec<MetricSample>),
}

impl Records {
    /// Number of records.
    pub fn len(&self) -> usize {
        match self {
            Records::Traces(v) => v.len(),
            Records::Logs(v) => v.len(),
            Records::Metrics(v) => v.len(),
        }
    }

    /// Whether the fetch returned nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the spans out, or an empty vec for any other shape.
    pub fn into_traces(self) -> Vec<TraceSpan> {
        match self {
            Records::Traces(v) => v,
            _ => Vec::new(),
        }
    }

    /// Take the log entries out, or an empty vec for any other shape.
    pub fn into_logs(self) -> Vec<LogRecord> {
        match self {
            Records::Logs(v) => v,
            _ => Vec::new(),
        }
    }

    /// Take the metric samples out, or an empty vec for any other shape.
    pub fn into_metrics(self) -> Vec<MetricSample> {
        match self {
            Records::Metrics(v) => v,
            _ => Vec::new(),
        }
    }
}

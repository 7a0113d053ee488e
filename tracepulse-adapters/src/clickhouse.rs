//! ClickHouse record source using the HTTP interface.
//!
//! Queries the tables written by the OpenTelemetry Collector's ClickHouse
//! exporter (`otel_traces`, `otel_logs`, `otel_metrics_*`), typically served
//! on port 8123. Results are requested as `JSONCompactEachRow`, so every row
//! is a JSON array in the fixed column order of its kind. The time columns
//! carry no timezone, so queries ask for ISO 8601 output, which ClickHouse
//! always renders in UTC regardless of the server timezone.
//!
//! | kind | columns |
//! |------|---------|
//! | traces | Timestamp, TraceId, SpanId, SpanName, ServiceName, Duration, StatusCode, StatusMessage |
//! | logs | Timestamp, TraceId, SpanId, ServiceName, Body, SeverityText |
//! | histogram | TimeUnix, ServiceName, MetricName, Sum, Count, Min, Max, Attributes |
//! | gauge / sum | TimeUnix, ServiceName, MetricName, Value, Attributes |
//!
//! ## Example
//!
//! ```rust,no_run
//! use chrono::{Duration, Utc};
//! use tracepulse_adapters::clickhouse::ClickHouseSource;
//! use tracepulse_adapters::RecordSource;
//! use tracepulse_types::RecordKind;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = ClickHouseSource::builder()
//!         .endpoint("http://localhost:8123")
//!         .database("otel")
//!         .credentials("default", "")
//!         .build()?;
//!
//!     let spans = source
//!         .fetch(RecordKind::Traces, Utc::now() - Duration::hours(1))
//!         .await?
//!         .into_traces();
//!
//!     println!("Fetched {} spans", spans.len());
//!     Ok(())
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use tracepulse_types::{
    DurationUnit, LogRecord, MetricKind, MetricSample, MetricValue, RecordKind, Records,
    SpanStatus, TraceSpan,
};

use crate::{RecordSource, SourceError};

/// Setting that makes `DateTime64` values come back as UTC `...Z` strings.
const ISO_OUTPUT: &str = "date_time_output_format = 'iso'";

/// Default `DateTime64` text format. Only accepted from UTC servers.
const CLICKHOUSE_DATETIME: &str = "%Y-%m-%d %H:%M:%S%.f";

/// ClickHouse source for trace, log and metric records.
#[derive(Debug, Clone)]
pub struct ClickHouseSource {
    client: Client,
    endpoint: String,
    database: String,
    username: String,
    password: String,
    duration_unit: DurationUnit,
    description: String,
}

impl ClickHouseSource {
    /// Create a new builder for configuring the source.
    pub fn builder() -> ClickHouseSourceBuilder {
        ClickHouseSourceBuilder::default()
    }

    /// Run a query and return its rows.
    async fn query_rows(&self, sql: &str) -> Result<Vec<Vec<Value>>, SourceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("database", self.database.as_str())])
            .basic_auth(&self.username, Some(&self.password))
            .body(sql.to_string())
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(SourceError::Auth("Invalid credentials".to_string()));
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(SourceError::Query(format!(
                "server returned status {}: {}",
                status,
                body.trim()
            )));
        }

        parse_rows(&body)
    }
}

#[async_trait]
impl RecordSource for ClickHouseSource {
    async fn fetch(&self, kind: RecordKind, since: DateTime<Utc>) -> Result<Records, SourceError> {
        let sql = query_for(kind, since);
        let rows = self.query_rows(&sql).await?;
        debug!(%kind, rows = rows.len(), "fetched rows");

        let records = match kind {
            RecordKind::Traces => Records::Traces(
                rows.iter()
                    .map(|row| decode_trace(row, self.duration_unit))
                    .collect::<Result<_, _>>()?,
            ),
            RecordKind::Logs => {
                Records::Logs(rows.iter().map(|row| decode_log(row)).collect::<Result<_, _>>()?)
            }
            RecordKind::Histogram => Records::Metrics(
                rows.iter()
                    .map(|row| decode_histogram(row))
                    .collect::<Result<_, _>>()?,
            ),
            RecordKind::Gauge | RecordKind::Sum => {
                let metric_kind = if kind == RecordKind::Gauge {
                    MetricKind::Gauge
                } else {
                    MetricKind::Sum
                };
                Records::Metrics(
                    rows.iter()
                        .map(|row| decode_scalar(row, metric_kind))
                        .collect::<Result<_, _>>()?,
                )
            }
        };
        Ok(records)
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Builder for ClickHouseSource.
#[derive(Debug, Default)]
pub struct ClickHouseSourceBuilder {
    endpoint: Option<String>,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    timeout: Option<Duration>,
    duration_unit: Option<DurationUnit>,
}

impl ClickHouseSourceBuilder {
    /// Set the HTTP endpoint (e.g., "http://localhost:8123").
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the database holding the OpenTelemetry tables (default: "otel").
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the username and password for authentication.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the unit of the `Duration` column (default: nanoseconds).
    pub fn duration_unit(mut self, unit: DurationUnit) -> Self {
        self.duration_unit = Some(unit);
        self
    }

    /// Build the source.
    pub fn build(self) -> Result<ClickHouseSource, SourceError> {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(10));
        if timeout.is_zero() {
            return Err(SourceError::Config("timeout must be greater than zero".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Config(e.to_string()))?;

        let endpoint = self
            .endpoint
            .unwrap_or_else(|| "http://localhost:8123".to_string())
            .trim_end_matches('/')
            .to_string();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(SourceError::Config(format!(
                "endpoint must be an http(s) URL: {}",
                endpoint
            )));
        }

        let database = self.database.unwrap_or_else(|| "otel".to_string());
        let description = format!("clickhouse: {}/{}", endpoint, database);

        Ok(ClickHouseSource {
            client,
            endpoint,
            database,
            username: self.username.unwrap_or_else(|| "default".to_string()),
            password: self.password.unwrap_or_default(),
            duration_unit: self.duration_unit.unwrap_or_default(),
            description,
        })
    }
}

/// Build the query for one record kind.
fn query_for(kind: RecordKind, since: DateTime<Utc>) -> String {
    let (columns, time_column, table) = match kind {
        RecordKind::Traces => (
            "Timestamp, TraceId, SpanId, SpanName, ServiceName, Duration, StatusCode, StatusMessage",
            "Timestamp",
            "otel_traces",
        ),
        RecordKind::Logs => (
            "Timestamp, TraceId, SpanId, ServiceName, Body, SeverityText",
            "Timestamp",
            "otel_logs",
        ),
        RecordKind::Histogram => (
            "TimeUnix, ServiceName, MetricName, Sum, Count, Min, Max, Attributes",
            "TimeUnix",
            "otel_metrics_histogram",
        ),
        RecordKind::Gauge => (
            "TimeUnix, ServiceName, MetricName, Value, Attributes",
            "TimeUnix",
            "otel_metrics_gauge",
        ),
        RecordKind::Sum => (
            "TimeUnix, ServiceName, MetricName, Value, Attributes",
            "TimeUnix",
            "otel_metrics_sum",
        ),
    };

    format!(
        "SELECT {columns} FROM {table} WHERE {time_column} >= toDateTime64('{since}', 9, 'UTC') \
         ORDER BY {time_column} SETTINGS {ISO_OUTPUT} FORMAT JSONCompactEachRow",
        since = since.format("%Y-%m-%d %H:%M:%S%.9f"),
    )
}

/// Split a `JSONCompactEachRow` body into rows.
fn parse_rows(body: &str) -> Result<Vec<Vec<Value>>, SourceError> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(|e| SourceError::Decode(e.to_string())))
        .collect()
}

fn column<'a>(row: &'a [Value], index: usize, name: &str) -> Result<&'a Value, SourceError> {
    row.get(index)
        .ok_or_else(|| SourceError::Decode(format!("missing column {} ({})", index, name)))
}

fn as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Numbers may be quoted: ClickHouse quotes 64-bit integers by default.
fn as_f64(value: &Value, name: &str) -> Result<f64, SourceError> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| SourceError::Decode(format!("{} is not a number: {}", name, value)))
}

fn as_u64(value: &Value, name: &str) -> Result<u64, SourceError> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| SourceError::Decode(format!("{} is not an unsigned integer: {}", name, value)))
}

fn as_timestamp(value: &Value, name: &str) -> Result<DateTime<Utc>, SourceError> {
    let parsed = match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, CLICKHOUSE_DATETIME)
                    .ok()
                    .map(|naive| Utc.from_utc_datetime(&naive))
            }),
        Value::Number(n) => n.as_f64().and_then(|secs| {
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9) as u32;
            DateTime::from_timestamp(whole as i64, nanos)
        }),
        _ => None,
    };
    parsed.ok_or_else(|| SourceError::Decode(format!("{} is not a timestamp: {}", name, value)))
}

fn as_attributes(value: &Value) -> BTreeMap<String, String> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), as_string(v))).collect(),
        _ => BTreeMap::new(),
    }
}

fn decode_trace(row: &[Value], unit: DurationUnit) -> Result<TraceSpan, SourceError> {
    Ok(TraceSpan {
        timestamp: as_timestamp(column(row, 0, "Timestamp")?, "Timestamp")?,
        trace_id: as_string(column(row, 1, "TraceId")?),
        span_id: as_string(column(row, 2, "SpanId")?),
        span_name: as_string(column(row, 3, "SpanName")?),
        service_name: as_string(column(row, 4, "ServiceName")?),
        duration_ms: unit.to_millis(as_f64(column(row, 5, "Duration")?, "Duration")?),
        status: SpanStatus::from_code(&as_string(column(row, 6, "StatusCode")?)),
        status_message: as_string(column(row, 7, "StatusMessage")?),
    })
}

fn decode_log(row: &[Value]) -> Result<LogRecord, SourceError> {
    Ok(LogRecord {
        timestamp: as_timestamp(column(row, 0, "Timestamp")?, "Timestamp")?,
        trace_id: as_string(column(row, 1, "TraceId")?),
        span_id: as_string(column(row, 2, "SpanId")?),
        service_name: as_string(column(row, 3, "ServiceName")?),
        body: as_string(column(row, 4, "Body")?),
        severity: as_string(column(row, 5, "SeverityText")?),
    })
}

fn decode_histogram(row: &[Value]) -> Result<MetricSample, SourceError> {
    Ok(MetricSample {
        time: as_timestamp(column(row, 0, "TimeUnix")?, "TimeUnix")?,
        service_name: as_string(column(row, 1, "ServiceName")?),
        metric_name: as_string(column(row, 2, "MetricName")?),
        kind: MetricKind::Histogram,
        value: MetricValue::Histogram {
            sum: as_f64(column(row, 3, "Sum")?, "Sum")?,
            count: as_u64(column(row, 4, "Count")?, "Count")?,
            min: as_f64(column(row, 5, "Min")?, "Min")?,
            max: as_f64(column(row, 6, "Max")?, "Max")?,
        },
        attributes: as_attributes(column(row, 7, "Attributes")?),
    })
}

fn decode_scalar(row: &[Value], kind: MetricKind) -> Result<MetricSample, SourceError> {
    Ok(MetricSample {
        time: as_timestamp(column(row, 0, "TimeUnix")?, "TimeUnix")?,
        service_name: as_string(column(row, 1, "ServiceName")?),
        metric_name: as_string(column(row, 2, "MetricName")?),
        kind,
        value: MetricValue::Scalar(as_f64(column(row, 3, "Value")?, "Value")?),
        attributes: as_attributes(column(row, 4, "Attributes")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use serde_json::json;

    #[test]
    fn test_builder_defaults() {
        let source = ClickHouseSource::builder().build().unwrap();
        assert_eq!(source.endpoint, "http://localhost:8123");
        assert_eq!(source.database, "otel");
        assert_eq!(source.username, "default");
        assert_eq!(source.password, "");
        assert_eq!(source.duration_unit, DurationUnit::Nanoseconds);
        assert_eq!(source.description(), "clickhouse: http://localhost:8123/otel");
    }

    #[test]
    fn test_builder_custom() {
        let source = ClickHouseSource::builder()
            .endpoint("http://clickhouse.local:8123/")
            .database("telemetry")
            .credentials("reader", "secret")
            .duration_unit(DurationUnit::Microseconds)
            .build()
            .unwrap();

        assert_eq!(source.endpoint, "http://clickhouse.local:8123");
        assert_eq!(source.database, "telemetry");
        assert_eq!(source.username, "reader");
        assert_eq!(source.password, "secret");
        assert_eq!(source.duration_unit, DurationUnit::Microseconds);
    }

    #[test]
    fn test_builder_rejects_bad_parameters() {
        let err = ClickHouseSource::builder()
            .endpoint("clickhouse:9000")
            .build()
            .unwrap_err();
        assert!(matches!(err, SourceError::Config(_)));

        let err = ClickHouseSource::builder()
            .timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, SourceError::Config(_)));
    }

    #[test]
    fn trace_query_shape() {
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let sql = query_for(RecordKind::Traces, since);
        assert!(sql.starts_with(
            "SELECT Timestamp, TraceId, SpanId, SpanName, ServiceName, Duration, StatusCode, StatusMessage FROM otel_traces"
        ));
        assert!(sql.contains("Timestamp >= toDateTime64('2024-01-01 09:00:00.000000000', 9, 'UTC')"));
        assert!(sql.contains("ORDER BY Timestamp SETTINGS date_time_output_format = 'iso'"));
        assert!(sql.ends_with("FORMAT JSONCompactEachRow"));
    }

    #[test]
    fn metric_queries_use_time_unix() {
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let sql = query_for(RecordKind::Gauge, since);
        assert!(sql.contains("FROM otel_metrics_gauge"));
        assert!(sql.contains("ORDER BY TimeUnix"));

        let sql = query_for(RecordKind::Histogram, since);
        assert!(sql.contains("Sum, Count, Min, Max, Attributes FROM otel_metrics_histogram"));

        for kind in RecordKind::ALL {
            assert!(query_for(kind, since).contains("SETTINGS date_time_output_format = 'iso'"));
        }
    }

    #[test]
    fn parse_rows_skips_blank_lines() {
        let body = "[\"a\",1]\n\n[\"b\",2]\n";
        let rows = parse_rows(body).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], json!("b"));
    }

    #[test]
    fn parse_rows_rejects_garbage() {
        let err = parse_rows("Code: 60. DB::Exception: Table otel.otel_traces does not exist").unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[test]
    fn decode_trace_normalizes_duration() {
        let row = vec![
            json!("2024-01-01 10:00:02.250000000"),
            json!("abc123"),
            json!("span1"),
            json!("GET /users/{id}"),
            json!("API-Gateway"),
            json!("150000000"),
            json!("STATUS_CODE_OK"),
            json!(""),
        ];

        let span = decode_trace(&row, DurationUnit::Nanoseconds).unwrap();
        assert_eq!(span.duration_ms, 150.0);
        assert_eq!(span.status, SpanStatus::Ok);
        assert_eq!(span.service_name, "API-Gateway");
        assert_eq!(span.timestamp.second(), 2);
        assert_eq!(span.timestamp.nanosecond(), 250_000_000);
    }

    #[test]
    fn iso_timestamps_keep_their_utc_instant() {
        let ts = as_timestamp(&json!("2024-01-01T09:00:00.123456789Z"), "Timestamp").unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        assert_eq!(ts, expected);

        let ts = as_timestamp(&json!("2024-01-01T10:00:00+01:00"), "Timestamp").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn decode_trace_accepts_unquoted_numbers() {
        let row = vec![
            json!("2024-01-01T10:00:02Z"),
            json!("abc123"),
            json!("span1"),
            json!("checkout"),
            json!("Order-Service"),
            json!(2500),
            json!("STATUS_CODE_ERROR"),
            json!("out of stock"),
        ];

        let span = decode_trace(&row, DurationUnit::Microseconds).unwrap();
        assert_eq!(span.duration_ms, 2.5);
        assert!(span.is_error());
        assert_eq!(span.status_message, "out of stock");
    }

    #[test]
    fn decode_trace_missing_column() {
        let row = vec![json!("2024-01-01 10:00:02"), json!("abc")];
        let err = decode_trace(&row, DurationUnit::Nanoseconds).unwrap_err();
        assert!(err.to_string().contains("SpanId"));
    }

    #[test]
    fn decode_log_row() {
        let row = vec![
            json!("2024-01-01 10:00:02"),
            json!(""),
            json!(""),
            json!("Auth-Service"),
            json!("token validation failed: Expired token"),
            json!("WARN"),
        ];

        let log = decode_log(&row).unwrap();
        assert_eq!(log.service_name, "Auth-Service");
        assert_eq!(log.severity, "WARN");
    }

    #[test]
    fn decode_metric_rows() {
        let histogram = vec![
            json!("2024-01-01 10:00:00"),
            json!("API-Gateway"),
            json!("http.server.duration"),
            json!(1234.5),
            json!("10"),
            json!(12.0),
            json!(480.0),
            json!({"http.route": "/users/{id}"}),
        ];
        let sample = decode_histogram(&histogram).unwrap();
        assert_eq!(
            sample.value,
            MetricValue::Histogram {
                sum: 1234.5,
                count: 10,
                min: 12.0,
                max: 480.0
            }
        );
        assert_eq!(sample.attributes["http.route"], "/users/{id}");

        let gauge = vec![
            json!("2024-01-01 10:00:00"),
            json!("API-Gateway"),
            json!("process.cpu.utilization"),
            json!(0.42),
            json!({}),
        ];
        let sample = decode_scalar(&gauge, MetricKind::Gauge).unwrap();
        assert_eq!(sample.kind, MetricKind::Gauge);
        assert_eq!(sample.value, MetricValue::Scalar(0.42));
        assert!(sample.attributes.is_empty());
    }

    #[test]
    fn bad_timestamp_is_a_decode_error() {
        let err = as_timestamp(&json!("yesterday"), "Timestamp").unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }
}

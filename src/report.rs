//! One-shot analytics report.
//!
//! Besides the regular analyses, the report compares average latency with
//! the period of the same length just before the window and lists the
//! failing endpoints.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::info;

use tracepulse_adapters::{RecordSource, SourceBatch};
use tracepulse_engine::analysis::{analysis_set, analyze};
use tracepulse_engine::{EngineConfig, EngineError, WindowTracker};
use tracepulse_types::TraceSpan;

/// Relative change in average latency below which the trend is stable.
const TREND_THRESHOLD_PCT: f64 = 5.0;

/// Direction of average latency against the previous period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// Average latency compared with the previous period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyTrend {
    pub direction: TrendDirection,
    /// Percent change; zero when there is nothing to compare with.
    pub percentage: f64,
    pub avg: Option<f64>,
    pub previous_avg: Option<f64>,
}

/// Failed spans of one endpoint and status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRow {
    pub endpoint: String,
    pub status: String,
    pub error_count: usize,
}

fn mean_duration(spans: &[TraceSpan]) -> Option<f64> {
    if spans.is_empty() {
        return None;
    }
    Some(spans.iter().map(|s| s.duration_ms).sum::<f64>() / spans.len() as f64)
}

/// Compare average latency of `current` with `previous`.
pub fn latency_trend(current: &[TraceSpan], previous: &[TraceSpan]) -> LatencyTrend {
    let avg = mean_duration(current);
    let previous_avg = mean_duration(previous);

    let percentage = match (avg, previous_avg) {
        (Some(avg), Some(prev)) if prev > 0.0 => (avg - prev) / prev * 100.0,
        _ => 0.0,
    };
    let direction = if percentage > TREND_THRESHOLD_PCT {
        TrendDirection::Increasing
    } else if percentage < -TREND_THRESHOLD_PCT {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    LatencyTrend {
        direction,
        percentage,
        avg,
        previous_avg,
    }
}

/// Count failed spans per endpoint and status, most errors first.
pub fn error_table(spans: &[TraceSpan]) -> Vec<ErrorRow> {
    let mut counts: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for span in spans.iter().filter(|s| s.is_error()) {
        *counts
            .entry((span.span_name.as_str(), span.status.as_str()))
            .or_default() += 1;
    }

    let mut rows: Vec<ErrorRow> = counts
        .into_iter()
        .map(|((endpoint, status), error_count)| ErrorRow {
            endpoint: endpoint.to_string(),
            status: status.to_string(),
            error_count,
        })
        .collect();
    rows.sort_by(|a, b| b.error_count.cmp(&a.error_count));
    rows
}

/// Split a batch fetched from before `since` into the window itself and the
/// spans that precede it.
fn split_at(batch: SourceBatch, since: DateTime<Utc>) -> (SourceBatch, Vec<TraceSpan>) {
    let (traces, previous): (Vec<TraceSpan>, Vec<TraceSpan>) = batch
        .traces
        .into_iter()
        .partition(|span| span.timestamp >= since);

    let current = SourceBatch {
        traces,
        logs: batch.logs.into_iter().filter(|l| l.timestamp >= since).collect(),
        metrics: batch.metrics.into_iter().filter(|m| m.time >= since).collect(),
    };
    (current, previous)
}

/// Build a report covering every analysis, extended ones included.
///
/// `previous` holds the spans of the period before `since`, used for the
/// latency trend.
pub fn build_report(
    source: &str,
    since: DateTime<Utc>,
    generated_at: DateTime<Utc>,
    batch: &SourceBatch,
    previous: &[TraceSpan],
) -> Result<Value> {
    let mut report = Map::new();

    report.insert(
        "summary".to_string(),
        json!({
            "source": source,
            "since": since,
            "generated_at": generated_at,
            "traces": batch.traces.len(),
            "logs": batch.logs.len(),
            "metrics": batch.metrics.len(),
        }),
    );

    let mut analyses = Map::new();
    for result in analyze(&batch.traces, &analysis_set(true), generated_at) {
        analyses.insert(result.name.to_string(), serde_json::to_value(&result.payload)?);
    }
    report.insert("analyses".to_string(), Value::Object(analyses));

    report.insert(
        "trend".to_string(),
        serde_json::to_value(latency_trend(&batch.traces, previous))?,
    );
    report.insert(
        "error_table".to_string(),
        serde_json::to_value(error_table(&batch.traces))?,
    );

    Ok(Value::Object(report))
}

/// Fetch the backfill window, plus one more for the trend, and write a
/// pretty JSON report.
pub async fn export_report(source: &dyn RecordSource, engine: &EngineConfig, path: &Path) -> Result<()> {
    let now = Utc::now();
    let since = WindowTracker::with_backfill(now, engine.backfill).current();
    let previous_since = WindowTracker::with_backfill(since, engine.backfill).current();

    let batch = tokio::time::timeout(engine.cycle_timeout, source.fetch_batch(previous_since))
        .await
        .map_err(|_| EngineError::CycleTimeout(engine.cycle_timeout))?
        .map_err(EngineError::from)?;
    let (batch, previous) = split_at(batch, since);

    let report = build_report(source.description(), since, now, &batch, &previous)?;
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    info!(
        path = %path.display(),
        spans = batch.traces.len(),
        previous_spans = previous.len(),
        "exported report"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::time::Duration as StdDuration;
    use tempfile::tempdir;
    use tracepulse_adapters::MemorySource;
    use tracepulse_types::SpanStatus;

    fn span(ts: DateTime<Utc>, name: &str, duration_ms: f64, status: SpanStatus) -> TraceSpan {
        TraceSpan {
            timestamp: ts,
            trace_id: "t".to_string(),
            span_id: "s".to_string(),
            span_name: name.to_string(),
            service_name: "api".to_string(),
            duration_ms,
            status,
            status_message: String::new(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_report_contains_every_analysis() {
        let t0 = t0();
        let batch = SourceBatch {
            traces: vec![
                span(t0, "/users", 100.0, SpanStatus::Ok),
                span(t0 + Duration::seconds(1), "/users", 200.0, SpanStatus::Ok),
                span(t0 + Duration::seconds(2), "/orders", 300.0, SpanStatus::Error),
            ],
            ..SourceBatch::default()
        };

        let report = build_report("memory: test", t0, t0 + Duration::minutes(1), &batch, &[]).unwrap();

        assert_eq!(report["summary"]["traces"], 3);
        assert_eq!(report["summary"]["source"], "memory: test");

        let analyses = report["analyses"].as_object().unwrap();
        assert_eq!(analyses.len(), 6);
        assert_eq!(analyses["response_time"]["avg"], 200.0);
        assert_eq!(analyses["error_rate"]["total_errors"], 1);
        assert_eq!(analyses["endpoint_performance"]["data"][0]["endpoint"], "/users");
        assert_eq!(
            analyses["response_time_distribution"]["data"].as_array().unwrap().len(),
            20
        );

        assert_eq!(report["trend"]["direction"], "stable");
        assert_eq!(report["trend"]["previous_avg"], Value::Null);
        assert_eq!(report["error_table"][0]["endpoint"], "/orders");
        assert_eq!(report["error_table"][0]["status"], "Error");
        assert_eq!(report["error_table"][0]["error_count"], 1);
    }

    #[test]
    fn test_trend_direction() {
        let previous = [span(t0(), "/a", 100.0, SpanStatus::Ok)];

        let slower = latency_trend(&[span(t0(), "/a", 150.0, SpanStatus::Ok)], &previous);
        assert_eq!(slower.direction, TrendDirection::Increasing);
        assert!((slower.percentage - 50.0).abs() < 1e-9);

        let faster = latency_trend(&[span(t0(), "/a", 80.0, SpanStatus::Ok)], &previous);
        assert_eq!(faster.direction, TrendDirection::Decreasing);

        // Within five percent either way is stable.
        let same = latency_trend(&[span(t0(), "/a", 104.0, SpanStatus::Ok)], &previous);
        assert_eq!(same.direction, TrendDirection::Stable);
        assert_eq!(same.previous_avg, Some(100.0));
    }

    #[test]
    fn test_trend_without_history_is_stable() {
        let trend = latency_trend(&[span(t0(), "/a", 150.0, SpanStatus::Ok)], &[]);
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert_eq!(trend.percentage, 0.0);
        assert_eq!(trend.avg, Some(150.0));

        let zero = latency_trend(
            &[span(t0(), "/a", 150.0, SpanStatus::Ok)],
            &[span(t0(), "/a", 0.0, SpanStatus::Ok)],
        );
        assert_eq!(zero.direction, TrendDirection::Stable);
    }

    #[test]
    fn test_error_table_orders_by_count() {
        let spans = [
            span(t0(), "/pay", 10.0, SpanStatus::Error),
            span(t0(), "/cart", 10.0, SpanStatus::Error),
            span(t0(), "/pay", 10.0, SpanStatus::Error),
            span(t0(), "/pay", 10.0, SpanStatus::Ok),
            span(t0(), "/home", 10.0, SpanStatus::Unset),
        ];

        let table = error_table(&spans);
        assert_eq!(
            table,
            vec![
                ErrorRow {
                    endpoint: "/pay".to_string(),
                    status: "Error".to_string(),
                    error_count: 2,
                },
                ErrorRow {
                    endpoint: "/cart".to_string(),
                    status: "Error".to_string(),
                    error_count: 1,
                },
            ]
        );
    }

    #[test]
    fn test_split_keeps_previous_spans_out_of_the_window() {
        let since = t0();
        let batch = SourceBatch {
            traces: vec![
                span(since - Duration::minutes(30), "/old", 10.0, SpanStatus::Ok),
                span(since, "/new", 20.0, SpanStatus::Ok),
            ],
            ..SourceBatch::default()
        };

        let (current, previous) = split_at(batch, since);
        assert_eq!(current.traces.len(), 1);
        assert_eq!(current.traces[0].span_name, "/new");
        assert_eq!(previous.len(), 1);
        assert_eq!(previous[0].span_name, "/old");
    }

    #[tokio::test]
    async fn test_export_writes_pretty_json() {
        let now = Utc::now();
        let source = MemorySource::new("export");
        source.push_traces([
            span(now - Duration::minutes(15), "/users", 30.0, SpanStatus::Ok),
            span(now, "/users", 42.0, SpanStatus::Ok),
        ]);

        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let engine = EngineConfig {
            backfill: StdDuration::from_secs(600),
            ..EngineConfig::default()
        };

        export_report(&source, &engine, &path).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains('\n'));
        let report: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(report["analyses"]["request_volume"]["total_requests"], 1);
        assert_eq!(report["trend"]["previous_avg"], 30.0);
        assert_eq!(report["trend"]["direction"], "increasing");
    }
}

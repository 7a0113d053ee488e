//! Derived metrics over a batch of spans.
//!
//! Every function here is pure: it reads an immutable slice of spans and
//! returns a payload. An empty slice yields the payload's zero value, and
//! running a function twice over the same slice yields identical output.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use tracepulse_types::{
    AnalysisName, AnalysisPayload, AnalysisResult, DistributionAnalysis, DistributionBucket,
    EndpointPerformanceAnalysis, EndpointStats, ErrorRateAnalysis, ErrorRateBucket,
    RequestVolumeAnalysis, ResponseTimeAnalysis, ResponseTimeBucket, ServicePerformanceAnalysis,
    ServiceStats, SpanStatus, TraceSpan, VolumeBucket,
};

/// Number of bins in the response time histogram.
pub const DEFAULT_DISTRIBUTION_BUCKETS: usize = 20;

/// Start of the minute containing `ts`.
pub fn floor_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp().div_euclid(60) * 60;
    DateTime::from_timestamp(secs, 0).unwrap_or(ts)
}

/// Percentile of already sorted values, `q` in `0.0..=1.0`.
///
/// Interpolates linearly between the two closest ranks.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let weight = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * weight
        }
    }
}

/// Summary statistics of a set of durations.
#[derive(Debug, Default)]
struct Summary {
    sorted: Vec<f64>,
    sum: f64,
}

impl Summary {
    fn new(mut values: Vec<f64>) -> Self {
        values.sort_by(f64::total_cmp);
        let sum = values.iter().sum();
        Self { sorted: values, sum }
    }

    fn count(&self) -> u64 {
        self.sorted.len() as u64
    }

    fn avg(&self) -> f64 {
        if self.sorted.is_empty() {
            0.0
        } else {
            self.sum / self.sorted.len() as f64
        }
    }

    fn min(&self) -> f64 {
        self.sorted.first().copied().unwrap_or(0.0)
    }

    fn max(&self) -> f64 {
        self.sorted.last().copied().unwrap_or(0.0)
    }

    fn percentile(&self, q: f64) -> f64 {
        percentile(&self.sorted, q)
    }

    /// Population standard deviation.
    fn std_dev(&self) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        let mean = self.avg();
        let variance = self
            .sorted
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / self.sorted.len() as f64;
        variance.sqrt()
    }
}

fn by_minute(spans: &[TraceSpan]) -> BTreeMap<DateTime<Utc>, Vec<&TraceSpan>> {
    let mut buckets: BTreeMap<DateTime<Utc>, Vec<&TraceSpan>> = BTreeMap::new();
    for span in spans {
        buckets.entry(floor_minute(span.timestamp)).or_default().push(span);
    }
    buckets
}

fn durations<'a>(spans: impl IntoIterator<Item = &'a TraceSpan>) -> Vec<f64> {
    spans.into_iter().map(|s| s.duration_ms).collect()
}

fn rate(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Latency per minute and over the whole batch.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use tracepulse_engine::analysis::response_time;
/// use tracepulse_types::{SpanStatus, TraceSpan};
///
/// let spans: Vec<TraceSpan> = [100.0, 200.0, 300.0]
///     .into_iter()
///     .map(|duration_ms| TraceSpan {
///         timestamp: Utc::now(),
///         trace_id: String::new(),
///         span_id: String::new(),
///         span_name: "/users".to_string(),
///         service_name: "api".to_string(),
///         duration_ms,
///         status: SpanStatus::Ok,
///         status_message: String::new(),
///     })
///     .collect();
///
/// assert_eq!(response_time(&spans).avg, 200.0);
/// ```
pub fn response_time(spans: &[TraceSpan]) -> ResponseTimeAnalysis {
    if spans.is_empty() {
        return ResponseTimeAnalysis::default();
    }

    let data = by_minute(spans)
        .into_iter()
        .map(|(minute, bucket)| {
            let summary = Summary::new(durations(bucket));
            ResponseTimeBucket {
                minute,
                avg_duration: summary.avg(),
                max_duration: summary.max(),
                min_duration: summary.min(),
                count: summary.count(),
            }
        })
        .collect();

    let overall = Summary::new(durations(spans));
    ResponseTimeAnalysis {
        data,
        avg: overall.avg(),
        max: overall.max(),
        min: overall.min(),
        p95: overall.percentile(0.95),
        p99: overall.percentile(0.99),
        std_dev: overall.std_dev(),
    }
}

/// Share of spans whose status is an error.
pub fn error_rate(spans: &[TraceSpan]) -> ErrorRateAnalysis {
    if spans.is_empty() {
        return ErrorRateAnalysis::default();
    }

    let data = by_minute(spans)
        .into_iter()
        .map(|(minute, bucket)| {
            let total_count = bucket.len() as u64;
            let error_count = bucket.iter().filter(|s| s.is_error()).count() as u64;
            ErrorRateBucket {
                minute,
                error_count,
                total_count,
                error_rate: rate(error_count, total_count),
            }
        })
        .collect();

    let total_requests = spans.len() as u64;
    let total_errors = spans.iter().filter(|s| s.is_error()).count() as u64;
    ErrorRateAnalysis {
        data,
        error_rate: rate(total_errors, total_requests),
        total_requests,
        total_errors,
    }
}

/// Request counts per minute and the average rate over the batch.
///
/// The rate divides by the time covered by the batch in minutes, never by
/// less than one minute.
pub fn request_volume(spans: &[TraceSpan]) -> RequestVolumeAnalysis {
    let (Some(first), Some(last)) = (
        spans.iter().map(|s| s.timestamp).min(),
        spans.iter().map(|s| s.timestamp).max(),
    ) else {
        return RequestVolumeAnalysis::default();
    };

    let data = by_minute(spans)
        .into_iter()
        .map(|(minute, bucket)| VolumeBucket {
            minute,
            count: bucket.len() as u64,
        })
        .collect();

    let total_requests = spans.len() as u64;
    let span_minutes = (last - first).num_milliseconds() as f64 / 60_000.0;
    RequestVolumeAnalysis {
        data,
        total_requests,
        req_per_minute: total_requests as f64 / span_minutes.max(1.0),
    }
}

/// Latency per service, ordered by service name.
pub fn service_performance(spans: &[TraceSpan]) -> ServicePerformanceAnalysis {
    let mut services: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for span in spans {
        services
            .entry(span.service_name.as_str())
            .or_default()
            .push(span.duration_ms);
    }

    let data = services
        .into_iter()
        .map(|(service_name, values)| {
            let summary = Summary::new(values);
            ServiceStats {
                service_name: service_name.to_string(),
                avg_duration: summary.avg(),
                max_duration: summary.max(),
                min_duration: summary.min(),
                count: summary.count(),
                p95: summary.percentile(0.95),
            }
        })
        .collect();

    ServicePerformanceAnalysis { data }
}

/// Equal-width histogram of durations.
///
/// A batch where every span has the same duration gets a range widened by
/// 10% on each side (or `[0, 1]` for zero) so the bins have a width.
pub fn response_time_distribution(spans: &[TraceSpan], buckets: usize) -> DistributionAnalysis {
    if spans.is_empty() {
        return DistributionAnalysis::default();
    }
    let buckets = buckets.max(1);

    let summary = Summary::new(durations(spans));
    let (mut low, mut high) = (summary.min(), summary.max());
    if low == high {
        if low == 0.0 {
            high = 1.0;
        } else {
            (low, high) = (low * 0.9, high * 1.1);
        }
    }
    let width = (high - low) / buckets as f64;

    let mut counts = vec![0u64; buckets];
    for value in &summary.sorted {
        let index = (((value - low) / width).floor() as usize).min(buckets - 1);
        counts[index] += 1;
    }

    let data = counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| DistributionBucket {
            bin_start: low + width * i as f64,
            bin_end: low + width * (i + 1) as f64,
            count,
        })
        .collect();

    DistributionAnalysis { data }
}

/// Request count, latency and errors per span name, busiest first.
pub fn endpoint_performance(spans: &[TraceSpan]) -> EndpointPerformanceAnalysis {
    #[derive(Default)]
    struct Acc {
        count: u64,
        errors: u64,
        total_ms: f64,
        last: Option<(DateTime<Utc>, SpanStatus)>,
    }

    let mut endpoints: BTreeMap<&str, Acc> = BTreeMap::new();
    for span in spans {
        let acc = endpoints.entry(span.span_name.as_str()).or_default();
        acc.count += 1;
        acc.total_ms += span.duration_ms;
        if span.is_error() {
            acc.errors += 1;
        }
        if acc.last.map_or(true, |(ts, _)| span.timestamp >= ts) {
            acc.last = Some((span.timestamp, span.status));
        }
    }

    let mut data: Vec<EndpointStats> = endpoints
        .into_iter()
        .map(|(endpoint, acc)| EndpointStats {
            endpoint: endpoint.to_string(),
            total_requests: acc.count,
            avg_duration: acc.total_ms / acc.count as f64,
            error_rate: rate(acc.errors, acc.count),
            last_status: acc.last.map(|(_, status)| status).unwrap_or_default(),
        })
        .collect();

    // Stable sort keeps ties in name order.
    data.sort_by(|a, b| b.total_requests.cmp(&a.total_requests));

    EndpointPerformanceAnalysis { data }
}

/// Compute one named analysis.
pub fn compute(name: AnalysisName, spans: &[TraceSpan]) -> AnalysisPayload {
    match name {
        AnalysisName::ResponseTime => AnalysisPayload::ResponseTime(response_time(spans)),
        AnalysisName::ErrorRate => AnalysisPayload::ErrorRate(error_rate(spans)),
        AnalysisName::RequestVolume => AnalysisPayload::RequestVolume(request_volume(spans)),
        AnalysisName::ServicePerformance => {
            AnalysisPayload::ServicePerformance(service_performance(spans))
        }
        AnalysisName::ResponseTimeDistribution => AnalysisPayload::ResponseTimeDistribution(
            response_time_distribution(spans, DEFAULT_DISTRIBUTION_BUCKETS),
        ),
        AnalysisName::EndpointPerformance => {
            AnalysisPayload::EndpointPerformance(endpoint_performance(spans))
        }
    }
}

/// The analyses to run: the core set, plus the extended set if asked.
pub fn analysis_set(extended: bool) -> Vec<AnalysisName> {
    let mut names = AnalysisName::CORE.to_vec();
    if extended {
        names.extend(AnalysisName::EXTENDED);
    }
    names
}

/// Run every named analysis over the batch, stamping them all with the
/// same `computed_at`.
pub fn analyze(
    spans: &[TraceSpan],
    names: &[AnalysisName],
    computed_at: DateTime<Utc>,
) -> Vec<AnalysisResult> {
    names
        .iter()
        .map(|&name| AnalysisResult::new(compute(name, spans), computed_at))
        .collect()
}

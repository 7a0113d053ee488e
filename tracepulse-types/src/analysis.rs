//! Analysis results published to subscribers.
//!
//! Durations are milliseconds and rates are percentages in `0..=100`
//! throughout.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

/// Name of a published analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AnalysisName {
    /// Latency summary with percentiles.
    ResponseTime,
    /// Share of failed requests.
    ErrorRate,
    /// Throughput.
    RequestVolume,
    /// Latency per service.
    ServicePerformance,
    /// Latency histogram.
    ResponseTimeDistribution,
    /// Latency and errors per endpoint.
    EndpointPerformance,
}

impl AnalysisName {
    /// The analyses every cycle publishes.
    pub const CORE: [AnalysisName; 4] = [
        AnalysisName::ResponseTime,
        AnalysisName::ErrorRate,
        AnalysisName::RequestVolume,
        AnalysisName::ServicePerformance,
    ];

    /// The analyses published only when extended output is enabled.
    pub const EXTENDED: [AnalysisName; 2] = [
        AnalysisName::ResponseTimeDistribution,
        AnalysisName::EndpointPerformance,
    ];

    /// Wire name, e.g. `response_time`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisName::ResponseTime => "response_time",
            AnalysisName::ErrorRate => "error_rate",
            AnalysisName::RequestVolume => "request_volume",
            AnalysisName::ServicePerformance => "service_performance",
            AnalysisName::ResponseTimeDistribution => "response_time_distribution",
            AnalysisName::EndpointPerformance => "endpoint_performance",
        }
    }
}

impl fmt::Display for AnalysisName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisName::CORE
            .iter()
            .chain(AnalysisName::EXTENDED.iter())
            .find(|name| name.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown analysis: {}", s))
    }
}

/// Latency statistics for one minute.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResponseTimeBucket {
    /// Start of the minute.
    pub minute: DateTime<Utc>,
    pub avg_duration: f64,
    pub max_duration: f64,
    pub min_duration: f64,
    pub count: u64,
}

/// Latency over a batch of spans.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResponseTimeAnalysis {
    /// Per-minute buckets, oldest first.
    pub data: Vec<ResponseTimeBucket>,
    pub avg: f64,
    pub max: f64,
    pub min: f64,
    pub p95: f64,
    pub p99: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

/// Error counts for one minute.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorRateBucket {
    pub minute: DateTime<Utc>,
    pub error_count: u64,
    pub total_count: u64,
    pub error_rate: f64,
}

/// Error share over a batch of spans.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorRateAnalysis {
    pub data: Vec<ErrorRateBucket>,
    pub error_rate: f64,
    pub total_requests: u64,
    pub total_errors: u64,
}

/// Request count for one minute.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VolumeBucket {
    pub minute: DateTime<Utc>,
    pub count: u64,
}

/// Throughput over a batch of spans.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestVolumeAnalysis {
    pub data: Vec<VolumeBucket>,
    pub total_requests: u64,
    pub req_per_minute: f64,
}

/// Latency statistics for one service.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServiceStats {
    pub service_name: String,
    pub avg_duration: f64,
    pub max_duration: f64,
    pub min_duration: f64,
    pub count: u64,
    pub p95: f64,
}

/// Latency broken down by service.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServicePerformanceAnalysis {
    /// One entry per service, ordered by name.
    pub data: Vec<ServiceStats>,
}

/// One histogram bin, `[bin_start, bin_end)` except the last which is closed.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DistributionBucket {
    pub bin_start: f64,
    pub bin_end: f64,
    pub count: u64,
}

/// Equal-width histogram of span durations.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DistributionAnalysis {
    pub data: Vec<DistributionBucket>,
}

/// Request statistics for one endpoint.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EndpointStats {
    pub endpoint: String,
    pub total_requests: u64,
    pub avg_duration: f64,
    pub error_rate: f64,
    /// Status of the most recent span for this endpoint.
    pub last_status: crate::SpanStatus,
}

/// Latency and errors broken down by endpoint.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EndpointPerformanceAnalysis {
    /// Busiest endpoints first.
    pub data: Vec<EndpointStats>,
}

/// Payload of an [`AnalysisResult`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum AnalysisPayload {
    ResponseTime(ResponseTimeAnalysis),
    ErrorRate(ErrorRateAnalysis),
    RequestVolume(RequestVolumeAnalysis),
    ServicePerformance(ServicePerformanceAnalysis),
    ResponseTimeDistribution(DistributionAnalysis),
    EndpointPerformance(EndpointPerformanceAnalysis),
}

impl AnalysisPayload {
    /// The analysis this payload belongs to.
    pub fn name(&self) -> AnalysisName {
        match self {
            AnalysisPayload::ResponseTime(_) => AnalysisName::ResponseTime,
            AnalysisPayload::ErrorRate(_) => AnalysisName::ErrorRate,
            AnalysisPayload::RequestVolume(_) => AnalysisName::RequestVolume,
            AnalysisPayload::ServicePerformance(_) => AnalysisName::ServicePerformance,
            AnalysisPayload::ResponseTimeDistribution(_) => AnalysisName::ResponseTimeDistribution,
            AnalysisPayload::EndpointPerformance(_) => AnalysisName::EndpointPerformance,
        }
    }
}

/// A named analysis computed over one batch.
///
/// Results are ephemeral: each cycle supersedes the previous one, and
/// `computed_at` tells a subscriber how fresh the value is.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalysisResult {
    pub name: AnalysisName,
    pub payload: AnalysisPayload,
    pub computed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Wrap a payload, deriving the name from it.
    pub fn new(payload: AnalysisPayload, computed_at: DateTime<Utc>) -> Self {
        Self {
            name: payload.name(),
            payload,
            computed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names() {
        assert_eq!(AnalysisName::ResponseTime.to_string(), "response_time");
        assert_eq!(AnalysisName::ServicePerformance.as_str(), "service_performance");
    }

    #[test]
    fn parse_known_and_unknown_names() {
        assert_eq!("error_rate".parse(), Ok(AnalysisName::ErrorRate));
        assert_eq!(
            "endpoint_performance".parse(),
            Ok(AnalysisName::EndpointPerformance)
        );
        assert!("latency".parse::<AnalysisName>().is_err());
    }

    #[test]
    fn result_name_follows_payload() {
        let result = AnalysisResult::new(
            AnalysisPayload::RequestVolume(RequestVolumeAnalysis::default()),
            Utc::now(),
        );
        assert_eq!(result.name, AnalysisName::RequestVolume);
    }

    #[test]
    fn default_payloads_are_zero() {
        let rt = ResponseTimeAnalysis::default();
        assert!(rt.data.is_empty());
        assert_eq!(rt.avg, 0.0);
        assert_eq!(rt.p99, 0.0);

        let er = ErrorRateAnalysis::default();
        assert_eq!(er.total_requests, 0);
        assert_eq!(er.error_rate, 0.0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn result_json_shape() {
        use chrono::TimeZone;

        let result = AnalysisResult::new(
            AnalysisPayload::EndpointPerformance(EndpointPerformanceAnalysis {
                data: vec![EndpointStats {
                    endpoint: "/users/42".to_string(),
                    total_requests: 2,
                    avg_duration: 125.0,
                    error_rate: 50.0,
                    last_status: crate::SpanStatus::Error,
                }],
            }),
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 1, 0).unwrap(),
        );

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["name"], "endpoint_performance");
        assert_eq!(json["computed_at"], "2024-01-01T10:01:00Z");
        // Payloads are untagged: the name already identifies them.
        assert_eq!(json["payload"]["data"][0]["endpoint"], "/users/42");
        assert_eq!(json["payload"]["data"][0]["last_status"], "Error");
    }
}

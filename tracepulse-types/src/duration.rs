//! Duration units and normalization.
//!
//! Stores report span durations in whatever unit their schema uses
//! (OpenTelemetry exporters write nanoseconds). Everything downstream of the
//! data source works in milliseconds, so raw values are normalized once with
//! [`DurationUnit::to_millis`].

use core::fmt;
use core::str::FromStr;
use core::time::Duration;

/// The native unit of a raw duration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DurationUnit {
    /// Nanoseconds (the OpenTelemetry default).
    #[default]
    #[cfg_attr(feature = "serde", serde(alias = "ns"))]
    Nanoseconds,
    /// Microseconds.
    #[cfg_attr(feature = "serde", serde(alias = "us"))]
    Microseconds,
    /// Milliseconds.
    #[cfg_attr(feature = "serde", serde(alias = "ms"))]
    Milliseconds,
    /// Seconds.
    #[cfg_attr(feature = "serde", serde(alias = "s"))]
    Seconds,
}

impl DurationUnit {
    /// Number of milliseconds in one unit.
    pub const fn millis_per_unit(&self) -> f64 {
        match self {
            DurationUnit::Nanoseconds => 1e-6,
            DurationUnit::Microseconds => 1e-3,
            DurationUnit::Milliseconds => 1.0,
            DurationUnit::Seconds => 1_000.0,
        }
    }

    /// Convert a raw value in this unit to milliseconds.
    pub fn to_millis(&self, raw: f64) -> f64 {
        raw * self.millis_per_unit()
    }

    /// Short suffix used in config files and display ("ns", "ms", ...).
    pub const fn suffix(&self) -> &'static str {
        match self {
            DurationUnit::Nanoseconds => "ns",
            DurationUnit::Microseconds => "us",
            DurationUnit::Milliseconds => "ms",
            DurationUnit::Seconds => "s",
        }
    }
}

impl fmt::Display for DurationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

impl FromStr for DurationUnit {
    type Err = UnknownDurationUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ns" | "nanoseconds" => Ok(DurationUnit::Nanoseconds),
            "us" | "µs" | "microseconds" => Ok(DurationUnit::Microseconds),
            "ms" | "milliseconds" => Ok(DurationUnit::Milliseconds),
            "s" | "seconds" => Ok(DurationUnit::Seconds),
            _ => Err(UnknownDurationUnit(s.to_string())),
        }
    }
}

/// Returned when a duration unit string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDurationUnit(pub String);

impl fmt::Display for UnknownDurationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown duration unit: {}", self.0)
    }
}

impl std::error::Error for UnknownDurationUnit {}

/// Express a standard duration as fractional milliseconds.
pub fn duration_millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nanoseconds_to_millis() {
        assert_eq!(DurationUnit::Nanoseconds.to_millis(150_000_000.0), 150.0);
    }

    #[test]
    fn microseconds_to_millis() {
        assert_eq!(DurationUnit::Microseconds.to_millis(2_500.0), 2.5);
    }

    #[test]
    fn milliseconds_are_unchanged() {
        assert_eq!(DurationUnit::Milliseconds.to_millis(42.0), 42.0);
    }

    #[test]
    fn seconds_to_millis() {
        assert_eq!(DurationUnit::Seconds.to_millis(1.5), 1_500.0);
    }

    #[test]
    fn default_is_nanoseconds() {
        assert_eq!(DurationUnit::default(), DurationUnit::Nanoseconds);
    }

    #[test]
    fn parse_suffixes() {
        assert_eq!("ns".parse(), Ok(DurationUnit::Nanoseconds));
        assert_eq!("µs".parse(), Ok(DurationUnit::Microseconds));
        assert_eq!(" MS ".parse(), Ok(DurationUnit::Milliseconds));
        assert_eq!("seconds".parse(), Ok(DurationUnit::Seconds));
        assert!("hours".parse::<DurationUnit>().is_err());
    }

    #[test]
    fn std_duration_as_millis() {
        assert_eq!(duration_millis(Duration::from_micros(1_500)), 1.5);
    }
}

//! Tracking of the lower bound for the next fetch.

use chrono::{DateTime, Duration, Utc};

/// Default look-back for the very first fetch.
pub const DEFAULT_BACKFILL: std::time::Duration = std::time::Duration::from_secs(3600);

/// The instant from which the next fetch starts.
///
/// The tracker only ever moves forward. It is owned by a single scheduler,
/// so no locking is involved.
///
/// # Example
///
/// ```rust
/// use chrono::{Duration, TimeZone, Utc};
/// use tracepulse_engine::WindowTracker;
///
/// let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
/// let mut window = WindowTracker::new(start);
///
/// assert!(window.advance(start + Duration::seconds(10)));
/// assert!(!window.advance(start));
/// assert_eq!(window.current(), start + Duration::seconds(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowTracker {
    last_fetch_time: DateTime<Utc>,
}

impl WindowTracker {
    /// Start the window at an explicit instant.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            last_fetch_time: start,
        }
    }

    /// Start the window `backfill` before `now`.
    pub fn with_backfill(now: DateTime<Utc>, backfill: std::time::Duration) -> Self {
        let backfill = Duration::from_std(backfill).unwrap_or(Duration::MAX);
        let start = now.checked_sub_signed(backfill).unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self::new(start)
    }

    /// Move the window to `t` if it is later than the current value.
    ///
    /// Returns whether the window moved.
    pub fn advance(&mut self, t: DateTime<Utc>) -> bool {
        if t > self.last_fetch_time {
            self.last_fetch_time = t;
            true
        } else {
            false
        }
    }

    /// Lower bound of the next fetch.
    pub fn current(&self) -> DateTime<Utc> {
        self.last_fetch_time
    }
}

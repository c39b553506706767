//! Time and quota primitives shared by the engine and the strategies.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{FloodgateError, Result};

/// A point in time, in milliseconds since the Unix epoch.
///
/// This is the unit every strategy persists, so it is kept as a plain
/// integer rather than a richer date type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The current wall-clock time.
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Create a timestamp from epoch milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Epoch milliseconds.
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Signed milliseconds from `earlier` to `self`. Negative when `earlier`
    /// is actually later, e.g. after a clock step backwards.
    pub fn millis_since(&self, earlier: Timestamp) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    /// This timestamp moved forward by `millis`.
    pub fn plus_millis(&self, millis: i64) -> Timestamp {
        Timestamp(self.0.saturating_add(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Named time units accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of this unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// The fixed `(limit, window)` pair a limiter enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    /// Maximum admissions per window; zero rejects everything
    limit: u64,
    /// Window length in whole milliseconds
    window_ms: i64,
}

impl Quota {
    /// Create a quota. The window must be at least one millisecond long;
    /// sub-millisecond precision is dropped.
    pub fn new(limit: u64, window: Duration) -> Result<Self> {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        if window_ms <= 0 {
            return Err(FloodgateError::InvalidConfig(format!(
                "window must be at least 1ms, got {:?}",
                window
            )));
        }
        Ok(Self { limit, window_ms })
    }

    /// Create a quota of `limit` admissions per `unit`.
    pub fn per(limit: u64, unit: TimeUnit) -> Self {
        Self {
            limit,
            window_ms: unit.duration().as_millis() as i64,
        }
    }

    /// Get the admission limit.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Get the window.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms as u64)
    }

    /// Get the window in milliseconds.
    pub fn window_millis(&self) -> i64 {
        self.window_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_unit_duration() {
        assert_eq!(TimeUnit::Second.duration(), Duration::from_secs(1));
        assert_eq!(TimeUnit::Minute.duration(), Duration::from_secs(60));
        assert_eq!(TimeUnit::Hour.duration(), Duration::from_secs(3600));
        assert_eq!(TimeUnit::Day.duration(), Duration::from_secs(86400));
    }

    #[test]
    fn test_quota_rejects_empty_window() {
        assert!(matches!(
            Quota::new(10, Duration::ZERO),
            Err(FloodgateError::InvalidConfig(_))
        ));
        assert!(matches!(
            Quota::new(10, Duration::from_micros(999)),
            Err(FloodgateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_quota_accepts_zero_limit() {
        let quota = Quota::new(0, Duration::from_secs(1)).unwrap();
        assert_eq!(quota.limit(), 0);
        assert_eq!(quota.window_millis(), 1000);
    }

    #[test]
    fn test_quota_per_unit() {
        let quota = Quota::per(100, TimeUnit::Minute);
        assert_eq!(quota.limit(), 100);
        assert_eq!(quota.window(), Duration::from_secs(60));
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let earlier = Timestamp::from_millis(1_000);
        let later = earlier.plus_millis(250);

        assert_eq!(later.as_millis(), 1_250);
        assert_eq!(later.millis_since(earlier), 250);
        assert_eq!(earlier.millis_since(later), -250);
    }

    #[test]
    fn test_timestamp_serializes_as_integer() {
        let ts = Timestamp::from_millis(1_704_067_200_000);
        assert_eq!(serde_json::to_string(&ts).unwrap(), "1704067200000");
    }
}

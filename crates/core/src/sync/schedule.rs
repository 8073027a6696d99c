//! Global sync interval and the re-run tolerance.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Hours used when the setting is absent or unusable.
pub const DEFAULT_SCHEDULE_HOURS: i64 = 6;

/// Sentinel disabling scheduled syncs.
pub const DISABLED_SENTINEL: i64 = -1;

/// Sentinel selecting a five-minute interval.
pub const TEST_MODE_SENTINEL: i64 = -5;

/// Share of the interval that must have passed before a scheduled run.
pub const RUN_TOLERANCE: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScheduleInterval {
    Disabled,
    Every {
        #[serde(rename = "seconds", serialize_with = "as_seconds")]
        period: Duration,
    },
}

fn as_seconds<S: serde::Serializer>(period: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(period.num_seconds())
}

impl Default for ScheduleInterval {
    fn default() -> Self {
        ScheduleInterval::hours(DEFAULT_SCHEDULE_HOURS)
    }
}

impl ScheduleInterval {
    pub fn hours(hours: i64) -> Self {
        ScheduleInterval::Every {
            period: Duration::hours(hours),
        }
    }

    /// Parse the stored setting. Unusable values fall back to the default.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(value) = raw.map(str::trim).and_then(|v| v.parse::<i64>().ok()) else {
            return Self::default();
        };
        match value {
            DISABLED_SENTINEL => ScheduleInterval::Disabled,
            TEST_MODE_SENTINEL => ScheduleInterval::Every {
                period: Duration::minutes(5),
            },
            hours if hours > 0 => ScheduleInterval::hours(hours),
            _ => Self::default(),
        }
    }

    pub fn period(&self) -> Option<Duration> {
        match self {
            ScheduleInterval::Disabled => None,
            ScheduleInterval::Every { period } => Some(*period),
        }
    }

    /// Earliest time a run may start after one completed at `last`.
    pub fn next_due(&self, last: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let period = self.period()?;
        let tolerated = Duration::milliseconds((period.num_milliseconds() as f64 * RUN_TOLERANCE) as i64);
        Some(last + tolerated)
    }

    /// Whether a scheduled run is due at `now`.
    pub fn is_due(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        if *self == ScheduleInterval::Disabled {
            return false;
        }
        match last.and_then(|l| self.next_due(l)) {
            Some(due) => now >= due,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_sentinels_and_fallbacks() {
        assert_eq!(ScheduleInterval::parse(Some("-1")), ScheduleInterval::Disabled);
        assert_eq!(ScheduleInterval::parse(Some("-5")).period(), Some(Duration::minutes(5)));
        assert_eq!(ScheduleInterval::parse(Some(" 12 ")).period(), Some(Duration::hours(12)));
        for raw in [None, Some(""), Some("soon"), Some("0"), Some("-3"), Some("1.5")] {
            assert_eq!(ScheduleInterval::parse(raw).period(), Some(Duration::hours(6)), "{raw:?}");
        }
    }

    #[test]
    fn test_tolerance() {
        let interval = ScheduleInterval::hours(10);
        let last = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

        assert!(interval.is_due(None, last));
        assert!(!interval.is_due(Some(last), last + Duration::hours(8)));
        assert!(!interval.is_due(Some(last), last + Duration::minutes(8 * 60 + 59)));
        assert!(interval.is_due(Some(last), last + Duration::hours(9)));
        assert_eq!(interval.next_due(last), Some(last + Duration::hours(9)));

        assert!(!ScheduleInterval::Disabled.is_due(None, last));
    }
}

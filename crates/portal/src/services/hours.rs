//! Business hours for ordering, and the clock the portal reads time from.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Offset, TimeZone, Timelike, Utc, Weekday};
use serde::Serialize;

use crate::config::OrderingConfig;

/// Source of the current time.
///
/// Everything that stamps or compares wall-clock time goes through this so a
/// fixed instant can be used in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Self::System => Utc::now(),
            Self::Fixed(at) => *at,
        }
    }
}

/// Ordering window reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderingStatus {
    pub open: bool,
    /// Local opening time, e.g. `08:00`.
    pub opens_at: String,
    /// Local closing time, e.g. `14:00`.
    pub closes_at: String,
    /// Weekdays on which ordering is open.
    pub days: &'static str,
}

/// Monday-Friday `[open_hour, close_hour)` in a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    offset: FixedOffset,
    open_hour: u32,
    close_hour: u32,
    clock: Clock,
}

impl BusinessHours {
    /// Build from configuration. An offset that chrono rejects falls back to UTC.
    #[must_use]
    pub fn new(config: &OrderingConfig, clock: Clock) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600).unwrap_or_else(|| {
            tracing::warn!(
                offset = config.utc_offset_hours,
                "Invalid UTC offset, using UTC"
            );
            Utc.fix()
        });
        Self {
            offset,
            open_hour: config.open_hour,
            close_hour: config.close_hour,
            clock,
        }
    }

    /// Whether ordering is open at `at`.
    #[must_use]
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&self.offset);
        let weekday_open = !matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
        weekday_open && (self.open_hour..self.close_hour).contains(&local.hour())
    }

    /// Whether ordering is open now.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open_at(self.clock.now())
    }

    /// Status for the ordering page.
    #[must_use]
    pub fn status(&self) -> OrderingStatus {
        OrderingStatus {
            open: self.is_open(),
            opens_at: format!("{:02}:00", self.open_hour),
            closes_at: format!("{:02}:00", self.close_hour),
            days: "Monday-Friday",
        }
    }

    /// The instant `hour` o'clock local time falls on for the local day of
    /// `at`. Used by tests and diagnostics.
    #[must_use]
    pub fn local_hour_on(&self, at: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
        let local = at.with_timezone(&self.offset);
        let midnight = local
            - Duration::hours(i64::from(local.hour()))
            - Duration::minutes(i64::from(local.minute()))
            - Duration::seconds(i64::from(local.second()))
            - Duration::nanoseconds(i64::from(local.nanosecond()));
        (midnight + Duration::hours(i64::from(hour))).with_timezone(&Utc)
    }
}

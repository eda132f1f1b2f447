//! Wall clock access and time-of-day windows

use crate::error::{RouterError, Result};
use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use std::sync::Mutex;

/// Result of checking a time against an `HH:MM` window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Inside,
    Outside,
    /// One of the bounds could not be parsed
    Invalid,
}

/// Parse an `HH:MM` time of day
pub fn parse_hhmm(value: &str) -> Result<NaiveTime> {
    Ok(NaiveTime::parse_from_str(value.trim(), "%H:%M")?)
}

fn minutes_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Check `now` against the window `[start, stop)`
///
/// A window whose start is after its stop wraps over midnight. Equal bounds
/// describe an empty window.
pub fn time_in_range(now: NaiveTime, start: &str, stop: &str) -> TimeRange {
    let (Ok(start), Ok(stop)) = (parse_hhmm(start), parse_hhmm(stop)) else {
        return TimeRange::Invalid;
    };
    let (now, start, stop) = (
        minutes_of_day(now),
        minutes_of_day(start),
        minutes_of_day(stop),
    );

    let inside = if start == stop {
        false
    } else if start < stop {
        start <= now && now < stop
    } else {
        now >= start || now < stop
    };

    if inside {
        TimeRange::Inside
    } else {
        TimeRange::Outside
    }
}

/// Lowercase three-letter token used in `week_days`
pub fn weekday_token(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Sun => "sun",
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
    }
}

/// Local time provider
pub trait TimeSource: Send + Sync {
    /// Whether the clock has been set to a trustworthy time
    fn is_synced(&self) -> bool;

    /// Local wall-clock time, if available
    fn local_time(&self) -> Option<NaiveDateTime>;

    fn weekday(&self) -> Option<&'static str> {
        self.local_time().map(|t| weekday_token(t.weekday()))
    }
}

/// System clock rendered in a configured timezone
#[derive(Debug, Clone)]
pub struct SystemClock {
    tz: Tz,
}

/// Anything before this year means the RTC was never set
const MIN_SYNCED_YEAR: i32 = 2024;

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        let tz = name.parse::<Tz>().map_err(|e| {
            RouterError::validation("timezone".to_string(), e.to_string())
        })?;
        Ok(Self::new(tz))
    }
}

impl TimeSource for SystemClock {
    fn is_synced(&self) -> bool {
        Utc::now().year() >= MIN_SYNCED_YEAR
    }

    fn local_time(&self) -> Option<NaiveDateTime> {
        Some(Utc::now().with_timezone(&self.tz).naive_local())
    }
}

/// Clock set by hand, for simulations and tests
#[derive(Debug, Default)]
pub struct ManualClock {
    inner: Mutex<ManualClockState>,
}

#[derive(Debug, Default)]
struct ManualClockState {
    synced: bool,
    now: Option<NaiveDateTime>,
}

impl ManualClock {
    /// Synced clock showing `now`
    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            inner: Mutex::new(ManualClockState {
                synced: true,
                now: Some(now),
            }),
        }
    }

    pub fn set(&self, now: Option<NaiveDateTime>) {
        if let Ok(mut state) = self.inner.lock() {
            state.now = now;
        }
    }

    pub fn set_synced(&self, synced: bool) {
        if let Ok(mut state) = self.inner.lock() {
            state.synced = synced;
        }
    }
}

impl TimeSource for ManualClock {
    fn is_synced(&self) -> bool {
        self.inner.lock().map(|s| s.synced).unwrap_or(false)
    }

    fn local_time(&self) -> Option<NaiveDateTime> {
        self.inner.lock().ok().and_then(|s| s.now)
    }
}

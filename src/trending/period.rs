// Calendar period of a moment, used to tell whether a legacy record is current.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};

/// Day of month, week of year, and month of year for a moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub day: u32,
    pub week: u32,
    pub month: u32,
}

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Period containing `now` (local wall-clock time).
///
/// Weeks are counted from January 1st, offset by that day's weekday with
/// Sunday as zero, matching the layout of records already on disk.
pub fn current_period(now: NaiveDateTime) -> Period {
    let jan1 = NaiveDate::from_ymd_opt(now.year(), 1, 1)
        .unwrap_or(now.date())
        .and_time(NaiveTime::MIN);
    let elapsed_days = (now - jan1).num_milliseconds() as f64 / MILLIS_PER_DAY;
    let offset = f64::from(jan1.weekday().num_days_from_sunday());
    let week = ((elapsed_days + offset + 1.0) / 7.0).ceil() as u32;

    Period {
        day: now.day(),
        week,
        month: now.month(),
    }
}

// Stored trending listing.
// Layout shared by cached values and legacy unprefixed records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::github::{Since, TrendingItem};

use super::period::Period;

/// A trending listing as persisted, stamped with the period it was fetched in.
///
/// Legacy records carry no expiry; whether they are still usable is decided
/// by comparing the stamped period with the current one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingRecord {
    #[serde(default)]
    pub repos: Vec<TrendingItem>,
    #[serde(rename = "toDay", default)]
    pub day: Option<u32>,
    #[serde(rename = "toWeek", default)]
    pub week: Option<u32>,
    #[serde(rename = "toMonth", default)]
    pub month: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TrendingRecord {
    pub fn new(repos: Vec<TrendingItem>, period: Period, now: DateTime<Utc>) -> Self {
        Self {
            repos,
            day: Some(period.day),
            week: Some(period.week),
            month: Some(period.month),
            timestamp: Some(now),
        }
    }

    /// Whether the record was fetched in the same window-sized period as `now`.
    ///
    /// Daily listings compare the day, weekly the week, monthly the month.
    /// Queries without a window never match.
    pub fn is_current(&self, since: Option<Since>, now: Period) -> bool {
        match since {
            Some(Since::Daily) => self.day == Some(now.day),
            Some(Since::Weekly) => self.week == Some(now.week),
            Some(Since::Monthly) => self.month == Some(now.month),
            None => false,
        }
    }
}

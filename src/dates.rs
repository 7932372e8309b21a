//! Calendar dates for report requests.
//!
//! Reports are computed in the caller's time zone (the API accepts the
//! account default and `America/Los_Angeles`), so every helper takes "now"
//! as a zoned timestamp rather than reading the clock.

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

/// Calendar date in the API's `{year, month, day}` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReportDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl ReportDate {
    #[must_use]
    pub fn from_naive(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }

    #[must_use]
    pub fn today<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        Self::from_naive(now.date_naive())
    }

    #[must_use]
    pub fn yesterday<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        Self::days_before(now, 1)
    }

    /// The local date `days` days before `now`.
    #[must_use]
    pub fn days_before<Tz: TimeZone>(now: &DateTime<Tz>, days: u64) -> Self {
        let date = now
            .date_naive()
            .checked_sub_days(Days::new(days))
            .unwrap_or(NaiveDate::MIN);
        Self::from_naive(date)
    }
}

/// Inclusive date range (`startDate`, `endDate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: ReportDate,
    pub end_date: ReportDate,
}

impl DateRange {
    /// From `days` days ago through today.
    #[must_use]
    pub fn last_days<Tz: TimeZone>(now: &DateTime<Tz>, days: u64) -> Self {
        Self {
            start_date: ReportDate::days_before(now, days),
            end_date: ReportDate::today(now),
        }
    }
}

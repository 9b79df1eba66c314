use chrono::{DateTime, Datelike, Local, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Reduces a stored date value to its calendar day in local time.
///
/// Accepts plain `YYYY-MM-DD` days as well as RFC 3339 timestamps and naive
/// `YYYY-MM-DDTHH:MM:SS` datetimes, whose time-of-day is discarded.
pub fn normalize_day(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(day) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(day);
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.with_timezone(&Local).date_naive());
    }

    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|datetime| datetime.date())
}

pub(crate) fn deserialize_day<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    normalize_day(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized date '{}'", raw)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn of(day: NaiveDate) -> Self {
        Self {
            year: day.year(),
            month: day.month(),
        }
    }

    pub fn current() -> Self {
        Self::of(Local::now().date_naive())
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.offset(1).first_day().pred_opt().unwrap_or(NaiveDate::MAX)
    }

    pub fn days_in_month(&self) -> u32 {
        self.last_day().day()
    }

    /// Shifts by whole months; `offset(-1)` of January is December of the previous year.
    pub fn offset(&self, delta: i32) -> Self {
        let first = self.first_day();
        let shifted = if delta >= 0 {
            first.checked_add_months(Months::new(delta.unsigned_abs()))
        } else {
            first.checked_sub_months(Months::new(delta.unsigned_abs()))
        };
        shifted.map(Self::of).unwrap_or(*self)
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day.year() == self.year && day.month() == self.month
    }

    /// Document key of the month's memo, e.g. `2025-03`.
    pub fn memo_key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    pub fn parse(value: &str) -> Option<Self> {
        let (year, month) = value.trim().split_once(['/', '-'])?;
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.memo_key())
    }
}

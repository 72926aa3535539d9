//! Granularity bucketing, named date-range parsing, and prior-period
//! computation. `now` is always supplied by the caller (via `QueryContext`),
//! never read from the system clock here, so date-range resolution is
//! mockable in tests — the teacher threads the equivalent "now" through
//! `Validator`/`runtime::run_query`'s context rather than calling
//! `chrono::Utc::now()` inline, and this follows the same discipline.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

use crate::error::CoreError;
use crate::expr::SqlFunction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    Hour,
    Minute,
}

impl Granularity {
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "year" => Ok(Granularity::Year),
            "quarter" => Ok(Granularity::Quarter),
            "month" => Ok(Granularity::Month),
            "week" => Ok(Granularity::Week),
            "day" => Ok(Granularity::Day),
            "hour" => Ok(Granularity::Hour),
            "minute" => Ok(Granularity::Minute),
            other => Err(CoreError::InvalidGranularity(other.to_string())),
        }
    }

    /// The whitelisted function used to truncate a time expression to this
    /// granularity. Hour/minute truncation is expressed via `DateTruncDay`
    /// plus a dialect-level cast in the rare dialects that lack a native
    /// sub-day truncation function; for the four supported engines
    /// date_trunc/DATE_FORMAT/strftime all accept hour/minute directly, so we
    /// fold them into the day-grain function family with a distinguishing
    /// label carried by the planner instead of the dialect surface.
    pub fn trunc_function(&self) -> SqlFunction {
        match self {
            Granularity::Year => SqlFunction::DateTruncYear,
            Granularity::Quarter => SqlFunction::DateTruncQuarter,
            Granularity::Month => SqlFunction::DateTruncMonth,
            Granularity::Week => SqlFunction::DateTruncWeek,
            Granularity::Day | Granularity::Hour | Granularity::Minute => SqlFunction::DateTruncDay,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    /// Inclusive end, already expanded to the end of the unit for named ranges.
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// The immediately preceding range of equal duration: ends exactly one
    /// instant before `start` begins.
    pub fn prior(&self) -> DateRange {
        let len = self.duration();
        DateRange {
            start: self.start - len - Duration::nanoseconds(1),
            end: self.start - Duration::nanoseconds(1),
        }
    }
}

/// Parse a date-range request: either a literal `[start, end]` pair or a
/// named range resolved against `now`.
pub fn parse_date_range(spec: &DateRangeSpec, now: DateTime<Utc>) -> Result<DateRange, CoreError> {
    match spec {
        DateRangeSpec::Absolute { start, end } => {
            let start = parse_instant(start)?;
            let end = end_of_day_if_date_only(end)?;
            Ok(DateRange { start, end })
        }
        DateRangeSpec::Named(name) => parse_named_range(name, now),
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum DateRangeSpec {
    Named(String),
    Absolute { start: String, end: String },
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, CoreError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0).unwrap();
        return Ok(Utc.from_utc_datetime(&naive));
    }
    Err(CoreError::InvalidGranularity(format!("unparseable date '{s}'")))
}

fn end_of_day_if_date_only(s: &str) -> Result<DateTime<Utc>, CoreError> {
    if chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() {
        let date = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let naive = date.and_hms_nano_opt(23, 59, 59, 999_999_999).unwrap();
        return Ok(Utc.from_utc_datetime(&naive));
    }
    parse_instant(s)
}

fn start_of_day(dt: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(dt.year(), dt.month(), dt.day(), 0, 0, 0).unwrap()
}

fn end_of_day(dt: DateTime<Utc>) -> DateTime<Utc> {
    start_of_day(dt) + Duration::days(1) - Duration::nanoseconds(1)
}

fn start_of_month(dt: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(dt.year(), dt.month(), 1, 0, 0, 0).unwrap()
}

fn add_months(dt: DateTime<Utc>, months: i32) -> DateTime<Utc> {
    let total = dt.year() * 12 + (dt.month() as i32 - 1) + months;
    let year = total.div_euclid(12);
    let month = (total.rem_euclid(12) + 1) as u32;
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()
}

fn start_of_quarter(dt: DateTime<Utc>) -> DateTime<Utc> {
    let q_start_month = ((dt.month() - 1) / 3) * 3 + 1;
    Utc.with_ymd_and_hms(dt.year(), q_start_month, 1, 0, 0, 0).unwrap()
}

fn start_of_year(dt: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(dt.year(), 1, 1, 0, 0, 0).unwrap()
}

fn start_of_week(dt: DateTime<Utc>) -> DateTime<Utc> {
    let days_since_monday = dt.weekday().num_days_from_monday();
    start_of_day(dt) - Duration::days(days_since_monday as i64)
}

fn parse_named_range(name: &str, now: DateTime<Utc>) -> Result<DateRange, CoreError> {
    let name = name.trim();
    match name {
        "today" => Ok(DateRange { start: start_of_day(now), end: end_of_day(now) }),
        "yesterday" => {
            let y = now - Duration::days(1);
            Ok(DateRange { start: start_of_day(y), end: end_of_day(y) })
        }
        "this week" => Ok(DateRange { start: start_of_week(now), end: end_of_day(now) }),
        "last week" => {
            let start = start_of_week(now) - Duration::weeks(1);
            Ok(DateRange { start, end: start + Duration::weeks(1) - Duration::nanoseconds(1) })
        }
        "this month" => Ok(DateRange { start: start_of_month(now), end: end_of_day(now) }),
        "last month" => {
            let start = add_months(start_of_month(now), -1);
            let end = start_of_month(now) - Duration::nanoseconds(1);
            Ok(DateRange { start, end })
        }
        "this quarter" => Ok(DateRange { start: start_of_quarter(now), end: end_of_day(now) }),
        "last quarter" => {
            let start = add_months(start_of_quarter(now), -3);
            let end = start_of_quarter(now) - Duration::nanoseconds(1);
            Ok(DateRange { start, end })
        }
        "this year" => Ok(DateRange { start: start_of_year(now), end: end_of_day(now) }),
        "last year" => {
            let start = Utc.with_ymd_and_hms(now.year() - 1, 1, 1, 0, 0, 0).unwrap();
            let end = start_of_year(now) - Duration::nanoseconds(1);
            Ok(DateRange { start, end })
        }
        _ => parse_relative_range(name, now),
    }
}

fn parse_relative_range(name: &str, now: DateTime<Utc>) -> Result<DateRange, CoreError> {
    let parts: Vec<&str> = name.split_whitespace().collect();
    let bad = || CoreError::InvalidGranularity(format!("unrecognized date range '{name}'"));

    match parts.as_slice() {
        ["last", n, unit] => {
            let n: i64 = n.parse().map_err(|_| bad())?;
            let start = subtract_units(now, unit, n)?;
            Ok(DateRange { start, end: end_of_day(now) })
        }
        ["next", n, unit] => {
            let n: i64 = n.parse().map_err(|_| bad())?;
            let end = add_units(now, unit, n)?;
            Ok(DateRange { start: start_of_day(now), end })
        }
        _ => Err(bad()),
    }
}

fn unit_to_days_or_months(unit: &str) -> Result<UnitKind, CoreError> {
    match unit.trim_end_matches('s') {
        "day" => Ok(UnitKind::Days(1)),
        "week" => Ok(UnitKind::Days(7)),
        "month" => Ok(UnitKind::Months(1)),
        "quarter" => Ok(UnitKind::Months(3)),
        "year" => Ok(UnitKind::Months(12)),
        other => Err(CoreError::InvalidGranularity(format!("unrecognized date unit '{other}'"))),
    }
}

enum UnitKind {
    Days(i64),
    Months(i32),
}

fn subtract_units(now: DateTime<Utc>, unit: &str, n: i64) -> Result<DateTime<Utc>, CoreError> {
    match unit_to_days_or_months(unit)? {
        UnitKind::Days(per) => Ok(start_of_day(now) - Duration::days(per * n)),
        UnitKind::Months(per) => Ok(add_months(start_of_month(now), -(per as i64 * n) as i32)),
    }
}

fn add_units(now: DateTime<Utc>, unit: &str, n: i64) -> Result<DateTime<Utc>, CoreError> {
    match unit_to_days_or_months(unit)? {
        UnitKind::Days(per) => Ok(end_of_day(now) + Duration::days(per * n)),
        UnitKind::Months(per) => Ok(add_months(start_of_month(now), (per as i64 * n) as i32) - Duration::nanoseconds(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prior_period_equal_duration_and_adjacent() {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
        let range = parse_named_range("last 30 days", now).unwrap();
        let prior = range.prior();
        assert_eq!(prior.duration(), range.duration());
        assert_eq!(prior.end, range.start - Duration::nanoseconds(1));
    }

    #[test]
    fn this_month_spans_the_whole_month_so_far() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let range = parse_named_range("this month", now).unwrap();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn granularity_rejects_unknown_unit() {
        assert!(Granularity::parse("fortnight").is_err());
    }

    #[test]
    fn last_3_months_uses_month_starts() {
        let now = Utc.with_ymd_and_hms(2026, 4, 5, 0, 0, 0).unwrap();
        let range = parse_named_range("last 3 months", now).unwrap();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }
}

//! Date and datetime parsing for metadata fields and release times.
//!
//! Absolute values use ISO 8601-like forms (`2020-09-04`, `2020-09-04 23:59:00`,
//! `2020-09-04T23:59`). Relative values have the form
//! `<n> (hour|day)[s] (before|after) <datetime>`, for example
//! `1 day after 2020-09-04 23:59:00`.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use regex::Regex;

/// Canonical output format for dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Canonical output format for datetimes.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Accepted input formats for absolute datetimes, tried in order.
const DATETIME_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Matches `<n> hour(s)|day(s) before|after <base>`.
static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s+(hour|day)s?\s+(before|after)\s+(.+)$").expect("relative date regex")
});

/// Failure to interpret a string as a date or datetime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateError {
    #[error("{0:?} is not a valid date")]
    InvalidDate(String),

    #[error("{0:?} is not a valid datetime")]
    InvalidDatetime(String),

    #[error("offset in {0:?} is out of range")]
    OutOfRange(String),
}

/// Parse a datetime, absolute or relative.
///
/// A bare date (no time component) is rejected.
pub fn parse_datetime(input: &str) -> Result<NaiveDateTime, DateError> {
    let trimmed = input.trim();

    if let Some(caps) = RELATIVE_RE.captures(trimmed) {
        let base = parse_datetime(&caps[4])?;
        return shift(base, &caps[1], &caps[2], &caps[3], trimmed);
    }

    DATETIME_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| DateError::InvalidDatetime(input.to_string()))
}

/// Parse a date, absolute or relative.
///
/// The base of a relative date may be either a date (taken at midnight) or a
/// datetime; the result is truncated to its date.
pub fn parse_date(input: &str) -> Result<NaiveDate, DateError> {
    let trimmed = input.trim();

    if let Some(caps) = RELATIVE_RE.captures(trimmed) {
        let base = match parse_datetime(&caps[4]) {
            Ok(dt) => dt,
            Err(_) => parse_date(&caps[4])?.and_time(chrono::NaiveTime::MIN),
        };
        return Ok(shift(base, &caps[1], &caps[2], &caps[3], trimmed)?.date());
    }

    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map_err(|_| DateError::InvalidDate(input.to_string()))
}

fn shift(
    base: NaiveDateTime,
    amount: &str,
    unit: &str,
    direction: &str,
    input: &str,
) -> Result<NaiveDateTime, DateError> {
    let out_of_range = || DateError::OutOfRange(input.to_string());

    let amount: i64 = amount.parse().map_err(|_| out_of_range())?;
    let delta = match unit {
        "hour" => TimeDelta::try_hours(amount),
        _ => TimeDelta::try_days(amount),
    }
    .ok_or_else(out_of_range)?;

    let shifted = match direction {
        "before" => base.checked_sub_signed(delta),
        _ => base.checked_add_signed(delta),
    };
    shifted.ok_or_else(out_of_range)
}

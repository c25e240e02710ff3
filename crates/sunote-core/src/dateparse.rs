//! Human-readable due date parsing.
//!
//! Turns strings like "tomorrow", "in 2 days" or "2026-01-28 09:30" into
//! epoch milliseconds. Calendar dates are read in local time.

use chrono::{Local, NaiveDate, NaiveDateTime, TimeDelta, TimeZone};

use crate::Error;

/// Parse a due date.
///
/// Supports:
/// - Epoch milliseconds: "1700003600000" (passed through)
/// - Date and time: "2026-01-28 12:00:00", "2026-01-28 12:00"
/// - Date only: "2026-01-28" (midnight)
/// - Named: "now", "today", "tomorrow"
/// - Relative future: "in 2 days", "in 3 hours", "in 1w"
pub fn parse_due_at(input: &str) -> Result<i64, Error> {
    let input = input.trim().to_lowercase();

    if let Ok(millis) = input.parse::<i64>() {
        return Ok(millis);
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&input, format) {
            return local_millis(dt, &input);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(&input, "%Y-%m-%d") {
        return local_millis(start_of_day(date), &input);
    }

    let now = Local::now();
    match input.as_str() {
        "now" => return Ok(now.timestamp_millis()),
        "today" => return local_millis(start_of_day(now.date_naive()), &input),
        "tomorrow" => {
            return local_millis(start_of_day(now.date_naive()) + TimeDelta::days(1), &input)
        }
        _ => {}
    }

    if let Some(duration) = parse_in_future(&input) {
        return now
            .checked_add_signed(duration)
            .map(|t| t.timestamp_millis())
            .ok_or_else(|| Error::Validation(format!("due date out of range: {:?}", input)));
    }

    Err(Error::Validation(format!("cannot parse due date: {:?}", input)))
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

fn local_millis(dt: NaiveDateTime, input: &str) -> Result<i64, Error> {
    Local
        .from_local_datetime(&dt)
        .earliest()
        .map(|t| t.timestamp_millis())
        .ok_or_else(|| Error::Validation(format!("no such local time: {:?}", input)))
}

/// Parse "in X unit(s)" pattern
fn parse_in_future(input: &str) -> Option<TimeDelta> {
    let without_in = input.strip_prefix("in ")?;
    parse_duration(without_in)
}

/// Parse a duration like "2 days", "1 week", "3h"
fn parse_duration(input: &str) -> Option<TimeDelta> {
    let parts: Vec<&str> = input.split_whitespace().collect();

    if parts.len() == 2 {
        let num: i64 = parts[0].parse().ok()?;
        return unit_to_duration(parts[1], num);
    }

    if parts.len() == 1 {
        // "3h": number then unit with no space
        let s = parts[0];
        let num_end = s.chars().take_while(|c| c.is_ascii_digit()).count();
        if num_end > 0 && num_end < s.len() {
            let num: i64 = s[..num_end].parse().ok()?;
            return unit_to_duration(&s[num_end..], num);
        }
    }

    None
}

/// `None` for unknown units and for amounts `TimeDelta` cannot hold.
fn unit_to_duration(unit: &str, num: i64) -> Option<TimeDelta> {
    let unit = unit.trim_end_matches('s');
    match unit {
        "minute" | "min" | "m" => TimeDelta::try_minutes(num),
        "hour" | "hr" | "h" => TimeDelta::try_hours(num),
        "day" | "d" => TimeDelta::try_days(num),
        "week" | "wk" | "w" => TimeDelta::try_weeks(num),
        _ => None,
    }
}

//! Date normalization for the sheet's mixed encodings.
//!
//! Every entry point returns `Option` instead of an error: an unparseable
//! limit date simply means no deadline rule applies.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

const LEGACY_SERIAL_THRESHOLD: f64 = 30_000.0;
const SERIAL_EPOCH_OFFSET_DAYS: f64 = 25_569.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy)]
enum FieldOrder {
    DayMonthYear,
    YearMonthDay,
    DayMonthShortYear,
}

static DATE_LAYOUTS: Lazy<Vec<(Regex, FieldOrder)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"^(\d{2})/(\d{2})/(\d{4})$").expect("valid dd/mm/yyyy regex"),
            FieldOrder::DayMonthYear,
        ),
        (
            Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").expect("valid d/m/yyyy regex"),
            FieldOrder::DayMonthYear,
        ),
        (
            Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").expect("valid yyyy-mm-dd regex"),
            FieldOrder::YearMonthDay,
        ),
        (
            Regex::new(r"^(\d{1,2})-(\d{1,2})-(\d{4})$").expect("valid dd-mm-yyyy regex"),
            FieldOrder::DayMonthYear,
        ),
        (
            Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2})$").expect("valid d/m/yy regex"),
            FieldOrder::DayMonthShortYear,
        ),
    ]
});

static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4}),?(?:\s+(\d{1,2}):(\d{2})(?::(\d{2}))?)?$")
        .expect("valid note timestamp regex")
});

/// Parses any of the known sheet encodings into a calendar day.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    for (pattern, order) in DATE_LAYOUTS.iter() {
        let Some(caps) = pattern.captures(value) else {
            continue;
        };
        let first: u32 = caps[1].parse().ok()?;
        let second: u32 = caps[2].parse().ok()?;
        let third: i32 = caps[3].parse().ok()?;
        let (year, month, day) = match order {
            FieldOrder::DayMonthYear => (third, second, first),
            FieldOrder::YearMonthDay => (i32::try_from(first).ok()?, second, u32::try_from(third).ok()?),
            FieldOrder::DayMonthShortYear => (2000 + third, second, first),
        };
        // from_ymd_opt refuses rollover, so 31/02 never becomes 02/03.
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }

    if let Some(date) = parse_iso_datetime(value) {
        return Some(date);
    }

    parse_legacy_serial(value)
}

fn parse_iso_datetime(value: &str) -> Option<NaiveDate> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(value, layout).ok())
        .map(|parsed| parsed.date())
}

fn parse_legacy_serial(value: &str) -> Option<NaiveDate> {
    let serial: f64 = value.parse().ok()?;
    if !serial.is_finite() || serial <= LEGACY_SERIAL_THRESHOLD {
        return None;
    }
    let seconds = ((serial - SERIAL_EPOCH_OFFSET_DAYS) * SECONDS_PER_DAY).floor();
    DateTime::from_timestamp(seconds as i64, 0).map(|instant| instant.date_naive())
}

/// Parses `dd/mm/yyyy[,] [hh:mm[:ss]]` as written on notes and journal rows.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let caps = TIMESTAMP_RE.captures(raw.trim())?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year: i32 = caps[3].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    let hour = caps.get(4).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let minute = caps.get(5).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let second = caps.get(6).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;
    Some(NaiveDateTime::new(date, time))
}

/// Seconds since the epoch; malformed timestamps sort as the oldest entry.
pub fn timestamp_sort_key(raw: &str) -> i64 {
    parse_timestamp(raw)
        .map(|parsed| parsed.and_utc().timestamp())
        .unwrap_or(0)
}

pub fn format_timestamp(value: NaiveDateTime) -> String {
    value.format("%d/%m/%Y %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::{format_timestamp, normalize_date, parse_timestamp, timestamp_sort_key};
    use chrono::{Datelike, NaiveDate};

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn parses_day_first_and_iso() {
        assert_eq!(normalize_date("05/03/2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(normalize_date("2024-03-05"), Some(ymd(2024, 3, 5)));
        assert_eq!(normalize_date("5/3/2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(normalize_date("05-03-2024"), Some(ymd(2024, 3, 5)));
        assert_eq!(normalize_date("5/3/24"), Some(ymd(2024, 3, 5)));
    }

    #[test]
    fn rejects_rollover_dates() {
        assert_eq!(normalize_date("31/02/2024"), None);
        assert_eq!(normalize_date("2023-02-29"), None);
    }

    #[test]
    fn parses_iso_datetime_and_serial() {
        assert_eq!(normalize_date("2024-03-05T13:45:00"), Some(ymd(2024, 3, 5)));
        assert_eq!(normalize_date("2024-03-05T13:45:00-03:00"), Some(ymd(2024, 3, 5)));
        let serial = normalize_date("45000").expect("serial parses");
        assert_eq!(serial.year(), 2023);
        assert_eq!(serial, ymd(2023, 3, 15));
    }

    #[test]
    fn small_numbers_and_garbage_are_unparseable() {
        assert_eq!(normalize_date("1234"), None);
        assert_eq!(normalize_date(""), None);
        assert_eq!(normalize_date("amanhã"), None);
    }

    #[test]
    fn timestamps_accept_optional_time_and_comma() {
        let full = parse_timestamp("05/03/2024 14:30:15").expect("full timestamp");
        assert_eq!(format_timestamp(full), "05/03/2024 14:30:15");
        assert!(parse_timestamp("05/03/2024, 14:30").is_some());
        assert!(parse_timestamp("05/03/2024").is_some());
        assert_eq!(timestamp_sort_key("not a date"), 0);
        assert!(timestamp_sort_key("05/03/2024 14:31") > timestamp_sort_key("05/03/2024 14:30"));
    }
}

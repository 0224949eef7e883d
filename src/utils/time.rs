//! Date and timestamp helpers shared by the query and packaging layers.

use chrono::{DateTime, Datelike, NaiveDate, Utc, Weekday};

use crate::utils::error::{ServiceError, ServiceResult};

/// Wire timestamp format: UTC ISO-8601 with millisecond precision
const TIMESTAMP_FMT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Parse an input date in `YYYY-MM-DD` form.
///
/// Calendar-invalid dates (e.g. `2024-02-30`) are rejected, not rolled over.
pub fn parse_iso_date(field: &str, value: &str) -> ServiceResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        ServiceError::invalid_argument(format!(
            "invalid {}: '{}' (expected YYYY-MM-DD)",
            field, value
        ))
    })
}

/// Format a UTC instant for the wire: `YYYY-MM-DDTHH:MM:SS.SSSZ`
pub fn format_timestamp_ms(t: DateTime<Utc>) -> String {
    t.format(TIMESTAMP_FMT).to_string()
}

/// Current time in wire format
pub fn now_timestamp_ms() -> String {
    format_timestamp_ms(Utc::now())
}

pub fn is_weekday(d: NaiveDate) -> bool {
    !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Approximate count of trading days in `[from, to]`: weekdays minus an
/// estimated 10 exchange holidays per year.
pub fn estimate_trading_days(from: NaiveDate, to: NaiveDate) -> i64 {
    if to < from {
        return 0;
    }
    let mut weekdays = 0i64;
    let mut d = from;
    while d <= to {
        if is_weekday(d) {
            weekdays += 1;
        }
        d = match d.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    let total_days = (to - from).num_days() + 1;
    let holiday_estimate = (total_days as f64 / 365.25 * 10.0).round() as i64;
    (weekdays - holiday_estimate).max(0)
}

/// Parse a partition row timestamp, coercing to UTC.
///
/// Accepts RFC 3339 (offset or `Z`) and bare `YYYY-MM-DD HH:MM:SS[.SSS]` /
/// `YYYY-MM-DDTHH:MM:SS[.SSS]` forms, which are taken as already-UTC.
/// Returns None for anything else; the normalizer counts those as drops.
pub fn parse_row_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_iso_date_valid() {
        let d = parse_iso_date("from", "2024-01-05").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
    }

    #[test]
    fn test_parse_iso_date_rejects_impossible_dates() {
        assert!(parse_iso_date("from", "2024-02-30").is_err());
        assert!(parse_iso_date("from", "2024-13-01").is_err());
        assert!(parse_iso_date("from", "not-a-date").is_err());
        assert!(parse_iso_date("from", "2024/01/05").is_err());
    }

    #[test]
    fn test_timestamp_format_has_millisecond_precision() {
        let t = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_milli_opt(14, 30, 0, 250)
            .unwrap()
            .and_utc();
        assert_eq!(format_timestamp_ms(t), "2024-03-01T14:30:00.250Z");
    }

    #[test]
    fn test_is_weekday() {
        // 2024-01-06 is a Saturday, 2024-01-08 a Monday
        assert!(!is_weekday(NaiveDate::from_ymd_opt(2024, 1, 6).unwrap()));
        assert!(!is_weekday(NaiveDate::from_ymd_opt(2024, 1, 7).unwrap()));
        assert!(is_weekday(NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()));
    }

    #[test]
    fn test_estimate_trading_days_one_week() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        // 5 weekdays, holiday estimate rounds to 0 over 7 days
        assert_eq!(estimate_trading_days(from, to), 5);
    }

    #[test]
    fn test_estimate_trading_days_full_year() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let est = estimate_trading_days(from, to);
        // 2024 has 262 weekdays; estimate subtracts ~10 holidays
        assert!((250..=254).contains(&est), "estimate out of range: {}", est);
    }

    #[test]
    fn test_parse_row_timestamp_forms() {
        assert!(parse_row_timestamp("2024-01-05T14:30:00.000Z").is_some());
        assert!(parse_row_timestamp("2024-01-05T14:30:00+00:00").is_some());
        assert!(parse_row_timestamp("2024-01-05 14:30:00").is_some());
        assert!(parse_row_timestamp("2024-01-05T14:30:00").is_some());
        assert!(parse_row_timestamp("garbage").is_none());
        assert!(parse_row_timestamp("1704465000").is_none());
    }

    #[test]
    fn test_parse_row_timestamp_coerces_offset_to_utc() {
        let t = parse_row_timestamp("2024-01-05T09:30:00-05:00").unwrap();
        assert_eq!(format_timestamp_ms(t), "2024-01-05T14:30:00.000Z");
    }
}

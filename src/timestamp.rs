//! Timestamp reconciliation across browser-native epochs.
//!
//! Every browser family stores visit times in its own unit and epoch; the
//! canonical store keeps plain Unix seconds. The conversion table here is the
//! single source of truth for the non-relational extractors (the relational
//! extractors apply the same arithmetic inline in their SELECTs).

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};

use crate::config::Browser;

/// Seconds between 1601-01-01 and the Unix epoch (Windows FILETIME origin).
const WINDOWS_EPOCH_OFFSET: f64 = 11_644_473_600.0;
/// Seconds between the Unix epoch and 2001-01-01 (Core Data / WebKit origin).
const WEBKIT_EPOCH_OFFSET: f64 = 978_307_200.0;

/// Convert a browser-native timestamp to Unix seconds.
///
/// Chrome counts microseconds from 1601, IE/Edge counts 100 ns ticks from
/// 1601, Safari counts seconds from 2001 and Firefox counts microseconds from
/// 1970. With no browser given the value is taken to be Unix seconds already.
pub fn to_unix(browser: Option<Browser>, raw: f64) -> f64 {
    match browser {
        Some(Browser::Chrome) => raw / 1_000_000.0 - WINDOWS_EPOCH_OFFSET,
        Some(Browser::Ie11) => raw / 10_000_000.0 - WINDOWS_EPOCH_OFFSET,
        Some(Browser::Safari) => raw + WEBKIT_EPOCH_OFFSET,
        Some(Browser::Firefox) => raw / 1_000_000.0,
        None => raw,
    }
}

/// Default import cutoff: `days` days before now, as Unix seconds.
pub fn default_cutoff(days: i64) -> f64 {
    (Utc::now() - chrono::Duration::days(days)).timestamp() as f64
}

/// Human-readable local date for display and export.
pub fn format_timestamp(secs: i64) -> String {
    match DateTime::from_timestamp(secs, 0) {
        Some(dt) => dt
            .with_timezone(&Local)
            .format("%d.%m.%Y %H:%M:%S")
            .to_string(),
        None => "-".to_string(),
    }
}

/// Unix-second bounds `[start, end)` covering a single day.
pub fn day_bounds(day: NaiveDate) -> (i64, i64) {
    let start = day.and_hms_opt(0, 0, 0).unwrap_or_default();
    let end = start + chrono::Duration::days(1);
    (
        Utc.from_utc_datetime(&start).timestamp(),
        Utc.from_utc_datetime(&end).timestamp(),
    )
}

/// Unix-second bounds `[start of from, start of to)` covering a date range.
pub fn range_bounds(from: NaiveDate, to: NaiveDate) -> (i64, i64) {
    let start = from.and_hms_opt(0, 0, 0).unwrap_or_default();
    let end = to.and_hms_opt(0, 0, 0).unwrap_or_default();
    (
        Utc.from_utc_datetime(&start).timestamp(),
        Utc.from_utc_datetime(&end).timestamp(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    // 2020-06-15 12:00:00 UTC
    const INSTANT: f64 = 1_592_222_400.0;

    #[test]
    fn chrome_microseconds_since_1601() {
        let native = (INSTANT + 11_644_473_600.0) * 1_000_000.0;
        let unix = to_unix(Some(Browser::Chrome), native);
        assert!((unix - INSTANT).abs() < 1.0);
    }

    #[test]
    fn ie11_filetime_ticks_since_1601() {
        let native = (INSTANT + 11_644_473_600.0) * 10_000_000.0;
        let unix = to_unix(Some(Browser::Ie11), native);
        assert!((unix - INSTANT).abs() < 1.0);
    }

    #[test]
    fn safari_seconds_since_2001() {
        let native = INSTANT - 978_307_200.0;
        let unix = to_unix(Some(Browser::Safari), native);
        assert!((unix - INSTANT).abs() < 1.0);
    }

    #[test]
    fn firefox_microseconds_since_unix_epoch() {
        let native = INSTANT * 1_000_000.0;
        let unix = to_unix(Some(Browser::Firefox), native);
        assert!((unix - INSTANT).abs() < 1.0);
    }

    #[test]
    fn fallback_passes_unix_seconds_through() {
        assert_eq!(to_unix(None, INSTANT), INSTANT);
    }

    #[test]
    fn cutoff_is_in_the_past() {
        let cutoff = default_cutoff(60);
        let now = Utc::now().timestamp() as f64;
        assert!(cutoff < now);
        assert!(now - cutoff >= 60.0 * 86_400.0 - 5.0);
    }

    #[test]
    fn day_bounds_span_one_day() {
        let day = NaiveDate::from_ymd_opt(2020, 6, 15).expect("date");
        let (start, end) = day_bounds(day);
        assert_eq!(end - start, 86_400);
    }

    #[test]
    fn range_bounds_exclude_end_day() {
        let from = NaiveDate::from_ymd_opt(2020, 6, 15).expect("date");
        let to = NaiveDate::from_ymd_opt(2020, 6, 18).expect("date");
        let (start, end) = range_bounds(from, to);
        assert_eq!(end - start, 3 * 86_400);
    }
}

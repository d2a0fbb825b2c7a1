//! Time window matching for the tick scheduler.
//!
//! Everything here is a pure function of its arguments. Selection uses the
//! permissive predicates ([`is_starting_soon`], [`is_due`]); the strict
//! predicate ([`is_strictly_due`]) must hold again immediately before an
//! intent is mutated.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::MalformedMeetingTime;

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M:%S%.f", "%H:%M"];

/// True iff `meeting_start` lies in `[now, now + window]`, both ends inclusive.
pub fn is_starting_soon(meeting_start: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    meeting_start >= now && meeting_start <= now + window
}

/// Buffered selection predicate: `scheduled_at <= now + buffer`.
pub fn is_due(scheduled_at: DateTime<Utc>, now: DateTime<Utc>, buffer: Duration) -> bool {
    scheduled_at <= now + buffer
}

/// Unbuffered action predicate: `scheduled_at <= now`.
pub fn is_strictly_due(scheduled_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    scheduled_at <= now
}

/// Combine a stored meeting date and time into a UTC instant.
///
/// `offset` is the UTC offset the meeting service stores wall-clock values
/// in. A full ISO datetime in the date column is accepted; only its date
/// part is used.
pub fn meeting_start(
    date: &str,
    time: &str,
    offset: FixedOffset,
) -> Result<DateTime<Utc>, MalformedMeetingTime> {
    let malformed = |reason: String| MalformedMeetingTime {
        date: date.to_string(),
        time: time.to_string(),
        reason,
    };

    let date_part = date.trim();
    let date_part = date_part.split_once('T').map_or(date_part, |(d, _)| d);
    let day = NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| malformed(format!("invalid date: {e}")))?;

    let time_part = time.trim();
    let clock = TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(time_part, fmt).ok())
        .ok_or_else(|| malformed("invalid time".to_string()))?;

    offset
        .from_local_datetime(&day.and_time(clock))
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| malformed("ambiguous local time".to_string()))
}

/// Local calendar dates whose meetings can start within `[now, now + window]`.
///
/// One date normally; two when the window crosses local midnight.
pub fn sweep_dates(now: DateTime<Utc>, window: Duration, offset: FixedOffset) -> Vec<NaiveDate> {
    let first = now.with_timezone(&offset).date_naive();
    let last = (now + window).with_timezone(&offset).date_naive();
    if first == last {
        vec![first]
    } else {
        vec![first, last]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_starting_soon_inclusive_bounds() {
        let start = at("2025-01-01T16:44:00Z");
        let window = Duration::minutes(5);

        assert!(!is_starting_soon(start, at("2025-01-01T16:38:59Z"), window));
        assert!(is_starting_soon(start, at("2025-01-01T16:39:00Z"), window));
        assert!(is_starting_soon(start, at("2025-01-01T16:39:30Z"), window));
        assert!(is_starting_soon(start, at("2025-01-01T16:44:00Z"), window));
        assert!(!is_starting_soon(start, at("2025-01-01T16:44:01Z"), window));
    }

    #[test]
    fn test_due_is_buffered_but_strict_is_not() {
        let scheduled = at("2025-01-01T16:35:00Z");
        let now = at("2025-01-01T16:34:30Z");
        let buffer = Duration::minutes(1);

        assert!(is_due(scheduled, now, buffer));
        assert!(!is_strictly_due(scheduled, now));
        assert!(is_strictly_due(scheduled, at("2025-01-01T16:35:00Z")));
        assert!(!is_due(scheduled, at("2025-01-01T16:33:59Z"), buffer));
    }

    #[test]
    fn test_meeting_start_combines_date_and_time() {
        let start = meeting_start("2025-01-01", "16:40", utc()).unwrap();
        assert_eq!(start, at("2025-01-01T16:40:00Z"));

        let with_seconds = meeting_start("2025-01-01", "16:40:30", utc()).unwrap();
        assert_eq!(with_seconds, at("2025-01-01T16:40:30Z"));
    }

    #[test]
    fn test_meeting_start_accepts_iso_date_column() {
        let start = meeting_start("2025-01-01T00:00:00.000Z", "09:15", utc()).unwrap();
        assert_eq!(start, at("2025-01-01T09:15:00Z"));
    }

    #[test]
    fn test_meeting_start_applies_offset() {
        let cet = FixedOffset::east_opt(3600).unwrap();
        let start = meeting_start("2025-01-01", "16:40", cet).unwrap();
        assert_eq!(start, at("2025-01-01T15:40:00Z"));
    }

    #[test]
    fn test_meeting_start_rejects_malformed_values() {
        assert!(meeting_start("2025-02-30", "10:00", utc()).is_err());
        assert!(meeting_start("", "10:00", utc()).is_err());

        let err = meeting_start("2025-01-01", "25:99", utc()).unwrap_err();
        assert_eq!(err.time, "25:99");
        assert!(err.reason.contains("time"));
    }

    #[test]
    fn test_sweep_dates_single_day() {
        let dates = sweep_dates(at("2025-01-01T16:40:00Z"), Duration::minutes(5), utc());
        assert_eq!(dates, vec![NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()]);
    }

    #[test]
    fn test_sweep_dates_crossing_midnight() {
        let dates = sweep_dates(at("2025-01-01T23:58:00Z"), Duration::minutes(5), utc());
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            ]
        );
    }

    #[test]
    fn test_sweep_dates_use_local_calendar() {
        // 23:30 UTC is already the next day at UTC+2.
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let dates = sweep_dates(at("2025-01-01T23:30:00Z"), Duration::minutes(5), plus_two);
        assert_eq!(dates, vec![NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()]);
    }
}

use crate::components::google_calendar::models::EventDateTime;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

/// Midnight of `date` in `tz`, as UTC
pub fn date_start_utc(date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Provider representation of an event boundary.
///
/// All-day boundaries are sent as plain dates in the household timezone
/// (the end date stays exclusive), timed ones as UTC instants.
pub fn to_remote_time(at: DateTime<Utc>, all_day: bool, tz: Tz) -> EventDateTime {
    if all_day {
        EventDateTime {
            date: Some(at.with_timezone(&tz).date_naive()),
            ..Default::default()
        }
    } else {
        EventDateTime {
            date_time: Some(at),
            time_zone: Some(tz.name().to_string()),
            ..Default::default()
        }
    }
}

/// Provider representation of an event's start and end.
///
/// An all-day end date is exclusive, so a range that ends on its start day
/// is sent as covering that whole day.
pub fn to_remote_range(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    all_day: bool,
    tz: Tz,
) -> (EventDateTime, EventDateTime) {
    let remote_start = to_remote_time(start, all_day, tz);
    let mut remote_end = to_remote_time(end, all_day, tz);

    if let (Some(first), Some(last)) = (remote_start.date, remote_end.date) {
        if last <= first {
            remote_end.date = first.succ_opt().or(Some(first));
        }
    }
    (remote_start, remote_end)
}

/// Convert provider boundaries into `(start, end, all_day)`.
///
/// Returns `None` when either boundary is missing or unparseable.
pub fn from_remote_times(
    start: Option<&EventDateTime>,
    end: Option<&EventDateTime>,
    tz: Tz,
) -> Option<(DateTime<Utc>, DateTime<Utc>, bool)> {
    let (start, end) = (start?, end?);

    if let (Some(start), Some(end)) = (start.date_time, end.date_time) {
        return Some((start, end, false));
    }

    let start_date = start.date?;
    let end_date = end.date.unwrap_or(start_date);
    Some((
        date_start_utc(start_date, tz)?,
        date_start_utc(end_date, tz)?,
        true,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_day_round_trip_in_household_timezone() {
        let tz: Tz = "Europe/Helsinki".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let start = date_start_utc(date, tz).unwrap();
        // Helsinki is UTC+3 in summer
        assert_eq!(start.to_rfc3339(), "2024-05-31T21:00:00+00:00");

        let remote = to_remote_time(start, true, tz);
        assert_eq!(remote.date, Some(date));
        assert_eq!(remote.date_time, None);
    }

    #[test]
    fn test_timed_boundaries() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();

        let remote_start = to_remote_time(start, false, Tz::UTC);
        let remote_end = to_remote_time(end, false, Tz::UTC);
        assert_eq!(remote_start.time_zone.as_deref(), Some("UTC"));

        let parsed = from_remote_times(Some(&remote_start), Some(&remote_end), Tz::UTC);
        assert_eq!(parsed, Some((start, end, false)));
    }

    #[test]
    fn test_all_day_range_covers_at_least_one_day() {
        let tz: Tz = "Europe/Helsinki".parse().unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let start = date_start_utc(day, tz).unwrap();

        let (from, to) = to_remote_range(start, start, true, tz);
        assert_eq!(from.date, Some(day));
        assert_eq!(to.date, NaiveDate::from_ymd_opt(2024, 6, 2));

        // A proper two-day range is left alone
        let end = date_start_utc(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(), tz).unwrap();
        let (_, to) = to_remote_range(start, end, true, tz);
        assert_eq!(to.date, NaiveDate::from_ymd_opt(2024, 6, 3));

        // Timed ranges are untouched
        let (from, to) = to_remote_range(start, start, false, tz);
        assert_eq!(from.date_time, to.date_time);
    }

    #[test]
    fn test_all_day_without_end_date() {
        let start = EventDateTime {
            date: NaiveDate::from_ymd_opt(2024, 1, 2),
            ..Default::default()
        };
        let end = EventDateTime::default();

        let (from, to, all_day) = from_remote_times(Some(&start), Some(&end), Tz::UTC).unwrap();
        assert!(all_day);
        assert_eq!(from, to);
    }

    #[test]
    fn test_missing_boundaries() {
        assert_eq!(from_remote_times(None, None, Tz::UTC), None);
        let empty = EventDateTime::default();
        assert_eq!(from_remote_times(Some(&empty), Some(&empty), Tz::UTC), None);
    }
}

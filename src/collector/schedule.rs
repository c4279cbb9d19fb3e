//! Schedule helpers

use chrono::{DateTime, Duration, TimeZone};

/// Next occurrence of `hour:00` local time strictly after `now`.
///
/// When the hour does not exist on a day (DST gap) the run moves to the
/// following hour. Hours above 23 are clamped.
pub fn next_daily_run<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> DateTime<Tz> {
    let hour = hour.min(23);
    let tz = now.timezone();
    let mut date = now.date_naive();

    for _ in 0..3 {
        if let Some(naive) = date.and_hms_opt(hour, 0, 0) {
            let candidate = tz
                .from_local_datetime(&naive)
                .earliest()
                .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest());
            if let Some(candidate) = candidate {
                if candidate > *now {
                    return candidate;
                }
            }
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }

    now.clone() + Duration::hours(24)
}

/// Wall-clock time from `now` until `then`, zero if already past
pub fn until<Tz: TimeZone>(now: &DateTime<Tz>, then: &DateTime<Tz>) -> std::time::Duration {
    let millis = then.timestamp_millis() - now.timestamp_millis();
    std::time::Duration::from_millis(millis.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Timelike, Utc};

    #[test]
    fn test_later_today() {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 1, 30, 0).unwrap();
        let next = next_daily_run(&now, 2);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 2, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_already_passed_moves_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 2, 0, 0).unwrap();
        let next = next_daily_run(&now, 2);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 3, 2, 0, 0).unwrap());

        let now = Utc.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap();
        let next = next_daily_run(&now, 2);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 1, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_respects_offset() {
        let cet = FixedOffset::east_opt(3600).unwrap();
        let now = cet.with_ymd_and_hms(2024, 3, 2, 0, 15, 0).unwrap();
        let next = next_daily_run(&now, 2);
        assert_eq!(next.hour(), 2);
        assert_eq!(next.with_timezone(&Utc).hour(), 1);
    }

    #[test]
    fn test_hour_is_clamped() {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 1, 0, 0).unwrap();
        assert_eq!(next_daily_run(&now, 99).hour(), 23);
    }

    #[test]
    fn test_until() {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 1, 0, 0).unwrap();
        let later = now + Duration::minutes(90);
        assert_eq!(until(&now, &later).as_secs(), 5400);
        assert_eq!(until(&later, &now).as_secs(), 0);
    }
}

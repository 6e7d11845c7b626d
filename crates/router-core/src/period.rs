//! Budget period arithmetic. All bounds are UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::types::PeriodType;

/// Half-open interval `[start, end)` of one budget period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodBounds {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
}

impl PeriodBounds {
    /// Whether the instant falls in the period
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

impl PeriodType {
    /// Bounds of the period containing `now`
    #[must_use]
    pub fn bounds(self, now: DateTime<Utc>) -> PeriodBounds {
        let today = now.date_naive();
        let (start, end) = match self {
            Self::Daily => (today, today + Duration::days(1)),
            Self::Weekly => {
                let monday =
                    today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
                (monday, monday + Duration::days(7))
            }
            Self::Monthly => {
                let first = first_of_month(today);
                // day 1 plus 32 days always lands in the following month
                (first, first_of_month(first + Duration::days(32)))
            }
        };
        PeriodBounds {
            start: midnight(start),
            end: midnight(end),
        }
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).single().expect("valid timestamp")
    }

    #[test]
    fn test_daily_bounds() {
        let bounds = PeriodType::Daily.bounds(at(2024, 5, 17, 13, 45, 0));
        assert_eq!(bounds.start, at(2024, 5, 17, 0, 0, 0));
        assert_eq!(bounds.end, at(2024, 5, 18, 0, 0, 0));
    }

    #[test]
    fn test_weekly_bounds_start_monday() {
        // 2024-05-19 is a Sunday
        let bounds = PeriodType::Weekly.bounds(at(2024, 5, 19, 23, 59, 59));
        assert_eq!(bounds.start, at(2024, 5, 13, 0, 0, 0));
        assert_eq!(bounds.end, at(2024, 5, 20, 0, 0, 0));

        let monday = PeriodType::Weekly.bounds(at(2024, 5, 20, 0, 0, 0));
        assert_eq!(monday.start, at(2024, 5, 20, 0, 0, 0));
    }

    #[test]
    fn test_monthly_bounds() {
        let bounds = PeriodType::Monthly.bounds(at(2024, 2, 29, 10, 0, 0));
        assert_eq!(bounds.start, at(2024, 2, 1, 0, 0, 0));
        assert_eq!(bounds.end, at(2024, 3, 1, 0, 0, 0));

        let december = PeriodType::Monthly.bounds(at(2023, 12, 31, 23, 59, 59));
        assert_eq!(december.start, at(2023, 12, 1, 0, 0, 0));
        assert_eq!(december.end, at(2024, 1, 1, 0, 0, 0));

        let january = PeriodType::Monthly.bounds(at(2024, 1, 31, 0, 0, 0));
        assert_eq!(january.end, at(2024, 2, 1, 0, 0, 0));
    }

    #[test]
    fn test_rollover_second() {
        let before = PeriodType::Monthly.bounds(at(2024, 3, 31, 23, 59, 59));
        let after = PeriodType::Monthly.bounds(at(2024, 4, 1, 0, 0, 1));
        assert_ne!(before, after);
        assert_eq!(before.end, after.start);
        assert!(after.contains(at(2024, 4, 1, 0, 0, 1)));
        assert!(!before.contains(at(2024, 4, 1, 0, 0, 0)));
    }
}

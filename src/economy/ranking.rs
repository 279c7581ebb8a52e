use core::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Utc};
use thiserror::Error;

use crate::db::models::Window;

/// Calendar period a ranking aggregates over. All windows are in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Daily,
    /// Starts on Sunday 00:00
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown ranking period '{0}'")]
pub struct UnknownPeriod(pub String);

impl Period {
    /// The period's `[start, end)` window that contains `now`
    pub fn window(self, now: DateTime<Utc>) -> Window {
        let today = now.date_naive();

        let (start, end) = match self {
            Self::Daily => (today, today + Duration::days(1)),
            Self::Weekly => {
                let start = today - Duration::days(i64::from(today.weekday().num_days_from_sunday()));
                (start, start + Duration::days(7))
            }
            Self::Monthly => {
                let start = today - Duration::days(i64::from(today.day0()));
                let end = start
                    .checked_add_months(Months::new(1))
                    .unwrap_or(NaiveDate::MAX);
                (start, end)
            }
        };

        Window {
            start: midnight(start),
            end: midnight(end),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

impl FromStr for Period {
    type Err = UnknownPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            _ => Err(UnknownPeriod(s.to_string())),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 30, 0).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_daily_window_is_the_calendar_day() {
        let w = Period::Daily.window(at(2024, 3, 14, 17));
        assert_eq!(w.start, day(2024, 3, 14));
        assert_eq!(w.end, day(2024, 3, 15));
    }

    #[test]
    fn test_weekly_window_starts_on_sunday() {
        // 2024-03-14 is a Thursday
        let w = Period::Weekly.window(at(2024, 3, 14, 9));
        assert_eq!(w.start, day(2024, 3, 10));
        assert_eq!(w.end, day(2024, 3, 17));

        let sunday = Period::Weekly.window(at(2024, 3, 10, 0));
        assert_eq!(sunday.start, day(2024, 3, 10));
    }

    #[test]
    fn test_monthly_window_crosses_year_end() {
        let w = Period::Monthly.window(at(2023, 12, 31, 23));
        assert_eq!(w.start, day(2023, 12, 1));
        assert_eq!(w.end, day(2024, 1, 1));

        let feb = Period::Monthly.window(at(2024, 2, 29, 12));
        assert_eq!(feb.end, day(2024, 3, 1));
    }

    #[test]
    fn test_window_is_half_open() {
        let w = Period::Daily.window(at(2024, 3, 14, 17));
        assert!(w.contains(day(2024, 3, 14)));
        assert!(!w.contains(day(2024, 3, 15)));
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!("Weekly".parse::<Period>().unwrap(), Period::Weekly);
        assert_eq!("monthly".parse::<Period>().unwrap(), Period::Monthly);
        assert!("yearly".parse::<Period>().is_err());
    }
}

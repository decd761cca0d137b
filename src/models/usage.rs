// src/models/usage.rs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Per-user daily counter for generated-question requests.
///
/// The counter is only meaningful for `date`; on any other day it reads as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub count: u32,
    pub date: Option<NaiveDate>,
}

/// Usage as reported to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    pub usage: u32,
    pub limit: u32,
    pub remaining: u32,
    pub limit_reached: bool,
}

impl DailyUsage {
    pub fn current(&self, today: NaiveDate) -> u32 {
        if self.date == Some(today) {
            self.count
        } else {
            0
        }
    }

    /// Returns the counter advanced by one use, or `TooManyRequests` once the
    /// limit for `today` is reached.
    pub fn consume(self, today: NaiveDate, limit: u32) -> Result<DailyUsage, AppError> {
        let used = self.current(today);
        if used >= limit {
            return Err(AppError::TooManyRequests(format!(
                "Daily AI limit reached ({}/{}). Please try again tomorrow.",
                used, limit
            )));
        }
        Ok(DailyUsage {
            count: used + 1,
            date: Some(today),
        })
    }

    pub fn report(&self, today: NaiveDate, limit: u32) -> UsageReport {
        let usage = self.current(today);
        let remaining = limit.saturating_sub(usage);
        UsageReport {
            usage,
            limit,
            remaining,
            limit_reached: remaining == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn counter_resets_on_a_new_day() {
        let usage = DailyUsage {
            count: 5,
            date: Some(day(1)),
        };
        assert_eq!(usage.current(day(1)), 5);
        assert_eq!(usage.current(day(2)), 0);

        let next = usage.consume(day(2), 5).unwrap();
        assert_eq!(next, DailyUsage { count: 1, date: Some(day(2)) });
    }

    #[test]
    fn consume_stops_at_limit() {
        let mut usage = DailyUsage::default();
        for _ in 0..3 {
            usage = usage.consume(day(4), 3).unwrap();
        }
        assert_eq!(usage.count, 3);
        assert!(matches!(
            usage.consume(day(4), 3),
            Err(AppError::TooManyRequests(_))
        ));
    }

    #[test]
    fn report_counts_down() {
        let usage = DailyUsage {
            count: 2,
            date: Some(day(9)),
        };
        let report = usage.report(day(9), 5);
        assert_eq!(report.remaining, 3);
        assert!(!report.limit_reached);

        let stale = usage.report(day(10), 5);
        assert_eq!(stale.usage, 0);
        assert_eq!(stale.remaining, 5);
    }
}

use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Value};

pub const FITBIT_DAILY_RESOURCE: &str = "FitbitDailyData";
pub const FITBIT_HEART_RATE_RESOURCE: &str = "FitbitHeartRateData";

/// Inclusive day window for resource queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The last `days` days ending today (UTC).
    pub fn last_days(days: u32) -> Self {
        let end = Utc::now().date_naive();
        Self::ending_on(end, days)
    }

    pub fn ending_on(end: NaiveDate, days: u32) -> Self {
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
        }
    }

    /// `startDate`/`endDate` query parameters in `YYYY-MM-DD` form.
    pub fn to_query(&self) -> Value {
        json!({
            "startDate": self.start.format("%Y-%m-%d").to_string(),
            "endDate": self.end.format("%Y-%m-%d").to_string(),
        })
    }
}

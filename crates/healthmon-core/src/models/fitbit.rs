use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct FitbitHeartRateData {
    pub timestamp: String,
    pub value: f64,
    #[serde(default)]
    pub zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct FitbitDailyData {
    pub date: String,
    #[serde(default)]
    pub steps: u32,
    #[serde(default)]
    pub calories_burned: f64,
    #[serde(default)]
    pub active_minutes: u32,
    #[serde(default)]
    pub distance_km: f64,
    #[serde(default)]
    pub sleep_minutes: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct FitbitData {
    pub heart_rate: Vec<FitbitHeartRateData>,
    pub daily: Vec<FitbitDailyData>,
}

impl FitbitData {
    pub fn is_empty(&self) -> bool {
        self.heart_rate.is_empty() && self.daily.is_empty()
    }

    pub fn total_steps(&self) -> u64 {
        self.daily.iter().map(|d| u64::from(d.steps)).sum()
    }

    /// Most recent day by date string (ISO dates sort lexically).
    pub fn latest_day(&self) -> Option<&FitbitDailyData> {
        self.daily.iter().max_by(|a, b| a.date.cmp(&b.date))
    }

    pub fn average_heart_rate(&self) -> Option<f64> {
        if self.heart_rate.is_empty() {
            return None;
        }
        let sum: f64 = self.heart_rate.iter().map(|h| h.value).sum();
        Some(sum / self.heart_rate.len() as f64)
    }
}

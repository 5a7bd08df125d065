use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Clamped per-source percentages that fed one day's score.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakdown {
    pub tasks: f64,
    pub practice: f64,
    pub weight: f64,
    pub coding_practice: f64,
}

/// One calendar date of the aggregated series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DayRecord {
    pub date: NaiveDate,
    pub completed_count: u32,
    pub not_completed_count: u32,
    /// Weighted completion in `0..=100`.
    pub score: u8,
    pub breakdown: SourceBreakdown,
}

impl DayRecord {
    pub fn total_tasks(&self) -> u32 {
        self.completed_count + self.not_completed_count
    }
}

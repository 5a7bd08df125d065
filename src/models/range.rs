use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive calendar date range used for every range request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> AppResult<Self> {
        if start > end {
            return Err(AppError::validation_with_details(
                "range start is after range end",
                serde_json::json!({
                    "start": start.format(ISO_DATE_FORMAT).to_string(),
                    "end": end.format(ISO_DATE_FORMAT).to_string(),
                }),
            ));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> AppResult<Self> {
        Self::new(parse_iso_date(start)?, parse_iso_date(end)?)
    }

    pub fn from_preset(preset: RangePreset, today: NaiveDate) -> Self {
        let start = match preset {
            RangePreset::Today => today,
            RangePreset::LastSevenDays => today - Duration::days(7),
            RangePreset::ThisWeek => {
                today - Duration::days(i64::from(today.weekday().num_days_from_sunday()))
            }
            RangePreset::ThisMonth => today.with_day(1).unwrap_or(today),
            RangePreset::ThisYear => today.with_ordinal(1).unwrap_or(today),
        };
        Self { start, end: today }
    }

    pub fn start_param(&self) -> String {
        self.start.format(ISO_DATE_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(ISO_DATE_FORMAT).to_string()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start_param(), self.end_param())
    }
}

pub fn parse_iso_date(value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), ISO_DATE_FORMAT)
        .map_err(|err| AppError::validation(format!("invalid date `{value}`: {err}")))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RangePreset {
    Today,
    #[default]
    LastSevenDays,
    ThisWeek,
    ThisMonth,
    ThisYear,
}

impl RangePreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            RangePreset::Today => "today",
            RangePreset::LastSevenDays => "last_seven_days",
            RangePreset::ThisWeek => "this_week",
            RangePreset::ThisMonth => "this_month",
            RangePreset::ThisYear => "this_year",
        }
    }
}

impl fmt::Display for RangePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RangePreset {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "today" => Ok(RangePreset::Today),
            "last_seven_days" => Ok(RangePreset::LastSevenDays),
            "this_week" => Ok(RangePreset::ThisWeek),
            "this_month" => Ok(RangePreset::ThisMonth),
            "this_year" => Ok(RangePreset::ThisYear),
            other => Err(format!("unsupported range preset: {other}")),
        }
    }
}

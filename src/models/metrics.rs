use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::task::DayTask;

/// The four independently tracked sources that feed the daily score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    Tasks,
    Practice,
    Weight,
    CodingPractice,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Tasks,
        SourceKind::Practice,
        SourceKind::Weight,
        SourceKind::CodingPractice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Tasks => "tasks",
            SourceKind::Practice => "practice",
            SourceKind::Weight => "weight",
            SourceKind::CodingPractice => "codingPractice",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            SourceKind::Tasks => 0,
            SourceKind::Practice => 1,
            SourceKind::Weight => 2,
            SourceKind::CodingPractice => 3,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything that can contribute a completion percentage for one day.
pub trait SourcePercentage {
    /// Raw percentage as reported by the source, not yet clamped.
    fn raw_percentage(&self) -> f64;

    fn clamped_percentage(&self) -> f64 {
        clamp_percentage(self.raw_percentage())
    }
}

pub fn clamp_percentage(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Typing practice for one day.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PracticeMetric {
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub total_minutes: f64,
    #[serde(default)]
    pub minutes_practiced: f64,
}

/// Load-cell exercise for one day.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeightMetric {
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub goal_seconds: f64,
    #[serde(default)]
    pub seconds_practiced: f64,
}

/// Coding-practice questions for one day.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CodingPracticeMetric {
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub goal_question: f64,
    #[serde(default)]
    pub question_finished: f64,
}

impl SourcePercentage for PracticeMetric {
    fn raw_percentage(&self) -> f64 {
        self.percentage.unwrap_or(0.0)
    }
}

impl SourcePercentage for WeightMetric {
    fn raw_percentage(&self) -> f64 {
        self.percentage.unwrap_or(0.0)
    }
}

impl SourcePercentage for CodingPracticeMetric {
    fn raw_percentage(&self) -> f64 {
        self.percentage.unwrap_or(0.0)
    }
}

/// A day's task list contributes completed / total.
impl SourcePercentage for [DayTask] {
    fn raw_percentage(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let completed = self.iter().filter(|task| task.completed).count();
        completed as f64 / self.len() as f64 * 100.0
    }
}

impl SourcePercentage for Vec<DayTask> {
    fn raw_percentage(&self) -> f64 {
        self.as_slice().raw_percentage()
    }
}

pub type TaskDayMap = BTreeMap<NaiveDate, Vec<DayTask>>;
pub type PracticeDayMap = BTreeMap<NaiveDate, PracticeMetric>;
pub type WeightDayMap = BTreeMap<NaiveDate, WeightMetric>;
pub type CodingPracticeDayMap = BTreeMap<NaiveDate, CodingPracticeMetric>;

/// One source's payload for a whole range, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceDayMap {
    Tasks(TaskDayMap),
    Practice(PracticeDayMap),
    Weight(WeightDayMap),
    CodingPractice(CodingPracticeDayMap),
}

impl SourceDayMap {
    pub fn empty(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Tasks => SourceDayMap::Tasks(BTreeMap::new()),
            SourceKind::Practice => SourceDayMap::Practice(BTreeMap::new()),
            SourceKind::Weight => SourceDayMap::Weight(BTreeMap::new()),
            SourceKind::CodingPractice => SourceDayMap::CodingPractice(BTreeMap::new()),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            SourceDayMap::Tasks(_) => SourceKind::Tasks,
            SourceDayMap::Practice(_) => SourceKind::Practice,
            SourceDayMap::Weight(_) => SourceKind::Weight,
            SourceDayMap::CodingPractice(_) => SourceKind::CodingPractice,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SourceDayMap::Tasks(map) => map.len(),
            SourceDayMap::Practice(map) => map.len(),
            SourceDayMap::Weight(map) => map.len(),
            SourceDayMap::CodingPractice(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The four current source maps, as owned by the aggregation engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMaps {
    pub tasks: TaskDayMap,
    pub practice: PracticeDayMap,
    pub weight: WeightDayMap,
    pub coding_practice: CodingPracticeDayMap,
}

impl SourceMaps {
    /// Swap one source wholesale; the other three are untouched.
    pub fn replace(&mut self, map: SourceDayMap) {
        match map {
            SourceDayMap::Tasks(map) => self.tasks = map,
            SourceDayMap::Practice(map) => self.practice = map,
            SourceDayMap::Weight(map) => self.weight = map,
            SourceDayMap::CodingPractice(map) => self.coding_practice = map,
        }
    }

    pub fn len_of(&self, kind: SourceKind) -> usize {
        match kind {
            SourceKind::Tasks => self.tasks.len(),
            SourceKind::Practice => self.practice.len(),
            SourceKind::Weight => self.weight.len(),
            SourceKind::CodingPractice => self.coding_practice.len(),
        }
    }
}

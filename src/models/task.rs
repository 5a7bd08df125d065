use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A task as listed for one calendar day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DayTask {
    pub description: String,
    #[serde(default)]
    pub completed: bool,
}

impl DayTask {
    pub fn new(description: impl Into<String>, completed: bool) -> Self {
        Self {
            description: description.into(),
            completed,
        }
    }
}

/// Completed / incomplete split of one day's tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DayTaskSummary {
    pub completed: Vec<DayTask>,
    pub incomplete: Vec<DayTask>,
    pub percentage: f64,
}

impl DayTaskSummary {
    pub fn from_tasks(tasks: &[DayTask]) -> Self {
        let (completed, incomplete): (Vec<DayTask>, Vec<DayTask>) =
            tasks.iter().cloned().partition(|task| task.completed);
        let percentage = if tasks.is_empty() {
            0.0
        } else {
            completed.len() as f64 / tasks.len() as f64 * 100.0
        };
        Self {
            completed,
            incomplete,
            percentage,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskGroup {
    #[serde(rename = "dailyTasks")]
    Daily,
    #[serde(rename = "weeklyTasks")]
    Weekly,
    #[serde(rename = "monthlyTasks")]
    Monthly,
}

impl TaskGroup {
    pub const ALL: [TaskGroup; 3] = [TaskGroup::Daily, TaskGroup::Weekly, TaskGroup::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskGroup::Daily => "dailyTasks",
            TaskGroup::Weekly => "weeklyTasks",
            TaskGroup::Monthly => "monthlyTasks",
        }
    }
}

impl fmt::Display for TaskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recurring task in the aggregated incomplete list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub excluded: bool,
    #[serde(default)]
    pub frequency: Option<u32>,
}

impl TaskRecord {
    pub fn new(description: impl Into<String>, excluded: bool) -> Self {
        Self {
            description: description.into(),
            completed: false,
            excluded,
            frequency: None,
        }
    }
}

/// Wire shape of `/tasks/incomplete-aggregated`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedTasks {
    #[serde(default)]
    pub daily_tasks: Vec<TaskRecord>,
    #[serde(default)]
    pub weekly_tasks: Vec<TaskRecord>,
    #[serde(default)]
    pub monthly_tasks: Vec<TaskRecord>,
}

impl AggregatedTasks {
    pub fn group(&self, group: TaskGroup) -> &[TaskRecord] {
        match group {
            TaskGroup::Daily => &self.daily_tasks,
            TaskGroup::Weekly => &self.weekly_tasks,
            TaskGroup::Monthly => &self.monthly_tasks,
        }
    }

    pub fn group_mut(&mut self, group: TaskGroup) -> &mut Vec<TaskRecord> {
        match group {
            TaskGroup::Daily => &mut self.daily_tasks,
            TaskGroup::Weekly => &mut self.weekly_tasks,
            TaskGroup::Monthly => &mut self.monthly_tasks,
        }
    }

    pub fn find_mut(&mut self, group: TaskGroup, description: &str) -> Option<&mut TaskRecord> {
        self.group_mut(group)
            .iter_mut()
            .find(|task| task.description == description)
    }

    pub fn find(&self, group: TaskGroup, description: &str) -> Option<&TaskRecord> {
        self.group(group)
            .iter()
            .find(|task| task.description == description)
    }

    /// Tasks of `group` that still count toward aggregation.
    pub fn included(&self, group: TaskGroup) -> impl Iterator<Item = &TaskRecord> {
        self.group(group).iter().filter(|task| !task.excluded)
    }

    /// Tasks of `group` the user has excluded.
    pub fn excluded(&self, group: TaskGroup) -> impl Iterator<Item = &TaskRecord> {
        self.group(group).iter().filter(|task| task.excluded)
    }

    pub fn is_empty(&self) -> bool {
        TaskGroup::ALL
            .iter()
            .all(|group| self.group(*group).is_empty())
    }

    pub fn sort_by_description(&mut self) {
        for group in TaskGroup::ALL {
            self.group_mut(group).sort_by(compare_descriptions);
        }
    }
}

fn compare_descriptions(left: &TaskRecord, right: &TaskRecord) -> Ordering {
    left.description
        .to_lowercase()
        .cmp(&right.description.to_lowercase())
        .then_with(|| left.description.cmp(&right.description))
}

/// Body of `POST /tasks/exclusion`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionRequest {
    pub description: String,
    pub excluded: bool,
}

/// An optimistic exclusion change awaiting server confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionEdit {
    pub group: TaskGroup,
    pub description: String,
    pub previous_excluded: bool,
    pub next_excluded: bool,
    pub(crate) snapshot: u64,
    pub(crate) sequence: u64,
}

impl ExclusionEdit {
    pub fn request(&self) -> ExclusionRequest {
        ExclusionRequest {
            description: self.description.clone(),
            excluded: self.next_excluded,
        }
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::models::range::{DateRange, RangePreset};
use crate::models::task::{AggregatedTasks, ExclusionEdit, TaskGroup};
use crate::services::api_client::DashboardApi;

type TaskKey = (TaskGroup, String);

/// Edits of one task that the server has not answered yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingEdits {
    /// Last flag the server is known to hold.
    confirmed: bool,
    latest: u64,
    outstanding: usize,
    latest_failed: bool,
}

/// Aggregated recurring tasks plus the bookkeeping for in-flight edits.
#[derive(Debug, Clone, Default)]
pub struct ExclusionState {
    range: Option<DateRange>,
    tasks: AggregatedTasks,
    loading: bool,
    snapshot: u64,
    next_sequence: u64,
    pending: HashMap<TaskKey, PendingEdits>,
}

impl ExclusionState {
    pub fn range(&self) -> Option<DateRange> {
        self.range
    }

    pub fn tasks(&self) -> &AggregatedTasks {
        &self.tasks
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn pending_edits(&self) -> usize {
        self.pending.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { tasks: usize },
    Failed,
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The server accepted the new flag.
    Confirmed,
    /// The server refused; the task shows the last flag the server accepted.
    RolledBack,
    /// The server refused, but a newer edit or a reload owns the task now.
    Superseded,
    NotFound,
}

/// Optimistic exclusion toggling over the aggregated incomplete-task list.
pub struct ExclusionReconciler {
    api: Arc<dyn DashboardApi>,
    state: watch::Sender<ExclusionState>,
}

impl ExclusionReconciler {
    pub fn new(api: Arc<dyn DashboardApi>) -> Self {
        let (state, _) = watch::channel(ExclusionState::default());
        Self { api, state }
    }

    pub fn tasks(&self) -> AggregatedTasks {
        self.state.borrow().tasks.clone()
    }

    pub fn snapshot(&self) -> ExclusionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExclusionState> {
        self.state.subscribe()
    }

    pub async fn load_preset(&self, preset: RangePreset) -> LoadOutcome {
        let today = Local::now().date_naive();
        self.load(DateRange::from_preset(preset, today)).await
    }

    /// Replace the list with server truth for `range`, discarding optimistic state.
    pub async fn load(&self, range: DateRange) -> LoadOutcome {
        let mut snapshot = 0;
        self.state.send_modify(|state| {
            state.snapshot += 1;
            state.range = Some(range);
            state.loading = true;
            state.pending.clear();
            snapshot = state.snapshot;
        });
        debug!(target: "app::exclusion", range = %range, snapshot, "loading aggregated tasks");

        let (mut tasks, failed) = match self.api.incomplete_tasks(&range).await {
            Ok(tasks) => (tasks, false),
            Err(error) => {
                warn!(
                    target: "app::exclusion",
                    range = %range,
                    error = %error,
                    "failed to load aggregated tasks"
                );
                (AggregatedTasks::default(), true)
            }
        };
        tasks.sort_by_description();
        let count = TaskGroup::ALL
            .iter()
            .map(|group| tasks.group(*group).len())
            .sum();

        let applied = self.state.send_if_modified(|state| {
            if state.snapshot != snapshot {
                return false;
            }
            // Toggles issued while the request was in flight targeted the old list.
            state.snapshot += 1;
            state.pending.clear();
            state.tasks = tasks;
            state.loading = false;
            true
        });

        match (applied, failed) {
            (false, _) => LoadOutcome::Superseded,
            (true, true) => LoadOutcome::Failed,
            (true, false) => {
                info!(target: "app::exclusion", range = %range, tasks = count, "aggregated tasks loaded");
                LoadOutcome::Loaded { tasks: count }
            }
        }
    }

    /// Flip `excluded` for one task immediately, then confirm with the server.
    pub async fn toggle_exclusion(&self, group: TaskGroup, description: &str) -> ToggleOutcome {
        let Some(edit) = self.apply_locally(group, description) else {
            warn!(
                target: "app::exclusion",
                group = group.as_str(),
                description,
                "toggle requested for unknown task"
            );
            return ToggleOutcome::NotFound;
        };

        match self.api.set_exclusion(&edit.request()).await {
            Ok(()) => {
                self.confirm(&edit);
                info!(
                    target: "app::exclusion",
                    group = group.as_str(),
                    description,
                    excluded = edit.next_excluded,
                    "exclusion confirmed"
                );
                ToggleOutcome::Confirmed
            }
            Err(error) => {
                let outcome = self.roll_back(&edit);
                warn!(
                    target: "app::exclusion",
                    group = group.as_str(),
                    description,
                    error = %error,
                    outcome = ?outcome,
                    "exclusion update failed"
                );
                outcome
            }
        }
    }

    fn apply_locally(&self, group: TaskGroup, description: &str) -> Option<ExclusionEdit> {
        let mut edit = None;
        self.state.send_if_modified(|state| {
            let snapshot = state.snapshot;
            let Some(task) = state.tasks.find_mut(group, description) else {
                return false;
            };
            let previous_excluded = task.excluded;
            task.excluded = !previous_excluded;

            state.next_sequence += 1;
            let sequence = state.next_sequence;
            let pending = state
                .pending
                .entry((group, description.to_string()))
                .or_insert(PendingEdits {
                    confirmed: previous_excluded,
                    latest: sequence,
                    outstanding: 0,
                    latest_failed: false,
                });
            pending.latest = sequence;
            pending.outstanding += 1;
            pending.latest_failed = false;

            edit = Some(ExclusionEdit {
                group,
                description: description.to_string(),
                previous_excluded,
                next_excluded: !previous_excluded,
                snapshot,
                sequence,
            });
            true
        });
        edit
    }

    // Count one answer for the edit's key. `None` when a reload discarded the bookkeeping.
    fn answer(
        state: &mut ExclusionState,
        edit: &ExclusionEdit,
        accepted: bool,
    ) -> Option<(PendingEdits, bool)> {
        if state.snapshot != edit.snapshot {
            return None;
        }
        let key = (edit.group, edit.description.clone());
        let pending = state.pending.get_mut(&key)?;
        pending.outstanding = pending.outstanding.saturating_sub(1);
        let is_latest = pending.latest == edit.sequence;
        if accepted {
            pending.confirmed = edit.next_excluded;
        } else if is_latest {
            pending.latest_failed = true;
        }
        let answered = *pending;
        if answered.outstanding == 0 {
            state.pending.remove(&key);
        }
        Some((answered, is_latest))
    }

    fn confirm(&self, edit: &ExclusionEdit) {
        self.state.send_if_modified(|state| {
            let Some((pending, _)) = Self::answer(state, edit, true) else {
                return false;
            };
            // The newest edit already failed and fell back; show what the server now holds.
            if !pending.latest_failed {
                return false;
            }
            Self::show(state, edit, pending.confirmed)
        });
    }

    fn roll_back(&self, edit: &ExclusionEdit) -> ToggleOutcome {
        let mut outcome = ToggleOutcome::Superseded;
        self.state.send_if_modified(|state| {
            let Some((pending, true)) = Self::answer(state, edit, false) else {
                return false;
            };
            outcome = ToggleOutcome::RolledBack;
            Self::show(state, edit, pending.confirmed)
        });
        outcome
    }

    fn show(state: &mut ExclusionState, edit: &ExclusionEdit, excluded: bool) -> bool {
        match state.tasks.find_mut(edit.group, &edit.description) {
            Some(task) if task.excluded != excluded => {
                task.excluded = excluded;
                true
            }
            _ => false,
        }
    }
}

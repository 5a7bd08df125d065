use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::models::metrics::{CodingPracticeMetric, PracticeMetric, SourceKind, WeightMetric};
use crate::models::task::{DayTask, DayTaskSummary};
use crate::services::api_client::DashboardApi;

/// One drill-down panel: its own loading flag and whatever data arrived.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetailPanel<T> {
    pub loading: bool,
    pub data: Option<T>,
}

impl<T> Default for DetailPanel<T> {
    fn default() -> Self {
        Self {
            loading: false,
            data: None,
        }
    }
}

impl<T> DetailPanel<T> {
    fn start(&mut self) {
        self.loading = true;
        self.data = None;
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DayDetailState {
    pub selected_date: Option<NaiveDate>,
    pub tasks: DetailPanel<Vec<DayTask>>,
    pub practice: DetailPanel<PracticeMetric>,
    pub weight: DetailPanel<WeightMetric>,
    pub coding_practice: DetailPanel<CodingPracticeMetric>,
    #[serde(skip)]
    tickets: [u64; 4],
}

impl DayDetailState {
    pub fn is_loading(&self) -> bool {
        self.tasks.loading
            || self.practice.loading
            || self.weight.loading
            || self.coding_practice.loading
    }

    pub fn task_summary(&self) -> Option<DayTaskSummary> {
        self.tasks.data.as_deref().map(DayTaskSummary::from_tasks)
    }

    fn bump(&mut self, kind: SourceKind) -> u64 {
        let slot = &mut self.tickets[kind.index()];
        *slot += 1;
        *slot
    }

    fn is_current(&self, kind: SourceKind, ticket: u64) -> bool {
        self.tickets[kind.index()] == ticket
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelOutcome {
    Loaded,
    Failed,
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayDetailReport {
    pub date: NaiveDate,
    pub outcomes: [(SourceKind, PanelOutcome); 4],
}

impl DayDetailReport {
    pub fn outcome(&self, kind: SourceKind) -> PanelOutcome {
        self.outcomes[kind.index()].1
    }
}

/// Fetches per-source detail for the selected day, one independent slot per source.
pub struct DayDetailCoordinator {
    api: Arc<dyn DashboardApi>,
    state: watch::Sender<DayDetailState>,
}

impl DayDetailCoordinator {
    pub fn new(api: Arc<dyn DashboardApi>) -> Self {
        let (state, _) = watch::channel(DayDetailState::default());
        Self { api, state }
    }

    pub fn snapshot(&self) -> DayDetailState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DayDetailState> {
        self.state.subscribe()
    }

    pub async fn select_date(&self, date: NaiveDate) -> DayDetailReport {
        let mut tickets = [0u64; 4];
        self.state.send_modify(|state| {
            state.selected_date = Some(date);
            state.tasks.start();
            state.practice.start();
            state.weight.start();
            state.coding_practice.start();
            for kind in SourceKind::ALL {
                tickets[kind.index()] = state.bump(kind);
            }
        });
        info!(target: "app::detail", %date, "loading day detail");

        let api = &self.api;
        let (tasks, practice, weight, coding) = tokio::join!(
            async {
                let result = api.tasks_for_day(date).await;
                self.settle(SourceKind::Tasks, tickets[0], result, |state| &mut state.tasks)
            },
            async {
                let result = api.practice_for_day(date, false).await;
                self.settle(SourceKind::Practice, tickets[1], result, |state| {
                    &mut state.practice
                })
            },
            async {
                let result = api.weight_for_day(date).await;
                self.settle(SourceKind::Weight, tickets[2], result, |state| &mut state.weight)
            },
            async {
                let result = api.coding_practice_for_day(date).await;
                self.settle(SourceKind::CodingPractice, tickets[3], result, |state| {
                    &mut state.coding_practice
                })
            },
        );

        DayDetailReport {
            date,
            outcomes: [
                (SourceKind::Tasks, tasks),
                (SourceKind::Practice, practice),
                (SourceKind::Weight, weight),
                (SourceKind::CodingPractice, coding),
            ],
        }
    }

    /// Re-run only the practice fetch with `isForced=true`. `None` when no day is selected.
    pub async fn force_recompute_practice(&self) -> Option<PanelOutcome> {
        let mut target = None;
        self.state.send_if_modified(|state| {
            let Some(date) = state.selected_date else {
                return false;
            };
            state.practice.loading = true;
            target = Some((date, state.bump(SourceKind::Practice)));
            true
        });

        let Some((date, ticket)) = target else {
            warn!(target: "app::detail", "force recompute requested without a selected day");
            return None;
        };

        debug!(target: "app::detail", %date, "forcing practice recompute");
        let result = self.api.practice_for_day(date, true).await;
        Some(self.settle(SourceKind::Practice, ticket, result, |state| &mut state.practice))
    }

    /// Deselect and blank every panel; in-flight results are dropped.
    pub fn clear(&self) {
        self.state.send_modify(|state| {
            for kind in SourceKind::ALL {
                state.bump(kind);
            }
            state.selected_date = None;
            state.tasks = DetailPanel::default();
            state.practice = DetailPanel::default();
            state.weight = DetailPanel::default();
            state.coding_practice = DetailPanel::default();
        });
    }

    fn settle<T>(
        &self,
        kind: SourceKind,
        ticket: u64,
        result: AppResult<T>,
        panel: impl FnOnce(&mut DayDetailState) -> &mut DetailPanel<T>,
    ) -> PanelOutcome {
        let failed = match &result {
            Ok(_) => false,
            Err(error) => {
                warn!(
                    target: "app::detail",
                    source = kind.as_str(),
                    error = %error,
                    "detail fetch failed"
                );
                true
            }
        };

        let applied = self.state.send_if_modified(|state| {
            if !state.is_current(kind, ticket) {
                return false;
            }
            let slot = panel(state);
            slot.loading = false;
            slot.data = result.ok();
            true
        });

        if !applied {
            debug!(target: "app::detail", source = kind.as_str(), "dropping superseded detail");
            PanelOutcome::Superseded
        } else if failed {
            PanelOutcome::Failed
        } else {
            PanelOutcome::Loaded
        }
    }
}

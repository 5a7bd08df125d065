use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::metrics::{SourceDayMap, SourceKind};
use crate::models::range::{DateRange, RangePreset};
use crate::services::aggregation::{AggregationEngine, RangeTicket};
use crate::services::api_client::DashboardApi;

/// Per-source result of one range fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFetchOutcome {
    Loaded { days: usize },
    Failed,
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeFetchReport {
    pub range: DateRange,
    pub outcomes: [(SourceKind, SourceFetchOutcome); 4],
}

impl RangeFetchReport {
    pub fn outcome(&self, kind: SourceKind) -> SourceFetchOutcome {
        self.outcomes[kind.index()].1
    }

    pub fn failed_sources(&self) -> Vec<SourceKind> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == SourceFetchOutcome::Failed)
            .map(|(kind, _)| *kind)
            .collect()
    }
}

/// Issues the four range fetches and hands each result to the engine.
pub struct RangeFetchCoordinator {
    api: Arc<dyn DashboardApi>,
    engine: Arc<AggregationEngine>,
}

impl RangeFetchCoordinator {
    pub fn new(api: Arc<dyn DashboardApi>, engine: Arc<AggregationEngine>) -> Self {
        Self { api, engine }
    }

    /// Fetch every source for `[start, end]`. Source failures are logged and
    /// leave that source empty; only an invalid range is an error.
    pub async fn fetch_range(&self, start: NaiveDate, end: NaiveDate) -> AppResult<RangeFetchReport> {
        let range = DateRange::new(start, end)?;
        Ok(self.load(range).await)
    }

    pub async fn apply_preset(&self, preset: RangePreset) -> RangeFetchReport {
        let today = Local::now().date_naive();
        self.load(DateRange::from_preset(preset, today)).await
    }

    /// Back to the default last-seven-days window.
    pub async fn reset(&self) -> RangeFetchReport {
        self.apply_preset(RangePreset::LastSevenDays).await
    }

    /// Re-issue the current range. Errors when no range has been loaded yet.
    pub async fn refresh(&self) -> AppResult<RangeFetchReport> {
        let range = self
            .engine
            .current_range()
            .ok_or_else(|| AppError::validation("no date range selected to refresh"))?;
        Ok(self.load(range).await)
    }

    pub async fn load(&self, range: DateRange) -> RangeFetchReport {
        let ticket = self.engine.begin_range(range);
        info!(
            target: "app::range",
            range = %range,
            generation = ticket.generation,
            "fetching range"
        );

        let (tasks, practice, weight, coding) = tokio::join!(
            self.fetch_source(&ticket, SourceKind::Tasks),
            self.fetch_source(&ticket, SourceKind::Practice),
            self.fetch_source(&ticket, SourceKind::Weight),
            self.fetch_source(&ticket, SourceKind::CodingPractice),
        );

        let report = RangeFetchReport {
            range,
            outcomes: [
                (SourceKind::Tasks, tasks),
                (SourceKind::Practice, practice),
                (SourceKind::Weight, weight),
                (SourceKind::CodingPractice, coding),
            ],
        };

        let failed = report.failed_sources();
        if !failed.is_empty() {
            warn!(
                target: "app::range",
                range = %range,
                failed = ?failed,
                "range loaded with missing sources"
            );
        }
        report
    }

    async fn fetch_source(&self, ticket: &RangeTicket, kind: SourceKind) -> SourceFetchOutcome {
        let range = &ticket.range;
        let result = match kind {
            SourceKind::Tasks => self.api.tasks_in_range(range).await.map(SourceDayMap::Tasks),
            SourceKind::Practice => self
                .api
                .practice_in_range(range)
                .await
                .map(SourceDayMap::Practice),
            SourceKind::Weight => self.api.weight_in_range(range).await.map(SourceDayMap::Weight),
            SourceKind::CodingPractice => self
                .api
                .coding_practice_in_range(range)
                .await
                .map(SourceDayMap::CodingPractice),
        };

        let (map, loaded) = match result {
            Ok(map) => (map, true),
            Err(error) => {
                warn!(
                    target: "app::range",
                    source = kind.as_str(),
                    range = %range,
                    error = %error,
                    "source fetch failed, showing no data for this source"
                );
                (SourceDayMap::empty(kind), false)
            }
        };

        let days = map.len();
        if !self.engine.apply(ticket, map) {
            return SourceFetchOutcome::Superseded;
        }

        if loaded {
            debug!(target: "app::range", source = kind.as_str(), days, "source loaded");
            SourceFetchOutcome::Loaded { days }
        } else {
            SourceFetchOutcome::Failed
        }
    }
}

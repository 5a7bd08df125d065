use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::watch;
use tracing::debug;

use crate::config::SourceWeights;
use crate::models::day_record::{DayRecord, SourceBreakdown};
use crate::models::metrics::{clamp_percentage, SourceDayMap, SourceMaps, SourcePercentage};
use crate::models::range::DateRange;

/// Merge the four source maps into one ascending series of scored days.
///
/// Every date present in any map yields exactly one record; a date missing
/// from a source contributes 0 for that source.
pub fn aggregate(maps: &SourceMaps, weights: &SourceWeights) -> Vec<DayRecord> {
    let dates: BTreeSet<NaiveDate> = maps
        .tasks
        .keys()
        .chain(maps.practice.keys())
        .chain(maps.weight.keys())
        .chain(maps.coding_practice.keys())
        .copied()
        .collect();

    dates
        .into_iter()
        .map(|date| build_record(date, maps, weights))
        .collect()
}

fn build_record(date: NaiveDate, maps: &SourceMaps, weights: &SourceWeights) -> DayRecord {
    let (completed_count, not_completed_count) = maps
        .tasks
        .get(&date)
        .map(|tasks| {
            let completed = tasks.iter().filter(|task| task.completed).count();
            (completed as u32, (tasks.len() - completed) as u32)
        })
        .unwrap_or((0, 0));

    let breakdown = SourceBreakdown {
        tasks: maps
            .tasks
            .get(&date)
            .map(|tasks| tasks.clamped_percentage())
            .unwrap_or(0.0),
        practice: maps
            .practice
            .get(&date)
            .map(SourcePercentage::clamped_percentage)
            .unwrap_or(0.0),
        weight: maps
            .weight
            .get(&date)
            .map(SourcePercentage::clamped_percentage)
            .unwrap_or(0.0),
        coding_practice: maps
            .coding_practice
            .get(&date)
            .map(SourcePercentage::clamped_percentage)
            .unwrap_or(0.0),
    };

    DayRecord {
        date,
        completed_count,
        not_completed_count,
        score: weighted_score(&breakdown, weights),
        breakdown,
    }
}

pub fn weighted_score(breakdown: &SourceBreakdown, weights: &SourceWeights) -> u8 {
    let sum = weights.tasks * breakdown.tasks
        + weights.practice * breakdown.practice
        + weights.weight * breakdown.weight
        + weights.coding_practice * breakdown.coding_practice;
    clamp_percentage(sum).round() as u8
}

/// Issued when a range fetch starts; results carrying an older ticket are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeTicket {
    pub generation: u64,
    pub range: DateRange,
}

/// What subscribers observe: the current maps and the series derived from them.
#[derive(Debug, Clone, Default)]
pub struct EngineSnapshot {
    pub range: Option<DateRange>,
    pub generation: u64,
    pub maps: SourceMaps,
    pub series: Arc<Vec<DayRecord>>,
}

/// Owns the source maps and republishes the series after every replacement.
pub struct AggregationEngine {
    weights: SourceWeights,
    state: watch::Sender<EngineSnapshot>,
}

impl AggregationEngine {
    pub fn new(weights: SourceWeights) -> Self {
        let (state, _) = watch::channel(EngineSnapshot::default());
        Self { weights, state }
    }

    /// Open a new generation for `range`; in-flight results of older ones become stale.
    /// The previous range's maps and series are dropped in the same update.
    pub fn begin_range(&self, range: DateRange) -> RangeTicket {
        let mut ticket = RangeTicket {
            generation: 0,
            range,
        };
        self.state.send_modify(|snapshot| {
            snapshot.generation += 1;
            snapshot.range = Some(range);
            snapshot.maps = SourceMaps::default();
            snapshot.series = Arc::new(Vec::new());
            ticket.generation = snapshot.generation;
        });
        ticket
    }

    /// Replace one source map wholesale and recompute. Returns `false` when the
    /// ticket is stale and nothing changed.
    pub fn apply(&self, ticket: &RangeTicket, map: SourceDayMap) -> bool {
        let weights = self.weights;
        let kind = map.kind();
        let days = map.len();
        let applied = self.state.send_if_modified(|snapshot| {
            if snapshot.generation != ticket.generation {
                return false;
            }
            snapshot.maps.replace(map);
            snapshot.series = Arc::new(aggregate(&snapshot.maps, &weights));
            true
        });

        if applied {
            debug!(
                target: "app::aggregate",
                source = kind.as_str(),
                days,
                generation = ticket.generation,
                "source map replaced, series recomputed"
            );
        } else {
            debug!(
                target: "app::aggregate",
                source = kind.as_str(),
                generation = ticket.generation,
                "discarding result for superseded range"
            );
        }
        applied
    }

    pub fn series(&self) -> Arc<Vec<DayRecord>> {
        Arc::clone(&self.state.borrow().series)
    }

    pub fn current_range(&self) -> Option<DateRange> {
        self.state.borrow().range
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.state.subscribe()
    }
}

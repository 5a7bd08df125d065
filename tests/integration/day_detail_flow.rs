//! Day drill-down against a scripted backend.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;
use tracker_dashboard_lib::models::metrics::SourceKind;
use tracker_dashboard_lib::services::api_client::testing::{ScriptedApi, ScriptedReply};
use tracker_dashboard_lib::services::day_detail::{DayDetailCoordinator, PanelOutcome};

fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid test date")
}

fn script_day(api: &ScriptedApi, day: &str, task: &str) {
    api.on(
        &format!("/tasks/day/{day}"),
        ScriptedReply::ok(json!([
            {"description": task, "completed": true},
            {"description": "Water plants", "completed": false}
        ])),
    );
    api.on(
        &format!("/keybr/day/{day}"),
        ScriptedReply::ok(json!({"percentage": 40.0, "totalMinutes": 30, "minutesPracticed": 12})),
    );
    api.on(
        &format!("/weight/day/{day}"),
        ScriptedReply::ok(json!({"percentage": 100.0, "goalSeconds": 60, "secondsPracticed": 75})),
    );
    api.on(
        &format!("/leetcode/day/{day}"),
        ScriptedReply::ok(json!({"percentage": 50.0, "goalQuestion": 2, "questionFinished": 1})),
    );
}

#[tokio::test]
async fn test_one_failing_panel_leaves_the_others_populated() {
    let failing = Arc::new(ScriptedApi::new());
    failing.on(
        "/tasks/day/2024-01-05",
        ScriptedReply::ok(json!([{"description": "Clean desk", "completed": true}])),
    );
    failing.on("/keybr/day/2024-01-05", ScriptedReply::ok(json!({"percentage": 40.0})));
    failing.on("/weight/day/2024-01-05", ScriptedReply::status(500));
    failing.on("/leetcode/day/2024-01-05", ScriptedReply::ok(json!({"percentage": 50.0})));

    let coordinator = DayDetailCoordinator::new(failing);
    let report = coordinator.select_date(date("2024-01-05")).await;

    assert_eq!(report.outcome(SourceKind::Weight), PanelOutcome::Failed);
    assert_eq!(report.outcome(SourceKind::Tasks), PanelOutcome::Loaded);

    let state = coordinator.snapshot();
    assert!(!state.is_loading());
    assert!(state.weight.data.is_none());
    assert_eq!(state.tasks.data.as_ref().map(Vec::len), Some(1));
    assert_eq!(
        state.practice.data.as_ref().and_then(|m| m.percentage),
        Some(40.0)
    );
    assert_eq!(
        state.coding_practice.data.as_ref().and_then(|m| m.percentage),
        Some(50.0)
    );
}

#[tokio::test]
async fn test_selecting_a_new_day_wins_over_slow_earlier_responses() {
    let api = Arc::new(ScriptedApi::new());
    script_day(&api, "2024-01-02", "Task A");
    api.on(
        "/tasks/day/2024-01-01",
        ScriptedReply::ok(json!([{"description": "Task from A", "completed": true}]))
            .after(Duration::from_millis(100)),
    );
    api.on(
        "/keybr/day/2024-01-01",
        ScriptedReply::ok(json!({"percentage": 99.0})).after(Duration::from_millis(100)),
    );
    api.on("/weight/day/2024-01-01", ScriptedReply::ok(json!({"percentage": 1.0})));
    api.on("/leetcode/day/2024-01-01", ScriptedReply::ok(json!({"percentage": 1.0})));
    let coordinator = Arc::new(DayDetailCoordinator::new(api));

    let first = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.select_date(date("2024-01-01")).await })
    };
    tokio::task::yield_now().await;

    let second = coordinator.select_date(date("2024-01-02")).await;
    let first = first.await.expect("first selection task");

    assert_eq!(first.outcome(SourceKind::Tasks), PanelOutcome::Superseded);
    assert_eq!(first.outcome(SourceKind::Practice), PanelOutcome::Superseded);
    assert_eq!(second.outcome(SourceKind::Tasks), PanelOutcome::Loaded);

    let state = coordinator.snapshot();
    assert_eq!(state.selected_date, Some(date("2024-01-02")));
    let tasks = state.tasks.data.expect("tasks for B");
    assert_eq!(tasks[0].description, "Task A");
    assert_eq!(state.practice.data.and_then(|m| m.percentage), Some(40.0));
    assert_eq!(state.weight.data.and_then(|m| m.percentage), Some(100.0));
}

#[tokio::test]
async fn test_force_recompute_only_refetches_practice() {
    let api = Arc::new(ScriptedApi::new());
    script_day(&api, "2024-01-03", "Clean desk");
    let coordinator = DayDetailCoordinator::new(api.clone());

    assert_eq!(coordinator.force_recompute_practice().await, None);
    assert!(api.calls().is_empty());

    coordinator.select_date(date("2024-01-03")).await;
    let outcome = coordinator.force_recompute_practice().await;

    assert_eq!(outcome, Some(PanelOutcome::Loaded));
    let practice_calls = api.calls_to("/keybr/day/2024-01-03");
    assert_eq!(practice_calls.len(), 2);
    assert!(practice_calls[0].query.is_empty());
    assert_eq!(
        practice_calls[1].query,
        vec![("isForced", "true".to_string())]
    );
    assert_eq!(api.calls_to("/tasks/day/2024-01-03").len(), 1);
    assert!(!coordinator.snapshot().practice.loading);
}

#[tokio::test]
async fn test_task_summary_splits_completed_and_incomplete() {
    let api = Arc::new(ScriptedApi::new());
    script_day(&api, "2024-01-04", "Clean desk");
    let coordinator = DayDetailCoordinator::new(api);

    coordinator.select_date(date("2024-01-04")).await;
    let summary = coordinator
        .snapshot()
        .task_summary()
        .expect("tasks loaded");

    assert_eq!(summary.completed[0].description, "Clean desk");
    assert_eq!(summary.incomplete[0].description, "Water plants");
    assert_eq!(summary.percentage, 50.0);
}

#[tokio::test]
async fn test_clear_drops_in_flight_results() {
    let api = Arc::new(ScriptedApi::new());
    for path in [
        "/tasks/day/2024-01-06",
        "/keybr/day/2024-01-06",
        "/weight/day/2024-01-06",
        "/leetcode/day/2024-01-06",
    ] {
        api.on(path, ScriptedReply::ok(json!({})).after(Duration::from_millis(50)));
    }
    let coordinator = Arc::new(DayDetailCoordinator::new(api));

    let pending = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.select_date(date("2024-01-06")).await })
    };
    tokio::task::yield_now().await;
    coordinator.clear();

    let report = pending.await.expect("selection task");
    assert_eq!(report.outcome(SourceKind::Tasks), PanelOutcome::Superseded);

    let state = coordinator.snapshot();
    assert_eq!(state.selected_date, None);
    assert!(state.tasks.data.is_none());
    assert!(!state.is_loading());
}

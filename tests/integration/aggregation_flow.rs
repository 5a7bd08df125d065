//! Range fetch → aggregation flow against a scripted backend.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;
use tracker_dashboard_lib::config::SourceWeights;
use tracker_dashboard_lib::models::metrics::SourceKind;
use tracker_dashboard_lib::models::range::DateRange;
use tracker_dashboard_lib::services::aggregation::AggregationEngine;
use tracker_dashboard_lib::services::api_client::testing::{ScriptedApi, ScriptedReply};
use tracker_dashboard_lib::services::range_fetch::{RangeFetchCoordinator, SourceFetchOutcome};

fn setup(api: Arc<ScriptedApi>) -> (Arc<AggregationEngine>, Arc<RangeFetchCoordinator>) {
    let engine = Arc::new(AggregationEngine::new(SourceWeights::default()));
    let coordinator = Arc::new(RangeFetchCoordinator::new(api, Arc::clone(&engine)));
    (engine, coordinator)
}

fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid test date")
}

fn empty_sources(api: &ScriptedApi, paths: &[&str]) {
    for path in paths {
        api.on(path, ScriptedReply::ok(json!({})));
    }
}

#[tokio::test]
async fn test_failed_sources_contribute_zero() {
    let api = Arc::new(ScriptedApi::new());
    api.on(
        "/tasks/range",
        ScriptedReply::ok(json!({
            "2024-01-01": [
                {"description": "x", "completed": true},
                {"description": "y", "completed": false}
            ]
        })),
    );
    api.on("/keybr/range", ScriptedReply::status(500));
    api.on(
        "/weight/range",
        ScriptedReply::ok(json!({"2024-01-02": {"percentage": 100.0, "goalSeconds": 60, "secondsPracticed": 60}})),
    );
    api.on("/leetcode/range", ScriptedReply::status(404));
    let (engine, coordinator) = setup(api.clone());

    let report = coordinator
        .fetch_range(date("2024-01-01"), date("2024-01-07"))
        .await
        .expect("valid range");

    assert_eq!(
        report.failed_sources(),
        vec![SourceKind::Practice, SourceKind::CodingPractice]
    );
    assert_eq!(
        report.outcome(SourceKind::Tasks),
        SourceFetchOutcome::Loaded { days: 1 }
    );

    let series = engine.series();
    assert_eq!(series.len(), 2);
    assert_eq!(series[0].date, date("2024-01-01"));
    assert_eq!(series[0].score, 20);
    assert_eq!(series[1].date, date("2024-01-02"));
    assert_eq!(series[1].score, 10);

    let call = &api.calls_to("/tasks/range")[0];
    assert_eq!(
        call.query,
        vec![
            ("start", "2024-01-01".to_string()),
            ("end", "2024-01-07".to_string())
        ]
    );
}

#[tokio::test]
async fn test_new_range_replaces_every_source() {
    let api = Arc::new(ScriptedApi::new());
    api.on(
        "/keybr/range",
        ScriptedReply::ok(json!({"2024-01-03": {"percentage": 50.0}})),
    );
    api.on("/keybr/range", ScriptedReply::ok(json!({})));
    api.on("/tasks/range", ScriptedReply::ok(json!({})));
    api.on(
        "/tasks/range",
        ScriptedReply::ok(json!({"2024-02-10": [{"description": "x", "completed": true}]})),
    );
    empty_sources(&api, &["/weight/range", "/leetcode/range"]);
    let (engine, coordinator) = setup(api);

    coordinator
        .load(DateRange::parse("2024-01-01", "2024-01-07").unwrap())
        .await;
    assert_eq!(engine.series().len(), 1);
    assert_eq!(engine.series()[0].date, date("2024-01-03"));

    coordinator
        .load(DateRange::parse("2024-02-08", "2024-02-14").unwrap())
        .await;
    let series = engine.series();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].date, date("2024-02-10"));
    assert_eq!(series[0].score, 40);
    assert_eq!(series[0].breakdown.practice, 0.0);
}

#[tokio::test]
async fn test_late_response_for_old_range_is_discarded() {
    let api = Arc::new(ScriptedApi::new());
    api.on(
        "/tasks/range",
        ScriptedReply::ok(json!({"2024-01-02": [{"description": "old", "completed": true}]}))
            .after(Duration::from_millis(100)),
    );
    api.on(
        "/tasks/range",
        ScriptedReply::ok(json!({"2024-02-02": [{"description": "new", "completed": false}]})),
    );
    empty_sources(&api, &["/keybr/range", "/weight/range", "/leetcode/range"]);
    let (engine, coordinator) = setup(api);

    let first = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            coordinator
                .load(DateRange::parse("2024-01-01", "2024-01-07").unwrap())
                .await
        })
    };
    tokio::task::yield_now().await;

    let second = coordinator
        .load(DateRange::parse("2024-02-01", "2024-02-07").unwrap())
        .await;
    let first = first.await.expect("first load task");

    assert_eq!(
        first.outcome(SourceKind::Tasks),
        SourceFetchOutcome::Superseded
    );
    assert_eq!(
        second.outcome(SourceKind::Tasks),
        SourceFetchOutcome::Loaded { days: 1 }
    );

    let series = engine.series();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].date, date("2024-02-02"));
    assert_eq!(series[0].not_completed_count, 1);
    assert_eq!(
        engine.current_range(),
        Some(DateRange::parse("2024-02-01", "2024-02-07").unwrap())
    );
}

#[tokio::test]
async fn test_out_of_range_percentages_are_clamped() {
    let api = Arc::new(ScriptedApi::new());
    api.on(
        "/keybr/range",
        ScriptedReply::ok(json!({"2024-01-01": {"percentage": 250.0}})),
    );
    api.on(
        "/leetcode/range",
        ScriptedReply::ok(json!({"2024-01-01": {"percentage": -40.0}})),
    );
    empty_sources(&api, &["/tasks/range", "/weight/range"]);
    let (engine, coordinator) = setup(api);

    coordinator
        .fetch_range(date("2024-01-01"), date("2024-01-01"))
        .await
        .expect("valid range");

    let day = &engine.series()[0];
    assert_eq!(day.breakdown.practice, 100.0);
    assert_eq!(day.breakdown.coding_practice, 0.0);
    assert_eq!(day.score, 20);
    assert!(engine.series().iter().all(|day| day.score <= 100));
}

#[tokio::test]
async fn test_inverted_range_is_rejected_without_fetching() {
    let api = Arc::new(ScriptedApi::new());
    let (_engine, coordinator) = setup(api.clone());

    let result = coordinator
        .fetch_range(date("2024-01-07"), date("2024-01-01"))
        .await;

    assert!(result.is_err());
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_refresh_reuses_current_range() {
    let api = Arc::new(ScriptedApi::new());
    empty_sources(
        &api,
        &["/tasks/range", "/keybr/range", "/weight/range", "/leetcode/range"],
    );
    let (_engine, coordinator) = setup(api.clone());

    assert!(coordinator.refresh().await.is_err());

    let range = DateRange::parse("2024-03-01", "2024-03-31").unwrap();
    coordinator.load(range).await;
    let report = coordinator.refresh().await.expect("range is loaded");

    assert_eq!(report.range, range);
    assert_eq!(api.calls_to("/weight/range").len(), 2);
}

#[tokio::test]
async fn test_series_never_mixes_ranges_while_sources_are_in_flight() {
    let api = Arc::new(ScriptedApi::new());
    api.on(
        "/keybr/range",
        ScriptedReply::ok(json!({"2024-01-03": {"percentage": 50.0}})),
    );
    api.on(
        "/keybr/range",
        ScriptedReply::ok(json!({"2024-02-05": {"percentage": 80.0}}))
            .after(Duration::from_millis(100)),
    );
    empty_sources(&api, &["/tasks/range", "/weight/range", "/leetcode/range"]);
    let (engine, coordinator) = setup(api);

    coordinator
        .load(DateRange::parse("2024-01-01", "2024-01-07").unwrap())
        .await;
    assert_eq!(engine.series()[0].date, date("2024-01-03"));

    let february = DateRange::parse("2024-02-01", "2024-02-07").unwrap();
    let pending = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.load(february).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.range, Some(february));
    assert!(snapshot.series.iter().all(|day| day.date >= date("2024-02-01")));
    assert!(snapshot.series.is_empty());

    pending.await.expect("february load");
    let series = engine.series();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].date, date("2024-02-05"));
}

//! Optimistic exclusion toggling against a scripted backend.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracker_dashboard_lib::models::range::DateRange;
use tracker_dashboard_lib::models::task::TaskGroup;
use tracker_dashboard_lib::services::api_client::testing::{ScriptedApi, ScriptedReply};
use tracker_dashboard_lib::services::exclusion::{
    ExclusionReconciler, LoadOutcome, ToggleOutcome,
};

const INCOMPLETE: &str = "/tasks/incomplete-aggregated";
const EXCLUSION: &str = "/tasks/exclusion";

fn week() -> DateRange {
    DateRange::parse("2024-01-07", "2024-01-13").expect("valid range")
}

fn aggregated() -> serde_json::Value {
    json!({
        "dailyTasks": [
            {"description": "Stretch", "completed": false, "excluded": true, "frequency": 2},
            {"description": "Clean desk", "completed": false, "excluded": false, "frequency": 5},
            {"description": "answer email", "completed": false, "excluded": false, "frequency": 1}
        ],
        "weeklyTasks": [
            {"description": "Clean desk", "completed": false, "excluded": false, "frequency": 1}
        ],
        "monthlyTasks": []
    })
}

async fn loaded(api: Arc<ScriptedApi>) -> ExclusionReconciler {
    api.on(INCOMPLETE, ScriptedReply::ok(aggregated()));
    let reconciler = ExclusionReconciler::new(api);
    let outcome = reconciler.load(week()).await;
    assert_eq!(outcome, LoadOutcome::Loaded { tasks: 4 });
    reconciler
}

#[tokio::test]
async fn test_load_sorts_each_group_case_insensitively() {
    let api = Arc::new(ScriptedApi::new());
    let reconciler = loaded(api.clone()).await;

    let tasks = reconciler.tasks();
    let daily: Vec<&str> = tasks
        .daily_tasks
        .iter()
        .map(|task| task.description.as_str())
        .collect();
    assert_eq!(daily, vec!["answer email", "Clean desk", "Stretch"]);
    assert_eq!(
        api.calls_to(INCOMPLETE)[0].query,
        vec![
            ("start", "2024-01-07".to_string()),
            ("end", "2024-01-13".to_string())
        ]
    );
}

#[tokio::test]
async fn test_failed_toggle_restores_exact_list() {
    let api = Arc::new(ScriptedApi::new());
    api.on(EXCLUSION, ScriptedReply::status(500));
    let reconciler = loaded(api.clone()).await;
    let before = reconciler.tasks();

    let outcome = reconciler
        .toggle_exclusion(TaskGroup::Daily, "Clean desk")
        .await;

    assert_eq!(outcome, ToggleOutcome::RolledBack);
    assert_eq!(reconciler.tasks(), before);
    assert!(
        !reconciler
            .tasks()
            .find(TaskGroup::Daily, "Clean desk")
            .expect("task still listed")
            .excluded
    );
    assert_eq!(
        api.calls_to(EXCLUSION)[0].body,
        Some(json!({"description": "Clean desk", "excluded": true}))
    );
}

#[tokio::test]
async fn test_confirmed_toggle_flips_exactly_one_task() {
    let api = Arc::new(ScriptedApi::new());
    api.on(EXCLUSION, ScriptedReply::ok(json!({"status": "success"})));
    let reconciler = loaded(api).await;
    let before = reconciler.tasks();

    let outcome = reconciler
        .toggle_exclusion(TaskGroup::Daily, "Clean desk")
        .await;
    assert_eq!(outcome, ToggleOutcome::Confirmed);

    let after = reconciler.tasks();
    let mut changed = 0;
    for group in TaskGroup::ALL {
        for (old, new) in before.group(group).iter().zip(after.group(group)) {
            assert_eq!(old.description, new.description);
            if old.excluded != new.excluded {
                changed += 1;
            }
        }
    }
    assert_eq!(changed, 1);
    assert!(after.find(TaskGroup::Daily, "Clean desk").unwrap().excluded);
    assert!(!after.find(TaskGroup::Weekly, "Clean desk").unwrap().excluded);
    assert_eq!(after.excluded(TaskGroup::Daily).count(), 2);
}

#[tokio::test]
async fn test_optimistic_flag_is_visible_before_the_server_answers() {
    let api = Arc::new(ScriptedApi::new());
    api.on(
        EXCLUSION,
        ScriptedReply::status(503).after(Duration::from_millis(50)),
    );
    let reconciler = Arc::new(loaded(api).await);
    let mut updates = reconciler.subscribe();
    updates.borrow_and_update();

    let toggle = {
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move {
            reconciler
                .toggle_exclusion(TaskGroup::Daily, "Clean desk")
                .await
        })
    };

    updates.changed().await.expect("optimistic update");
    assert!(
        updates
            .borrow()
            .tasks()
            .find(TaskGroup::Daily, "Clean desk")
            .unwrap()
            .excluded
    );

    assert_eq!(toggle.await.unwrap(), ToggleOutcome::RolledBack);
    assert!(
        !reconciler
            .tasks()
            .find(TaskGroup::Daily, "Clean desk")
            .unwrap()
            .excluded
    );
}

#[tokio::test]
async fn test_unknown_task_is_not_sent() {
    let api = Arc::new(ScriptedApi::new());
    let reconciler = loaded(api.clone()).await;

    let outcome = reconciler
        .toggle_exclusion(TaskGroup::Monthly, "Clean desk")
        .await;

    assert_eq!(outcome, ToggleOutcome::NotFound);
    assert!(api.calls_to(EXCLUSION).is_empty());
}

#[tokio::test]
async fn test_toggles_on_different_tasks_settle_independently() {
    let api = Arc::new(ScriptedApi::new());
    api.on(
        EXCLUSION,
        ScriptedReply::status(500).after(Duration::from_millis(30)),
    );
    api.on(EXCLUSION, ScriptedReply::ok(json!({"status": "success"})));
    let reconciler = loaded(api).await;

    let (failed, confirmed) = tokio::join!(
        reconciler.toggle_exclusion(TaskGroup::Daily, "Clean desk"),
        reconciler.toggle_exclusion(TaskGroup::Daily, "Stretch"),
    );

    assert_eq!(failed, ToggleOutcome::RolledBack);
    assert_eq!(confirmed, ToggleOutcome::Confirmed);

    let tasks = reconciler.tasks();
    assert!(!tasks.find(TaskGroup::Daily, "Clean desk").unwrap().excluded);
    assert!(!tasks.find(TaskGroup::Daily, "Stretch").unwrap().excluded);
}

#[tokio::test]
async fn test_reload_discards_pending_edits() {
    let api = Arc::new(ScriptedApi::new());
    api.on(
        EXCLUSION,
        ScriptedReply::status(500).after(Duration::from_millis(50)),
    );
    let mut refreshed = aggregated();
    refreshed["weeklyTasks"][0]["excluded"] = json!(true);
    api.on(INCOMPLETE, ScriptedReply::ok(aggregated()));
    api.on(INCOMPLETE, ScriptedReply::ok(refreshed));
    let reconciler = Arc::new(ExclusionReconciler::new(api.clone()));
    reconciler.load(week()).await;

    let toggle = {
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move {
            reconciler
                .toggle_exclusion(TaskGroup::Weekly, "Clean desk")
                .await
        })
    };
    tokio::task::yield_now().await;
    assert_eq!(reconciler.snapshot().pending_edits(), 1);

    reconciler.load(week()).await;

    assert_eq!(toggle.await.unwrap(), ToggleOutcome::Superseded);
    assert!(
        reconciler
            .tasks()
            .find(TaskGroup::Weekly, "Clean desk")
            .unwrap()
            .excluded
    );
    assert_eq!(reconciler.snapshot().pending_edits(), 0);
}

#[tokio::test]
async fn test_failed_load_yields_empty_groups() {
    let api = Arc::new(ScriptedApi::new());
    let reconciler = loaded(api.clone()).await;
    api.on(INCOMPLETE, ScriptedReply::status(502));
    // Drains the initial reply still at the head of the queue.
    reconciler.load(week()).await;

    let outcome = reconciler.load(week()).await;

    assert_eq!(outcome, LoadOutcome::Failed);
    assert!(reconciler.tasks().is_empty());
    assert!(!reconciler.snapshot().is_loading());
}

#[tokio::test]
async fn test_toggle_during_reload_cannot_overwrite_server_truth() {
    let api = Arc::new(ScriptedApi::new());
    api.on(
        EXCLUSION,
        ScriptedReply::status(500).after(Duration::from_millis(150)),
    );
    let mut refreshed = aggregated();
    refreshed["weeklyTasks"][0]["excluded"] = json!(true);
    api.on(INCOMPLETE, ScriptedReply::ok(aggregated()));
    api.on(
        INCOMPLETE,
        ScriptedReply::ok(refreshed).after(Duration::from_millis(50)),
    );
    let reconciler = ExclusionReconciler::new(api.clone());
    reconciler.load(week()).await;

    let (reload, toggle) = tokio::join!(reconciler.load(week()), async {
        tokio::task::yield_now().await;
        reconciler
            .toggle_exclusion(TaskGroup::Weekly, "Clean desk")
            .await
    });

    assert_eq!(reload, LoadOutcome::Loaded { tasks: 4 });
    assert_eq!(toggle, ToggleOutcome::Superseded);
    assert_eq!(api.calls_to(EXCLUSION).len(), 1);
    assert!(
        reconciler
            .tasks()
            .find(TaskGroup::Weekly, "Clean desk")
            .unwrap()
            .excluded
    );
    assert_eq!(reconciler.snapshot().pending_edits(), 0);
}

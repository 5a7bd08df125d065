pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

use tracing::{info, warn};

use crate::config::DashboardConfig;
use crate::error::{AppError, AppResult};
use crate::models::range::RangePreset;
use crate::services::exclusion::LoadOutcome;
use crate::state::DashboardState;

pub fn run() {
    if let Err(error) = try_run() {
        eprintln!("failed to launch dashboard: {error}");
        std::process::exit(1);
    }
}

fn try_run() -> AppResult<()> {
    let config = DashboardConfig::load()?;
    crate::utils::logger::init_logging(&config.log_dir)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config))
}

async fn serve(config: DashboardConfig) -> AppResult<()> {
    let state = DashboardState::new(&config)?;
    info!(
        target: "app::config",
        api = %config.api_base_url,
        stream = %config.stream_url,
        "dashboard starting"
    );

    state.sensor().subscribe().await;

    let report = state.reset().await;
    for day in state.engine().series().iter() {
        info!(
            target: "app::aggregate",
            date = %day.date,
            score = day.score,
            completed = day.completed_count,
            not_completed = day.not_completed_count,
            "daily score"
        );
    }
    if !report.failed_sources().is_empty() {
        warn!(target: "app::range", range = %report.range, "some sources are unavailable");
    }

    if let LoadOutcome::Loaded { tasks } = state
        .exclusions()
        .load_preset(RangePreset::ThisWeek)
        .await
    {
        info!(target: "app::exclusion", tasks, "recurring tasks ready");
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::other(format!("failed to wait for shutdown signal: {err}")))?;

    info!(target: "app::config", "shutting down");
    state.sensor().unsubscribe().await;
    Ok(())
}

use std::sync::Arc;

use crate::config::DashboardConfig;
use crate::error::AppResult;
use crate::services::aggregation::AggregationEngine;
use crate::services::api_client::{DashboardApi, HttpDashboardApi};
use crate::services::day_detail::DayDetailCoordinator;
use crate::services::exclusion::ExclusionReconciler;
use crate::services::range_fetch::{RangeFetchCoordinator, RangeFetchReport};
use crate::services::sensor_stream::{SensorFeed, SensorStreamClient, StompSensorFeed};

/// Holds every dashboard component; each owns its own slice of state.
#[derive(Clone)]
pub struct DashboardState {
    engine: Arc<AggregationEngine>,
    range_fetch: Arc<RangeFetchCoordinator>,
    day_detail: Arc<DayDetailCoordinator>,
    exclusions: Arc<ExclusionReconciler>,
    sensor: Arc<SensorStreamClient>,
}

impl DashboardState {
    /// Wire the HTTP and websocket transports from `config`.
    pub fn new(config: &DashboardConfig) -> AppResult<Self> {
        let api: Arc<dyn DashboardApi> = Arc::new(HttpDashboardApi::from_config(config)?);
        let feed: Arc<dyn SensorFeed> = Arc::new(StompSensorFeed::from_config(config));
        Ok(Self::with_transports(config, api, feed))
    }

    pub fn with_transports(
        config: &DashboardConfig,
        api: Arc<dyn DashboardApi>,
        feed: Arc<dyn SensorFeed>,
    ) -> Self {
        let engine = Arc::new(AggregationEngine::new(config.weights));
        let range_fetch = Arc::new(RangeFetchCoordinator::new(
            Arc::clone(&api),
            Arc::clone(&engine),
        ));
        let day_detail = Arc::new(DayDetailCoordinator::new(Arc::clone(&api)));
        let exclusions = Arc::new(ExclusionReconciler::new(api));
        let sensor = Arc::new(SensorStreamClient::new(feed, config.reconnect_delay()));

        Self {
            engine,
            range_fetch,
            day_detail,
            exclusions,
            sensor,
        }
    }

    pub fn engine(&self) -> Arc<AggregationEngine> {
        Arc::clone(&self.engine)
    }

    pub fn range_fetch(&self) -> Arc<RangeFetchCoordinator> {
        Arc::clone(&self.range_fetch)
    }

    pub fn day_detail(&self) -> Arc<DayDetailCoordinator> {
        Arc::clone(&self.day_detail)
    }

    pub fn exclusions(&self) -> Arc<ExclusionReconciler> {
        Arc::clone(&self.exclusions)
    }

    pub fn sensor(&self) -> Arc<SensorStreamClient> {
        Arc::clone(&self.sensor)
    }

    /// Back to the default range with no day selected.
    pub async fn reset(&self) -> RangeFetchReport {
        self.day_detail.clear();
        self.range_fetch.reset().await
    }
}

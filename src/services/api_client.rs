use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::DashboardConfig;
use crate::error::{AppError, AppResult, TransportErrorCode};
use crate::models::metrics::{
    CodingPracticeDayMap, CodingPracticeMetric, PracticeDayMap, PracticeMetric, TaskDayMap,
    WeightDayMap, WeightMetric,
};
use crate::models::range::{DateRange, ISO_DATE_FORMAT};
use crate::models::task::{AggregatedTasks, DayTask, ExclusionRequest};

/// Backend endpoints the dashboard consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    TasksRange,
    TasksDay(NaiveDate),
    PracticeRange,
    PracticeDay { date: NaiveDate, forced: bool },
    WeightRange,
    WeightDay(NaiveDate),
    CodingPracticeRange,
    CodingPracticeDay(NaiveDate),
    IncompleteAggregated,
    Exclusion,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::TasksRange => "tasksRange",
            Endpoint::TasksDay(_) => "tasksDay",
            Endpoint::PracticeRange => "practiceRange",
            Endpoint::PracticeDay { .. } => "practiceDay",
            Endpoint::WeightRange => "weightRange",
            Endpoint::WeightDay(_) => "weightDay",
            Endpoint::CodingPracticeRange => "codingPracticeRange",
            Endpoint::CodingPracticeDay(_) => "codingPracticeDay",
            Endpoint::IncompleteAggregated => "incompleteAggregated",
            Endpoint::Exclusion => "exclusion",
        }
    }

    pub fn path(&self) -> String {
        let day = |date: &NaiveDate| date.format(ISO_DATE_FORMAT).to_string();
        match self {
            Endpoint::TasksRange => "/tasks/range".to_string(),
            Endpoint::TasksDay(date) => format!("/tasks/day/{}", day(date)),
            Endpoint::PracticeRange => "/keybr/range".to_string(),
            Endpoint::PracticeDay { date, .. } => format!("/keybr/day/{}", day(date)),
            Endpoint::WeightRange => "/weight/range".to_string(),
            Endpoint::WeightDay(date) => format!("/weight/day/{}", day(date)),
            Endpoint::CodingPracticeRange => "/leetcode/range".to_string(),
            Endpoint::CodingPracticeDay(date) => format!("/leetcode/day/{}", day(date)),
            Endpoint::IncompleteAggregated => "/tasks/incomplete-aggregated".to_string(),
            Endpoint::Exclusion => "/tasks/exclusion".to_string(),
        }
    }
}

/// One outbound request: endpoint plus its query string pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub endpoint: Endpoint,
    pub query: Vec<(&'static str, String)>,
}

impl ApiRequest {
    pub fn new(endpoint: Endpoint) -> Self {
        let mut query = Vec::new();
        if let Endpoint::PracticeDay { forced: true, .. } = endpoint {
            query.push(("isForced", "true".to_string()));
        }
        Self { endpoint, query }
    }

    pub fn ranged(endpoint: Endpoint, range: &DateRange) -> Self {
        Self {
            endpoint,
            query: vec![("start", range.start_param()), ("end", range.end_param())],
        }
    }

    pub fn path(&self) -> String {
        self.endpoint.path()
    }
}

/// Raw JSON request/response primitive the typed API is built on.
#[async_trait]
pub trait JsonTransport: Send + Sync {
    async fn get_json(&self, request: &ApiRequest) -> AppResult<JsonValue>;

    async fn post_json(&self, request: &ApiRequest, body: JsonValue) -> AppResult<()>;
}

/// Typed view of every backend call the dashboard makes.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn tasks_in_range(&self, range: &DateRange) -> AppResult<TaskDayMap>;
    async fn practice_in_range(&self, range: &DateRange) -> AppResult<PracticeDayMap>;
    async fn weight_in_range(&self, range: &DateRange) -> AppResult<WeightDayMap>;
    async fn coding_practice_in_range(&self, range: &DateRange)
        -> AppResult<CodingPracticeDayMap>;

    async fn tasks_for_day(&self, date: NaiveDate) -> AppResult<Vec<DayTask>>;
    async fn practice_for_day(&self, date: NaiveDate, forced: bool) -> AppResult<PracticeMetric>;
    async fn weight_for_day(&self, date: NaiveDate) -> AppResult<WeightMetric>;
    async fn coding_practice_for_day(&self, date: NaiveDate) -> AppResult<CodingPracticeMetric>;

    async fn incomplete_tasks(&self, range: &DateRange) -> AppResult<AggregatedTasks>;
    async fn set_exclusion(&self, request: &ExclusionRequest) -> AppResult<()>;
}

async fn fetch<T, C>(transport: &C, request: ApiRequest) -> AppResult<T>
where
    T: DeserializeOwned,
    C: JsonTransport + ?Sized,
{
    let value = transport.get_json(&request).await?;
    decode(&request, value)
}

fn decode<T: DeserializeOwned>(request: &ApiRequest, value: JsonValue) -> AppResult<T> {
    serde_json::from_value(value).map_err(|err| {
        AppError::transport(
            TransportErrorCode::InvalidResponse,
            request.path(),
            format!("unexpected response shape from {}: {err}", request.path()),
        )
    })
}

#[async_trait]
impl<C: JsonTransport> DashboardApi for C {
    async fn tasks_in_range(&self, range: &DateRange) -> AppResult<TaskDayMap> {
        fetch(self, ApiRequest::ranged(Endpoint::TasksRange, range)).await
    }

    async fn practice_in_range(&self, range: &DateRange) -> AppResult<PracticeDayMap> {
        fetch(self, ApiRequest::ranged(Endpoint::PracticeRange, range)).await
    }

    async fn weight_in_range(&self, range: &DateRange) -> AppResult<WeightDayMap> {
        fetch(self, ApiRequest::ranged(Endpoint::WeightRange, range)).await
    }

    async fn coding_practice_in_range(
        &self,
        range: &DateRange,
    ) -> AppResult<CodingPracticeDayMap> {
        fetch(self, ApiRequest::ranged(Endpoint::CodingPracticeRange, range)).await
    }

    async fn tasks_for_day(&self, date: NaiveDate) -> AppResult<Vec<DayTask>> {
        fetch(self, ApiRequest::new(Endpoint::TasksDay(date))).await
    }

    async fn practice_for_day(&self, date: NaiveDate, forced: bool) -> AppResult<PracticeMetric> {
        fetch(self, ApiRequest::new(Endpoint::PracticeDay { date, forced })).await
    }

    async fn weight_for_day(&self, date: NaiveDate) -> AppResult<WeightMetric> {
        fetch(self, ApiRequest::new(Endpoint::WeightDay(date))).await
    }

    async fn coding_practice_for_day(&self, date: NaiveDate) -> AppResult<CodingPracticeMetric> {
        fetch(self, ApiRequest::new(Endpoint::CodingPracticeDay(date))).await
    }

    async fn incomplete_tasks(&self, range: &DateRange) -> AppResult<AggregatedTasks> {
        fetch(
            self,
            ApiRequest::ranged(Endpoint::IncompleteAggregated, range),
        )
        .await
    }

    async fn set_exclusion(&self, request: &ExclusionRequest) -> AppResult<()> {
        let body = serde_json::to_value(request)?;
        self.post_json(&ApiRequest::new(Endpoint::Exclusion), body)
            .await
    }
}

/// `reqwest`-backed transport against the tracker backend.
#[derive(Debug, Clone)]
pub struct HttpDashboardApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDashboardApi {
    pub fn from_config(config: &DashboardConfig) -> AppResult<Self> {
        Self::try_new(&config.api_base_url, config.http_timeout())
    }

    pub fn try_new(base_url: &str, timeout: StdDuration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Some(StdDuration::from_secs(90)))
            .build()
            .map_err(|err| AppError::other(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, request: &ApiRequest) -> String {
        format!("{}{}", self.base_url, request.path())
    }

    fn map_http_error(status: StatusCode, endpoint: &str, correlation_id: &str) -> AppError {
        let message = match status {
            StatusCode::NOT_FOUND => format!("{endpoint} not found on backend"),
            StatusCode::BAD_REQUEST => format!("backend rejected request to {endpoint}"),
            status if status.is_server_error() => {
                format!("backend unavailable for {endpoint} (status {})", status.as_u16())
            }
            status => format!("{endpoint} returned status {}", status.as_u16()),
        };
        AppError::transport_with_details(
            TransportErrorCode::HttpStatus,
            endpoint,
            Some(status.as_u16()),
            message,
            Some(correlation_id),
        )
    }

    fn error_from_reqwest(err: reqwest::Error, endpoint: &str, correlation_id: &str) -> AppError {
        if err.is_timeout() {
            AppError::transport_with_details(
                TransportErrorCode::HttpTimeout,
                endpoint,
                None,
                format!("request to {endpoint} timed out"),
                Some(correlation_id),
            )
        } else if err.is_connect() {
            AppError::transport_with_details(
                TransportErrorCode::Connect,
                endpoint,
                None,
                format!("cannot reach backend for {endpoint}"),
                Some(correlation_id),
            )
        } else if let Some(status) = err.status() {
            Self::map_http_error(status, endpoint, correlation_id)
        } else if err.is_decode() {
            AppError::transport_with_details(
                TransportErrorCode::InvalidResponse,
                endpoint,
                None,
                format!("undecodable response from {endpoint}: {err}"),
                Some(correlation_id),
            )
        } else {
            AppError::transport_with_details(
                TransportErrorCode::Unknown,
                endpoint,
                None,
                format!("request to {endpoint} failed: {err}"),
                Some(correlation_id),
            )
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        request: &ApiRequest,
    ) -> AppResult<(reqwest::Response, String)> {
        let correlation_id = Uuid::new_v4().to_string();
        let endpoint = request.path();

        debug!(
            target: "app::http",
            endpoint = request.endpoint.as_str(),
            path = %endpoint,
            correlation_id = %correlation_id,
            "sending request"
        );

        let start = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|err| Self::error_from_reqwest(err, &endpoint, &correlation_id))?;

        let status = response.status();
        let latency_ms = start.elapsed().as_millis();
        if !status.is_success() {
            warn!(
                target: "app::http",
                correlation_id = %correlation_id,
                status = status.as_u16(),
                latency_ms,
                "backend returned non-success status"
            );
            return Err(Self::map_http_error(status, &endpoint, &correlation_id));
        }

        debug!(
            target: "app::http",
            correlation_id = %correlation_id,
            status = status.as_u16(),
            latency_ms,
            "backend responded"
        );
        Ok((response, correlation_id))
    }
}

#[async_trait]
impl JsonTransport for HttpDashboardApi {
    async fn get_json(&self, request: &ApiRequest) -> AppResult<JsonValue> {
        let builder = self
            .client
            .get(self.url_for(request))
            .header("Content-Type", "application/json")
            .query(&request.query);
        let (response, correlation_id) = self.send(builder, request).await?;
        let endpoint = request.path();
        response
            .json::<JsonValue>()
            .await
            .map_err(|err| Self::error_from_reqwest(err, &endpoint, &correlation_id))
    }

    async fn post_json(&self, request: &ApiRequest, body: JsonValue) -> AppResult<()> {
        let builder = self
            .client
            .post(self.url_for(request))
            .query(&request.query)
            .json(&body);
        // Any 2xx is a confirmation; the payload is not inspected.
        self.send(builder, request).await.map(|_| ())
    }
}

pub mod testing {
    //! In-memory transport with scripted replies, latency and call recording.

    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone)]
    pub struct ScriptedReply {
        outcome: Result<JsonValue, u16>,
        delay: StdDuration,
    }

    impl ScriptedReply {
        pub fn ok(body: JsonValue) -> Self {
            Self {
                outcome: Ok(body),
                delay: StdDuration::ZERO,
            }
        }

        pub fn status(code: u16) -> Self {
            Self {
                outcome: Err(code),
                delay: StdDuration::ZERO,
            }
        }

        pub fn after(mut self, delay: StdDuration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedCall {
        pub path: String,
        pub query: Vec<(&'static str, String)>,
        pub body: Option<JsonValue>,
    }

    /// Replies are queued per path; the last queued reply repeats once the
    /// queue drains. Unscripted paths answer 404.
    #[derive(Debug, Default)]
    pub struct ScriptedApi {
        replies: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedApi {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(&self, path: &str, reply: ScriptedReply) -> &Self {
            let mut replies = self.replies.lock().unwrap_or_else(|err| err.into_inner());
            replies.entry(path.to_string()).or_default().push_back(reply);
            self
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls
                .lock()
                .unwrap_or_else(|err| err.into_inner())
                .clone()
        }

        pub fn calls_to(&self, path: &str) -> Vec<RecordedCall> {
            self.calls()
                .into_iter()
                .filter(|call| call.path == path)
                .collect()
        }

        fn next_reply(&self, path: &str) -> Option<ScriptedReply> {
            let mut replies = self.replies.lock().unwrap_or_else(|err| err.into_inner());
            let queue = replies.get_mut(path)?;
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        }

        async fn answer(&self, request: &ApiRequest, body: Option<JsonValue>) -> AppResult<JsonValue> {
            let path = request.path();
            self.calls
                .lock()
                .unwrap_or_else(|err| err.into_inner())
                .push(RecordedCall {
                    path: path.clone(),
                    query: request.query.clone(),
                    body,
                });

            let reply = self
                .next_reply(&path)
                .unwrap_or_else(|| ScriptedReply::status(404));
            if !reply.delay.is_zero() {
                tokio::time::sleep(reply.delay).await;
            }
            match reply.outcome {
                Ok(value) => Ok(value),
                Err(code) => Err(AppError::transport_with_details(
                    TransportErrorCode::HttpStatus,
                    path.clone(),
                    Some(code),
                    format!("{path} returned status {code}"),
                    None,
                )),
            }
        }
    }

    #[async_trait]
    impl JsonTransport for ScriptedApi {
        async fn get_json(&self, request: &ApiRequest) -> AppResult<JsonValue> {
            self.answer(request, None).await
        }

        async fn post_json(&self, request: &ApiRequest, body: JsonValue) -> AppResult<()> {
            self.answer(request, Some(body)).await.map(|_| ())
        }
    }
}

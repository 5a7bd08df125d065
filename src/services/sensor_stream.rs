//! Live load-cell feed.
//!
//! A [`SensorFeed`] opens sessions; [`SensorStreamClient`] keeps exactly one
//! session alive, reconnecting after a fixed delay, and republishes the most
//! recent [`SensorSample`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::DashboardConfig;
use crate::error::{AppError, AppResult, TransportErrorCode};
use crate::models::sensor::{ConnectionState, SensorSample};
use crate::utils::stomp::{StompCommand, StompFrame};

const SUBSCRIPTION_ID: &str = "sensor-0";
const SHUTDOWN_GRACE: StdDuration = StdDuration::from_secs(1);

/// Opens one session against the sensor broker.
#[async_trait]
pub trait SensorFeed: Send + Sync {
    async fn connect(&self) -> AppResult<Box<dyn SensorSubscription>>;
}

/// An open session yielding raw message bodies.
#[async_trait]
pub trait SensorSubscription: Send {
    /// `None` once the session has ended cleanly.
    async fn next_message(&mut self) -> Option<AppResult<String>>;

    async fn close(&mut self) {}
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// STOMP over websocket, subscribed to a single topic.
#[derive(Debug, Clone)]
pub struct StompSensorFeed {
    url: String,
    topic: String,
}

impl StompSensorFeed {
    pub fn new(url: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            topic: topic.into(),
        }
    }

    pub fn from_config(config: &DashboardConfig) -> Self {
        Self::new(&config.stream_url, &config.sensor_topic)
    }

    fn host(&self) -> String {
        reqwest::Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string())
    }

    fn protocol_error(&self, message: impl Into<String>) -> AppError {
        AppError::transport(TransportErrorCode::StreamProtocol, self.url.clone(), message)
    }

    async fn send_frame(&self, ws: &mut WsStream, frame: StompFrame) -> AppResult<()> {
        ws.send(Message::Text(frame.encode()))
            .await
            .map_err(|err| self.protocol_error(format!("failed to send {}: {err}", frame.command)))
    }

    async fn await_connected(&self, ws: &mut WsStream) -> AppResult<()> {
        while let Some(message) = ws.next().await {
            let message = message
                .map_err(|err| self.protocol_error(format!("handshake interrupted: {err}")))?;
            let Message::Text(text) = message else {
                continue;
            };
            match StompFrame::decode(&text) {
                Ok(Some(frame)) if frame.command == StompCommand::Connected => {
                    debug!(
                        target: "app::sensor",
                        version = frame.get("version").unwrap_or("1.0"),
                        "broker accepted connection"
                    );
                    return Ok(());
                }
                Ok(Some(frame)) if frame.command == StompCommand::Error => {
                    let reason = frame.get("message").unwrap_or("unspecified").to_string();
                    return Err(self.protocol_error(format!("broker refused connection: {reason}")));
                }
                Ok(_) => continue,
                Err(err) => {
                    return Err(self.protocol_error(format!("bad frame during handshake: {err}")))
                }
            }
        }
        Err(self.protocol_error("connection closed before CONNECTED"))
    }
}

#[async_trait]
impl SensorFeed for StompSensorFeed {
    async fn connect(&self) -> AppResult<Box<dyn SensorSubscription>> {
        let (mut ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|err| {
                AppError::transport(
                    TransportErrorCode::Connect,
                    self.url.clone(),
                    format!("cannot open sensor stream: {err}"),
                )
            })?;

        self.send_frame(&mut ws, StompFrame::connect(&self.host()))
            .await?;
        self.await_connected(&mut ws).await?;
        self.send_frame(&mut ws, StompFrame::subscribe(SUBSCRIPTION_ID, &self.topic))
            .await?;

        Ok(Box::new(StompSubscription {
            ws,
            url: self.url.clone(),
        }))
    }
}

struct StompSubscription {
    ws: WsStream,
    url: String,
}

#[async_trait]
impl SensorSubscription for StompSubscription {
    async fn next_message(&mut self) -> Option<AppResult<String>> {
        while let Some(message) = self.ws.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        warn!(target: "app::sensor", "dropping non-utf8 binary frame");
                        continue;
                    }
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(err) => {
                    return Some(Err(AppError::transport(
                        TransportErrorCode::StreamProtocol,
                        self.url.clone(),
                        format!("sensor stream failed: {err}"),
                    )))
                }
            };

            match StompFrame::decode(&text) {
                Ok(Some(frame)) => match frame.command {
                    StompCommand::Message => return Some(Ok(frame.body)),
                    StompCommand::Error => {
                        let reason = frame.get("message").unwrap_or("unspecified").to_string();
                        return Some(Err(AppError::transport(
                            TransportErrorCode::StreamProtocol,
                            self.url.clone(),
                            format!("broker error: {reason}"),
                        )));
                    }
                    _ => continue,
                },
                Ok(None) => continue,
                Err(err) => {
                    warn!(target: "app::sensor", error = %err, "dropping undecodable frame");
                    continue;
                }
            }
        }
        None
    }

    async fn close(&mut self) {
        let _ = self
            .ws
            .send(Message::Text(StompFrame::disconnect().encode()))
            .await;
        let _ = self.ws.close(None).await;
    }
}

struct SensorShared {
    sample: watch::Sender<Option<SensorSample>>,
    connection: watch::Sender<ConnectionState>,
    // Only the loop started by the latest `subscribe` may publish.
    session: AtomicU64,
}

impl SensorShared {
    fn next_session(&self) -> u64 {
        self.session.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, session: u64) -> bool {
        self.session.load(Ordering::SeqCst) == session
    }

    fn set_connection(&self, session: u64, next: ConnectionState) {
        if self.is_current(session) {
            self.store_connection(next);
        }
    }

    fn store_connection(&self, next: ConnectionState) {
        self.connection.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            debug!(
                target: "app::sensor",
                from = state.as_str(),
                to = next.as_str(),
                "connection state changed"
            );
            *state = next;
            true
        });
    }

    fn accept(&self, session: u64, body: &str) {
        if !self.is_current(session) {
            return;
        }
        match SensorSample::parse(body) {
            Ok(sample) => {
                self.sample.send_replace(Some(sample));
            }
            Err(err) => {
                warn!(target: "app::sensor", error = %err, "dropping malformed sensor message");
            }
        }
    }
}

struct SubscriptionHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.task)
            .await
            .is_err()
        {
            self.task.abort();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Keeps one sensor session alive and exposes the latest sample.
pub struct SensorStreamClient {
    feed: Arc<dyn SensorFeed>,
    reconnect_delay: StdDuration,
    shared: Arc<SensorShared>,
    handle: Mutex<Option<SubscriptionHandle>>,
}

impl SensorStreamClient {
    pub fn new(feed: Arc<dyn SensorFeed>, reconnect_delay: StdDuration) -> Self {
        let (sample, _) = watch::channel(None);
        let (connection, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            feed,
            reconnect_delay,
            shared: Arc::new(SensorShared {
                sample,
                connection,
                session: AtomicU64::new(0),
            }),
            handle: Mutex::new(None),
        }
    }

    pub fn latest(&self) -> Option<SensorSample> {
        *self.shared.sample.borrow()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.shared.connection.borrow()
    }

    pub fn watch_samples(&self) -> watch::Receiver<Option<SensorSample>> {
        self.shared.sample.subscribe()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.shared.connection.subscribe()
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock_handle()
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Start the session loop. A running one is shut down and its connection closed first.
    pub async fn subscribe(&self) {
        let previous = self.lock_handle().take();
        if let Some(previous) = previous {
            previous.shutdown().await;
            debug!(target: "app::sensor", "stopped previous sensor subscription");
        }

        let session = self.shared.next_session();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_session_loop(
            Arc::clone(&self.feed),
            Arc::clone(&self.shared),
            self.reconnect_delay,
            session,
            stop_rx,
        ));
        let displaced = self.lock_handle().replace(SubscriptionHandle {
            stop: Some(stop_tx),
            task,
        });
        // A concurrent `subscribe` may have slipped in; its loop is already stale.
        if let Some(displaced) = displaced {
            displaced.shutdown().await;
        }
        info!(target: "app::sensor", session, "sensor subscription started");
    }

    /// Stop the session loop and close the connection. The last sample stays readable.
    pub async fn unsubscribe(&self) {
        let handle = self.lock_handle().take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            self.shared.store_connection(ConnectionState::Disconnected);
            info!(target: "app::sensor", "sensor subscription stopped");
        }
    }

    fn lock_handle(&self) -> std::sync::MutexGuard<'_, Option<SubscriptionHandle>> {
        self.handle.lock().unwrap_or_else(|err| err.into_inner())
    }
}

async fn run_session_loop(
    feed: Arc<dyn SensorFeed>,
    shared: Arc<SensorShared>,
    reconnect_delay: StdDuration,
    session: u64,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        shared.set_connection(session, ConnectionState::Connecting);
        let connected = tokio::select! {
            _ = &mut stop => break,
            result = feed.connect() => result,
        };

        match connected {
            Ok(mut subscription) => {
                shared.set_connection(session, ConnectionState::Connected);
                info!(target: "app::sensor", "sensor stream connected");
                loop {
                    tokio::select! {
                        _ = &mut stop => {
                            subscription.close().await;
                            shared.set_connection(session, ConnectionState::Disconnected);
                            return;
                        }
                        message = subscription.next_message() => match message {
                            Some(Ok(body)) => shared.accept(session, &body),
                            Some(Err(err)) => {
                                warn!(target: "app::sensor", error = %err, "sensor stream lost");
                                break;
                            }
                            None => {
                                info!(target: "app::sensor", "sensor stream closed by broker");
                                break;
                            }
                        },
                    }
                }
            }
            Err(err) => {
                warn!(target: "app::sensor", error = %err, "sensor stream connect failed");
            }
        }

        shared.set_connection(session, ConnectionState::Disconnected);
        debug!(
            target: "app::sensor",
            delay_ms = reconnect_delay.as_millis() as u64,
            "scheduling reconnect"
        );
        tokio::select! {
            _ = &mut stop => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }
    shared.set_connection(session, ConnectionState::Disconnected);
}

pub mod testing {
    //! In-memory feed: each queued session is an mpsc channel of raw bodies.

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::mpsc;

    use super::*;

    enum ScriptedSession {
        Open(mpsc::UnboundedReceiver<String>),
        Refused,
    }

    #[derive(Default)]
    pub struct ChannelSensorFeed {
        sessions: Mutex<VecDeque<ScriptedSession>>,
        connects: AtomicUsize,
        open: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    impl ChannelSensorFeed {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a session; it ends when the returned sender is dropped.
        pub fn session(&self) -> mpsc::UnboundedSender<String> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.lock().push_back(ScriptedSession::Open(rx));
            tx
        }

        /// Queue one failed connect attempt.
        pub fn refuse(&self) {
            self.lock().push_back(ScriptedSession::Refused);
        }

        pub fn connect_attempts(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        pub fn open_sessions(&self) -> usize {
            self.open.load(Ordering::SeqCst)
        }

        /// Sessions ended through `close` rather than dropped.
        pub fn closed_sessions(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ScriptedSession>> {
            self.sessions.lock().unwrap_or_else(|err| err.into_inner())
        }
    }

    #[async_trait]
    impl SensorFeed for ChannelSensorFeed {
        async fn connect(&self) -> AppResult<Box<dyn SensorSubscription>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let next = self.lock().pop_front();
            match next {
                Some(ScriptedSession::Open(rx)) => {
                    self.open.fetch_add(1, Ordering::SeqCst);
                    Ok(Box::new(ChannelSubscription {
                        rx,
                        open: Arc::clone(&self.open),
                        closed: Arc::clone(&self.closed),
                    }))
                }
                Some(ScriptedSession::Refused) | None => Err(AppError::transport(
                    TransportErrorCode::Connect,
                    "memory://sensor",
                    "scripted connect failure",
                )),
            }
        }
    }

    struct ChannelSubscription {
        rx: mpsc::UnboundedReceiver<String>,
        open: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SensorSubscription for ChannelSubscription {
        async fn next_message(&mut self) -> Option<AppResult<String>> {
            self.rx.recv().await.map(Ok)
        }

        async fn close(&mut self) {
            self.rx.close();
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Drop for ChannelSubscription {
        fn drop(&mut self) {
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

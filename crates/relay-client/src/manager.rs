//! The connection manager.
//!
//! One background driver task per `connect()` owns the socket. It loops
//! connect → serve → lost → wait → connect until `close()` cancels it.
//! Every state change made by a driver is checked against the epoch it was
//! started with, so a driver that outlives its `close()` cannot disturb a
//! later connection.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use relay_core::{CloseReason, CloseSource, ConnectionState, close_code};
use relay_settings::WireProtocol;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::errors::{ClientError, ConnectionError};
use crate::heartbeat::{HeartbeatMonitor, Probe};
use crate::state::StateTracker;

const PING: &str = "ping";
const PONG: &str = "pong";
const HEARTBEAT_TIMEOUT_REASON: &str = "ping/pong message timeout";
const CONNECT_TIMEOUT_REASON: &str = "connect timeout";
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A frame delivered to consumers.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    /// Raw text ([`WireProtocol::Text`]).
    Text(String),
    /// Parsed JSON ([`WireProtocol::Json`]).
    Json(Value),
}

struct Driver {
    cancel: CancellationToken,
    close_request: Arc<Mutex<Option<CloseReason>>>,
}

#[derive(Default)]
struct Control {
    epoch: u64,
    driver: Option<Driver>,
}

struct Inner {
    config: ClientConfig,
    url: Mutex<String>,
    state: StateTracker,
    close_reason: Mutex<Option<CloseReason>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    control: Mutex<Control>,
    messages: broadcast::Sender<InboundMessage>,
    errors: broadcast::Sender<ConnectionError>,
}

impl Inner {
    fn is_current(control: &Control, epoch: u64) -> bool {
        control.epoch == epoch && control.driver.is_some()
    }

    fn transition(&self, epoch: u64, state: ConnectionState) -> bool {
        let control = self.control.lock();
        if !Self::is_current(&control, epoch) {
            return false;
        }
        let _ = self.state.set(state);
        true
    }

    fn go_live(&self, epoch: u64, outbound: mpsc::UnboundedSender<Message>) -> bool {
        let control = self.control.lock();
        if !Self::is_current(&control, epoch) {
            return false;
        }
        *self.outbound.lock() = Some(outbound);
        *self.close_reason.lock() = None;
        let _ = self.state.set(ConnectionState::Connected);
        true
    }

    fn lose(&self, epoch: u64, reason: CloseReason) -> bool {
        let control = self.control.lock();
        if !Self::is_current(&control, epoch) {
            return false;
        }
        let _ = self.outbound.lock().take();
        *self.close_reason.lock() = Some(reason);
        let _ = self.state.set(ConnectionState::ConnectionLost);
        true
    }

    fn deliver(&self, text: &str) {
        let message = match self.config.protocol {
            WireProtocol::Text => InboundMessage::Text(text.to_owned()),
            WireProtocol::Json => match serde_json::from_str(text) {
                Ok(value) => InboundMessage::Json(value),
                Err(err) => {
                    debug!(error = %err, "dropping malformed JSON frame");
                    return;
                }
            },
        };
        let _ = self.messages.send(message);
    }
}

/// Keeps one logical websocket connection alive across failures.
///
/// Cloning shares the connection. The background task runs until
/// [`close`](Self::close) is called.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Create a manager in the `Disconnected` state.
    pub fn new(config: ClientConfig) -> Self {
        let (messages, _) = broadcast::channel(config.channel_capacity);
        let (errors, _) = broadcast::channel(config.channel_capacity);
        Self {
            inner: Arc::new(Inner {
                url: Mutex::new(config.url.clone()),
                config,
                state: StateTracker::new(),
                close_reason: Mutex::new(None),
                outbound: Mutex::new(None),
                control: Mutex::new(Control::default()),
                messages,
                errors,
            }),
        }
    }

    /// Start connecting. No-op unless `Disconnected` or `Closed`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut control = self.inner.control.lock();
        if control.driver.is_some() || !self.inner.state.get().can_connect() {
            debug!(state = %self.inner.state.get(), "connect ignored");
            return;
        }
        control.epoch += 1;
        let epoch = control.epoch;
        let cancel = CancellationToken::new();
        let close_request = Arc::new(Mutex::new(None));
        control.driver = Some(Driver {
            cancel: cancel.clone(),
            close_request: Arc::clone(&close_request),
        });
        let _ = self.inner.state.set(ConnectionState::Connecting);
        drop(control);

        let _ = tokio::spawn(drive(Arc::clone(&self.inner), epoch, cancel, close_request));
    }

    /// Close for good. No reconnect follows.
    ///
    /// A live socket gets a close frame with `code` (default 1000) and
    /// `reason`; the state becomes `Closed` immediately.
    pub fn close(&self, code: Option<u16>, reason: Option<String>) {
        let mut control = self.inner.control.lock();
        let reason = CloseReason::user(code, reason);
        if let Some(driver) = control.driver.take() {
            *driver.close_request.lock() = Some(reason.clone());
            driver.cancel.cancel();
        }
        let _ = self.inner.outbound.lock().take();
        info!(reason = %reason, "connection closed by user");
        *self.inner.close_reason.lock() = Some(reason);
        let _ = self.inner.state.set(ConnectionState::Closed);
    }

    /// Send a text frame.
    pub fn send(&self, text: impl Into<String>) -> Result<(), ClientError> {
        let outbound = self.inner.outbound.lock();
        let tx = outbound.as_ref().ok_or(ClientError::NotConnected)?;
        tx.send(Message::text(text.into()))
            .map_err(|_| ClientError::NotConnected)
    }

    /// Serialize `value` and send it as a text frame.
    pub fn send_json<T: Serialize>(&self, value: &T) -> Result<(), ClientError> {
        let text = serde_json::to_string(value)?;
        self.send(text)
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    /// Why the connection is not connected, if it is not.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.inner.close_reason.lock().clone()
    }

    /// The current state followed by every transition.
    pub fn state_changes(&self) -> BoxStream<'static, ConnectionState> {
        self.inner.state.stream()
    }

    /// Resolve once the state equals `state`.
    pub async fn wait_for(&self, state: ConnectionState) {
        self.inner.state.wait_for(state).await;
    }

    /// Subscribe to inbound frames.
    pub fn messages(&self) -> broadcast::Receiver<InboundMessage> {
        self.inner.messages.subscribe()
    }

    /// Subscribe to failed connection attempts.
    pub fn errors(&self) -> broadcast::Receiver<ConnectionError> {
        self.inner.errors.subscribe()
    }

    /// Endpoint used by the next attempt.
    pub fn url(&self) -> String {
        self.inner.url.lock().clone()
    }

    /// Change the endpoint; takes effect on the next attempt.
    pub fn set_url(&self, url: impl Into<String>) {
        *self.inner.url.lock() = url.into();
    }
}

enum Exit {
    Closed,
    Lost(CloseReason),
}

#[instrument(skip_all, fields(epoch = epoch))]
async fn drive(
    inner: Arc<Inner>,
    epoch: u64,
    cancel: CancellationToken,
    close_request: Arc<Mutex<Option<CloseReason>>>,
) {
    loop {
        let url = inner.url.lock().clone();
        debug!(url = %url, "connecting");
        let attempt = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            attempt = tokio::time::timeout(
                inner.config.connect_timeout,
                tokio_tungstenite::connect_async(url.as_str()),
            ) => attempt,
        };
        let attempt = match attempt {
            Ok(Ok((socket, _response))) => Ok(socket),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_elapsed) => Err(CONNECT_TIMEOUT_REASON.to_owned()),
        };

        match attempt {
            Ok(socket) => {
                info!(url = %url, "connected");
                match serve(&inner, epoch, socket, &cancel, &close_request).await {
                    Exit::Closed => return,
                    Exit::Lost(reason) => {
                        warn!(url = %url, reason = %reason, "connection lost");
                        let _ = inner.lose(epoch, reason);
                    }
                }
            }
            Err(err) => {
                warn!(url = %url, error = %err, "connect failed");
                let reason = CloseReason::client(close_code::ABNORMAL, err);
                if inner.lose(epoch, reason.clone()) {
                    let _ = inner.errors.send(ConnectionError { url, reason });
                }
            }
        }

        if !inner.transition(epoch, ConnectionState::WaitingReconnect) {
            return;
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(inner.config.reconnect_delay) => {}
        }
        if !inner.transition(epoch, ConnectionState::Connecting) {
            return;
        }
    }
}

async fn serve(
    inner: &Inner,
    epoch: u64,
    socket: Socket,
    cancel: &CancellationToken,
    close_request: &Mutex<Option<CloseReason>>,
) -> Exit {
    let (mut sink, mut source) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    if !inner.go_live(epoch, tx) {
        let frame = user_close_frame(close_request);
        let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, sink.send(frame)).await;
        return Exit::Closed;
    }

    let heartbeat_enabled = inner.config.heartbeat_enabled;
    let period = inner.config.heartbeat_interval;
    let mut monitor = HeartbeatMonitor::new(period);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let frame = user_close_frame(close_request);
                let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, sink.send(frame)).await;
                return Exit::Closed;
            }
            _ = ticker.tick(), if heartbeat_enabled => match monitor.on_tick(Instant::now()) {
                Probe::TimedOut => {
                    let frame = close_frame(close_code::HEARTBEAT_TIMEOUT, HEARTBEAT_TIMEOUT_REASON);
                    let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, sink.send(frame)).await;
                    return Exit::Lost(CloseReason::client(
                        close_code::HEARTBEAT_TIMEOUT,
                        HEARTBEAT_TIMEOUT_REASON,
                    ));
                }
                Probe::SendPing => {
                    if let Err(err) = sink.send(Message::text(PING)).await {
                        return Exit::Lost(transport_lost(&err));
                    }
                }
            },
            Some(message) = rx.recv() => {
                if let Err(err) = sink.send(message).await {
                    return Exit::Lost(transport_lost(&err));
                }
            }
            frame = source.next() => match frame {
                None => return Exit::Lost(CloseReason::server(close_code::ABNORMAL, None)),
                Some(Err(err)) => return Exit::Lost(transport_lost(&err)),
                Some(Ok(Message::Close(frame))) => return Exit::Lost(peer_closed(frame)),
                Some(Ok(Message::Pong(_))) => monitor.on_pong(),
                Some(Ok(Message::Text(text))) => {
                    let text = text.as_str();
                    if heartbeat_enabled && text == PING {
                        if let Err(err) = sink.send(Message::text(PONG)).await {
                            return Exit::Lost(transport_lost(&err));
                        }
                    } else if heartbeat_enabled && text == PONG {
                        monitor.on_pong();
                    } else {
                        inner.deliver(text);
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    debug!(len = data.len(), "dropping binary frame");
                }
                Some(Ok(Message::Ping(_) | Message::Frame(_))) => {}
            },
        }
    }
}

fn close_frame(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code: code.into(),
        reason: reason.to_owned().into(),
    }))
}

fn user_close_frame(close_request: &Mutex<Option<CloseReason>>) -> Message {
    let request = close_request.lock().clone();
    let code = request
        .as_ref()
        .and_then(|r| r.code)
        .unwrap_or(close_code::NORMAL);
    let reason = request.and_then(|r| r.reason).unwrap_or_default();
    close_frame(code, &reason)
}

fn transport_lost(err: &tokio_tungstenite::tungstenite::Error) -> CloseReason {
    CloseReason::server(close_code::ABNORMAL, Some(err.to_string()))
}

fn peer_closed(frame: Option<CloseFrame>) -> CloseReason {
    match frame {
        Some(frame) => {
            let reason = frame.reason.as_str();
            CloseReason::new(
                CloseSource::Server,
                Some(u16::from(frame.code)),
                (!reason.is_empty()).then(|| reason.to_owned()),
            )
        }
        None => CloseReason::new(CloseSource::Server, None, None),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use serde_json::json;
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_secs(5);

    type ServerSocket = WebSocketStream<TcpStream>;

    /// Accept loop; `handler` gets the zero-based connection index.
    async fn spawn_server<F, Fut>(handler: F) -> (String, Arc<AtomicUsize>)
    where
        F: Fn(usize, ServerSocket) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        let handler = Arc::new(handler);
        let _ = tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(tcp).await else {
                    continue;
                };
                let index = counter.fetch_add(1, Ordering::SeqCst);
                let handler = Arc::clone(&handler);
                let _ = tokio::spawn(async move { handler(index, ws).await });
            }
        });
        (format!("ws://{addr}"), accepted)
    }

    async fn echo(_index: usize, mut ws: ServerSocket) {
        while let Some(Ok(message)) = ws.next().await {
            match message {
                Message::Text(text) if text.as_str() == PING => {
                    let _ = ws.send(Message::text(PONG)).await;
                }
                Message::Text(text) => {
                    let _ = ws.send(Message::Text(text)).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    }

    async fn silent(_index: usize, mut ws: ServerSocket) {
        while let Some(Ok(_)) = ws.next().await {}
    }

    fn dead_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        format!("ws://{}", listener.local_addr().unwrap())
    }

    fn config(url: &str) -> ClientConfig {
        ClientConfig {
            heartbeat_interval: Duration::from_millis(50),
            reconnect_delay: Duration::from_millis(50),
            ..ClientConfig::new(url)
        }
    }

    async fn within<T>(future: impl Future<Output = T>) -> T {
        tokio::time::timeout(TIMEOUT, future)
            .await
            .expect("timed out")
    }

    async fn take_states(
        states: &mut BoxStream<'static, ConnectionState>,
        n: usize,
    ) -> Vec<ConnectionState> {
        let mut seen = Vec::with_capacity(n);
        for _ in 0..n {
            seen.push(within(states.next()).await.unwrap());
        }
        seen
    }

    #[tokio::test]
    async fn connect_then_close_sequence() {
        let (url, _) = spawn_server(echo).await;
        let manager = ConnectionManager::new(config(&url));
        let mut states = manager.state_changes();

        manager.connect();
        within(manager.wait_for(ConnectionState::Connected)).await;
        manager.close(Some(close_code::NORMAL), Some("done".into()));

        assert_eq!(
            take_states(&mut states, 4).await,
            vec![
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Closed,
            ]
        );
        assert_eq!(
            manager.close_reason(),
            Some(CloseReason::user(Some(1000), Some("done".into())))
        );
        assert_matches!(manager.send("late"), Err(ClientError::NotConnected));
    }

    #[tokio::test]
    async fn send_before_connect_fails() {
        let manager = ConnectionManager::new(ClientConfig::new(dead_url()));
        let err = manager.send("hello").unwrap_err();
        assert_eq!(err.to_string(), "Not connected");
    }

    #[tokio::test]
    async fn close_before_connect_is_terminal() {
        let manager = ConnectionManager::new(ClientConfig::new(dead_url()));
        manager.close(None, None);
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert_eq!(manager.close_reason(), Some(CloseReason::user(None, None)));
    }

    #[tokio::test]
    async fn echo_round_trip_hides_heartbeat() {
        let (url, _) = spawn_server(echo).await;
        let manager = ConnectionManager::new(config(&url));
        let mut messages = manager.messages();
        manager.connect();
        within(manager.wait_for(ConnectionState::Connected)).await;

        // Several heartbeat intervals pass without a timeout.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(manager.state(), ConnectionState::Connected);

        manager.send("hello").unwrap();
        manager.send_json(&json!({"n": 1})).unwrap();
        assert_eq!(
            within(messages.recv()).await.unwrap(),
            InboundMessage::Text("hello".into())
        );
        assert_eq!(
            within(messages.recv()).await.unwrap(),
            InboundMessage::Text(r#"{"n":1}"#.into())
        );
        manager.close(None, None);
    }

    #[tokio::test]
    async fn heartbeat_timeout_closes_and_schedules_reconnect() {
        let (url, _) = spawn_server(silent).await;
        let manager = ConnectionManager::new(ClientConfig {
            reconnect_delay: Duration::from_secs(30),
            ..config(&url)
        });
        let mut states = manager.state_changes();
        manager.connect();

        assert_eq!(
            take_states(&mut states, 5).await,
            vec![
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::ConnectionLost,
                ConnectionState::WaitingReconnect,
            ]
        );
        assert_eq!(
            manager.close_reason(),
            Some(CloseReason::client(4000, "ping/pong message timeout"))
        );
        manager.close(None, None);
    }

    #[tokio::test]
    async fn server_close_triggers_reconnect() {
        let (url, accepted) = spawn_server(|index, mut ws: ServerSocket| async move {
            if index == 0 {
                let _ = ws
                    .close(Some(CloseFrame {
                        code: 4002.into(),
                        reason: "bye".into(),
                    }))
                    .await;
                while let Some(Ok(_)) = ws.next().await {}
            } else {
                echo(index, ws).await;
            }
        })
        .await;
        let manager = ConnectionManager::new(ClientConfig {
            reconnect_delay: Duration::from_millis(300),
            ..config(&url)
        });
        let mut states = manager.state_changes();
        manager.connect();

        assert_eq!(
            take_states(&mut states, 4).await,
            vec![
                ConnectionState::Disconnected,
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::ConnectionLost,
            ]
        );
        assert_eq!(
            manager.close_reason(),
            Some(CloseReason::server(4002, Some("bye".into())))
        );
        assert_eq!(
            take_states(&mut states, 3).await,
            vec![
                ConnectionState::WaitingReconnect,
                ConnectionState::Connecting,
                ConnectionState::Connected,
            ]
        );
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
        assert_eq!(manager.close_reason(), None);
        manager.close(None, None);
    }

    #[tokio::test]
    async fn connect_failure_is_reported_and_retried() {
        let url = dead_url();
        let manager = ConnectionManager::new(config(&url));
        let mut errors = manager.errors();
        manager.connect();

        let first = within(errors.recv()).await.unwrap();
        assert_eq!(first.url, url);
        assert_eq!(first.reason.source, CloseSource::Client);
        assert_eq!(first.reason.code, Some(close_code::ABNORMAL));

        // Fixed delay, infinite retries.
        let second = within(errors.recv()).await.unwrap();
        assert_eq!(second.url, url);
        manager.close(None, None);
    }

    #[tokio::test]
    async fn stalled_handshake_times_out_and_retries() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        let _ = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((tcp, _)) = listener.accept().await {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
                held.push(tcp);
            }
        });

        let manager = ConnectionManager::new(ClientConfig {
            connect_timeout: Duration::from_millis(100),
            ..config(&url)
        });
        let mut errors = manager.errors();
        manager.connect();

        let first = within(errors.recv()).await.unwrap();
        assert_eq!(first.url, url);
        assert_eq!(
            first.reason,
            CloseReason::client(close_code::ABNORMAL, "connect timeout")
        );
        let _ = within(errors.recv()).await.unwrap();
        assert!(accepted.load(Ordering::SeqCst) >= 2);
        assert_ne!(manager.state(), ConnectionState::Connected);
        manager.close(None, None);
    }

    #[tokio::test]
    async fn set_url_applies_to_next_attempt() {
        let (live, _) = spawn_server(echo).await;
        let manager = ConnectionManager::new(config(&dead_url()));
        manager.connect();
        within(manager.wait_for(ConnectionState::WaitingReconnect)).await;

        manager.set_url(live.clone());
        assert_eq!(manager.url(), live);
        within(manager.wait_for(ConnectionState::Connected)).await;
        manager.close(None, None);
    }

    #[tokio::test]
    async fn close_while_waiting_stops_reconnects() {
        let manager = ConnectionManager::new(ClientConfig {
            reconnect_delay: Duration::from_millis(100),
            ..config(&dead_url())
        });
        let mut errors = manager.errors();
        manager.connect();
        within(manager.wait_for(ConnectionState::WaitingReconnect)).await;
        let _ = within(errors.recv()).await;

        manager.close(None, None);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert_matches!(
            errors.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        );
    }

    #[tokio::test]
    async fn connect_is_idempotent_and_reusable_after_close() {
        let (url, accepted) = spawn_server(echo).await;
        let manager = ConnectionManager::new(config(&url));
        manager.connect();
        manager.connect();
        within(manager.wait_for(ConnectionState::Connected)).await;
        manager.connect();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 1);

        manager.close(None, None);
        manager.connect();
        within(manager.wait_for(ConnectionState::Connected)).await;
        assert_eq!(manager.state(), ConnectionState::Connected);
        manager.close(None, None);
    }

    #[tokio::test]
    async fn json_protocol_drops_malformed_frames() {
        let (url, _) = spawn_server(|_, mut ws: ServerSocket| async move {
            let _ = ws.send(Message::text("not json")).await;
            let _ = ws.send(Message::binary(vec![1u8, 2, 3])).await;
            let _ = ws.send(Message::text(r#"{"a":1}"#)).await;
            echo(0, ws).await;
        })
        .await;
        let manager = ConnectionManager::new(ClientConfig {
            protocol: WireProtocol::Json,
            ..config(&url)
        });
        let mut messages = manager.messages();
        manager.connect();

        assert_eq!(
            within(messages.recv()).await.unwrap(),
            InboundMessage::Json(json!({"a": 1}))
        );
        manager.close(None, None);
    }

    #[tokio::test]
    async fn disabled_heartbeat_delivers_ping_text() {
        let (url, _) = spawn_server(|_, mut ws: ServerSocket| async move {
            let _ = ws.send(Message::text(PING)).await;
            silent(0, ws).await;
        })
        .await;
        let manager = ConnectionManager::new(ClientConfig {
            heartbeat_enabled: false,
            ..config(&url)
        });
        let mut messages = manager.messages();
        manager.connect();

        assert_eq!(
            within(messages.recv()).await.unwrap(),
            InboundMessage::Text("ping".into())
        );
        // Silent peer is fine without heartbeat.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(manager.state(), ConnectionState::Connected);
        manager.close(None, None);
    }
}

//! `RelayServer`: axum HTTP + websocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use futures::StreamExt;
use relay_core::{ChannelStream, EventSourceLookup, EventStream, StreamId};
use relay_pubsub::{
    CommandSession, CustomCommandHandler, NoopHooks, TopicDispatcher, TopicDispatcherConfig,
    TopicHooks,
};
use relay_webhooks::{FailureCallback, WebhookRegistry};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::webhooks;
use crate::websocket::{BridgeConfig, bridge};

/// Inbound frames buffered between a socket reader and its dispatcher.
const INBOUND_CAPACITY: usize = 64;
/// Capacity of the webhook event bus.
const EVENT_BUS_CAPACITY: usize = 1024;

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Command-mode event sources.
    pub sources: Arc<dyn EventSourceLookup>,
    /// Receives command-mode verbs other than `sub`/`unsub`.
    pub custom_commands: Option<Arc<dyn CustomCommandHandler>>,
    /// Topic-mode dispatcher.
    pub dispatcher: Arc<TopicDispatcher>,
    /// Webhook registrations.
    pub webhooks: WebhookRegistry,
    /// Events fanned out to webhooks.
    pub events: broadcast::Sender<Value>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Open websocket connections.
    pub connections: Arc<AtomicUsize>,
    /// When the server started.
    pub start_time: Instant,
}

impl AppState {
    /// A fresh subscription to the event bus.
    ///
    /// A webhook that falls behind skips the missed events.
    pub fn event_source(&self) -> EventStream {
        BroadcastStream::new(self.events.subscribe())
            .filter_map(|item| async move {
                match item {
                    Ok(value) => Some(Ok(value)),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "webhook source lagged");
                        None
                    }
                }
            })
            .boxed()
    }

    fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            heartbeat_interval: self.config.heartbeat_interval,
            max_missed_pongs: self.config.max_missed_pongs(),
        }
    }
}

/// The relay server.
pub struct RelayServer {
    state: AppState,
}

impl RelayServer {
    /// Create a server with no topic hooks.
    pub fn new(config: ServerConfig, sources: Arc<dyn EventSourceLookup>) -> Self {
        Self::with_topic_hooks(config, sources, Arc::new(NoopHooks))
    }

    /// Create a server whose topic dispatcher calls `hooks`.
    pub fn with_topic_hooks(
        config: ServerConfig,
        sources: Arc<dyn EventSourceLookup>,
        hooks: Arc<dyn TopicHooks>,
    ) -> Self {
        let dispatcher = TopicDispatcher::new(
            hooks,
            TopicDispatcherConfig {
                subscribe_ack: config.subscribe_ack,
            },
        );
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            state: AppState {
                webhooks: WebhookRegistry::new(&config.webhooks),
                config: Arc::new(config),
                sources,
                custom_commands: None,
                dispatcher: Arc::new(dispatcher),
                events,
                shutdown: Arc::new(ShutdownCoordinator::new()),
                connections: Arc::new(AtomicUsize::new(0)),
                start_time: Instant::now(),
            },
        }
    }

    /// Report webhooks torn down by a delivery or source failure to
    /// `on_failure`. Replaces the registry, so call it before serving.
    #[must_use]
    pub fn with_webhook_failure_callback(mut self, on_failure: FailureCallback) -> Self {
        self.state.webhooks =
            WebhookRegistry::with_failure_callback(&self.state.config.webhooks, on_failure);
        self
    }

    /// Forward unknown command-mode verbs to `handler`.
    #[must_use]
    pub fn with_custom_commands(mut self, handler: Arc<dyn CustomCommandHandler>) -> Self {
        self.state.custom_commands = Some(handler);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/ws/commands", get(commands_handler))
            .route("/ws/topics", get(topics_handler))
            .route("/webhooks", post(webhooks::add).delete(webhooks::remove))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address. The task ends once shutdown begins.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.state.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local = listener.local_addr()?;
        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let token = self.state.shutdown.token();

        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %err, "server stopped with error");
            }
        });
        info!(addr = %local, "relay server listening");
        Ok((local, handle))
    }

    /// Publish an event to every registered webhook. Returns the number of
    /// live webhook subscriptions.
    pub fn publish_event(&self, value: Value) -> usize {
        self.state.events.send(value).unwrap_or(0)
    }

    /// A sender for the webhook event bus.
    pub fn event_bus(&self) -> broadcast::Sender<Value> {
        self.state.events.clone()
    }

    /// Close every connection, drop every webhook and wait for connection
    /// tasks to finish.
    pub async fn stop(&self, timeout: Option<Duration>) -> bool {
        self.state.webhooks.clear();
        self.state.shutdown.drain(timeout).await
    }

    /// Topic-mode dispatcher.
    pub fn dispatcher(&self) -> &Arc<TopicDispatcher> {
        &self.state.dispatcher
    }

    /// Webhook registrations.
    pub fn webhooks(&self) -> &WebhookRegistry {
        &self.state.webhooks
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Open websocket connections.
    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::Acquire)
    }
}

/// Holds one slot of `max_connections` for the life of a socket.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(counter: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        let _ = counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()?;
        Some(Self(Arc::clone(counter)))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.connections.load(Ordering::Acquire);
    Json(health::health_check(
        state.start_time,
        connections,
        state.webhooks.len(),
    ))
}

fn too_many_connections() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response()
}

/// GET /ws/commands
async fn commands_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(slot) = ConnectionSlot::acquire(&state.connections, state.config.max_connections)
    else {
        warn!("rejecting command socket, connection limit reached");
        return too_many_connections();
    };
    let shutdown = Arc::clone(&state.shutdown);
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            shutdown.track(command_connection(socket, StreamId::new(), state, slot))
        })
}

/// GET /ws/topics
async fn topics_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let Some(slot) = ConnectionSlot::acquire(&state.connections, state.config.max_connections)
    else {
        warn!("rejecting topic socket, connection limit reached");
        return too_many_connections();
    };
    let shutdown = Arc::clone(&state.shutdown);
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            shutdown.track(topic_connection(socket, StreamId::new(), state, slot))
        })
}

#[instrument(skip_all, fields(stream_id = %id))]
async fn command_connection(socket: WebSocket, id: StreamId, state: AppState, _slot: ConnectionSlot) {
    let (stream, queue) = ChannelStream::new(id, state.config.max_buffered_bytes);
    let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
    info!("command stream connected");

    let mut session = CommandSession::new(stream.clone(), Arc::clone(&state.sources));
    if let Some(handler) = &state.custom_commands {
        session = session.with_custom_handler(Arc::clone(handler));
    }
    let _ = tokio::join!(
        session.run(rx),
        bridge::run(
            socket,
            Arc::clone(&stream),
            queue,
            tx,
            state.bridge_config(),
            state.shutdown.token(),
        ),
    );
    info!(age_ms = stream.age().as_millis(), "command stream closed");
}

#[instrument(skip_all, fields(stream_id = %id))]
async fn topic_connection(socket: WebSocket, id: StreamId, state: AppState, _slot: ConnectionSlot) {
    let (stream, queue) = ChannelStream::new(id, state.config.max_buffered_bytes);
    let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
    info!("topic stream connected");

    let _ = tokio::join!(
        state.dispatcher.serve(stream.clone(), rx),
        bridge::run(
            socket,
            Arc::clone(&stream),
            queue,
            tx,
            state.bridge_config(),
            state.shutdown.token(),
        ),
    );
    info!(age_ms = stream.age().as_millis(), "topic stream closed");
}

//! Pumps frames between an upgraded axum socket and a [`ChannelStream`].
//!
//! The writer drains the stream's outbound queue and owns the heartbeat.
//! The reader forwards text frames, in order, to whatever serves the
//! stream. Whichever side finishes first marks the stream disconnected so
//! the other one stops too.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use relay_core::{ChannelStream, MessageStream, Outbound, OutboundQueue, close_code};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::heartbeat::{HeartbeatResult, HeartbeatTracker};

const PING: &str = "ping";
const PONG: &str = "pong";
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Heartbeat parameters for one socket.
#[derive(Clone, Copy, Debug)]
pub struct BridgeConfig {
    /// Protocol ping interval.
    pub heartbeat_interval: Duration,
    /// Silent ticks tolerated before closing.
    pub max_missed_pongs: u32,
}

/// Run the socket until either side goes away or `shutdown` fires.
pub async fn run(
    socket: WebSocket,
    stream: Arc<ChannelStream>,
    queue: OutboundQueue,
    inbound: mpsc::Sender<String>,
    config: BridgeConfig,
    shutdown: CancellationToken,
) {
    let (sink, source) = socket.split();
    let writer = tokio::spawn(write_loop(sink, queue, Arc::clone(&stream), config));
    let abort = writer.abort_handle();

    read_loop(source, &stream, inbound, &shutdown).await;
    stream.mark_disconnected();

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        debug!(stream_id = %stream.id(), "writer did not finish, aborting");
        abort.abort();
    }
}

async fn read_loop(
    mut source: SplitStream<WebSocket>,
    stream: &ChannelStream,
    inbound: mpsc::Sender<String>,
    shutdown: &CancellationToken,
) {
    let closed = stream.closed();
    loop {
        let frame = tokio::select! {
            biased;
            () = closed.cancelled() => return,
            () = shutdown.cancelled() => {
                stream.close(close_code::RESTARTING, "server shutting down");
                return;
            }
            frame = source.next() => frame,
        };
        let message = match frame {
            Some(Ok(message)) => message,
            Some(Err(err)) => {
                debug!(stream_id = %stream.id(), error = %err, "socket read failed");
                return;
            }
            None => return,
        };

        stream.mark_alive();
        match message {
            Message::Text(text) => {
                if text.as_str() == PING {
                    let _ = stream.send(PONG.to_owned());
                } else if inbound.send(text.to_string()).await.is_err() {
                    return;
                }
            }
            Message::Binary(data) => {
                debug!(stream_id = %stream.id(), len = data.len(), "dropping binary frame");
            }
            Message::Close(frame) => {
                debug!(
                    stream_id = %stream.id(),
                    code = frame.as_ref().map(|f| f.code),
                    "peer closed"
                );
                return;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: OutboundQueue,
    stream: Arc<ChannelStream>,
    config: BridgeConfig,
) {
    let disconnected = stream.closed();
    let mut heartbeat = HeartbeatTracker::new(config.max_missed_pongs);
    let mut ping = tokio::time::interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            item = queue.recv() => match item {
                Some(Outbound::Text(text)) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame { code, reason: reason.into() };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
                None => break,
            },
            () = disconnected.cancelled() => break,
            _ = ping.tick() => match heartbeat.on_tick(stream.check_alive()) {
                HeartbeatResult::TimedOut => {
                    warn!(stream_id = %stream.id(), missed = heartbeat.missed(), "heartbeat timeout, closing stream");
                    stream.close(close_code::HEARTBEAT_TIMEOUT, "ping/pong message timeout");
                }
                HeartbeatResult::Ping => {
                    if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            },
        }
    }
    stream.mark_disconnected();
}

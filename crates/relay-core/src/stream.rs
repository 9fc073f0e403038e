//! The message stream abstraction and its channel-backed implementation.
//!
//! [`MessageStream`] is what dispatchers talk to: send text, close with a
//! code, and observe closure through a [`CancellationToken`]. The transport
//! side owns the matching [`OutboundQueue`] and writes whatever it yields.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::close::close_code;
use crate::ids::StreamId;

/// A bidirectional text stream as seen by dispatch logic.
pub trait MessageStream: Send + Sync {
    /// Stream identifier.
    fn id(&self) -> &StreamId;

    /// Queue a text frame. Returns `false` if the stream is closed or was
    /// closed by this call.
    fn send(&self, text: String) -> bool;

    /// Close with `code` and `reason`. Idempotent.
    fn close(&self, code: u16, reason: &str);

    /// Whether the stream still accepts frames.
    fn is_open(&self) -> bool;

    /// Token cancelled exactly when the stream closes.
    fn closed(&self) -> CancellationToken;
}

/// Item handed to the transport writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Text frame.
    Text(String),
    /// Close frame; nothing follows it.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Writer half of a [`ChannelStream`].
#[derive(Debug)]
pub struct OutboundQueue {
    rx: mpsc::UnboundedReceiver<Outbound>,
    buffered: Arc<AtomicUsize>,
}

impl OutboundQueue {
    /// Next item to write, releasing its bytes from the buffer count.
    pub async fn recv(&mut self) -> Option<Outbound> {
        let item = self.rx.recv().await?;
        if let Outbound::Text(text) = &item {
            let _ = self.buffered.fetch_sub(text.len(), Ordering::AcqRel);
        }
        Some(item)
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Outbound> {
        let item = self.rx.try_recv().ok()?;
        if let Outbound::Text(text) = &item {
            let _ = self.buffered.fetch_sub(text.len(), Ordering::AcqRel);
        }
        Some(item)
    }
}

/// A [`MessageStream`] backed by an unbounded channel with a byte budget.
///
/// Once the bytes queued but not yet taken by the writer reach
/// `max_buffered_bytes`, the next `send` closes the stream with
/// [`close_code::BACKPRESSURE`].
#[derive(Debug)]
pub struct ChannelStream {
    id: StreamId,
    tx: mpsc::UnboundedSender<Outbound>,
    buffered: Arc<AtomicUsize>,
    max_buffered_bytes: usize,
    open: AtomicBool,
    closed: CancellationToken,
    connected_at: Instant,
    /// Whether the peer answered since the last heartbeat check.
    is_alive: AtomicBool,
}

impl ChannelStream {
    /// Create a stream and its writer queue.
    pub fn new(id: StreamId, max_buffered_bytes: usize) -> (Arc<Self>, OutboundQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let buffered = Arc::new(AtomicUsize::new(0));
        let stream = Arc::new(Self {
            id,
            tx,
            buffered: Arc::clone(&buffered),
            max_buffered_bytes,
            open: AtomicBool::new(true),
            closed: CancellationToken::new(),
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
        });
        (stream, OutboundQueue { rx, buffered })
    }

    /// Serialize `value` and send it.
    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(json),
            Err(_) => false,
        }
    }

    /// The peer went away; close without queueing a close frame.
    pub fn mark_disconnected(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            debug!(stream_id = %self.id, "stream disconnected");
            self.closed.cancel();
        }
    }

    /// Bytes queued but not yet taken by the writer.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered.load(Ordering::Acquire)
    }

    /// Mark the peer as alive (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the peer was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the stream was accepted.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl MessageStream for ChannelStream {
    fn id(&self) -> &StreamId {
        &self.id
    }

    fn send(&self, text: String) -> bool {
        if !self.is_open() {
            return false;
        }
        let buffered = self.buffered_bytes();
        if buffered >= self.max_buffered_bytes {
            warn!(stream_id = %self.id, buffered, limit = self.max_buffered_bytes, "outbound buffer full, closing stream");
            self.close(close_code::BACKPRESSURE, "backpressure");
            return false;
        }
        let len = text.len();
        let _ = self.buffered.fetch_add(len, Ordering::AcqRel);
        if self.tx.send(Outbound::Text(text)).is_err() {
            let _ = self.buffered.fetch_sub(len, Ordering::AcqRel);
            self.mark_disconnected();
            return false;
        }
        true
    }

    fn close(&self, code: u16, reason: &str) {
        if self.open.swap(false, Ordering::AcqRel) {
            debug!(stream_id = %self.id, code, reason, "closing stream");
            let _ = self.tx.send(Outbound::Close {
                code,
                reason: reason.to_owned(),
            });
            self.closed.cancel();
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}

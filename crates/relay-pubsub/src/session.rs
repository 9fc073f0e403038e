//! Command-mode session: one per accepted stream.
//!
//! The session owns the stream's subscription table and is driven from a
//! single task ([`CommandSession::run`]), so the table needs no lock.
//! Subscriptions report termination back through a channel tagged with a
//! generation number; a report for a key that has since been
//! re-subscribed is ignored.

use std::ops::ControlFlow;
use std::sync::Arc;

use async_trait::async_trait;
use relay_core::{
    EventSourceLookup, MessageStream, Observer, OpenError, PushSubscription, SourceError,
    close_code, frames, push,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::command::{Command, CommandKey, INVALID_EVENT_TYPE, UNKNOWN_COMMAND_TYPE};
use crate::table::SubscriptionTable;

/// Receives commands with a verb other than `sub`/`unsub`.
pub trait CustomCommandHandler: Send + Sync {
    /// Handle `verb` with its parsed remainder.
    fn handle(&self, stream: &Arc<dyn MessageStream>, verb: &str, key: &CommandKey);
}

struct ActiveSubscription {
    generation: u64,
    handle: PushSubscription,
}

#[derive(Debug)]
struct Ended {
    key: CommandKey,
    generation: u64,
}

/// Per-stream command dispatcher.
pub struct CommandSession {
    stream: Arc<dyn MessageStream>,
    sources: Arc<dyn EventSourceLookup>,
    custom: Option<Arc<dyn CustomCommandHandler>>,
    table: SubscriptionTable<CommandKey, ActiveSubscription>,
    next_generation: u64,
    ended_tx: mpsc::UnboundedSender<Ended>,
    ended_rx: mpsc::UnboundedReceiver<Ended>,
}

impl CommandSession {
    /// Create a session for `stream`, resolving event types via `sources`.
    pub fn new(stream: Arc<dyn MessageStream>, sources: Arc<dyn EventSourceLookup>) -> Self {
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        Self {
            stream,
            sources,
            custom: None,
            table: SubscriptionTable::new(),
            next_generation: 0,
            ended_tx,
            ended_rx,
        }
    }

    /// Forward unknown verbs to `handler` (after the error frame).
    #[must_use]
    pub fn with_custom_handler(mut self, handler: Arc<dyn CustomCommandHandler>) -> Self {
        self.custom = Some(handler);
        self
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.table.len()
    }

    /// Whether `key` has a live subscription.
    pub fn is_subscribed(&self, key: &CommandKey) -> bool {
        self.table.contains(key)
    }

    /// Process inbound frames until the stream closes or `inbound` ends,
    /// then cancel every subscription.
    #[instrument(skip_all, fields(stream_id = %self.stream.id()))]
    pub async fn run(mut self, mut inbound: mpsc::Receiver<String>) {
        let closed = self.stream.closed();
        loop {
            tokio::select! {
                biased;
                () = closed.cancelled() => break,
                Some(ended) = self.ended_rx.recv() => self.reap(&ended),
                text = inbound.recv() => match text {
                    Some(text) => self.handle_text(&text),
                    None => break,
                },
            }
        }
        self.cancel_all();
    }

    /// Apply one inbound text frame.
    pub fn handle_text(&mut self, text: &str) {
        match Command::parse(text) {
            Err(err) => send_error(self.stream.as_ref(), &err.to_string(), err.key()),
            Ok(Command::Subscribe(key)) => self.subscribe(key),
            Ok(Command::Unsubscribe(key)) => self.unsubscribe(&key),
            Ok(Command::Unknown { verb, key }) => {
                send_error(self.stream.as_ref(), UNKNOWN_COMMAND_TYPE, &verb);
                if let Some(handler) = &self.custom {
                    handler.handle(&self.stream, &verb, &key);
                }
            }
        }
    }

    /// Drop every pending termination report, removing ended entries.
    pub fn reap_ended(&mut self) {
        while let Ok(ended) = self.ended_rx.try_recv() {
            self.reap(&ended);
        }
    }

    /// Cancel and forget every subscription. Idempotent.
    pub fn cancel_all(&mut self) {
        let entries = self.table.drain();
        if !entries.is_empty() {
            debug!(stream_id = %self.stream.id(), count = entries.len(), "cancelling subscriptions");
        }
        for (_, active) in entries {
            active.handle.cancel();
        }
    }

    fn subscribe(&mut self, key: CommandKey) {
        let events = match self.sources.open(&key.event_type, &key.args) {
            Ok(events) => events,
            Err(OpenError::UnknownEventType(_)) => {
                send_error(self.stream.as_ref(), INVALID_EVENT_TYPE, &key.event_type);
                return;
            }
            Err(OpenError::Source(err)) => {
                send_error(self.stream.as_ref(), &err.message, &key.to_string());
                return;
            }
        };

        if let Some(previous) = self.table.remove(&key) {
            previous.handle.cancel();
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let observer = CommandObserver {
            stream: Arc::clone(&self.stream),
            key: key.clone(),
            generation,
            ended: self.ended_tx.clone(),
        };
        debug!(stream_id = %self.stream.id(), key = %key, "subscribed");
        let handle = push::subscribe(events, observer);
        let _ = self
            .table
            .insert(key, ActiveSubscription { generation, handle });
    }

    fn unsubscribe(&mut self, key: &CommandKey) {
        if let Some(active) = self.table.remove(key) {
            debug!(stream_id = %self.stream.id(), key = %key, "unsubscribed");
            active.handle.cancel();
        }
    }

    fn reap(&mut self, ended: &Ended) {
        let current = self
            .table
            .get(&ended.key)
            .is_some_and(|active| active.generation == ended.generation);
        if current {
            let _ = self.table.remove(&ended.key);
        }
    }
}

impl Drop for CommandSession {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Send an error frame, closing the stream if the frame cannot be built.
fn send_error(stream: &dyn MessageStream, message: &str, key: &str) {
    match frames::error(message, key) {
        Ok(frame) => {
            let _ = stream.send(frame);
        }
        Err(err) => {
            warn!(stream_id = %stream.id(), error = %err, "failed to encode error frame, closing stream");
            stream.close(close_code::INTERNAL_ERROR, "failed to encode error frame");
        }
    }
}

struct CommandObserver {
    stream: Arc<dyn MessageStream>,
    key: CommandKey,
    generation: u64,
    ended: mpsc::UnboundedSender<Ended>,
}

impl CommandObserver {
    fn report_ended(&self) {
        let _ = self.ended.send(Ended {
            key: self.key.clone(),
            generation: self.generation,
        });
    }
}

#[async_trait]
impl Observer for CommandObserver {
    async fn on_next(&self, value: Value) -> ControlFlow<()> {
        match frames::data(&self.key.event_type, value) {
            Ok(frame) => {
                if self.stream.send(frame) {
                    ControlFlow::Continue(())
                } else {
                    debug!(stream_id = %self.stream.id(), key = %self.key, "stream refused value, stopping");
                    self.report_ended();
                    ControlFlow::Break(())
                }
            }
            Err(err) => {
                warn!(key = %self.key, error = %err, "dropping unencodable value");
                ControlFlow::Continue(())
            }
        }
    }

    async fn on_error(&self, error: SourceError) {
        debug!(stream_id = %self.stream.id(), key = %self.key, error = %error, "subscription failed");
        send_error(self.stream.as_ref(), &error.message, &self.key.to_string());
        self.report_ended();
    }

    async fn on_complete(&self) {
        self.report_ended();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

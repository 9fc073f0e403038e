//! Topic-mode dispatcher.
//!
//! Streams subscribe to topic patterns with JSON envelopes; the application
//! publishes with [`TopicDispatcher::dispatch`]. Every registered stream
//! whose table holds a matching pattern receives the envelope once.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use relay_core::{
    EnvelopeError, EnvelopeType, MessageEnvelope, MessageStream, StreamId, close_code,
};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::table::SubscriptionTable;
use crate::topic::{self, TopicError};

/// A subscribe refused by [`TopicHooks::on_subscribed`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SubscribeRejected(pub String);

/// Failure to publish.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The outbound topic is not a valid topic.
    #[error(transparent)]
    Topic(#[from] TopicError),
    /// The envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Application callbacks for topic-mode subscriptions.
///
/// All methods default to no-ops. Hooks run on the subscribing stream's
/// task, outside any dispatcher lock.
#[async_trait]
pub trait TopicHooks: Send + Sync {
    /// First subscribe to `topic` on `stream`. Returned envelopes are sent
    /// after the subscription is recorded; an error rejects it.
    async fn on_subscribed(
        &self,
        _stream: &StreamId,
        _topic: &str,
    ) -> Result<Vec<MessageEnvelope>, SubscribeRejected> {
        Ok(Vec::new())
    }

    /// Repeat subscribe to a pattern the stream already holds.
    async fn on_resubscribed(&self, _stream: &StreamId, _topic: &str) -> Vec<MessageEnvelope> {
        Vec::new()
    }

    /// A recorded pattern was removed by an unsubscribe envelope.
    async fn on_unsubscribed(&self, _stream: &StreamId, _topic: &str) {}

    /// A publish or unpublish envelope arrived from a stream.
    async fn on_message(&self, _stream: &StreamId, _envelope: MessageEnvelope) {}
}

/// Hooks that accept everything and do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHooks;

impl TopicHooks for NoopHooks {}

/// Dispatcher options.
#[derive(Clone, Debug, Default)]
pub struct TopicDispatcherConfig {
    /// Send a `subscribeAck` envelope after recording a subscribe.
    pub subscribe_ack: bool,
}

struct TopicStream {
    stream: Arc<dyn MessageStream>,
    patterns: SubscriptionTable<String, Vec<String>>,
}

/// Routes published envelopes to subscribed streams.
pub struct TopicDispatcher {
    streams: DashMap<StreamId, TopicStream>,
    hooks: Arc<dyn TopicHooks>,
    config: TopicDispatcherConfig,
}

impl TopicDispatcher {
    /// Create a dispatcher with `hooks`.
    pub fn new(hooks: Arc<dyn TopicHooks>, config: TopicDispatcherConfig) -> Self {
        Self {
            streams: DashMap::new(),
            hooks,
            config,
        }
    }

    /// Register a stream with an empty table.
    pub fn attach(&self, stream: Arc<dyn MessageStream>) {
        let id = stream.id().clone();
        debug!(stream_id = %id, "topic stream attached");
        let _ = self.streams.insert(
            id,
            TopicStream {
                stream,
                patterns: SubscriptionTable::new(),
            },
        );
    }

    /// Forget a stream and its patterns without calling unsubscribe hooks.
    pub fn detach(&self, id: &StreamId) -> bool {
        let removed = self.streams.remove(id);
        if let Some((_, entry)) = &removed {
            debug!(stream_id = %id, patterns = entry.patterns.len(), "topic stream detached");
        }
        removed.is_some()
    }

    /// Number of attached streams.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Patterns held by `id`, in subscription order.
    pub fn subscriptions(&self, id: &StreamId) -> Vec<String> {
        self.streams
            .get(id)
            .map(|entry| entry.patterns.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Attach `stream`, apply inbound frames until it closes or `inbound`
    /// ends, then detach.
    #[instrument(skip_all, fields(stream_id = %stream.id()))]
    pub async fn serve(&self, stream: Arc<dyn MessageStream>, mut inbound: mpsc::Receiver<String>) {
        let id = stream.id().clone();
        let closed = stream.closed();
        self.attach(stream);
        loop {
            tokio::select! {
                biased;
                () = closed.cancelled() => break,
                text = inbound.recv() => match text {
                    Some(text) => self.handle_text(&id, &text).await,
                    None => break,
                },
            }
        }
        let _ = self.detach(&id);
    }

    /// Apply one inbound envelope from stream `id`.
    pub async fn handle_text(&self, id: &StreamId, text: &str) {
        let envelope = match MessageEnvelope::parse(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(stream_id = %id, error = %err, "dropping malformed envelope");
                return;
            }
        };
        match envelope.kind() {
            EnvelopeType::Subscribe => self.subscribe(id, envelope.topic).await,
            EnvelopeType::Unsubscribe => self.unsubscribe(id, &envelope.topic).await,
            EnvelopeType::Publish | EnvelopeType::Unpublish => {
                self.hooks.on_message(id, envelope).await;
            }
            EnvelopeType::SubscribeAck => {
                debug!(stream_id = %id, "ignoring subscribeAck from stream");
            }
        }
    }

    /// Deliver `envelope` to every stream holding a matching pattern.
    ///
    /// Each stream receives it at most once. Returns the number of streams
    /// that accepted the frame.
    pub fn dispatch(&self, envelope: &MessageEnvelope) -> Result<usize, DispatchError> {
        let tokens = topic::tokenize(&envelope.topic)?;
        let frame = envelope.to_json()?;

        let targets: Vec<Arc<dyn MessageStream>> = self
            .streams
            .iter()
            .filter(|entry| {
                entry
                    .patterns
                    .iter()
                    .any(|(_, pattern)| topic::compare(&tokens, pattern))
            })
            .map(|entry| Arc::clone(&entry.stream))
            .collect();

        let delivered = targets
            .iter()
            .filter(|stream| stream.send(frame.clone()))
            .count();
        debug!(topic = %envelope.topic, matched = targets.len(), delivered, "dispatched");
        Ok(delivered)
    }

    /// Publish `data` on `topic`.
    pub fn publish(&self, topic: &str, data: Value) -> Result<usize, DispatchError> {
        self.dispatch(&MessageEnvelope::publish(topic, data))
    }

    /// Publish an error on `topic`.
    pub fn publish_error(&self, topic: &str, error: EnvelopeError) -> Result<usize, DispatchError> {
        self.dispatch(&MessageEnvelope::error(topic, error))
    }

    /// Retract data on `topic`.
    pub fn unpublish(&self, topic: &str) -> Result<usize, DispatchError> {
        self.dispatch(&MessageEnvelope::unpublish(topic))
    }

    async fn subscribe(&self, id: &StreamId, topic: String) {
        let Some(stream) = self.stream(id) else {
            return;
        };

        let tokens = match topic::tokenize(&topic) {
            Ok(tokens) => tokens,
            Err(err) => {
                send_envelope(
                    stream.as_ref(),
                    &MessageEnvelope::error(topic, EnvelopeError::bad_request(err.to_string())),
                );
                return;
            }
        };

        let already = self
            .streams
            .get(id)
            .is_some_and(|entry| entry.patterns.contains(&topic));
        if already {
            for envelope in self.hooks.on_resubscribed(id, &topic).await {
                send_envelope(stream.as_ref(), &envelope);
            }
            return;
        }

        let initial = match self.hooks.on_subscribed(id, &topic).await {
            Ok(initial) => initial,
            Err(rejected) => {
                debug!(stream_id = %id, topic = %topic, reason = %rejected, "subscribe rejected");
                send_envelope(
                    stream.as_ref(),
                    &MessageEnvelope::error(topic, EnvelopeError::bad_request(rejected.0)),
                );
                return;
            }
        };

        let recorded = match self.streams.get_mut(id) {
            Some(mut entry) => {
                let _ = entry.patterns.insert(topic.clone(), tokens);
                true
            }
            None => false,
        };
        if !recorded {
            return;
        }
        debug!(stream_id = %id, topic = %topic, "topic subscribed");

        if self.config.subscribe_ack {
            send_envelope(stream.as_ref(), &MessageEnvelope::subscribe_ack(topic));
        }
        for envelope in initial {
            send_envelope(stream.as_ref(), &envelope);
        }
    }

    async fn unsubscribe(&self, id: &StreamId, topic: &str) {
        let removed = self
            .streams
            .get_mut(id)
            .and_then(|mut entry| entry.patterns.remove(&topic.to_owned()))
            .is_some();
        if removed {
            debug!(stream_id = %id, topic, "topic unsubscribed");
            self.hooks.on_unsubscribed(id, topic).await;
        }
    }

    fn stream(&self, id: &StreamId) -> Option<Arc<dyn MessageStream>> {
        self.streams.get(id).map(|entry| Arc::clone(&entry.stream))
    }
}

fn send_envelope(stream: &dyn MessageStream, envelope: &MessageEnvelope) {
    match envelope.to_json() {
        Ok(frame) => {
            let _ = stream.send(frame);
        }
        Err(err) => {
            warn!(stream_id = %stream.id(), error = %err, "failed to encode envelope, closing stream");
            stream.close(close_code::INTERNAL_ERROR, "failed to encode envelope");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use parking_lot::Mutex;
    use relay_core::{ChannelStream, Outbound, OutboundQueue};
    use serde_json::json;

    fn envelopes(queue: &mut OutboundQueue) -> Vec<Value> {
        let mut out = Vec::new();
        while let Some(item) = queue.try_recv() {
            if let Outbound::Text(text) = item {
                out.push(serde_json::from_str(&text).unwrap());
            }
        }
        out
    }

    fn attached(
        dispatcher: &TopicDispatcher,
        id: &str,
    ) -> (Arc<ChannelStream>, OutboundQueue, StreamId) {
        let (stream, queue) = ChannelStream::new(StreamId::from(id), 1 << 20);
        dispatcher.attach(stream.clone());
        (stream, queue, StreamId::from(id))
    }

    fn dispatcher() -> TopicDispatcher {
        TopicDispatcher::new(Arc::new(NoopHooks), TopicDispatcherConfig::default())
    }

    async fn subscribe(dispatcher: &TopicDispatcher, id: &StreamId, topic: &str) {
        let text = MessageEnvelope::subscribe(topic).to_json().unwrap();
        dispatcher.handle_text(id, &text).await;
    }

    #[tokio::test]
    async fn dispatch_reaches_matching_streams_once() {
        let dispatcher = dispatcher();
        let (_a, mut queue_a, id_a) = attached(&dispatcher, "a");
        let (_b, mut queue_b, id_b) = attached(&dispatcher, "b");

        subscribe(&dispatcher, &id_a, "sensors/#").await;
        subscribe(&dispatcher, &id_a, "sensors/+/temp").await;
        subscribe(&dispatcher, &id_b, "other/#").await;

        let delivered = dispatcher.publish("sensors/kitchen/temp", json!(21)).unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(
            envelopes(&mut queue_a),
            vec![json!({"type": "publish", "topic": "sensors/kitchen/temp", "data": 21})]
        );
        assert!(envelopes(&mut queue_b).is_empty());
    }

    #[tokio::test]
    async fn invalid_subscribe_topic_echoes_error() {
        let dispatcher = dispatcher();
        let (_s, mut queue, id) = attached(&dispatcher, "s");
        subscribe(&dispatcher, &id, "/leading").await;

        assert_eq!(
            envelopes(&mut queue),
            vec![json!({
                "type": "publish",
                "topic": "/leading",
                "error": {"code": 400, "desc": "Topic must not start with '/'"}
            })]
        );
        assert!(dispatcher.subscriptions(&id).is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery_and_unknown_is_silent() {
        let dispatcher = dispatcher();
        let (_s, mut queue, id) = attached(&dispatcher, "s");
        subscribe(&dispatcher, &id, "a/b").await;
        let unsub = MessageEnvelope::unsubscribe("a/b").to_json().unwrap();
        dispatcher.handle_text(&id, &unsub).await;
        let unknown = MessageEnvelope::unsubscribe("x/y").to_json().unwrap();
        dispatcher.handle_text(&id, &unknown).await;

        assert_eq!(dispatcher.publish("a/b", json!(1)).unwrap(), 0);
        assert!(envelopes(&mut queue).is_empty());
    }

    #[tokio::test]
    async fn dispatch_rejects_invalid_topic() {
        let dispatcher = dispatcher();
        assert!(matches!(
            dispatcher.publish("", json!(null)),
            Err(DispatchError::Topic(TopicError::Empty))
        ));
    }

    #[tokio::test]
    async fn error_and_unpublish_are_routed() {
        let dispatcher = dispatcher();
        let (_s, mut queue, id) = attached(&dispatcher, "s");
        subscribe(&dispatcher, &id, "feed/+").await;

        let _ = dispatcher
            .publish_error("feed/x", EnvelopeError::new(503, "upstream unavailable"))
            .unwrap();
        let _ = dispatcher.unpublish("feed/x").unwrap();
        assert_eq!(
            envelopes(&mut queue),
            vec![
                json!({"type": "publish", "topic": "feed/x", "error": {"code": 503, "desc": "upstream unavailable"}}),
                json!({"type": "unpublish", "topic": "feed/x"}),
            ]
        );
    }

    #[tokio::test]
    async fn malformed_envelope_is_dropped() {
        let dispatcher = dispatcher();
        let (_s, mut queue, id) = attached(&dispatcher, "s");
        dispatcher.handle_text(&id, "not json").await;
        assert!(envelopes(&mut queue).is_empty());
    }

    #[tokio::test]
    async fn detach_discards_without_hooks() {
        let hooks = Arc::new(RecordingHooks::default());
        let dispatcher = TopicDispatcher::new(hooks.clone(), TopicDispatcherConfig::default());
        let (_s, _queue, id) = attached(&dispatcher, "s");
        subscribe(&dispatcher, &id, "a/#").await;

        assert!(dispatcher.detach(&id));
        assert!(!dispatcher.detach(&id));
        assert_eq!(dispatcher.stream_count(), 0);
        assert_eq!(dispatcher.publish("a/b", json!(1)).unwrap(), 0);
        assert_eq!(*hooks.calls.lock(), vec!["subscribed a/#".to_owned()]);
    }

    #[derive(Default)]
    struct RecordingHooks {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TopicHooks for RecordingHooks {
        async fn on_subscribed(
            &self,
            _stream: &StreamId,
            topic: &str,
        ) -> Result<Vec<MessageEnvelope>, SubscribeRejected> {
            self.calls.lock().push(format!("subscribed {topic}"));
            if topic.starts_with("private") {
                return Err(SubscribeRejected("Forbidden topic".into()));
            }
            Ok(vec![MessageEnvelope::publish(topic, json!("snapshot"))])
        }

        async fn on_resubscribed(&self, _stream: &StreamId, topic: &str) -> Vec<MessageEnvelope> {
            self.calls.lock().push(format!("resubscribed {topic}"));
            vec![MessageEnvelope::publish(topic, json!("sync"))]
        }

        async fn on_unsubscribed(&self, _stream: &StreamId, topic: &str) {
            self.calls.lock().push(format!("unsubscribed {topic}"));
        }

        async fn on_message(&self, _stream: &StreamId, envelope: MessageEnvelope) {
            self.calls.lock().push(format!("message {}", envelope.topic));
        }
    }

    #[tokio::test]
    async fn hooks_drive_initial_and_sync_messages() {
        let hooks = Arc::new(RecordingHooks::default());
        let dispatcher = TopicDispatcher::new(hooks.clone(), TopicDispatcherConfig::default());
        let (_s, mut queue, id) = attached(&dispatcher, "s");

        subscribe(&dispatcher, &id, "prices/eu").await;
        subscribe(&dispatcher, &id, "prices/eu").await;
        let unsub = MessageEnvelope::unsubscribe("prices/eu").to_json().unwrap();
        dispatcher.handle_text(&id, &unsub).await;
        dispatcher
            .handle_text(&id, r#"{"topic": "prices/us", "data": 3}"#)
            .await;

        assert_eq!(
            *hooks.calls.lock(),
            vec![
                "subscribed prices/eu",
                "resubscribed prices/eu",
                "unsubscribed prices/eu",
                "message prices/us",
            ]
        );
        let data: Vec<Value> = envelopes(&mut queue)
            .into_iter()
            .map(|e| e["data"].clone())
            .collect();
        assert_eq!(data, vec![json!("snapshot"), json!("sync")]);
    }

    #[tokio::test]
    async fn rejected_subscribe_is_not_recorded() {
        let hooks = Arc::new(RecordingHooks::default());
        let dispatcher = TopicDispatcher::new(hooks, TopicDispatcherConfig::default());
        let (_s, mut queue, id) = attached(&dispatcher, "s");
        subscribe(&dispatcher, &id, "private/keys").await;

        assert!(dispatcher.subscriptions(&id).is_empty());
        assert_eq!(
            envelopes(&mut queue),
            vec![json!({
                "type": "publish",
                "topic": "private/keys",
                "error": {"code": 400, "desc": "Forbidden topic"}
            })]
        );
    }

    #[tokio::test]
    async fn subscribe_ack_when_enabled() {
        let dispatcher = TopicDispatcher::new(
            Arc::new(NoopHooks),
            TopicDispatcherConfig {
                subscribe_ack: true,
            },
        );
        let (_s, mut queue, id) = attached(&dispatcher, "s");
        subscribe(&dispatcher, &id, "a/b").await;
        assert_eq!(
            envelopes(&mut queue),
            vec![json!({"type": "subscribeAck", "topic": "a/b"})]
        );
    }

    #[tokio::test]
    async fn serve_detaches_on_close() {
        let dispatcher = Arc::new(dispatcher());
        let (stream, _queue) = ChannelStream::new(StreamId::from("live"), 1 << 20);
        let (tx, rx) = mpsc::channel(8);
        let task = {
            let dispatcher = Arc::clone(&dispatcher);
            let stream = stream.clone();
            tokio::spawn(async move { dispatcher.serve(stream, rx).await })
        };

        tx.send(MessageEnvelope::subscribe("a/#").to_json().unwrap())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(dispatcher.subscriptions(&StreamId::from("live")), vec!["a/#"]);

        stream.close(close_code::NORMAL, "done");
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(dispatcher.stream_count(), 0);
    }
}

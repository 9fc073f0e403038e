//! The built-in `clock` source.
//!
//! Command-mode clients subscribe with `sub:clock` or `sub:clock:<ms>`.
//! [`publish_ticks`] feeds the same ticks to topic subscribers on
//! [`CLOCK_TOPIC`] and to registered webhooks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use relay_core::{EventSourceRegistry, EventStream, SourceError};
use relay_pubsub::TopicDispatcher;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Event type name.
pub const CLOCK: &str = "clock";
/// Topic the publisher writes to.
pub const CLOCK_TOPIC: &str = "clock/tick";

/// Tick payload.
pub fn tick(seq: u64) -> Value {
    json!({ "seq": seq, "now": Utc::now().to_rfc3339() })
}

/// Source service for the `clock` event type.
#[derive(Clone, Copy, Debug)]
pub struct Clock {
    default_interval: Duration,
}

impl Clock {
    /// Clock ticking every `default_interval` unless a subscriber asks
    /// for another period.
    pub fn new(default_interval: Duration) -> Self {
        Self { default_interval }
    }

    /// Open a tick stream. `args[0]`, if present, is the period in ms.
    pub fn ticks(&self, args: &[String]) -> Result<EventStream, SourceError> {
        let period = match args.first() {
            None => self.default_interval,
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .ok_or_else(|| SourceError::new(format!("invalid clock interval: {raw}")))?,
        };
        let ticks = IntervalStream::new(tokio::time::interval_at(Instant::now() + period, period));
        let mut seq = 0;
        Ok(ticks
            .map(move |_| {
                seq += 1;
                Ok(tick(seq))
            })
            .boxed())
    }
}

/// Registry exposing `clock`.
pub fn registry(clock: Clock) -> EventSourceRegistry<Clock> {
    EventSourceRegistry::new(Arc::new(clock)).with(CLOCK, Clock::ticks)
}

/// Publish a tick to [`CLOCK_TOPIC`] and `events` every `period` until
/// `cancel` fires.
pub async fn publish_ticks(
    dispatcher: Arc<TopicDispatcher>,
    events: broadcast::Sender<Value>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut seq = 0;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {
                seq += 1;
                let value = tick(seq);
                match dispatcher.publish(CLOCK_TOPIC, value.clone()) {
                    Ok(delivered) => debug!(seq, delivered, "clock tick"),
                    Err(err) => warn!(error = %err, "clock publish failed"),
                }
                let _ = events.send(value);
            }
        }
    }
}

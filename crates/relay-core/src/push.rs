//! Push subscriptions: a single producer stream drained into an observer.
//!
//! [`subscribe`] spawns one task per subscription. The returned
//! [`PushSubscription`] is the only way to stop it; cancelling is idempotent
//! and no `on_next` starts after cancellation has been observed.

use std::ops::ControlFlow;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::SourceError;

/// Values produced by an event source.
pub type EventStream = BoxStream<'static, Result<Value, SourceError>>;

/// Receives the values of one push subscription, in source order.
#[async_trait]
pub trait Observer: Send + Sync + 'static {
    /// Next value. Returning `Break` ends the subscription without
    /// calling `on_complete`.
    async fn on_next(&self, value: Value) -> ControlFlow<()>;

    /// The source failed. Terminal.
    async fn on_error(&self, _error: SourceError) {}

    /// The source finished. Terminal.
    async fn on_complete(&self) {}
}

/// Handle to a running push subscription. Dropping it cancels.
#[derive(Debug)]
pub struct PushSubscription {
    token: CancellationToken,
}

impl PushSubscription {
    /// Stop delivery. Safe to call more than once.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether `cancel` has been called (or the handle dropped).
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Drain `source` into `observer` on a new task.
///
/// Must be called from within a tokio runtime.
pub fn subscribe(source: EventStream, observer: impl Observer) -> PushSubscription {
    let token = CancellationToken::new();
    let cancelled = token.clone();

    let _ = tokio::spawn(async move {
        let mut source = source;
        loop {
            let item = tokio::select! {
                biased;
                () = cancelled.cancelled() => return,
                item = source.next() => item,
            };
            if cancelled.is_cancelled() {
                return;
            }
            match item {
                Some(Ok(value)) => {
                    if observer.on_next(value).await.is_break() {
                        return;
                    }
                }
                Some(Err(error)) => {
                    observer.on_error(error).await;
                    return;
                }
                None => {
                    observer.on_complete().await;
                    return;
                }
            }
        }
    });

    PushSubscription { token }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[derive(Debug, PartialEq)]
    enum Seen {
        Next(Value),
        Error(String),
        Complete,
    }

    #[derive(Clone, Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<Seen>>>,
        stop_after: Option<usize>,
    }

    #[async_trait]
    impl Observer for Recorder {
        async fn on_next(&self, value: Value) -> ControlFlow<()> {
            let mut seen = self.seen.lock();
            seen.push(Seen::Next(value));
            match self.stop_after {
                Some(n) if seen.len() >= n => ControlFlow::Break(()),
                _ => ControlFlow::Continue(()),
            }
        }

        async fn on_error(&self, error: SourceError) {
            self.seen.lock().push(Seen::Error(error.message));
        }

        async fn on_complete(&self) {
            self.seen.lock().push(Seen::Complete);
        }
    }

    fn channel_source() -> (mpsc::UnboundedSender<Result<Value, SourceError>>, EventStream) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let stream = async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        };
        (tx, Box::pin(stream))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn delivers_in_order_then_completes() {
        let recorder = Recorder::default();
        let source = futures::stream::iter(vec![Ok(json!(1)), Ok(json!(2)), Ok(json!(3))]).boxed();
        let _sub = subscribe(source, recorder.clone());
        settle().await;
        assert_eq!(
            *recorder.seen.lock(),
            vec![
                Seen::Next(json!(1)),
                Seen::Next(json!(2)),
                Seen::Next(json!(3)),
                Seen::Complete
            ]
        );
    }

    #[tokio::test]
    async fn error_is_terminal() {
        let recorder = Recorder::default();
        let source = futures::stream::iter(vec![
            Ok(json!("a")),
            Err(SourceError::new("boom")),
            Ok(json!("never")),
        ])
        .boxed();
        let _sub = subscribe(source, recorder.clone());
        settle().await;
        assert_eq!(
            *recorder.seen.lock(),
            vec![Seen::Next(json!("a")), Seen::Error("boom".into())]
        );
    }

    #[tokio::test]
    async fn nothing_delivered_after_cancel() {
        let recorder = Recorder::default();
        let (tx, source) = channel_source();
        let sub = subscribe(source, recorder.clone());

        tx.send(Ok(json!(1))).unwrap();
        settle().await;
        sub.cancel();
        sub.cancel();
        assert!(sub.is_cancelled());
        let _ = tx.send(Ok(json!(2)));
        settle().await;

        assert_eq!(*recorder.seen.lock(), vec![Seen::Next(json!(1))]);
    }

    #[tokio::test]
    async fn drop_cancels() {
        let recorder = Recorder::default();
        let (tx, source) = channel_source();
        drop(subscribe(source, recorder.clone()));
        let _ = tx.send(Ok(json!(1)));
        settle().await;
        assert!(recorder.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn break_stops_without_complete() {
        let recorder = Recorder {
            stop_after: Some(1),
            ..Recorder::default()
        };
        let source = futures::stream::iter(vec![Ok(json!(1)), Ok(json!(2))]).boxed();
        let _sub = subscribe(source, recorder.clone());
        settle().await;
        assert_eq!(*recorder.seen.lock(), vec![Seen::Next(json!(1))]);
    }
}

//! Observable connection state.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use relay_core::ConnectionState;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

const CHANGE_CAPACITY: usize = 64;

/// Current state plus a broadcast of every transition.
///
/// Setting the state it already holds is a no-op, so observers never see
/// the same state twice in a row. An observer that falls behind skips the
/// backlog and resumes from the current state.
#[derive(Debug)]
pub struct StateTracker {
    current: Arc<Mutex<ConnectionState>>,
    changes: broadcast::Sender<ConnectionState>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    /// Tracker starting at `Disconnected`.
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            current: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            changes,
        }
    }

    /// Current state.
    pub fn get(&self) -> ConnectionState {
        *self.current.lock()
    }

    /// Move to `state`. Returns `false` if already there.
    pub fn set(&self, state: ConnectionState) -> bool {
        let mut current = self.current.lock();
        if *current == state {
            return false;
        }
        let previous = std::mem::replace(&mut *current, state);
        debug!(from = %previous, to = %state, "connection state");
        let _ = self.changes.send(state);
        true
    }

    /// The current state followed by every later transition.
    pub fn stream(&self) -> BoxStream<'static, ConnectionState> {
        let (first, rx) = snapshot(&self.current, &self.changes);
        let current = Arc::clone(&self.current);
        let changes = self.changes.clone();

        let later = futures::stream::unfold((rx, first), move |(mut rx, mut last)| {
            let current = Arc::clone(&current);
            let changes = changes.clone();
            async move {
                loop {
                    let received = rx.recv().await;
                    let next = match received {
                        Ok(state) => state,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "state observer lagged, resuming from current state");
                            let (state, fresh) = snapshot(&current, &changes);
                            rx = fresh;
                            state
                        }
                        Err(RecvError::Closed) => return None,
                    };
                    if next != last {
                        last = next;
                        return Some((next, (rx, last)));
                    }
                }
            }
        });
        futures::stream::once(async move { first })
            .chain(later)
            .boxed()
    }

    /// Resolve once the state equals `target` (immediately if it already does).
    pub async fn wait_for(&self, target: ConnectionState) {
        let mut states = self.stream();
        while let Some(state) = states.next().await {
            if state == target {
                return;
            }
        }
    }
}

/// Read the current state and subscribe under one lock, so the receiver
/// starts exactly after it.
fn snapshot(
    current: &Mutex<ConnectionState>,
    changes: &broadcast::Sender<ConnectionState>,
) -> (ConnectionState, broadcast::Receiver<ConnectionState>) {
    let current = current.lock();
    (*current, changes.subscribe())
}

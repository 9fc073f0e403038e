//! Server-side liveness: protocol pings and a missed-tick counter.

/// Outcome of one heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// Peer answered (or is within tolerance); send the next ping.
    Ping,
    /// Too many consecutive silent ticks.
    TimedOut,
}

/// Counts consecutive ticks on which the peer was silent.
///
/// Any inbound frame marks the stream alive. A tick that finds it alive
/// resets the count; `max_missed` silent ticks in a row time it out.
#[derive(Debug, Clone)]
pub struct HeartbeatTracker {
    max_missed: u32,
    missed: u32,
}

impl HeartbeatTracker {
    /// Tracker tolerating `max_missed` silent ticks (at least one).
    pub fn new(max_missed: u32) -> Self {
        Self {
            max_missed: max_missed.max(1),
            missed: 0,
        }
    }

    /// Record a tick; `alive` is whether the peer spoke since the last one.
    pub fn on_tick(&mut self, alive: bool) -> HeartbeatResult {
        if alive {
            self.missed = 0;
            return HeartbeatResult::Ping;
        }
        self.missed += 1;
        if self.missed >= self.max_missed {
            HeartbeatResult::TimedOut
        } else {
            HeartbeatResult::Ping
        }
    }

    /// Consecutive silent ticks so far.
    pub fn missed(&self) -> u32 {
        self.missed
    }
}

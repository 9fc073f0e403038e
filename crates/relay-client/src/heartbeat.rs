//! Client-side liveness tracking.
//!
//! The manager ticks a [`HeartbeatMonitor`] every interval. A tick either
//! asks for another `"ping"` or reports that the first unanswered probe is
//! at least two intervals old.

use std::time::Duration;

use tokio::time::Instant;

/// What to do on a heartbeat tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Probe {
    /// Send `"ping"`.
    SendPing,
    /// No pong within two intervals of the first unanswered ping.
    TimedOut,
}

/// Tracks the oldest unanswered probe.
#[derive(Clone, Debug)]
pub struct HeartbeatMonitor {
    interval: Duration,
    outstanding_since: Option<Instant>,
}

impl HeartbeatMonitor {
    /// Monitor for probes sent every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            outstanding_since: None,
        }
    }

    /// Probe interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Window after which an unanswered probe is fatal.
    pub fn timeout(&self) -> Duration {
        self.interval * 2
    }

    /// Advance on a tick at `now`.
    pub fn on_tick(&mut self, now: Instant) -> Probe {
        match self.outstanding_since {
            Some(since) if now.saturating_duration_since(since) >= self.timeout() => Probe::TimedOut,
            Some(_) => Probe::SendPing,
            None => {
                self.outstanding_since = Some(now);
                Probe::SendPing
            }
        }
    }

    /// A pong arrived.
    pub fn on_pong(&mut self) {
        self.outstanding_since = None;
    }

    /// Whether a probe is awaiting its pong.
    pub fn is_waiting(&self) -> bool {
        self.outstanding_since.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: Duration = Duration::from_millis(100);

    #[test]
    fn pong_keeps_it_alive() {
        let mut hb = HeartbeatMonitor::new(P);
        let t0 = Instant::now();
        for i in 0..10 {
            assert_eq!(hb.on_tick(t0 + P * i), Probe::SendPing);
            hb.on_pong();
        }
        assert!(!hb.is_waiting());
    }

    #[test]
    fn times_out_two_intervals_after_first_probe() {
        let mut hb = HeartbeatMonitor::new(P);
        let t0 = Instant::now();
        assert_eq!(hb.on_tick(t0), Probe::SendPing);
        assert_eq!(hb.on_tick(t0 + P), Probe::SendPing);
        assert_eq!(hb.on_tick(t0 + P * 2), Probe::TimedOut);
    }

    #[test]
    fn late_pong_resets_window() {
        let mut hb = HeartbeatMonitor::new(P);
        let t0 = Instant::now();
        let _ = hb.on_tick(t0);
        let _ = hb.on_tick(t0 + P);
        hb.on_pong();
        assert_eq!(hb.on_tick(t0 + P * 2), Probe::SendPing);
        assert_eq!(hb.on_tick(t0 + P * 3), Probe::SendPing);
        assert_eq!(hb.on_tick(t0 + P * 4), Probe::TimedOut);
    }

    #[test]
    fn timeout_is_twice_interval() {
        assert_eq!(HeartbeatMonitor::new(P).timeout(), Duration::from_millis(200));
        assert_eq!(HeartbeatMonitor::new(P).interval(), P);
    }
}

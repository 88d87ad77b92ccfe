//! Transport liveness tracking
//!
//! Tracks a single boolean liveness signal from connect/disconnect
//! observations plus packet arrival times. The monitor never replays
//! missed events (none are queued server-side); the network loop reacts
//! to a reconnect by re-fetching the full task list.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct ConnectionMonitor {
    connected: bool,
    last_seen: Instant,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self {
            connected: false,
            last_seen: Instant::now(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Records a (re)established connection. Returns true when this is a
    /// transition from disconnected, which is the caller's cue to resync.
    pub fn mark_connected(&mut self) -> bool {
        let was_down = !self.connected;
        self.connected = true;
        self.last_seen = Instant::now();
        was_down
    }

    pub fn mark_disconnected(&mut self) {
        self.connected = false;
    }

    /// Records traffic from the server without changing the liveness state.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// True when the server has been silent past `timeout` while we
    /// believed the connection was up.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.connected && self.last_seen.elapsed() > timeout
    }
}

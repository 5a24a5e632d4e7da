//! Idle-only heartbeat bookkeeping.
//!
//! The remote reads its stdin between commands, so a probe only means
//! something when nothing else is in flight: a `NOOP` that goes unanswered
//! while the channel is otherwise idle is the signature of a stalled
//! process. The timer itself lives in the session loop; this type owns the
//! gating decision so the invariant stays testable without I/O.

use std::time::Duration;

/// Default probe period.
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_millis(100);

/// Tracks whether a heartbeat round-trip is currently outstanding.
#[derive(Debug, Default)]
pub struct Heartbeat {
    in_flight: bool,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when a probe should be written: no commands pending and no
    /// probe already awaiting its ack.
    pub fn should_emit(&self, pending_commands: usize) -> bool {
        pending_commands == 0 && !self.in_flight
    }

    /// Record that a probe was written.
    pub fn mark_emitted(&mut self) {
        self.in_flight = true;
    }

    /// Record the ack. Valid in any state; an unsolicited ack just clears.
    pub fn acknowledge(&mut self) {
        self.in_flight = false;
    }
}

//! Time sources for record timestamps
//!
//! A node that could not sync its clock still reports, but sinks must know
//! the timestamp is relative to boot rather than the epoch:
//! - System clock (hosts, or boards after NTP)
//! - Fixed time (tests and boards with no clock at all)

/// Timestamp in milliseconds since epoch (or device boot)
pub type Timestamp = u64;

/// Source of time for the system
pub trait TimeSource {
    /// Current timestamp in milliseconds
    fn now(&self) -> Timestamp;

    /// Whether [`now`](Self::now) is wall clock time (vs time since boot)
    fn is_wall_clock(&self) -> bool;
}

/// System time source (requires std)
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTime;

#[cfg(feature = "std")]
impl TimeSource for SystemTime {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime as StdSystemTime, UNIX_EPOCH};

        StdSystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }

    fn is_wall_clock(&self) -> bool {
        true
    }
}

/// Fixed time source for testing
#[derive(Debug, Clone)]
pub struct FixedTime {
    timestamp: Timestamp,
    wall_clock: bool,
}

impl FixedTime {
    /// Boot-relative time frozen at `timestamp`
    pub fn new(timestamp: Timestamp) -> Self {
        Self { timestamp, wall_clock: false }
    }

    /// Wall clock time frozen at `timestamp`
    pub fn wall_clock(timestamp: Timestamp) -> Self {
        Self { timestamp, wall_clock: true }
    }

    /// Jump to `timestamp`
    pub fn set(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    /// Move forward by `ms`
    pub fn advance(&mut self, ms: u64) {
        self.timestamp += ms;
    }
}

impl TimeSource for FixedTime {
    fn now(&self) -> Timestamp {
        self.timestamp
    }

    fn is_wall_clock(&self) -> bool {
        self.wall_clock
    }
}

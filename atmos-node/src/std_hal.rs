//! Host implementations of the hardware seams
//!
//! Used when the cycle runs on a Linux gateway or in a simulator. Firmware
//! builds supply their own delay and watchdog.

use std::thread;
use std::time::{Duration, Instant};

use atmos_core::Watchdog;
use embedded_hal::delay::DelayNs;
use log::{debug, error};

/// Delay backed by `thread::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

/// Software watchdog that reports missed deadlines
///
/// A host cannot be reset, so an expired deadline is logged at feed time and
/// counted instead.
#[derive(Debug, Default)]
pub struct DeadlineWatchdog {
    timeout: Option<Duration>,
    last_feed: Option<Instant>,
    overruns: u32,
}

impl DeadlineWatchdog {
    /// Unarmed watchdog
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds that arrived after the deadline
    pub fn overruns(&self) -> u32 {
        self.overruns
    }

    /// Whether the watchdog is currently armed
    pub fn is_armed(&self) -> bool {
        self.timeout.is_some()
    }
}

impl Watchdog for DeadlineWatchdog {
    fn arm(&mut self, timeout: Duration) {
        debug!("watchdog armed for {} ms", timeout.as_millis());
        self.timeout = Some(timeout);
        self.last_feed = Some(Instant::now());
    }

    fn feed(&mut self) {
        let (Some(timeout), Some(last)) = (self.timeout, self.last_feed) else {
            return;
        };
        let elapsed = last.elapsed();
        if elapsed > timeout {
            self.overruns += 1;
            error!(
                "watchdog deadline missed by {} ms; a hardware watchdog would have reset",
                (elapsed - timeout).as_millis()
            );
        }
        self.last_feed = Some(Instant::now());
    }

    fn disarm(&mut self) {
        self.timeout = None;
        self.last_feed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_feed_is_counted() {
        let mut watchdog = DeadlineWatchdog::new();
        watchdog.arm(Duration::from_millis(1));
        StdDelay.delay_ms(5);
        watchdog.feed();
        assert_eq!(watchdog.overruns(), 1);

        watchdog.arm(Duration::from_secs(10));
        watchdog.feed();
        assert_eq!(watchdog.overruns(), 1);
    }

    #[test]
    fn unarmed_feed_is_ignored() {
        let mut watchdog = DeadlineWatchdog::new();
        watchdog.feed();
        watchdog.arm(Duration::from_secs(10));
        assert!(watchdog.is_armed());
        watchdog.disarm();
        assert!(!watchdog.is_armed());
        assert_eq!(watchdog.overruns(), 0);
    }
}

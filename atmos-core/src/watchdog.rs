//! Hardware watchdog abstraction
//!
//! The watchdog is the last line of defense: if any step hangs (a wedged bus,
//! a socket that never times out) the device resets instead of draining the
//! battery awake. It is armed at the start of a cycle, fed before every
//! attempt of every fallible step, and disarmed right before deep sleep.

use core::time::Duration;

/// Timer that resets the device unless fed
pub trait Watchdog {
    /// Start (or restart) the timer with `timeout`
    fn arm(&mut self, timeout: Duration);

    /// Reset the countdown
    fn feed(&mut self);

    /// Stop the timer before entering deep sleep
    fn disarm(&mut self);
}

impl<W: Watchdog + ?Sized> Watchdog for &mut W {
    fn arm(&mut self, timeout: Duration) {
        (**self).arm(timeout)
    }

    fn feed(&mut self) {
        (**self).feed()
    }

    fn disarm(&mut self) {
        (**self).disarm()
    }
}

/// Stand-in for boards and hosts without a hardware watchdog
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWatchdog;

impl Watchdog for NoWatchdog {
    fn arm(&mut self, _timeout: Duration) {}

    fn feed(&mut self) {}

    fn disarm(&mut self) {}
}

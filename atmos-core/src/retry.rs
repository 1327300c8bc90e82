//! Bounded retry with exponential backoff
//!
//! Every fallible step of the wake cycle runs through [`Reliability`]. It
//! feeds the watchdog before each attempt and waits between attempts through
//! a [`DelayNs`] implementation, which on hardware is a light-sleep timer
//! rather than a spin loop.
//!
//! ```text
//! attempt 1 ─✗─ wait base ─ attempt 2 ─✗─ wait base·m ─ attempt 3 ─✗─ ExhaustedError
//!                                                        (each wait capped at max_delay)
//! ```

use core::fmt::Display;
use core::time::Duration;

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::constants::time::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_MS,
    DETECT_BASE_DELAY_MS, DETECT_MAX_ATTEMPTS,
};
use crate::errors::ExhaustedError;
use crate::watchdog::Watchdog;

/// Attempt budget and backoff curve for one kind of operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first; zero is treated as one
    pub max_attempts: u32,
    /// Wait before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single wait
    pub max_delay: Duration,
    /// Growth factor between consecutive waits
    pub backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            DEFAULT_BACKOFF_MULTIPLIER,
        )
    }
}

impl RetryPolicy {
    /// Fully specified policy
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, backoff_multiplier: f32) -> Self {
        Self { max_attempts, base_delay, max_delay, backoff_multiplier }
    }

    /// Single attempt, no waiting
    pub const fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, 1.0)
    }

    /// Policy for the sensor detection pass
    pub fn detection() -> Self {
        Self {
            max_attempts: DETECT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DETECT_BASE_DELAY_MS),
            ..Self::default()
        }
    }

    /// Wait before retry number `retry` (0 = after the first failure)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = libm::pow(f64::from(self.backoff_multiplier), f64::from(retry));
        let scaled = self.base_delay.as_nanos() as f64 * factor;
        let cap = self.max_delay.as_nanos() as f64;
        if !scaled.is_finite() || scaled >= cap {
            self.max_delay
        } else if scaled <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(scaled as u64)
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Owns the watchdog and the delay provider for one wake cycle
pub struct Reliability<W, D> {
    watchdog: W,
    delay: D,
}

impl<W: Watchdog, D: DelayNs> Reliability<W, D> {
    /// Wrap a watchdog and a delay provider
    pub fn new(watchdog: W, delay: D) -> Self {
        Self { watchdog, delay }
    }

    /// Start the watchdog for this cycle
    pub fn arm(&mut self, timeout: Duration) {
        self.watchdog.arm(timeout);
    }

    /// Feed the watchdog outside a retried operation
    pub fn feed(&mut self) {
        self.watchdog.feed();
    }

    /// Last feed, then stop the watchdog so deep sleep is not interrupted
    pub fn disarm_for_sleep(&mut self) {
        self.watchdog.feed();
        self.watchdog.disarm();
    }

    /// Low-power wait
    pub fn pause(&mut self, wait: Duration) {
        let whole_ms = wait.as_millis();
        let mut remaining = whole_ms;
        while remaining > 0 {
            let step = remaining.min(u128::from(u32::MAX)) as u32;
            self.delay.delay_ms(step);
            remaining -= u128::from(step);
        }
        let sub_ms_us = (wait - Duration::from_millis(whole_ms as u64)).as_micros() as u32;
        if sub_ms_us > 0 {
            self.delay.delay_us(sub_ms_us);
        }
    }

    /// Run `operation` until it succeeds or the policy is used up
    ///
    /// The operation borrows the delay provider so it can wait for hardware
    /// to settle without owning a second timer.
    pub fn execute<T, E, F>(&mut self, label: &str, policy: &RetryPolicy, operation: F) -> Result<T, ExhaustedError<E>>
    where
        E: Display,
        F: FnMut(&mut D) -> Result<T, E>,
    {
        self.execute_if(label, policy, operation, |_| true)
    }

    /// Like [`execute`](Self::execute), but stops early when `should_retry`
    /// rejects an error
    pub fn execute_if<T, E, F, P>(
        &mut self,
        label: &str,
        policy: &RetryPolicy,
        mut operation: F,
        should_retry: P,
    ) -> Result<T, ExhaustedError<E>>
    where
        E: Display,
        F: FnMut(&mut D) -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        let max_attempts = policy.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.watchdog.feed();
            match operation(&mut self.delay) {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}/{}", label, attempt, max_attempts);
                    }
                    return Ok(value);
                }
                Err(cause) => {
                    warn!("{} attempt {}/{} failed: {}", label, attempt, max_attempts, cause);
                    if attempt >= max_attempts || !should_retry(&cause) {
                        return Err(ExhaustedError { attempts: attempt, last_cause: cause });
                    }
                    let wait = policy.delay_for(attempt - 1);
                    self.pause(wait);
                }
            }
        }
    }

    /// Borrow the watchdog
    pub fn watchdog_mut(&mut self) -> &mut W {
        &mut self.watchdog
    }

    /// Borrow the delay provider
    pub fn delay_mut(&mut self) -> &mut D {
        &mut self.delay
    }

    /// Give back the watchdog and delay provider
    pub fn into_parts(self) -> (W, D) {
        (self.watchdog, self.delay)
    }
}

//! Fan-out of one record to every configured sink

use atmos_core::{Reliability, TelemetryRecord, Watchdog};
use embedded_hal::delay::DelayNs;
use log::{info, warn};

use crate::{Sink, SinkError};

/// Outcome of one sink for one record
#[derive(Debug)]
pub struct SinkResult {
    /// Sink name
    pub sink: &'static str,
    /// Attempts made, including the first
    pub attempts: u32,
    /// Final outcome
    pub outcome: Result<(), SinkError>,
}

impl SinkResult {
    /// Whether the record landed
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Ordered set of sinks
#[derive(Default)]
pub struct TelemetryDispatcher {
    sinks: Vec<Box<dyn Sink>>,
}

impl TelemetryDispatcher {
    /// No sinks
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`push`](Self::push)
    pub fn with_sink(mut self, sink: Box<dyn Sink>) -> Self {
        self.push(sink);
        self
    }

    /// Add a sink; sinks run in insertion order
    pub fn push(&mut self, sink: Box<dyn Sink>) {
        self.sinks.push(sink);
    }

    /// Number of sinks
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// No sinks configured
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Names of the configured sinks
    pub fn names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Send `record` to every sink
    ///
    /// Each sink gets its own retry budget. A failing sink is reported in its
    /// [`SinkResult`] and never stops the sinks after it.
    pub fn dispatch<W: Watchdog, D: DelayNs>(
        &mut self,
        record: &TelemetryRecord,
        reliability: &mut Reliability<W, D>,
    ) -> Vec<SinkResult> {
        let mut results = Vec::with_capacity(self.sinks.len());
        for sink in self.sinks.iter_mut() {
            let name = sink.name();
            let policy = *sink.retry_policy();
            let mut attempts = 0;
            let outcome = reliability.execute_if(
                name,
                &policy,
                |_| {
                    attempts += 1;
                    sink.send(record)
                },
                SinkError::is_retryable,
            );

            let outcome = match outcome {
                Ok(()) => {
                    info!("{}: record delivered", name);
                    Ok(())
                }
                Err(exhausted) => {
                    warn!("{}: giving up after {} attempts: {}", name, exhausted.attempts, exhausted.last_cause);
                    Err(exhausted.last_cause)
                }
            };
            results.push(SinkResult { sink: name, attempts, outcome });
        }
        results
    }
}

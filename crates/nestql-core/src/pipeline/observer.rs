//! Stage instrumentation.
//!
//! Observers are told when each stage starts and stops. They see names and
//! timings only, never inputs or outputs, so they cannot change control flow.
//! Timings are inclusive of the downstream stages.

use nestql_common::utils::error::Result;
use parking_lot::Mutex;
use std::time::Duration;

/// How a stage invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The stage returned an output.
    Completed,
    /// The stage returned an error.
    Failed,
}

impl StageOutcome {
    pub(crate) fn of<T>(result: &Result<T>) -> Self {
        if result.is_ok() {
            Self::Completed
        } else {
            Self::Failed
        }
    }
}

/// Start/stop hooks around every stage invocation.
pub trait StageObserver: Send + Sync {
    /// Called before the stage runs.
    fn on_start(&self, _stage: &'static str) {}

    /// Called after the stage returned.
    fn on_stop(&self, stage: &'static str, elapsed: Duration, outcome: StageOutcome);
}

/// Emits one `trace` event per stage.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl StageObserver for TracingObserver {
    fn on_stop(&self, stage: &'static str, elapsed: Duration, outcome: StageOutcome) {
        tracing::trace!(
            stage,
            elapsed_us = elapsed.as_micros() as u64,
            ok = outcome == StageOutcome::Completed,
            "pipeline stage finished"
        );
    }
}

/// One recorded stage measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
    /// Stage name.
    pub stage: &'static str,
    /// Inclusive duration.
    pub elapsed: Duration,
    /// Outcome.
    pub outcome: StageOutcome,
}

/// Collects stage timings in memory, for hosts that aggregate their own
/// performance metrics.
#[derive(Debug, Default)]
pub struct PerfRecorder {
    timings: Mutex<Vec<StageTiming>>,
}

impl PerfRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded timings, in stop order.
    #[must_use]
    pub fn timings(&self) -> Vec<StageTiming> {
        self.timings.lock().clone()
    }

    /// Sums the recorded durations per stage name.
    #[must_use]
    pub fn totals(&self) -> Vec<(&'static str, Duration)> {
        let mut totals: Vec<(&'static str, Duration)> = Vec::new();
        for timing in self.timings.lock().iter() {
            match totals.iter_mut().find(|(stage, _)| *stage == timing.stage) {
                Some((_, total)) => *total += timing.elapsed,
                None => totals.push((timing.stage, timing.elapsed)),
            }
        }
        totals
    }
}

impl StageObserver for PerfRecorder {
    fn on_stop(&self, stage: &'static str, elapsed: Duration, outcome: StageOutcome) {
        self.timings.lock().push(StageTiming {
            stage,
            elapsed,
            outcome,
        });
    }
}

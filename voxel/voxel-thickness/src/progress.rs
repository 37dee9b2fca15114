//! Progress reporting for long-running stages.

use std::sync::atomic::{AtomicU64, Ordering};

/// Pipeline stage a progress report refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Squared Euclidean distance transform.
    DistanceMap,
    /// Ridge table construction.
    Tables,
    /// Distance ridge extraction.
    DistanceRidge,
    /// Integer radius approximation.
    RidgeRounding,
    /// Radius reconstruction.
    RadiusMap,
    /// Conversion to diameters.
    Finalize,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DistanceMap => "distance map",
            Self::Tables => "ridge tables",
            Self::DistanceRidge => "distance ridge",
            Self::RidgeRounding => "ridge rounding",
            Self::RadiusMap => "radius map",
            Self::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// Receiver of progress reports.
///
/// Reports arrive from worker threads, so implementations must be cheap and
/// thread-safe.
pub trait ProgressSink: Send + Sync {
    /// `done` of `total` units of `stage` have completed.
    fn progress(&self, stage: Stage, done: u64, total: u64) {
        let _ = (stage, done, total);
    }

    /// A human-readable status line.
    fn status(&self, message: &str) {
        let _ = message;
    }
}

/// A sink that ignores all reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// Shared counter forwarding completed units of one stage to a sink.
pub(crate) struct ProgressCounter<'a> {
    sink: &'a dyn ProgressSink,
    stage: Stage,
    done: AtomicU64,
    total: u64,
}

impl<'a> ProgressCounter<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink, stage: Stage, total: u64) -> Self {
        sink.progress(stage, 0, total);
        Self {
            sink,
            stage,
            done: AtomicU64::new(0),
            total,
        }
    }

    /// Records `units` more completed units.
    pub(crate) fn add(&self, units: u64) {
        let done = self.done.fetch_add(units, Ordering::Relaxed) + units;
        self.sink.progress(self.stage, done.min(self.total), self.total);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Sink recording every report, shared with other test modules.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) reports: Mutex<Vec<(Stage, u64, u64)>>,
        pub(crate) messages: Mutex<Vec<String>>,
    }

    impl ProgressSink for RecordingSink {
        fn progress(&self, stage: Stage, done: u64, total: u64) {
            if let Ok(mut reports) = self.reports.lock() {
                reports.push((stage, done, total));
            }
        }

        fn status(&self, message: &str) {
            if let Ok(mut messages) = self.messages.lock() {
                messages.push(message.to_owned());
            }
        }
    }

    #[test]
    fn test_counter_reports_cumulative_totals() {
        let sink = RecordingSink::default();
        let counter = ProgressCounter::new(&sink, Stage::DistanceMap, 10);
        counter.add(4);
        counter.add(6);
        let reports = sink.reports.lock().map(|r| r.clone()).unwrap_or_default();
        assert_eq!(
            reports,
            vec![
                (Stage::DistanceMap, 0, 10),
                (Stage::DistanceMap, 4, 10),
                (Stage::DistanceMap, 10, 10),
            ]
        );
    }

    #[test]
    fn test_no_progress_is_silent() {
        let sink = NoProgress;
        sink.progress(Stage::Finalize, 1, 1);
        sink.status("ignored");
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::RadiusMap.to_string(), "radius map");
    }
}

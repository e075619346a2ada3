use crate::aggregate::RunMetrics;
use crate::sample::{CheckResult, HttpOutcome, IterationRecord, MetricSample};
use parking_lot::Mutex;
use std::time::Duration;

/// The append-only metric stream for one run.
///
/// Shared by every virtual user through the runner context. Writers only ever append, the runner
/// reads the stream once the run is over.
pub struct Reporter {
    samples: Mutex<Vec<MetricSample>>,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("samples", &self.samples.lock().len())
            .finish()
    }
}

impl Reporter {
    pub fn new() -> Self {
        Self {
            samples: Mutex::new(Vec::new()),
        }
    }

    pub fn add_http_outcome(&self, outcome: HttpOutcome) {
        log::trace!(
            "{} {} -> {:?} in {}ms",
            outcome.method,
            outcome.url,
            outcome.status,
            outcome.latency.as_millis()
        );
        self.samples.lock().push(MetricSample::Http(outcome));
    }

    pub fn add_check(&self, check: CheckResult) {
        self.samples.lock().push(MetricSample::Check(check));
    }

    pub fn add_iteration(&self, iteration: IterationRecord) {
        self.samples.lock().push(MetricSample::Iteration(iteration));
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    /// A copy of every sample recorded so far, in the order they were appended.
    pub fn samples(&self) -> Vec<MetricSample> {
        self.samples.lock().clone()
    }

    /// Aggregate the stream as it stands, over the given run duration.
    pub fn metrics(&self, run_duration: Duration) -> RunMetrics {
        RunMetrics::from_samples(&self.samples.lock(), run_duration)
    }
}

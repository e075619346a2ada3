mod aggregate;
mod check;
mod metric;
mod report;
mod reporter;
mod sample;

pub use aggregate::{Counter, Rate, RequestStats, RunMetrics, Trend};
pub use check::{named, Check, NamedCheck};
pub use metric::{BuiltinMetric, MetricKind};
pub use report::{print_summary, ThresholdRow};
pub use reporter::Reporter;
pub use sample::{CheckResult, HttpOutcome, IterationRecord, MetricSample};

use std::time::{Instant, SystemTime};

/// Tracks a single HTTP call from the moment it is sent.
///
/// Finish it with the response status or the transport error to get the [HttpOutcome] that should
/// be handed to the [Reporter]. If the call is cancelled the record is simply dropped and nothing
/// is reported.
pub struct RequestRecord {
    name: String,
    method: String,
    url: String,
    vu: usize,
    started: Instant,
    started_at: SystemTime,
}

impl RequestRecord {
    pub fn start(
        name: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
        vu: usize,
    ) -> Self {
        Self {
            name: name.into(),
            method: method.into(),
            url: url.into(),
            vu,
            started: Instant::now(),
            started_at: SystemTime::now(),
        }
    }

    pub fn finish_with_status(self, status: u16) -> HttpOutcome {
        let latency = self.started.elapsed();
        HttpOutcome {
            name: self.name,
            method: self.method,
            url: self.url,
            status: Some(status),
            latency,
            failed: !(200..400).contains(&status),
            vu: self.vu,
            timestamp: self.started_at,
        }
    }

    pub fn finish_with_error(self) -> HttpOutcome {
        let latency = self.started.elapsed();
        HttpOutcome {
            name: self.name,
            method: self.method,
            url: self.url,
            status: None,
            latency,
            failed: true,
            vu: self.vu,
            timestamp: self.started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirects_are_not_failures() {
        let outcome = RequestRecord::start("login", "POST", "http://localhost/api/login", 0)
            .finish_with_status(302);
        assert!(!outcome.failed);
    }

    #[test]
    fn client_and_server_errors_are_failures() {
        for status in [400, 404, 500, 503] {
            let outcome = RequestRecord::start("login", "POST", "http://localhost/api/login", 0)
                .finish_with_status(status);
            assert!(outcome.failed, "status {status} should count as failed");
        }
    }

    #[test]
    fn transport_errors_have_no_status() {
        let outcome = RequestRecord::start("schedule", "GET", "http://localhost/api/schedule", 3)
            .finish_with_error();
        assert!(outcome.failed);
        assert_eq!(outcome.status, None);
        assert_eq!(outcome.vu, 3);
    }
}

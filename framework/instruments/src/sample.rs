use std::time::{Duration, SystemTime};

/// The result of one HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpOutcome {
    /// Name tag of the request, used to group latencies in the summary.
    pub name: String,
    pub method: String,
    pub url: String,
    /// `None` when no response was received at all.
    pub status: Option<u16>,
    pub latency: Duration,
    /// A transport error or a status outside of 200-399.
    pub failed: bool,
    pub vu: usize,
    pub timestamp: SystemTime,
}

/// A named boolean assertion evaluated by a request script.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub vu: usize,
    pub timestamp: SystemTime,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, passed: bool, vu: usize) -> Self {
        Self {
            name: name.into(),
            passed,
            vu,
            timestamp: SystemTime::now(),
        }
    }
}

/// One completed invocation of a request script by a virtual user.
///
/// Cancelled iterations are never recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    pub vu: usize,
    pub iteration: u64,
    pub duration: Duration,
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricSample {
    Http(HttpOutcome),
    Check(CheckResult),
    Iteration(IterationRecord),
}

use std::fmt::{Display, Formatter};

/// How a metric is aggregated, which decides the aggregations a threshold may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Distribution of durations, in milliseconds.
    Trend,
    /// Fraction of samples that are non-zero.
    Rate,
    /// Running total.
    Counter,
}

/// The metrics that every run collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuiltinMetric {
    HttpReqDuration,
    HttpReqFailed,
    HttpReqs,
    Checks,
    Iterations,
    IterationDuration,
}

impl BuiltinMetric {
    pub const ALL: [BuiltinMetric; 6] = [
        BuiltinMetric::HttpReqDuration,
        BuiltinMetric::HttpReqFailed,
        BuiltinMetric::HttpReqs,
        BuiltinMetric::Checks,
        BuiltinMetric::Iterations,
        BuiltinMetric::IterationDuration,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinMetric::HttpReqDuration => "http_req_duration",
            BuiltinMetric::HttpReqFailed => "http_req_failed",
            BuiltinMetric::HttpReqs => "http_reqs",
            BuiltinMetric::Checks => "checks",
            BuiltinMetric::Iterations => "iterations",
            BuiltinMetric::IterationDuration => "iteration_duration",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|metric| metric.name() == name)
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            BuiltinMetric::HttpReqDuration | BuiltinMetric::IterationDuration => MetricKind::Trend,
            BuiltinMetric::HttpReqFailed | BuiltinMetric::Checks => MetricKind::Rate,
            BuiltinMetric::HttpReqs | BuiltinMetric::Iterations => MetricKind::Counter,
        }
    }
}

impl Display for BuiltinMetric {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

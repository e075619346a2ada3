use crate::metric::BuiltinMetric;
use crate::sample::MetricSample;
use std::collections::BTreeMap;
use std::time::Duration;

/// A distribution of durations in milliseconds.
///
/// Every aggregation returns `None` when there are no values, so that callers can tell "no data"
/// apart from a measured zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trend {
    sorted: Vec<f64>,
}

impl Trend {
    pub fn from_values(mut values: Vec<f64>) -> Self {
        values.sort_by(|a, b| a.total_cmp(b));
        Self { sorted: values }
    }

    pub fn count(&self) -> usize {
        self.sorted.len()
    }

    pub fn avg(&self) -> Option<f64> {
        if self.sorted.is_empty() {
            return None;
        }
        Some(self.sorted.iter().sum::<f64>() / self.sorted.len() as f64)
    }

    pub fn min(&self) -> Option<f64> {
        self.sorted.first().copied()
    }

    pub fn max(&self) -> Option<f64> {
        self.sorted.last().copied()
    }

    pub fn med(&self) -> Option<f64> {
        self.percentile(50.0)
    }

    /// Percentile with linear interpolation between the two closest ranks.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.sorted.is_empty() {
            return None;
        }

        let rank = p.clamp(0.0, 100.0) / 100.0 * (self.sorted.len() - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = rank.ceil() as usize;
        let weight = rank - lower as f64;

        Some(self.sorted[lower] + (self.sorted[upper] - self.sorted[lower]) * weight)
    }
}

/// Fraction of samples that matched, e.g. failed requests or passed checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rate {
    pub matched: usize,
    pub total: usize,
}

impl Rate {
    pub fn add(&mut self, matched: bool) {
        self.total += 1;
        if matched {
            self.matched += 1;
        }
    }

    pub fn unmatched(&self) -> usize {
        self.total - self.matched
    }

    pub fn rate(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.matched as f64 / self.total as f64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Counter {
    pub count: usize,
    run_duration: Duration,
}

impl Counter {
    pub fn count(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.count as f64)
    }

    /// Count per second of run time.
    pub fn rate(&self) -> Option<f64> {
        if self.count == 0 || self.run_duration.is_zero() {
            return None;
        }
        Some(self.count as f64 / self.run_duration.as_secs_f64())
    }
}

/// Latency and failures for requests sharing a name tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestStats {
    pub duration: Trend,
    pub failed: usize,
}

/// Aggregates over a complete metric stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunMetrics {
    pub run_duration: Duration,
    pub http_req_duration: Trend,
    /// Matched samples are failed requests.
    pub http_req_failed: Rate,
    pub http_reqs: Counter,
    /// Matched samples are passed checks.
    pub checks: Rate,
    pub iterations: Counter,
    pub iteration_duration: Trend,
    pub requests_by_name: BTreeMap<String, RequestStats>,
    pub checks_by_name: BTreeMap<String, Rate>,
}

impl RunMetrics {
    pub fn from_samples(samples: &[MetricSample], run_duration: Duration) -> Self {
        let mut http_durations = Vec::new();
        let mut http_req_failed = Rate::default();
        let mut checks = Rate::default();
        let mut iteration_durations = Vec::new();
        let mut durations_by_name: BTreeMap<String, (Vec<f64>, usize)> = BTreeMap::new();
        let mut checks_by_name: BTreeMap<String, Rate> = BTreeMap::new();

        for sample in samples {
            match sample {
                MetricSample::Http(outcome) => {
                    let millis = as_millis_f64(outcome.latency);
                    http_durations.push(millis);
                    http_req_failed.add(outcome.failed);

                    let entry = durations_by_name.entry(outcome.name.clone()).or_default();
                    entry.0.push(millis);
                    if outcome.failed {
                        entry.1 += 1;
                    }
                }
                MetricSample::Check(check) => {
                    checks.add(check.passed);
                    checks_by_name
                        .entry(check.name.clone())
                        .or_default()
                        .add(check.passed);
                }
                MetricSample::Iteration(iteration) => {
                    iteration_durations.push(as_millis_f64(iteration.duration));
                }
            }
        }

        Self {
            run_duration,
            http_reqs: Counter {
                count: http_durations.len(),
                run_duration,
            },
            http_req_duration: Trend::from_values(http_durations),
            http_req_failed,
            checks,
            iterations: Counter {
                count: iteration_durations.len(),
                run_duration,
            },
            iteration_duration: Trend::from_values(iteration_durations),
            requests_by_name: durations_by_name
                .into_iter()
                .map(|(name, (durations, failed))| {
                    (
                        name,
                        RequestStats {
                            duration: Trend::from_values(durations),
                            failed,
                        },
                    )
                })
                .collect(),
            checks_by_name,
        }
    }

    pub fn trend(&self, metric: BuiltinMetric) -> Option<&Trend> {
        match metric {
            BuiltinMetric::HttpReqDuration => Some(&self.http_req_duration),
            BuiltinMetric::IterationDuration => Some(&self.iteration_duration),
            _ => None,
        }
    }

    pub fn rate(&self, metric: BuiltinMetric) -> Option<&Rate> {
        match metric {
            BuiltinMetric::HttpReqFailed => Some(&self.http_req_failed),
            BuiltinMetric::Checks => Some(&self.checks),
            _ => None,
        }
    }

    pub fn counter(&self, metric: BuiltinMetric) -> Option<&Counter> {
        match metric {
            BuiltinMetric::HttpReqs => Some(&self.http_reqs),
            BuiltinMetric::Iterations => Some(&self.iterations),
            _ => None,
        }
    }
}

fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_micros() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{CheckResult, HttpOutcome, IterationRecord};
    use pretty_assertions::assert_eq;
    use std::time::SystemTime;

    fn http(name: &str, millis: u64, status: Option<u16>) -> MetricSample {
        MetricSample::Http(HttpOutcome {
            name: name.to_string(),
            method: "GET".to_string(),
            url: format!("http://localhost:8000/api/{name}"),
            status,
            latency: Duration::from_millis(millis),
            failed: status.map(|s| s >= 400).unwrap_or(true),
            vu: 0,
            timestamp: SystemTime::now(),
        })
    }

    #[test]
    fn percentiles_interpolate() {
        let trend = Trend::from_values((1..=100).map(|v| v as f64).rev().collect());

        assert_eq!(Some(1.0), trend.min());
        assert_eq!(Some(100.0), trend.max());
        assert_eq!(Some(50.5), trend.avg());
        assert_eq!(Some(50.5), trend.med());
        assert!((trend.percentile(95.0).unwrap() - 95.05).abs() < 1e-9);
    }

    #[test]
    fn single_value_percentile() {
        let trend = Trend::from_values(vec![42.0]);
        assert_eq!(Some(42.0), trend.percentile(99.0));
    }

    #[test]
    fn empty_aggregates_have_no_data() {
        let metrics = RunMetrics::from_samples(&[], Duration::ZERO);

        assert_eq!(None, metrics.http_req_duration.percentile(95.0));
        assert_eq!(None, metrics.http_req_failed.rate());
        assert_eq!(None, metrics.checks.rate());
        assert_eq!(None, metrics.http_reqs.count());
        assert_eq!(None, metrics.iterations.rate());
    }

    #[test]
    fn aggregate_mixed_stream() {
        let samples = vec![
            http("login", 10, Some(200)),
            http("schedule", 30, Some(200)),
            http("schedule", 50, Some(500)),
            http("schedule", 70, None),
            MetricSample::Check(CheckResult::new("login 200", true, 0)),
            MetricSample::Check(CheckResult::new("schedule 200", true, 0)),
            MetricSample::Check(CheckResult::new("schedule 200", false, 0)),
            MetricSample::Iteration(IterationRecord {
                vu: 0,
                iteration: 0,
                duration: Duration::from_millis(200),
                failed: false,
            }),
        ];

        let metrics = RunMetrics::from_samples(&samples, Duration::from_secs(2));

        assert_eq!(4, metrics.http_req_duration.count());
        assert_eq!(Some(0.5), metrics.http_req_failed.rate());
        assert_eq!(Some(2.0), metrics.http_reqs.rate());
        assert_eq!(3, metrics.checks.total);
        assert_eq!(2, metrics.checks.matched);
        assert_eq!(1, metrics.checks.unmatched());
        assert_eq!(Some(1.0), metrics.iterations.count());
        assert_eq!(Some(200.0), metrics.iteration_duration.max());

        let schedule = &metrics.requests_by_name["schedule"];
        assert_eq!(3, schedule.duration.count());
        assert_eq!(2, schedule.failed);
        assert_eq!(
            Rate {
                matched: 1,
                total: 2
            },
            metrics.checks_by_name["schedule 200"]
        );
    }

    #[test]
    fn aggregation_is_repeatable() {
        let samples = vec![http("login", 10, Some(200)), http("login", 20, Some(404))];

        let first = RunMetrics::from_samples(&samples, Duration::from_secs(1));
        let second = RunMetrics::from_samples(&samples, Duration::from_secs(1));

        assert_eq!(first, second);
    }
}

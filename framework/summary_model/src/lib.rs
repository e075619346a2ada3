use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner unless one is passed on the command line. Unique for each run.
    pub run_id: String,
    /// The name of the scenario that was run
    pub scenario_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The planned duration of the load profile, in seconds
    ///
    /// Runs with a fixed number of iterations per virtual user may finish sooner than this.
    pub planned_duration: u64,
    /// The actual wall-clock duration of the run, in seconds, including the graceful stop
    pub actual_duration: f64,
    /// Stages of the load profile as `(duration in milliseconds, target virtual users)`
    pub stages: Vec<(u64, usize)>,
    /// The highest number of virtual users that were active at the same time
    pub peak_vus: usize,
    /// Environment variables that shaped the run
    ///
    /// This won't capture all environment variables. Just the ones that the runner is aware of or
    /// that are included by the scenario itself.
    pub env: HashMap<String, String>,
    /// Total number of HTTP requests
    pub http_reqs: usize,
    /// Number of HTTP requests that failed
    pub http_reqs_failed: usize,
    /// Number of checks that passed
    pub checks_passed: usize,
    /// Number of checks that failed
    pub checks_failed: usize,
    /// Number of completed iterations
    pub iterations: usize,
    /// One entry per configured threshold
    pub thresholds: Vec<ThresholdSummary>,
    /// The version of Stampede that was used for this run
    pub stampede_version: String,
}

/// The outcome of a single threshold
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdSummary {
    pub metric: String,
    pub expression: String,
    /// `None` if the metric received no samples during the run
    pub observed: Option<f64>,
    pub passed: bool,
}

impl RunSummary {
    /// Create a new run summary
    pub fn new(
        run_id: String,
        scenario_name: String,
        started_at: i64,
        planned_duration: u64,
        stages: Vec<(u64, usize)>,
        stampede_version: String,
    ) -> Self {
        Self {
            run_id,
            scenario_name,
            started_at,
            planned_duration,
            actual_duration: 0.0,
            stages,
            peak_vus: 0,
            env: HashMap::with_capacity(0),
            http_reqs: 0,
            http_reqs_failed: 0,
            checks_passed: 0,
            checks_failed: 0,
            iterations: 0,
            thresholds: Vec::new(),
            stampede_version,
        }
    }

    /// Add an environment variable
    pub fn add_env(&mut self, key: String, value: String) {
        self.env.insert(key, value);
    }

    /// True if every threshold passed. A run without thresholds passes.
    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    /// Compute a fingerprint for this run summary
    ///
    /// The fingerprint is intended to uniquely identify the configuration used to run the scenario.
    /// It uses the
    ///     - Scenario name
    ///     - Stages
    ///     - Threshold expressions
    ///     - Selected environment variables
    ///     - Stampede version
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario_name.as_bytes());
        for (duration, target) in &self.stages {
            Digest::update(&mut hasher, duration.to_le_bytes());
            Digest::update(&mut hasher, (*target as u64).to_le_bytes());
        }
        self.thresholds
            .iter()
            .sorted_by_key(|t| (t.metric.clone(), t.expression.clone()))
            .for_each(|t| {
                Digest::update(&mut hasher, t.metric.as_bytes());
                Digest::update(&mut hasher, t.expression.as_bytes());
            });
        self.env
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });
        Digest::update(&mut hasher, self.stampede_version.as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

/// Append the run summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: &RunSummary, path: PathBuf) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all("\n".as_bytes())?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: &RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_summary)?;
    Ok(())
}

/// Load run summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_run_summary].
pub fn load_summary_runs(path: PathBuf) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let run: RunSummary = serde_json::from_str(&line)?;
        runs.push(run);
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_summary() -> RunSummary {
        let mut summary = RunSummary::new(
            "run-1".to_string(),
            "login_and_get_schedule".to_string(),
            1_700_000_000,
            130,
            vec![(20_000, 10), (40_000, 30), (40_000, 30), (30_000, 0)],
            "0.1.0".to_string(),
        );
        summary.add_env("BASE_URL".to_string(), "http://localhost:8000".to_string());
        summary.thresholds.push(ThresholdSummary {
            metric: "http_req_failed".to_string(),
            expression: "rate<0.01".to_string(),
            observed: Some(0.0),
            passed: true,
        });
        summary
    }

    #[test]
    fn append_and_load_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summaries.jsonl");

        let first = sample_summary();
        let mut second = sample_summary();
        second.run_id = "run-2".to_string();
        second.thresholds[0].observed = None;

        append_run_summary(&first, path.clone()).unwrap();
        append_run_summary(&second, path.clone()).unwrap();

        let loaded = load_summary_runs(path).unwrap();
        assert_eq!(vec![first, second], loaded);
    }

    #[test]
    fn fingerprint_ignores_run_id_and_results() {
        let first = sample_summary();
        let mut second = sample_summary();
        second.run_id = "run-2".to_string();
        second.http_reqs = 1000;
        second.thresholds[0].observed = Some(0.5);
        second.thresholds[0].passed = false;

        assert_eq!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_env() {
        let first = sample_summary();
        let mut second = sample_summary();
        second.add_env("GROUP".to_string(), "КС-22".to_string());

        assert_ne!(first.fingerprint(), second.fingerprint());
    }

    #[test]
    fn passed_requires_every_threshold() {
        let mut summary = sample_summary();
        assert!(summary.passed());

        summary.thresholds.push(ThresholdSummary {
            metric: "checks".to_string(),
            expression: "rate>0.99".to_string(),
            observed: Some(0.5),
            passed: false,
        });
        assert!(!summary.passed());
    }
}

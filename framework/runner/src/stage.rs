use std::time::Duration;

/// One step of a ramping load profile: reach `target` virtual users over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

/// How the virtual user count moves from one stage's target to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RampPolicy {
    /// Interpolate linearly from the previous target over the stage's duration.
    #[default]
    Linear,
    /// Jump to the stage's target as soon as the stage starts.
    Step,
}

/// What happens to in-flight iterations when virtual users are retired or the run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// Let in-flight iterations finish, cancelling whatever is still running after the grace
    /// period.
    Graceful { grace_period: Duration },
    /// Cancel in-flight iterations straight away.
    Immediate,
}

impl Default for StopPolicy {
    fn default() -> Self {
        StopPolicy::Graceful {
            grace_period: Duration::from_secs(30),
        }
    }
}

impl StopPolicy {
    pub fn grace_period(&self) -> Duration {
        match self {
            StopPolicy::Graceful { grace_period } => *grace_period,
            StopPolicy::Immediate => Duration::ZERO,
        }
    }
}

/// How many virtual users run over time.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadProfile {
    /// Ramp through the stages in order. No stages means the run finishes immediately.
    Ramping { stages: Vec<Stage> },
    /// A fixed number of virtual users for a fixed duration.
    Constant { vus: usize, duration: Duration },
    /// A fixed number of virtual users that each run exactly `iterations` iterations. The run
    /// is cut off at `max_duration` if the iterations take longer than that.
    PerVuIterations {
        vus: usize,
        iterations: u64,
        max_duration: Duration,
    },
}

impl Default for LoadProfile {
    fn default() -> Self {
        LoadProfile::Ramping { stages: Vec::new() }
    }
}

impl LoadProfile {
    /// The profile expressed as stages, for reporting.
    pub fn stages(&self) -> Vec<Stage> {
        match self {
            LoadProfile::Ramping { stages } => stages.clone(),
            LoadProfile::Constant { vus, duration } => vec![Stage {
                duration: *duration,
                target: *vus,
            }],
            LoadProfile::PerVuIterations {
                vus, max_duration, ..
            } => vec![Stage {
                duration: *max_duration,
                target: *vus,
            }],
        }
    }

    pub fn planned_duration(&self) -> Duration {
        self.stages().iter().map(|stage| stage.duration).sum()
    }

    pub fn max_vus(&self) -> usize {
        self.stages()
            .iter()
            .map(|stage| stage.target)
            .max()
            .unwrap_or(0)
    }

    pub fn iterations_per_vu(&self) -> Option<u64> {
        match self {
            LoadProfile::PerVuIterations { iterations, .. } => Some(*iterations),
            _ => None,
        }
    }

    /// Index of the stage that is running at `elapsed`, or `None` once every stage has elapsed.
    pub fn stage_at(&self, elapsed: Duration) -> Option<usize> {
        let mut stage_end = Duration::ZERO;
        for (index, stage) in self.stages().iter().enumerate() {
            stage_end += stage.duration;
            if elapsed < stage_end {
                return Some(index);
            }
        }
        None
    }

    /// The number of virtual users that should be active at `elapsed`, or `None` once the
    /// profile has finished.
    ///
    /// Only ramping profiles honour the ramp policy, the others always step.
    pub fn target_at(&self, elapsed: Duration, policy: RampPolicy) -> Option<usize> {
        let policy = match self {
            LoadProfile::Ramping { .. } => policy,
            _ => RampPolicy::Step,
        };

        let mut stage_start = Duration::ZERO;
        let mut previous = 0;
        for stage in self.stages() {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                return Some(match policy {
                    RampPolicy::Step => stage.target,
                    RampPolicy::Linear => {
                        let progress = (elapsed - stage_start).as_secs_f64()
                            / stage.duration.as_secs_f64();
                        interpolate(previous, stage.target, progress)
                    }
                });
            }
            stage_start = stage_end;
            previous = stage.target;
        }

        None
    }
}

/// Rounds down, so the result always lies between `from` and `to`.
fn interpolate(from: usize, to: usize, progress: f64) -> usize {
    let value = from as f64 + (to as f64 - from as f64) * progress.clamp(0.0, 1.0);
    value.floor() as usize
}

/// Parse a duration literal such as `500ms`, `20s`, `1m` or `1h`. A bare number is taken as
/// seconds.
pub(crate) fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration is empty".to_string());
    }
    if s.starts_with('-') {
        return Err(format!("duration [{input}] is negative"));
    }

    let (value, unit) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(at) => s.split_at(at),
        None => (s, "s"),
    };

    let millis_per_unit: u64 = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        _ => {
            return Err(format!(
                "duration [{input}] has unknown unit [{unit}], expected one of ms, s, m, h"
            ))
        }
    };

    // Whole numbers stay exact, fractions go through floating point.
    let too_long = || format!("duration [{input}] is too long");
    if let Ok(whole) = value.parse::<u64>() {
        return whole
            .checked_mul(millis_per_unit)
            .map(Duration::from_millis)
            .ok_or_else(too_long);
    }

    let value = value
        .parse::<f64>()
        .map_err(|_| format!("duration [{input}] does not start with a number"))?;

    Duration::try_from_secs_f64(value * millis_per_unit as f64 / 1000.0).map_err(|_| too_long())
}

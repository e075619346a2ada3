use std::sync::Arc;
use std::time::Duration;

use stampede_core::prelude::ConfigError;

use crate::cli::ScenarioCli;
use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
use crate::stage::{parse_duration, LoadProfile, RampPolicy, Stage, StopPolicy};
use crate::threshold::Threshold;

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type GlobalHook<RV> = fn(Arc<RunnerContext<RV>>) -> HookResult;
pub type VuHookMut<RV, V> = fn(&mut VuContext<RV, V>) -> HookResult;

const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(600);

/// The builder for a scenario definition.
///
/// This must be used at the start of a test to define the scenario that you want to run. Problems
/// with the values passed to the builder are collected and reported together by
/// [ScenarioDefinitionBuilder::build].
pub struct ScenarioDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the scenario, which should be unique within the test suite.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    cli: ScenarioCli,
    stages: Vec<Stage>,
    declared_stages: usize,
    constant: Option<(usize, Duration)>,
    per_vu_iterations: Option<(usize, u64)>,
    max_duration: Option<Duration>,
    ramp_policy: RampPolicy,
    stop_policy: StopPolicy,
    thresholds: Vec<Threshold>,
    problems: Vec<String>,
    /// Global setup hook for this scenario. It will be run once, before any virtual users are
    /// started. Returning an error aborts the run.
    setup_fn: Option<GlobalHookMut<RV>>,
    /// Setup hook for a virtual user, run once on its own thread before its first iteration. A
    /// virtual user whose setup fails never runs the script.
    setup_vu_fn: Option<VuHookMut<RV, V>>,
    /// The request script, invoked back to back by every virtual user until it is retired.
    script: Option<VuHookMut<RV, V>>,
    teardown_vu_fn: Option<VuHookMut<RV, V>>,
    /// Global teardown hook, run once after every virtual user has stopped. Best effort, a
    /// failure is logged and does not change the outcome of the run.
    teardown_fn: Option<GlobalHook<RV>>,
}

/// A validated scenario, ready to [crate::run::run].
pub struct ScenarioDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub(crate) name: String,
    pub(crate) cli: ScenarioCli,
    pub(crate) profile: LoadProfile,
    pub(crate) ramp_policy: RampPolicy,
    pub(crate) stop_policy: StopPolicy,
    pub(crate) thresholds: Vec<Threshold>,
    pub(crate) setup_fn: Option<GlobalHookMut<RV>>,
    pub(crate) vu_hooks: VuHooks<RV, V>,
    pub(crate) teardown_fn: Option<GlobalHook<RV>>,
}

/// The hooks every virtual user thread runs.
pub(crate) struct VuHooks<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub(crate) setup: Option<VuHookMut<RV, V>>,
    pub(crate) script: VuHookMut<RV, V>,
    pub(crate) teardown: Option<VuHookMut<RV, V>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> Clone for VuHooks<RV, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> Copy for VuHooks<RV, V> {}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinition<RV, V> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn profile(&self) -> &LoadProfile {
        &self.profile
    }

    pub fn ramp_policy(&self) -> RampPolicy {
        self.ramp_policy
    }

    pub fn stop_policy(&self) -> StopPolicy {
        self.stop_policy
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    pub fn base_url(&self) -> &str {
        &self.cli.base_url
    }
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinitionBuilder<RV, V> {
    /// Initialise a new scenario definition from the scenario name and command line arguments.
    /// See the [ScenarioDefinitionBuilder::name] for more information about the name.
    pub fn new_with_init(name: &str) -> Self {
        Self::new(name, crate::init::init())
    }

    /// Initialise a new scenario definition with already parsed command line arguments.
    pub fn new(name: &str, cli: ScenarioCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            stages: Vec::new(),
            declared_stages: 0,
            constant: None,
            per_vu_iterations: None,
            max_duration: None,
            ramp_policy: RampPolicy::default(),
            stop_policy: StopPolicy::default(),
            thresholds: Vec::new(),
            problems: Vec::new(),
            setup_fn: None,
            setup_vu_fn: None,
            script: None,
            teardown_vu_fn: None,
            teardown_fn: None,
        }
    }

    /// Append a ramp stage, for example `with_stage("20s", 10)` to move to 10 virtual users over
    /// 20 seconds.
    pub fn with_stage(mut self, duration: &str, target: i64) -> Self {
        let index = self.declared_stages;
        self.declared_stages += 1;
        let duration = self.duration_or_problem(&format!("stage {index}"), duration);
        let target = self.count_or_problem(&format!("stage {index} target"), target);

        if let (Some(duration), Some(target)) = (duration, target) {
            self.stages.push(Stage {
                duration,
                target: target as usize,
            });
        }

        self
    }

    pub fn with_stages(self, stages: &[(&str, i64)]) -> Self {
        stages
            .iter()
            .fold(self, |builder, (duration, target)| {
                builder.with_stage(duration, *target)
            })
    }

    /// Run a fixed number of virtual users for a fixed duration instead of ramping.
    pub fn with_constant_vus(mut self, vus: i64, duration: &str) -> Self {
        let vus = self.count_or_problem("constant virtual users", vus);
        let duration = self.duration_or_problem("constant duration", duration);

        if let (Some(vus), Some(duration)) = (vus, duration) {
            self.constant = Some((vus as usize, duration));
        }

        self
    }

    /// Run a fixed number of virtual users that each run exactly `iterations` iterations. The run
    /// ends as soon as every virtual user is done, or at the maximum duration.
    pub fn with_per_vu_iterations(mut self, vus: i64, iterations: i64) -> Self {
        let vus = self.count_or_problem("per virtual user iterations, virtual users", vus);
        let iterations = self.count_or_problem("per virtual user iterations", iterations);

        if let (Some(vus), Some(iterations)) = (vus, iterations) {
            self.per_vu_iterations = Some((vus as usize, iterations));
        }

        self
    }

    /// Cut off a per virtual user iterations run after this long. Defaults to 10 minutes.
    pub fn with_max_duration(mut self, duration: &str) -> Self {
        self.max_duration = self.duration_or_problem("max duration", duration);
        self
    }

    pub fn with_ramp_policy(mut self, ramp_policy: RampPolicy) -> Self {
        self.ramp_policy = ramp_policy;
        self
    }

    pub fn with_stop_policy(mut self, stop_policy: StopPolicy) -> Self {
        self.stop_policy = stop_policy;
        self
    }

    /// Stop gracefully, cancelling in-flight iterations that have not finished after
    /// `grace_period`.
    pub fn with_graceful_stop(mut self, grace_period: &str) -> Self {
        if let Some(grace_period) = self.duration_or_problem("grace period", grace_period) {
            self.stop_policy = StopPolicy::Graceful { grace_period };
        }
        self
    }

    /// Add a threshold such as `with_threshold("http_req_duration", "p(95)<800")`. The run fails
    /// if any threshold is breached.
    pub fn with_threshold(mut self, metric: &str, expression: &str) -> Self {
        match Threshold::parse(metric, expression) {
            Ok(threshold) => self.thresholds.push(threshold),
            Err(problem) => self.problems.push(problem),
        }
        self
    }

    /// Set the global setup hook [ScenarioDefinitionBuilder::setup_fn] for this scenario.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the virtual user setup hook [ScenarioDefinitionBuilder::setup_vu_fn] for this scenario.
    pub fn use_vu_setup(mut self, setup_vu_fn: VuHookMut<RV, V>) -> Self {
        self.setup_vu_fn = Some(setup_vu_fn);
        self
    }

    /// Set the request script [ScenarioDefinitionBuilder::script] for this scenario.
    pub fn use_script(mut self, script: VuHookMut<RV, V>) -> Self {
        self.script = Some(script);
        self
    }

    pub fn use_vu_teardown(mut self, teardown_vu_fn: VuHookMut<RV, V>) -> Self {
        self.teardown_vu_fn = Some(teardown_vu_fn);
        self
    }

    /// Set the global teardown hook [ScenarioDefinitionBuilder::teardown_fn] for this scenario.
    pub fn use_teardown(mut self, teardown_fn: GlobalHook<RV>) -> Self {
        self.teardown_fn = Some(teardown_fn);
        self
    }

    /// Validate the definition. Every problem found is reported in the [ConfigError].
    pub fn build(self) -> Result<ScenarioDefinition<RV, V>, ConfigError> {
        let mut problems = self.problems;

        let profiles_set = [
            !self.stages.is_empty(),
            self.constant.is_some(),
            self.per_vu_iterations.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if profiles_set > 1 {
            problems.push(
                "only one of stages, constant virtual users or per virtual user iterations can be used"
                    .to_string(),
            );
        }
        if self.max_duration.is_some() && self.per_vu_iterations.is_none() {
            problems.push("max duration only applies to per virtual user iterations".to_string());
        }

        match url::Url::parse(&self.cli.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => problems.push(format!(
                "base url [{}] must use http or https, not [{}]",
                self.cli.base_url,
                url.scheme()
            )),
            Err(e) => problems.push(format!("base url [{}] is invalid: {e}", self.cli.base_url)),
        }

        if self.script.is_none() {
            problems.push("no request script, set one with use_script".to_string());
        }

        let (Some(script), true) = (self.script, problems.is_empty()) else {
            return Err(ConfigError::from_problems(problems));
        };

        let profile = if let Some((vus, duration)) = self.constant {
            LoadProfile::Constant { vus, duration }
        } else if let Some((vus, iterations)) = self.per_vu_iterations {
            LoadProfile::PerVuIterations {
                vus,
                iterations,
                max_duration: self.max_duration.unwrap_or(DEFAULT_MAX_DURATION),
            }
        } else {
            LoadProfile::Ramping {
                stages: self.stages,
            }
        };

        Ok(ScenarioDefinition {
            name: self.name,
            cli: self.cli,
            profile,
            ramp_policy: self.ramp_policy,
            stop_policy: self.stop_policy,
            thresholds: self.thresholds,
            setup_fn: self.setup_fn,
            vu_hooks: VuHooks {
                setup: self.setup_vu_fn,
                script,
                teardown: self.teardown_vu_fn,
            },
            teardown_fn: self.teardown_fn,
        })
    }

    fn duration_or_problem(&mut self, what: &str, duration: &str) -> Option<Duration> {
        parse_duration(duration)
            .map_err(|problem| self.problems.push(format!("{what}: {problem}")))
            .ok()
    }

    fn count_or_problem(&mut self, what: &str, count: i64) -> Option<u64> {
        if count < 0 {
            self.problems
                .push(format!("{what} must not be negative, got {count}"));
            return None;
        }
        Some(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default)]
    struct Values;

    impl UserValuesConstraint for Values {}

    fn script(_ctx: &mut VuContext<Values, Values>) -> HookResult {
        Ok(())
    }

    fn cli() -> ScenarioCli {
        ScenarioCli {
            base_url: "http://localhost:8000".to_string(),
            no_progress: true,
            summary_file: None,
            run_id: None,
        }
    }

    fn builder() -> ScenarioDefinitionBuilder<Values, Values> {
        ScenarioDefinitionBuilder::new("definition_test", cli()).use_script(script)
    }

    #[test]
    fn staged_definition() {
        let definition = builder()
            .with_stages(&[("20s", 10), ("40s", 30), ("40s", 30), ("30s", 0)])
            .with_threshold("checks", "rate>0.99")
            .with_threshold("http_req_duration", "p(95)<800")
            .build()
            .unwrap();

        assert_eq!(Duration::from_secs(130), definition.profile().planned_duration());
        assert_eq!(30, definition.profile().max_vus());
        assert_eq!(2, definition.thresholds().len());
        assert_eq!(RampPolicy::Linear, definition.ramp_policy());
    }

    #[test]
    fn constant_definition() {
        let definition = builder().with_constant_vus(10, "1m").build().unwrap();

        assert_eq!(
            &LoadProfile::Constant {
                vus: 10,
                duration: Duration::from_secs(60)
            },
            definition.profile()
        );
    }

    #[test]
    fn every_problem_is_reported() {
        let err = builder()
            .with_stage("-5s", 10)
            .with_stage("10s", -1)
            .with_threshold("http_req_size", "avg<10")
            .with_threshold("http_req_duration", "p(95)=800")
            .build()
            .err()
            .unwrap();

        assert_eq!(4, err.problems().len(), "{err}");
        assert!(err.problems()[0].contains("negative"));
        assert!(err.problems()[1].contains("must not be negative"));
        assert!(err.problems()[2].contains("unknown metric"));
    }

    #[test]
    fn overlong_stage_is_a_problem() {
        let err = builder()
            .with_stage("9999999999999999h", 5)
            .build()
            .err()
            .unwrap();

        assert_eq!(1, err.problems().len(), "{err}");
        assert!(err.problems()[0].contains("too long"));
    }

    #[test]
    fn mixed_profiles_are_rejected() {
        let err = builder()
            .with_stage("10s", 5)
            .with_constant_vus(10, "1m")
            .build()
            .err()
            .unwrap();

        assert_eq!(1, err.problems().len());
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let mut cli = cli();
        cli.base_url = "localhost:8000/api".to_string();

        let err = ScenarioDefinitionBuilder::<Values, Values>::new("bad_url", cli)
            .use_script(script)
            .build()
            .err()
            .unwrap();

        assert!(err.problems()[0].contains("base url"), "{err}");
    }

    #[test]
    fn script_is_required() {
        let err = ScenarioDefinitionBuilder::<Values, Values>::new("no_script", cli())
            .build()
            .err()
            .unwrap();

        assert!(err.problems()[0].contains("use_script"));
    }

    #[test]
    fn empty_profile_is_valid() {
        let definition = builder().build().unwrap();

        assert_eq!(Duration::ZERO, definition.profile().planned_duration());
    }
}

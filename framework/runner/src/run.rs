use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use stampede_core::prelude::{ShutdownHandle, ThresholdBreach};
use stampede_instruments::{print_summary, Reporter, RunMetrics};
use stampede_summary_model::{append_run_summary, RunSummary, ThresholdSummary};

use crate::context::{RunnerContext, UserValuesConstraint};
use crate::definition::{ScenarioDefinition, ScenarioDefinitionBuilder};
use crate::executor::Executor;
use crate::monitor::start_monitor;
use crate::pool::VuPool;
use crate::progress::start_progress;
use crate::shutdown::start_shutdown_listener;
use crate::threshold::{evaluate_thresholds, ThresholdVerdict};

/// Process exit status when at least one threshold was breached.
pub const THRESHOLD_BREACH_EXIT_CODE: u8 = 99;

const TICK: Duration = Duration::from_millis(10);

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub metrics: RunMetrics,
    pub verdicts: Vec<ThresholdVerdict>,
}

impl RunOutcome {
    /// True if every threshold passed. A run without thresholds passes.
    pub fn passed(&self) -> bool {
        self.verdicts.iter().all(|v| v.passed)
    }

    pub fn breach(&self) -> Option<ThresholdBreach> {
        let breached = self
            .verdicts
            .iter()
            .filter(|v| !v.passed)
            .map(|v| format!("{} {}", v.metric, v.expression))
            .collect::<Vec<_>>();

        (!breached.is_empty()).then(|| ThresholdBreach::new(breached))
    }

    pub fn exit_status(&self) -> u8 {
        if self.passed() {
            0
        } else {
            THRESHOLD_BREACH_EXIT_CODE
        }
    }

    /// The exit code to return from a scenario's `main`.
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}

/// Run a scenario to completion.
///
/// Fails only if the definition is invalid, the run setup hook fails or the runner itself cannot
/// start. Failed requests, checks and thresholds are reported in the returned [RunOutcome].
pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV, V>,
) -> anyhow::Result<RunOutcome> {
    let definition = definition.build()?;

    log::info!("Running scenario: {}", definition.name);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime);
    let executor = Arc::new(Executor::new(runtime, shutdown_handle.clone()));
    let reporter = Arc::new(Reporter::new());
    let mut runner_context = RunnerContext::new(
        executor,
        reporter.clone(),
        shutdown_handle.clone(),
        definition.cli.base_url.clone(),
    );

    let started_at = chrono::Utc::now().timestamp();

    if let Some(setup_fn) = definition.setup_fn {
        setup_fn(&mut runner_context)?;
    }

    let runner_context = Arc::new(runner_context);

    let mut pool = VuPool::new(
        runner_context.clone(),
        definition.vu_hooks,
        definition.profile.iterations_per_vu(),
    );

    // Separate from the run's own shutdown handle so that these stop when the virtual users have
    // stopped, not when stopping begins.
    let run_finished = ShutdownHandle::new();
    let planned_duration = definition.profile.planned_duration();
    if !definition.cli.no_progress && !planned_duration.is_zero() {
        start_progress(planned_duration, pool.gauge(), run_finished.new_listener());
    }
    start_monitor(run_finished.new_listener());

    let run_started = Instant::now();
    let scheduled = drive(&definition, &mut pool, &shutdown_handle, run_started);

    log::info!("Stopping {} virtual users", pool.active());
    pool.stop_all(definition.stop_policy);
    let run_duration = run_started.elapsed();
    run_finished.shutdown();

    if let Some(teardown_fn) = definition.teardown_fn {
        // Don't crash the runner if the teardown fails. We still want the reporting to happen
        // cleanly. The hook is documented as 'best effort'.
        if let Err(e) = teardown_fn(runner_context.clone()) {
            log::error!("Teardown failed: {:?}", e);
        }
    }

    scheduled?;

    let metrics = reporter.metrics(run_duration);
    let verdicts = evaluate_thresholds(&definition.thresholds, &metrics);

    print_summary(
        &definition.name,
        &metrics,
        &verdicts
            .iter()
            .map(ThresholdVerdict::to_row)
            .collect::<Vec<_>>(),
    );

    let summary = summarize(
        &definition,
        &runner_context,
        started_at,
        run_duration,
        pool.peak(),
        &metrics,
        &verdicts,
    );

    if let Some(path) = &definition.cli.summary_file {
        match append_run_summary(&summary, path.clone()) {
            Ok(()) => log::info!("Run summary appended to {}", path.display()),
            Err(e) => log::error!("Failed to write run summary to {}: {e:?}", path.display()),
        }
    }

    let outcome = RunOutcome {
        summary,
        metrics,
        verdicts,
    };

    match outcome.breach() {
        Some(breach) => log::warn!("{breach}"),
        None => log::info!("All thresholds passed"),
    }

    Ok(outcome)
}

/// Follow the load profile until it finishes, every virtual user has finished on its own, or the
/// run is stopped.
fn drive<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: &ScenarioDefinition<RV, V>,
    pool: &mut VuPool<RV, V>,
    shutdown_handle: &ShutdownHandle,
    run_started: Instant,
) -> anyhow::Result<()> {
    let profile = &definition.profile;
    let stages = profile.stages();
    let mut current_stage = None;

    loop {
        if shutdown_handle.is_shutdown() {
            log::info!("Run stopped before its load profile finished");
            return Ok(());
        }

        let elapsed = run_started.elapsed();
        let Some(target) = profile.target_at(elapsed, definition.ramp_policy) else {
            log::info!("Load profile finished after {:.1}s", elapsed.as_secs_f64());
            return Ok(());
        };

        let stage = profile.stage_at(elapsed);
        if stage != current_stage {
            if let Some(index) = stage {
                log::info!(
                    "Stage {} of {}: {} virtual users over {:?}",
                    index + 1,
                    stages.len(),
                    stages[index].target,
                    stages[index].duration
                );
            }
            current_stage = stage;
        }

        pool.reap();
        pool.scale_to(target, definition.stop_policy)?;

        if profile.iterations_per_vu().is_some() && pool.all_finished() {
            log::info!("Every virtual user completed its iterations");
            return Ok(());
        }

        std::thread::sleep(TICK);
    }
}

fn summarize<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: &ScenarioDefinition<RV, V>,
    runner_context: &RunnerContext<RV>,
    started_at: i64,
    run_duration: Duration,
    peak_vus: usize,
    metrics: &RunMetrics,
    verdicts: &[ThresholdVerdict],
) -> RunSummary {
    let run_id = definition
        .cli
        .run_id
        .clone()
        .unwrap_or_else(|| nanoid::nanoid!());

    let mut summary = RunSummary::new(
        run_id,
        definition.name.clone(),
        started_at,
        definition.profile.planned_duration().as_secs(),
        definition
            .profile
            .stages()
            .iter()
            .map(|stage| (stage.duration.as_millis() as u64, stage.target))
            .collect(),
        env!("CARGO_PKG_VERSION").to_string(),
    );

    summary.add_env("BASE_URL".to_string(), definition.cli.base_url.clone());
    for (key, value) in runner_context.captured_env() {
        summary.add_env(key, value);
    }

    summary.actual_duration = run_duration.as_secs_f64();
    summary.peak_vus = peak_vus;
    summary.http_reqs = metrics.http_reqs.count;
    summary.http_reqs_failed = metrics.http_req_failed.matched;
    summary.checks_passed = metrics.checks.matched;
    summary.checks_failed = metrics.checks.unmatched();
    summary.iterations = metrics.iterations.count;
    summary.thresholds = verdicts
        .iter()
        .map(|verdict| ThresholdSummary {
            metric: verdict.metric.clone(),
            expression: verdict.expression.clone(),
            observed: verdict.observed,
            passed: verdict.passed,
        })
        .collect();

    summary
}

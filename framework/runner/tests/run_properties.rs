use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use stampede_runner::prelude::{
    evaluate_thresholds, run, ConfigError, HookResult, RampPolicy, ScenarioCli,
    ScenarioDefinitionBuilder, StopPolicy, Threshold, UserValuesConstraint, VuContext,
    THRESHOLD_BREACH_EXIT_CODE,
};

#[derive(Default, Debug)]
struct Values;

impl UserValuesConstraint for Values {}

type Ctx = VuContext<Values, Values>;

fn cli() -> ScenarioCli {
    ScenarioCli {
        base_url: "http://localhost:8000".to_string(),
        no_progress: true,
        summary_file: None,
        run_id: None,
    }
}

fn builder(name: &str) -> ScenarioDefinitionBuilder<Values, Values> {
    ScenarioDefinitionBuilder::new(name, cli())
}

fn passing_check(ctx: &mut Ctx) -> HookResult {
    ctx.record_check("status 200", true);
    Ok(())
}

#[test]
fn empty_profile_finishes_with_no_data() {
    let started = Instant::now();

    let outcome = run(builder("empty_profile")
        .use_script(passing_check)
        .with_threshold("http_req_failed", "rate<0.01")
        .with_threshold("checks", "rate>0.99"))
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(0, outcome.metrics.checks.total);
    assert_eq!(0, outcome.summary.peak_vus);
    assert!(outcome.verdicts.iter().all(|v| v.passed && v.is_no_data()));
    assert_eq!(0, outcome.exit_status());
}

#[test]
fn zero_duration_stages_finish_immediately() {
    let outcome = run(builder("zero_duration_stages")
        .with_stages(&[("0s", 10), ("0ms", 20)])
        .use_script(passing_check)
        .with_threshold("http_req_duration", "p(95)<800"))
    .unwrap();

    assert_eq!(0, outcome.metrics.checks.total);
    assert_eq!(None, outcome.verdicts[0].observed);
    assert_eq!(0, outcome.exit_status());
}

#[test]
fn fixed_vus_and_iterations_record_every_check() {
    let outcome = run(builder("fixed_vus_and_iterations")
        .with_per_vu_iterations(10, 5)
        .use_script(passing_check)
        .with_threshold("checks", "rate>0.99")
        .with_threshold("iterations", "count>=50"))
    .unwrap();

    assert_eq!(50, outcome.metrics.checks.total);
    assert_eq!(50, outcome.metrics.checks.matched);
    assert_eq!(
        outcome.metrics.checks.total,
        outcome.metrics.checks.matched + outcome.metrics.checks.unmatched()
    );
    assert_eq!(50, outcome.summary.iterations);
    assert_eq!(10, outcome.summary.peak_vus);
    assert_eq!(0, outcome.exit_status());
}

#[test]
fn failed_checks_breach_threshold() {
    fn failing_check(ctx: &mut Ctx) -> HookResult {
        ctx.record_check("items non-empty", false);
        Ok(())
    }

    let outcome = run(builder("failed_checks_breach_threshold")
        .with_per_vu_iterations(2, 3)
        .use_script(failing_check)
        .with_threshold("checks", "rate>0.99"))
    .unwrap();

    assert!(!outcome.passed());
    assert_eq!(THRESHOLD_BREACH_EXIT_CODE, outcome.exit_status());
    assert_eq!(1, outcome.breach().unwrap().breached().len());
    assert_eq!(Some(0.0), outcome.verdicts[0].observed);
}

#[test]
fn evaluation_is_repeatable() {
    let outcome = run(builder("evaluation_is_repeatable")
        .with_per_vu_iterations(3, 4)
        .use_script(passing_check)
        .with_threshold("checks", "rate>0.99")
        .with_threshold("iteration_duration", "max<1000"))
    .unwrap();

    let thresholds = vec![
        Threshold::parse("checks", "rate>0.99").unwrap(),
        Threshold::parse("iteration_duration", "max<1000").unwrap(),
    ];

    let first = evaluate_thresholds(&thresholds, &outcome.metrics);
    let second = evaluate_thresholds(&thresholds, &outcome.metrics);

    assert_eq!(first, second);
    assert_eq!(outcome.verdicts, first);
}

static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);
static MAX_IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

#[test]
fn concurrency_never_exceeds_target() {
    fn tracked(ctx: &mut Ctx) -> HookResult {
        let now = IN_FLIGHT.fetch_add(1, Ordering::SeqCst) + 1;
        MAX_IN_FLIGHT.fetch_max(now, Ordering::SeqCst);
        let result = ctx.think(Duration::from_millis(20));
        IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
        result
    }

    let outcome = run(builder("concurrency_never_exceeds_target")
        .with_stages(&[("300ms", 3), ("300ms", 5), ("300ms", 0)])
        .with_ramp_policy(RampPolicy::Linear)
        .use_script(tracked))
    .unwrap();

    let max = MAX_IN_FLIGHT.load(Ordering::SeqCst);
    assert!(max <= 5, "{max} iterations were in flight at once");
    assert!(max > 0);
    assert!(outcome.summary.peak_vus <= 5);
    assert_eq!(0, IN_FLIGHT.load(Ordering::SeqCst));
}

static RAMP_IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);
static RAMP_MAX_IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

#[test]
fn ramping_back_up_waits_for_retiring_virtual_users() {
    fn outlasts_stages(ctx: &mut Ctx) -> HookResult {
        let now = RAMP_IN_FLIGHT.fetch_add(1, Ordering::SeqCst) + 1;
        RAMP_MAX_IN_FLIGHT.fetch_max(now, Ordering::SeqCst);
        let result = ctx.think(Duration::from_millis(800));
        RAMP_IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
        result
    }

    let outcome = run(builder("ramping_back_up_waits_for_retiring_virtual_users")
        .with_stages(&[("200ms", 5), ("100ms", 0), ("300ms", 5)])
        .with_ramp_policy(RampPolicy::Step)
        .use_script(outlasts_stages))
    .unwrap();

    let max = RAMP_MAX_IN_FLIGHT.load(Ordering::SeqCst);
    assert_eq!(5, max, "{max} iterations were in flight at once");
    assert_eq!(5, outcome.summary.peak_vus);
    assert_eq!(0, RAMP_IN_FLIGHT.load(Ordering::SeqCst));
}

#[test]
fn immediate_stop_discards_in_flight_iterations() {
    fn slow(ctx: &mut Ctx) -> HookResult {
        ctx.think(Duration::from_secs(30))?;
        ctx.record_check("finished", true);
        Ok(())
    }

    let started = Instant::now();
    let outcome = run(builder("immediate_stop_discards_in_flight_iterations")
        .with_constant_vus(3, "200ms")
        .with_stop_policy(StopPolicy::Immediate)
        .use_script(slow))
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(0, outcome.metrics.checks.total);
    assert_eq!(None, outcome.metrics.iterations.count());
}

#[test]
fn grace_period_lets_iterations_finish() {
    fn slow(ctx: &mut Ctx) -> HookResult {
        ctx.think(Duration::from_millis(300))?;
        ctx.record_check("finished", true);
        Ok(())
    }

    let outcome = run(builder("grace_period_lets_iterations_finish")
        .with_constant_vus(2, "100ms")
        .with_graceful_stop("5s")
        .use_script(slow))
    .unwrap();

    assert_eq!(2, outcome.metrics.checks.total);
    assert_eq!(Some(2.0), outcome.metrics.iterations.count());
}

#[test]
fn invalid_definition_is_a_config_error() {
    let err = run(builder("invalid_definition")
        .with_stage("-10s", 5)
        .with_threshold("http_req_waiting", "p(95)<100")
        .use_script(passing_check))
    .unwrap_err();

    let config_error = err.downcast_ref::<ConfigError>().unwrap();
    assert_eq!(2, config_error.problems().len());
}

#[test]
fn summary_is_appended_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runs.jsonl");

    let mut cli = cli();
    cli.summary_file = Some(path.clone());
    cli.run_id = Some("summary-test".to_string());

    let outcome = run(
        ScenarioDefinitionBuilder::<Values, Values>::new("summary_is_appended_to_file", cli)
            .with_per_vu_iterations(1, 2)
            .use_script(passing_check)
            .with_threshold("checks", "rate>0.99"),
    )
    .unwrap();

    let runs = stampede_summary_model::load_summary_runs(path).unwrap();
    assert_eq!(1, runs.len());
    assert_eq!(outcome.summary.fingerprint(), runs[0].fingerprint());
    assert_eq!("summary-test", runs[0].run_id);
    assert_eq!(2, runs[0].checks_passed);
    assert!(runs[0].passed());
    assert_eq!(
        Some(&"http://localhost:8000".to_string()),
        runs[0].env.get("BASE_URL")
    );
}

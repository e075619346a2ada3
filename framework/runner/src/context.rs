use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use stampede_core::prelude::{AssertionFailure, DelegatedShutdownListener, ShutdownHandle};
use stampede_instruments::{Check, CheckResult, HttpOutcome, IterationRecord, Reporter};

use crate::executor::Executor;

pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

/// State shared by the whole run: the executor, the metric stream and the resolved configuration.
///
/// Created once when the run starts. The run setup hook gets mutable access to it, after that it
/// is shared read-only with every virtual user.
#[derive(Debug)]
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    reporter: Arc<Reporter>,
    shutdown_handle: ShutdownHandle,
    base_url: String,
    env: Mutex<BTreeMap<String, String>>,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        reporter: Arc<Reporter>,
        shutdown_handle: ShutdownHandle,
        base_url: String,
    ) -> Self {
        Self {
            executor,
            reporter,
            shutdown_handle,
            base_url,
            env: Mutex::new(BTreeMap::new()),
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn reporter(&self) -> Arc<Reporter> {
        self.reporter.clone()
    }

    /// Base URL of the service under test, as given by `--base-url` or `BASE_URL`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Read an environment variable, falling back to `default` if it is unset or not valid
    /// unicode. The resolved value is recorded in the run summary.
    pub fn capture_env(&self, key: &str, default: &str) -> String {
        let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
        log::debug!("Using {key}={value}");
        self.env.lock().insert(key.to_string(), value.clone());
        value
    }

    pub(crate) fn captured_env(&self) -> BTreeMap<String, String> {
        self.env.lock().clone()
    }

    /// End the run early, as if its load profile had finished. Virtual users are stopped with the
    /// configured stop policy.
    pub fn force_stop_scenario(&self) {
        log::info!("Scenario stop requested");
        self.shutdown_handle.shutdown();
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// The context a request script runs in, one per virtual user.
pub struct VuContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    vu_index: usize,
    vu_id: String,
    iteration: u64,
    runner_context: Arc<RunnerContext<RV>>,
    cancel_listener: DelegatedShutdownListener,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VuContext<RV, V> {
    pub(crate) fn new(
        vu_index: usize,
        runner_context: Arc<RunnerContext<RV>>,
        cancel_listener: DelegatedShutdownListener,
    ) -> Self {
        Self {
            vu_index,
            vu_id: format!("vu-{vu_index}"),
            iteration: 0,
            runner_context,
            cancel_listener,
            value: Default::default(),
        }
    }

    /// Ordinal of this virtual user, starting at 0. Indexes are never reused within a run.
    pub fn vu_index(&self) -> usize {
        self.vu_index
    }

    pub fn vu_id(&self) -> &str {
        &self.vu_id
    }

    /// Index of the iteration that is running, starting at 0 for each virtual user.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub(crate) fn set_iteration(&mut self, iteration: u64) {
        self.iteration = iteration;
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_listener.should_shutdown()
    }

    /// Run async code on the shared runtime, blocking this virtual user until it completes.
    ///
    /// The future is dropped if this virtual user is cancelled, and a
    /// [stampede_core::prelude::ShutdownSignalError] is returned. Anything the future had not yet
    /// recorded is lost, which is how cancelled requests are kept out of the metrics.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        self.runner_context
            .executor()
            .execute_in_place_until(fut, self.cancel_listener.clone())
    }

    /// Pause this virtual user. Other virtual users keep running, and the pause ends early with
    /// an error if this virtual user is cancelled.
    pub fn think(&self, duration: Duration) -> anyhow::Result<()> {
        self.execute_in_place(async move {
            tokio::time::sleep(duration).await;
            Ok(())
        })
    }

    /// Evaluate every check against `subject` and record the results. Returns true if they all
    /// passed.
    pub fn check<T: ?Sized>(&self, subject: &T, checks: &[&dyn Check<T>]) -> bool {
        checks
            .iter()
            .map(|check| {
                let passed = check.evaluate(subject);
                self.record_check(check.name(), passed);
                passed
            })
            .fold(true, |all, passed| all && passed)
    }

    /// Like [VuContext::check] but fails with the first check that did not pass, so the rest of
    /// the iteration can be skipped with `?`. Every check is still evaluated and recorded.
    pub fn require<T: ?Sized>(
        &self,
        subject: &T,
        checks: &[&dyn Check<T>],
    ) -> Result<(), AssertionFailure> {
        let mut first_failure = None;
        for check in checks {
            let passed = check.evaluate(subject);
            self.record_check(check.name(), passed);
            if !passed && first_failure.is_none() {
                first_failure = Some(check.name().to_string());
            }
        }

        match first_failure {
            Some(name) => Err(AssertionFailure::new(name)),
            None => Ok(()),
        }
    }

    /// Record a check that was evaluated outside of [VuContext::check].
    pub fn record_check(&self, name: &str, passed: bool) {
        if self.is_cancelled() {
            return;
        }
        self.runner_context
            .reporter
            .add_check(CheckResult::new(name, passed, self.vu_index));
    }

    pub fn record_http_outcome(&self, outcome: HttpOutcome) {
        if self.is_cancelled() {
            return;
        }
        self.runner_context.reporter.add_http_outcome(outcome);
    }

    pub(crate) fn record_iteration(&self, duration: Duration, failed: bool) {
        if self.is_cancelled() {
            return;
        }
        self.runner_context.reporter.add_iteration(IterationRecord {
            vu: self.vu_index,
            iteration: self.iteration,
            duration,
            failed,
        });
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct Values;

    impl UserValuesConstraint for Values {}

    /// A runner context on a small runtime, and one virtual user with its cancel handle.
    pub(crate) fn contexts() -> (
        Arc<RunnerContext<Values>>,
        VuContext<Values, Values>,
        ShutdownHandle,
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let run_handle = ShutdownHandle::new();
        let runner_context = Arc::new(RunnerContext::new(
            Arc::new(Executor::new(runtime, run_handle.clone())),
            Arc::new(Reporter::new()),
            run_handle,
            "http://localhost:8000".to_string(),
        ));
        let cancel = ShutdownHandle::new();
        let vu = VuContext::new(3, runner_context.clone(), cancel.new_listener());
        (runner_context, vu, cancel)
    }
}

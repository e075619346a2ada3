use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context;
use stampede_core::prelude::{DelegatedShutdownListener, ShutdownHandle};

use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
use crate::definition::VuHooks;
use crate::harness::{run_iteration, IterationEnd};
use crate::stage::StopPolicy;

/// How long a cancelled virtual user gets to unwind before its thread is abandoned.
const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct VuHandle {
    index: usize,
    /// Raised to stop starting new iterations.
    stop: ShutdownHandle,
    /// Raised to abandon the iteration in flight.
    cancel: ShutdownHandle,
    thread: JoinHandle<()>,
    cancel_at: Option<Instant>,
    cancelled_at: Option<Instant>,
}

impl VuHandle {
    fn retire(&mut self, stop_policy: StopPolicy) {
        self.stop.shutdown();
        match stop_policy {
            StopPolicy::Immediate => self.cancel(),
            StopPolicy::Graceful { grace_period } => {
                self.cancel_at = Some(Instant::now() + grace_period);
            }
        }
    }

    fn cancel(&mut self) {
        if self.cancelled_at.is_none() {
            self.cancel.shutdown();
            self.cancelled_at = Some(Instant::now());
        }
    }
}

/// The virtual users of a run.
///
/// Running virtual users, active or retiring, never exceed the last target passed to
/// [VuPool::scale_to]. A retiring virtual user keeps its slot until its thread has finished, and a
/// virtual user that finished on its own, because it bailed or ran all of its iterations, keeps
/// its slot so that it is not replaced.
pub(crate) struct VuPool<RV: UserValuesConstraint, V: UserValuesConstraint> {
    runner_context: Arc<RunnerContext<RV>>,
    hooks: VuHooks<RV, V>,
    iterations_per_vu: Option<u64>,
    active: Vec<VuHandle>,
    retiring: Vec<VuHandle>,
    next_index: usize,
    peak: usize,
    gauge: Arc<AtomicUsize>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VuPool<RV, V> {
    pub(crate) fn new(
        runner_context: Arc<RunnerContext<RV>>,
        hooks: VuHooks<RV, V>,
        iterations_per_vu: Option<u64>,
    ) -> Self {
        Self {
            runner_context,
            hooks,
            iterations_per_vu,
            active: Vec::new(),
            retiring: Vec::new(),
            next_index: 0,
            peak: 0,
            gauge: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn active(&self) -> usize {
        self.active.len()
    }

    /// The highest number of running virtual users seen so far, retiring ones included.
    pub(crate) fn peak(&self) -> usize {
        self.peak
    }

    /// Live count of running virtual users, for display.
    pub(crate) fn gauge(&self) -> Arc<AtomicUsize> {
        self.gauge.clone()
    }

    /// Start or retire virtual users until `target` are active. The most recently started are
    /// retired first. New virtual users are only started once retiring ones have left room for
    /// them.
    pub(crate) fn scale_to(&mut self, target: usize, stop_policy: StopPolicy) -> anyhow::Result<()> {
        while self.active.len() > target {
            if let Some(mut vu) = self.active.pop() {
                log::debug!("Retiring vu-{}", vu.index);
                vu.retire(stop_policy);
                self.retiring.push(vu);
            }
        }

        while self.running() < target {
            let vu = self.spawn()?;
            self.active.push(vu);
        }

        self.update_counts();

        Ok(())
    }

    /// Virtual users holding a slot, including retiring ones that are still finishing.
    fn running(&self) -> usize {
        self.active.len() + self.retiring.len()
    }

    fn update_counts(&mut self) {
        self.peak = self.peak.max(self.running());
        self.gauge.store(self.running(), Ordering::Relaxed);
    }

    /// Cancel retiring virtual users whose grace period is over and collect the ones that have
    /// finished.
    pub(crate) fn reap(&mut self) {
        let now = Instant::now();
        let mut still_retiring = Vec::with_capacity(self.retiring.len());

        for mut vu in self.retiring.drain(..) {
            if vu.thread.is_finished() {
                join(vu);
                continue;
            }

            match (vu.cancel_at, vu.cancelled_at) {
                (Some(cancel_at), None) if now >= cancel_at => {
                    log::debug!("Grace period over for vu-{}, cancelling", vu.index);
                    vu.cancel();
                    still_retiring.push(vu);
                }
                (_, Some(cancelled_at)) if now.duration_since(cancelled_at) >= CANCEL_TIMEOUT => {
                    log::warn!(
                        "vu-{} did not stop within {:?} of being cancelled, leaving it behind",
                        vu.index,
                        CANCEL_TIMEOUT
                    );
                }
                _ => still_retiring.push(vu),
            }
        }

        self.retiring = still_retiring;
        self.update_counts();
    }

    /// True once every virtual user, active or retiring, has finished running.
    pub(crate) fn all_finished(&self) -> bool {
        self.active
            .iter()
            .chain(self.retiring.iter())
            .all(|vu| vu.thread.is_finished())
    }

    /// Retire every virtual user with `stop_policy` and wait for them to finish.
    pub(crate) fn stop_all(&mut self, stop_policy: StopPolicy) {
        while let Some(mut vu) = self.active.pop() {
            vu.retire(stop_policy);
            self.retiring.push(vu);
        }

        while !self.retiring.is_empty() {
            self.reap();
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn spawn(&mut self) -> anyhow::Result<VuHandle> {
        let index = self.next_index;
        self.next_index += 1;

        let stop = ShutdownHandle::new();
        let cancel = ShutdownHandle::new();

        let runner_context = self.runner_context.clone();
        let hooks = self.hooks;
        let iterations = self.iterations_per_vu;
        let stop_listener = stop.new_listener();
        let cancel_listener = cancel.new_listener();

        let thread = std::thread::Builder::new()
            .name(format!("vu-{index}"))
            .spawn(move || {
                vu_loop(
                    index,
                    runner_context,
                    hooks,
                    iterations,
                    stop_listener,
                    cancel_listener,
                )
            })
            .with_context(|| format!("Failed to spawn thread for vu-{index}"))?;

        log::debug!("Started vu-{index}");

        Ok(VuHandle {
            index,
            stop,
            cancel,
            thread,
            cancel_at: None,
            cancelled_at: None,
        })
    }
}

fn join(vu: VuHandle) {
    if let Err(e) = vu.thread.join() {
        log::error!("vu-{} panicked outside of an iteration: {:?}", vu.index, e);
    }
}

fn vu_loop<RV: UserValuesConstraint, V: UserValuesConstraint>(
    index: usize,
    runner_context: Arc<RunnerContext<RV>>,
    hooks: VuHooks<RV, V>,
    iterations: Option<u64>,
    stop_listener: DelegatedShutdownListener,
    cancel_listener: DelegatedShutdownListener,
) {
    let mut context = VuContext::new(index, runner_context, cancel_listener);
    let vu_id = context.vu_id().to_string();

    if let Some(setup_vu_fn) = hooks.setup {
        if let Err(e) = setup_vu_fn(&mut context) {
            log::error!("Virtual user setup failed for {vu_id}: {e:?}");
            return;
        }
    }

    let mut iteration = 0;
    loop {
        if stop_listener.should_shutdown() || context.is_cancelled() {
            log::debug!("Stopping {vu_id} after {iteration} iterations");
            break;
        }
        if iterations.is_some_and(|limit| iteration >= limit) {
            log::debug!("{vu_id} completed its {iteration} iterations");
            break;
        }

        context.set_iteration(iteration);
        match run_iteration(hooks.script, &mut context) {
            IterationEnd::Completed | IterationEnd::Failed => {}
            IterationEnd::Cancelled => {
                log::debug!("Iteration {iteration} of {vu_id} was cancelled");
                break;
            }
            IterationEnd::Bailed(reason) => {
                log::info!("{vu_id} bailed: {reason}");
                break;
            }
        }

        iteration += 1;
    }

    if let Some(teardown_vu_fn) = hooks.teardown {
        if let Err(e) = teardown_vu_fn(&mut context) {
            log::error!("Virtual user teardown failed for {vu_id}: {e:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::{contexts, Values};
    use crate::definition::HookResult;

    type Ctx = VuContext<Values, Values>;

    fn hooks(script: fn(&mut Ctx) -> HookResult) -> VuHooks<Values, Values> {
        VuHooks {
            setup: None,
            script,
            teardown: None,
        }
    }

    fn spin(ctx: &mut Ctx) -> HookResult {
        ctx.think(Duration::from_millis(5))
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    #[test]
    fn scale_up_and_down() {
        let (runner_context, _vu, _cancel) = contexts();
        let mut pool = VuPool::new(runner_context, hooks(spin), None);

        pool.scale_to(4, StopPolicy::Immediate).unwrap();
        assert_eq!(4, pool.active());

        pool.scale_to(1, StopPolicy::Immediate).unwrap();
        assert_eq!(1, pool.active());
        // The first virtual user survives, later ones are retired first.
        assert_eq!(0, pool.active[0].index);

        wait_until(|| {
            pool.reap();
            pool.retiring.is_empty()
        });
        pool.scale_to(3, StopPolicy::Immediate).unwrap();
        // Indexes are not reused.
        assert_eq!(vec![0, 4, 5], pool.active.iter().map(|vu| vu.index).collect::<Vec<_>>());
        assert_eq!(4, pool.peak());

        pool.stop_all(StopPolicy::Immediate);
        assert!(pool.all_finished());
        assert_eq!(0, pool.gauge().load(Ordering::Relaxed));
    }

    #[test]
    fn retiring_virtual_users_keep_their_slot() {
        fn slow(ctx: &mut Ctx) -> HookResult {
            ctx.think(Duration::from_millis(300))
        }

        let (runner_context, _vu, _cancel) = contexts();
        let mut pool = VuPool::new(runner_context, hooks(slow), None);
        let graceful = StopPolicy::Graceful {
            grace_period: Duration::from_secs(5),
        };

        pool.scale_to(2, graceful).unwrap();
        pool.scale_to(0, graceful).unwrap();
        assert_eq!(0, pool.active());
        assert_eq!(2, pool.running());

        // Both slots are still held by virtual users finishing their iteration.
        pool.scale_to(2, graceful).unwrap();
        assert_eq!(0, pool.active());
        assert_eq!(2, pool.running());

        wait_until(|| {
            pool.reap();
            pool.retiring.is_empty()
        });
        pool.scale_to(2, graceful).unwrap();
        assert_eq!(vec![2, 3], pool.active.iter().map(|vu| vu.index).collect::<Vec<_>>());
        assert_eq!(2, pool.peak());

        pool.stop_all(StopPolicy::Immediate);
    }

    #[test]
    fn per_vu_iterations_finish_on_their_own() {
        fn count(ctx: &mut Ctx) -> HookResult {
            ctx.record_check("ran", true);
            Ok(())
        }

        let (runner_context, _vu, _cancel) = contexts();
        let mut pool = VuPool::new(runner_context.clone(), hooks(count), Some(5));

        pool.scale_to(3, StopPolicy::default()).unwrap();
        wait_until(|| pool.all_finished());

        // Finished virtual users keep their slot and are not replaced.
        pool.scale_to(3, StopPolicy::default()).unwrap();
        assert_eq!(3, pool.active());
        pool.stop_all(StopPolicy::default());

        let metrics = runner_context.reporter().metrics(Duration::from_secs(1));
        assert_eq!(15, metrics.checks.total);
        assert_eq!(Some(15.0), metrics.iterations.count());
    }

    #[test]
    fn graceful_retire_lets_iteration_finish() {
        fn slow(ctx: &mut Ctx) -> HookResult {
            ctx.think(Duration::from_millis(200))?;
            ctx.record_check("slow", true);
            Ok(())
        }

        let (runner_context, _vu, _cancel) = contexts();
        let mut pool = VuPool::new(runner_context.clone(), hooks(slow), None);

        pool.scale_to(1, StopPolicy::default()).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        pool.stop_all(StopPolicy::Graceful {
            grace_period: Duration::from_secs(5),
        });

        let metrics = runner_context.reporter().metrics(Duration::from_secs(1));
        assert_eq!(1, metrics.checks.total);
        assert_eq!(Some(1.0), metrics.iterations.count());
    }

    #[test]
    fn grace_period_expiry_cancels_iteration() {
        fn stuck(ctx: &mut Ctx) -> HookResult {
            ctx.think(Duration::from_secs(60))?;
            ctx.record_check("never", true);
            Ok(())
        }

        let (runner_context, _vu, _cancel) = contexts();
        let mut pool = VuPool::new(runner_context.clone(), hooks(stuck), None);

        pool.scale_to(2, StopPolicy::default()).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        pool.stop_all(StopPolicy::Graceful {
            grace_period: Duration::from_millis(100),
        });

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(runner_context.reporter().is_empty());
    }
}

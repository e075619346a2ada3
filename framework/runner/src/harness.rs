use std::panic::AssertUnwindSafe;
use std::time::Instant;

use stampede_core::prelude::{AssertionFailure, RequestError, ShutdownSignalError, VuBailError};

use crate::context::{UserValuesConstraint, VuContext};
use crate::definition::VuHookMut;

/// Name of the check recorded when an iteration fails for a reason that was not already recorded.
pub(crate) const ITERATION_CHECK: &str = "iteration";

#[derive(Debug, PartialEq)]
pub(crate) enum IterationEnd {
    Completed,
    Failed,
    /// Cut short by cancellation. Nothing about the iteration is recorded.
    Cancelled,
    /// The script retired its own virtual user.
    Bailed(String),
}

/// Run one iteration of the script, turning anything it raises into recorded metrics rather than
/// letting it escape the virtual user.
pub(crate) fn run_iteration<RV: UserValuesConstraint, V: UserValuesConstraint>(
    script: VuHookMut<RV, V>,
    ctx: &mut VuContext<RV, V>,
) -> IterationEnd {
    let started = Instant::now();
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| script(ctx)));

    let failed = match result {
        Ok(Ok(())) => false,
        Ok(Err(e)) if e.is::<ShutdownSignalError>() => return IterationEnd::Cancelled,
        Ok(Err(e)) if e.is::<VuBailError>() => return IterationEnd::Bailed(e.to_string()),
        Ok(Err(_)) | Err(_) if ctx.is_cancelled() => return IterationEnd::Cancelled,
        Ok(Err(e)) => {
            if e.is::<RequestError>() || e.is::<AssertionFailure>() {
                // Already recorded as a failed request or check.
                log::debug!("Iteration {} of {} failed: {e}", ctx.iteration(), ctx.vu_id());
            } else {
                log::error!(
                    "Iteration {} of {} failed: {e:?}",
                    ctx.iteration(),
                    ctx.vu_id()
                );
                ctx.record_check(ITERATION_CHECK, false);
            }
            true
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!(
                "Iteration {} of {} panicked: {message}",
                ctx.iteration(),
                ctx.vu_id()
            );
            ctx.record_check(ITERATION_CHECK, false);
            true
        }
    };

    ctx.record_iteration(started.elapsed(), failed);

    if failed {
        IterationEnd::Failed
    } else {
        IterationEnd::Completed
    }
}

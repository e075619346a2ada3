use std::future::Future;

use stampede_core::prelude::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};

/// The shared Tokio runtime that every virtual user thread drives its async work on.
#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    shutdown_handle: ShutdownHandle,
}

impl Executor {
    pub(crate) fn new(runtime: tokio::runtime::Runtime, shutdown_handle: ShutdownHandle) -> Self {
        Self {
            runtime,
            shutdown_handle,
        }
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// Note that the future will be cancelled if the run is stopped. You do not need to do
    /// anything special to handle this, but you should be aware that submitting a future which
    /// does not support cancelling may prevent the runner from shutting down.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        self.execute_in_place_until(fut, self.shutdown_handle.new_listener())
    }

    /// Run async code in place, cancelling it when `listener` observes its shutdown signal.
    ///
    /// A cancelled future is dropped at its current suspension point and a
    /// [ShutdownSignalError] is returned in its place.
    pub fn execute_in_place_until<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
        mut listener: DelegatedShutdownListener,
    ) -> anyhow::Result<T> {
        if listener.should_shutdown() {
            return Err(ShutdownSignalError::default().into());
        }

        self.runtime.block_on(async move {
            tokio::select! {
                biased;
                _ = listener.wait_for_shutdown() => {
                    Err(anyhow::anyhow!(ShutdownSignalError::default()))
                },
                result = fut => result,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn executor() -> (Executor, ShutdownHandle) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let handle = ShutdownHandle::new();
        (Executor::new(runtime, handle.clone()), handle)
    }

    #[test]
    fn completes_when_not_cancelled() {
        let (executor, _handle) = executor();

        let value = executor.execute_in_place(async { Ok(42) }).unwrap();

        assert_eq!(42, value);
    }

    #[test]
    fn cancels_pending_future() {
        let (executor, handle) = executor();
        let cancel = ShutdownHandle::new();

        let raiser = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            raiser.shutdown();
        });

        let result = executor.execute_in_place_until(
            async {
                std::future::pending::<()>().await;
                Ok(())
            },
            cancel.new_listener(),
        );

        let err = result.unwrap_err();
        assert!(err.is::<ShutdownSignalError>());
        // Cancelling one listener does not stop the run.
        assert!(!handle.is_shutdown());
    }

    #[test]
    fn does_not_start_once_cancelled() {
        let (executor, handle) = executor();
        handle.shutdown();

        let polled = std::sync::atomic::AtomicBool::new(false);
        let result = executor.execute_in_place(async {
            polled.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        });

        assert!(result.unwrap_err().is::<ShutdownSignalError>());
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }
}

use stampede_core::prelude::ShutdownHandle;
use tokio::signal;

/// Raise the returned handle when the process receives Ctrl-C.
pub(crate) fn start_shutdown_listener(runtime: &tokio::runtime::Runtime) -> ShutdownHandle {
    let handle = ShutdownHandle::default();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("Received shutdown signal, stopping virtual users...");
                listener_handle.shutdown();
            }
            Err(e) => {
                log::error!("Failed to listen for Ctrl-C, the run can only end on schedule: {e:?}");
            }
        }
    });

    handle
}

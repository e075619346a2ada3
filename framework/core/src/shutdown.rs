use std::sync::Arc;

use tokio::sync::watch::{Receiver, Sender};

/// A one-way stop signal.
///
/// Once [ShutdownHandle::shutdown] has been called the signal stays raised, so listeners created
/// after the fact, or listeners that check more than once, all observe it.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: Arc::new(tokio::sync::watch::channel(false).0),
        }
    }

    pub fn shutdown(&self) {
        let previous = self.sender.send_replace(true);
        if !previous {
            log::trace!("Shutdown signal raised");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: Receiver<bool>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// Point in time check if the shutdown signal has been raised. If this returns true then work
    /// should be stopped.
    ///
    /// A listener whose handle has been dropped reports true, nobody is left to stop it otherwise.
    pub fn should_shutdown(&self) -> bool {
        *self.receiver.borrow() || self.receiver.has_changed().is_err()
    }

    /// Wait for the shutdown signal to be raised. Returns immediately if it already has been. It
    /// is safe to race this with another future so that the signal cancels work in progress.
    pub async fn wait_for_shutdown(&mut self) {
        if self.receiver.wait_for(|raised| *raised).await.is_err() {
            log::trace!("Shutdown handle dropped while waiting, treating as shutdown");
        }
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ShutdownSignalError {
    msg: String,
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self {
            msg: "Execution cancelled by shutdown signal".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn signal_is_sticky() {
        let handle = ShutdownHandle::new();
        let listener = handle.new_listener();
        assert!(!listener.should_shutdown());

        handle.shutdown();
        assert!(listener.should_shutdown());
        assert!(listener.should_shutdown());

        // Listeners created after the signal was raised see it too.
        assert!(handle.new_listener().should_shutdown());
    }

    #[test]
    fn dropped_handle_reads_as_shutdown() {
        let handle = ShutdownHandle::new();
        let listener = handle.new_listener();
        drop(handle);

        assert!(listener.should_shutdown());
    }

    #[tokio::test]
    async fn wait_returns_once_raised() {
        let handle = ShutdownHandle::new();
        let mut listener = handle.new_listener();

        let raiser = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            raiser.shutdown();
        });

        tokio::time::timeout(Duration::from_secs(5), listener.wait_for_shutdown())
            .await
            .expect("listener was not woken by the shutdown signal");

        // A second wait on the same listener does not hang.
        tokio::time::timeout(Duration::from_secs(5), listener.wait_for_shutdown())
            .await
            .expect("second wait did not return");
    }
}

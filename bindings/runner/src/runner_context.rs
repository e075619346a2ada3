use std::sync::Arc;

use http_client_instrumented::prelude::Transport;
use stampede_runner::prelude::UserValuesConstraint;

#[derive(Default, Debug)]
pub struct HttpRunnerContext {
    transport: Option<Arc<dyn Transport>>,
}

impl UserValuesConstraint for HttpRunnerContext {}

impl HttpRunnerContext {
    /// The transport shared by every virtual user, if one has been configured.
    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.clone()
    }

    pub fn set_transport(&mut self, transport: Arc<dyn Transport>) {
        self.transport = Some(transport);
    }
}

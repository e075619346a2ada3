use anyhow::Context;
use http_client_instrumented::prelude::HttpClient;
use stampede_runner::prelude::UserValuesConstraint;

#[derive(Default, Debug)]
pub struct DefaultScenarioValues {}

impl UserValuesConstraint for DefaultScenarioValues {}

/// Per virtual user state for HTTP scenarios.
///
/// `SV` holds whatever else a scenario needs to keep between iterations.
#[derive(Default, Debug)]
pub struct HttpVuContext<SV: UserValuesConstraint = DefaultScenarioValues> {
    pub(crate) client: Option<HttpClient>,
    token: Option<String>,
    scenario_values: SV,
}

impl<SV: UserValuesConstraint> UserValuesConstraint for HttpVuContext<SV> {}

impl<SV: UserValuesConstraint> HttpVuContext<SV> {
    /// The client set up by [crate::common::configure_http_client].
    pub fn client(&self) -> anyhow::Result<&HttpClient> {
        self.client
            .as_ref()
            .context("HTTP client is not configured, use configure_http_client as the VU setup hook")
    }

    /// The auth token obtained by the last successful login, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn scenario_values(&self) -> &SV {
        &self.scenario_values
    }

    pub fn scenario_values_mut(&mut self) -> &mut SV {
        &mut self.scenario_values
    }
}

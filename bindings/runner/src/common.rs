use std::sync::Arc;

use anyhow::Context;
use http_client_instrumented::prelude::{HttpClient, HttpResponse, ReqwestTransport, RequestBuilder};
use stampede_runner::prelude::{HookResult, RunnerContext, UserValuesConstraint, VuContext};

use crate::context::HttpVuContext;
use crate::runner_context::HttpRunnerContext;

/// Iterations of each virtual user for which [log_sample] logs the response.
pub const SAMPLE_ITERATIONS: u64 = 3;

/// Number of body characters [log_sample] includes.
const SAMPLE_BODY_CHARS: usize = 200;

/// Sets up the transport shared by every virtual user.
///
/// Call this from your setup hook. A transport that was already installed, for example a fake one
/// in a test, is kept.
///
/// # Examples
///
/// ```rust
/// use http_stampede_runner::prelude::*;
///
/// fn setup(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
///     configure_transport(ctx)?;
///     Ok(())
/// }
/// ```
pub fn configure_transport(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    if ctx.get().transport().is_none() {
        let transport = ReqwestTransport::new().context("Failed to create HTTP transport")?;
        ctx.get_mut().set_transport(Arc::new(transport));
    }

    Ok(())
}

/// Creates the HTTP client for a virtual user, pointed at the base url of the run.
///
/// Call this from your VU setup hook. If [configure_transport] was not called then the virtual
/// user gets a transport of its own.
pub fn configure_http_client<SV: UserValuesConstraint>(
    ctx: &mut VuContext<HttpRunnerContext, HttpVuContext<SV>>,
) -> HookResult {
    let transport = match ctx.runner_context().get().transport() {
        Some(transport) => transport,
        None => {
            log::debug!("No shared transport configured, creating one for {}", ctx.vu_id());
            Arc::new(ReqwestTransport::new().context("Failed to create HTTP transport")?)
        }
    };

    let client = HttpClient::new(
        ctx.runner_context().base_url(),
        transport,
        ctx.runner_context().reporter(),
        ctx.vu_index(),
    )?;
    ctx.get_mut().client = Some(client);

    Ok(())
}

/// Get the HTTP client for this virtual user.
///
/// Fails if [configure_http_client] has not been run for it.
pub fn http_client<SV: UserValuesConstraint>(
    ctx: &VuContext<HttpRunnerContext, HttpVuContext<SV>>,
) -> anyhow::Result<&HttpClient> {
    ctx.get().client()
}

/// Send a request, blocking the virtual user until the response arrives.
///
/// A request that gets no response is recorded as failed and comes back with status
/// [http_client_instrumented::prelude::NO_RESPONSE_STATUS], so the script can check it and carry
/// on. The only error is cancellation: the request is abandoned if the virtual user is cancelled
/// and then nothing is recorded for it.
pub fn send_request<RV: UserValuesConstraint, V: UserValuesConstraint>(
    ctx: &VuContext<RV, V>,
    request: RequestBuilder<'_>,
) -> anyhow::Result<HttpResponse> {
    ctx.execute_in_place(async move { Ok(request.fetch().await) })
}

/// Log in as `user` and remember the token from the response, if it has one.
///
/// The request is named `login` in the summary. Returns the response so that the caller can check
/// it. A failed login clears the token.
pub fn login<SV: UserValuesConstraint>(
    ctx: &mut VuContext<HttpRunnerContext, HttpVuContext<SV>>,
    user: &str,
) -> anyhow::Result<HttpResponse> {
    let request = http_client(ctx)?
        .post_json("/api/login", &serde_json::json!({ "user": user }))
        .name("login");
    let response = send_request(ctx, request)?;

    let token = response
        .json_path("token")
        .and_then(|token| token.as_str().map(str::to_string));
    ctx.get_mut().set_token(token);

    Ok(response)
}

/// Log the status and the start of the body of a response during the first few iterations of a
/// virtual user.
pub fn log_sample<RV: UserValuesConstraint, V: UserValuesConstraint>(
    ctx: &VuContext<RV, V>,
    label: &str,
    response: &HttpResponse,
) {
    if ctx.iteration() < SAMPLE_ITERATIONS {
        let body = response
            .text()
            .chars()
            .take(SAMPLE_BODY_CHARS)
            .collect::<String>();
        log::info!(
            "{} iteration {} {label}: status {} body {body}",
            ctx.vu_id(),
            ctx.iteration(),
            response.status()
        );
    }
}

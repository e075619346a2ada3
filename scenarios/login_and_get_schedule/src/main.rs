use std::process::ExitCode;
use std::time::Duration;

use http_stampede_runner::prelude::*;

const DEFAULT_GROUP: &str = "КС-21";

#[derive(Debug, Default)]
pub struct ScenarioValues {
    group: String,
}

impl UserValuesConstraint for ScenarioValues {}

type Ctx = VuContext<HttpRunnerContext, HttpVuContext<ScenarioValues>>;

fn setup(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    configure_transport(ctx)?;
    Ok(())
}

fn vu_setup(ctx: &mut Ctx) -> HookResult {
    configure_http_client(ctx)?;
    let group = ctx.runner_context().capture_env("GROUP", DEFAULT_GROUP);
    ctx.get_mut().scenario_values_mut().group = group;
    Ok(())
}

fn vu_script(ctx: &mut Ctx) -> HookResult {
    let response = login(ctx, "tester")?;
    ctx.check(&response, &[&status_is("login 200", 200)]);

    let request = http_client(ctx)?
        .get("/api/schedule")
        .query("group", &ctx.get().scenario_values().group)
        .name("schedule");
    let response = send_request(ctx, request)?;

    log_sample(ctx, "schedule", &response);

    ctx.check(
        &response,
        &[
            &status_is("schedule 200", 200),
            &named("items non-empty", |response: &HttpResponse| {
                response
                    .json_path("items")
                    .and_then(|items| items.as_array().map(|items| !items.is_empty()))
                    .unwrap_or(false)
            }),
        ],
    );

    ctx.think(Duration::from_secs(1))?;

    Ok(())
}

fn main() -> StampedeResult<ExitCode> {
    let builder = ScenarioDefinitionBuilder::<
        HttpRunnerContext,
        HttpVuContext<ScenarioValues>,
    >::new_with_init(env!("CARGO_PKG_NAME"))
    .with_stages(&[("20s", 10), ("40s", 30), ("40s", 30), ("30s", 0)])
    .with_threshold("checks", "rate>0.99")
    .with_threshold("http_req_duration", "p(95)<800")
    .with_threshold("http_req_failed", "rate<0.01")
    .use_setup(setup)
    .use_vu_setup(vu_setup)
    .use_script(vu_script);

    let outcome = run(builder)?;

    Ok(outcome.exit_code())
}

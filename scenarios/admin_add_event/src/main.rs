use std::process::ExitCode;

use http_stampede_runner::prelude::*;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct NewEvent<'a> {
    date: &'a str,
    time: &'a str,
    title: &'a str,
    room: &'a str,
    group: &'a str,
}

const EVENT: NewEvent<'static> = NewEvent {
    date: "2025-10-25",
    time: "09:00",
    title: "Перевірка",
    room: "101",
    group: "КС-21",
};

type Ctx = VuContext<HttpRunnerContext, HttpVuContext>;

fn setup(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    configure_transport(ctx)?;
    Ok(())
}

fn vu_script(ctx: &mut Ctx) -> HookResult {
    login(ctx, "admin")?;
    if ctx.get().token().is_none() {
        log::debug!("{} has no token, adding the event without one", ctx.vu_id());
    }

    let mut request = http_client(ctx)?
        .post_json("/api/add_event", &EVENT)
        .name("add_event");
    if let Some(token) = ctx.get().token() {
        request = request.query("token", token);
    }
    let response = send_request(ctx, request)?;

    ctx.check(
        &response,
        &[
            &status_is("add 200", 200),
            &json_path_is("ok==true", "ok", serde_json::Value::Bool(true)),
        ],
    );

    Ok(())
}

fn main() -> StampedeResult<ExitCode> {
    let builder =
        ScenarioDefinitionBuilder::<HttpRunnerContext, HttpVuContext>::new_with_init(env!(
            "CARGO_PKG_NAME"
        ))
        .with_constant_vus(10, "1m")
        .with_threshold("http_req_failed", "rate<0.01")
        .with_threshold("http_req_duration", "p(95)<1000")
        .use_setup(setup)
        .use_vu_setup(configure_http_client)
        .use_script(vu_script);

    let outcome = run(builder)?;

    Ok(outcome.exit_code())
}

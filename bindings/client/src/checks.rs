use serde_json::Value;
use stampede_instruments::{named, NamedCheck};

use crate::response::HttpResponse;

/// A check that passes when the response has the given status.
pub fn status_is(
    name: impl Into<String>,
    status: u16,
) -> NamedCheck<impl Fn(&HttpResponse) -> bool + Send + Sync> {
    named(name, move |response: &HttpResponse| {
        response.status() == status
    })
}

/// A check that passes when the JSON body has `expected` at `path`.
pub fn json_path_is(
    name: impl Into<String>,
    path: &str,
    expected: Value,
) -> NamedCheck<impl Fn(&HttpResponse) -> bool + Send + Sync> {
    let path = path.to_string();
    named(name, move |response: &HttpResponse| {
        response.json_path(&path).as_ref() == Some(&expected)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;
    use stampede_instruments::Check;
    use std::time::Duration;

    #[test]
    fn response_checks() {
        let ok = HttpResponse::new(200, Bytes::from_static(br#"{"ok":true}"#), Duration::ZERO);
        let rejected =
            HttpResponse::new(400, Bytes::from_static(br#"{"ok":false}"#), Duration::ZERO);

        let add_200 = status_is("add 200", 200);
        let ok_true = json_path_is("ok==true", "ok", json!(true));
        let checks: [&dyn Check<HttpResponse>; 2] = [&add_200, &ok_true];

        assert!(checks.iter().all(|check| check.evaluate(&ok)));
        assert!(checks.iter().all(|check| !check.evaluate(&rejected)));
    }
}

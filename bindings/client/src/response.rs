use std::borrow::Cow;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Status of an [HttpResponse] for a request that never got a response.
pub const NO_RESPONSE_STATUS: u16 = 0;

/// A response as seen by a request script.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: u16,
    body: Bytes,
    elapsed: Duration,
}

impl HttpResponse {
    pub(crate) fn new(status: u16, body: Bytes, elapsed: Duration) -> Self {
        Self {
            status,
            body,
            elapsed,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Time from sending the request to receiving the whole body.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn json<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        serde_json::from_slice(&self.body).with_context(|| {
            format!(
                "Response body with status {} is not the expected JSON",
                self.status
            )
        })
    }

    /// Look up a value in a JSON body by a dot separated path such as `token` or `items.0.title`.
    /// Numeric segments index into arrays.
    ///
    /// Returns `None` if the body is not JSON or the path does not exist.
    pub fn json_path(&self, path: &str) -> Option<Value> {
        let root = serde_json::from_slice::<Value>(&self.body).ok()?;
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(&root, |value, segment| match value {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
            .cloned()
    }
}

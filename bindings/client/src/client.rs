use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;
use stampede_core::prelude::RequestError;
use stampede_instruments::{RequestRecord, Reporter};
use url::Url;

use crate::response::{HttpResponse, NO_RESPONSE_STATUS};
use crate::transport::{HttpRequest, Method, Transport};

/// An HTTP client for one virtual user that records an outcome for every request it completes.
///
/// Requests that are dropped before they complete, because the virtual user was cancelled, record
/// nothing.
#[derive(Debug, Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    reporter: Arc<Reporter>,
    vu: usize,
}

impl HttpClient {
    pub fn new(
        base_url: &str,
        transport: Arc<dyn Transport>,
        reporter: Arc<Reporter>,
        vu: usize,
    ) -> anyhow::Result<Self> {
        Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("Invalid base url [{base_url}]: {e}"))?;

        Ok(Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            reporter,
            vu,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Start a GET request for a path relative to the base url.
    pub fn get(&self, path: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::Get, path)
    }

    /// Start a POST request with `body` serialized as JSON.
    pub fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> RequestBuilder<'_> {
        let mut builder = RequestBuilder::new(self, Method::Post, path)
            .header("Content-Type", "application/json");
        builder.body = Some(
            serde_json::to_vec(body)
                .map(Bytes::from)
                .map_err(|e| e.to_string()),
        );
        builder
    }
}

pub struct RequestBuilder<'a> {
    client: &'a HttpClient,
    method: Method,
    path: String,
    name: Option<String>,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Result<Bytes, String>>,
}

impl<'a> RequestBuilder<'a> {
    fn new(client: &'a HttpClient, method: Method, path: &str) -> Self {
        Self {
            client,
            method,
            path: path.to_string(),
            name: None,
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Tag the request with a name. Requests with the same name are grouped in the summary. The
    /// path is used if no name is given.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a query parameter. The value is percent encoded.
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Send the request and record its outcome.
    ///
    /// Any response is `Ok`, including error statuses, which are recorded as failed requests. A
    /// [RequestError] means that no response was received, either because the request could not
    /// be built or because the transport failed. It has already been recorded as a failed request
    /// too.
    pub async fn send(self) -> Result<HttpResponse, RequestError> {
        let name = self.name.clone().unwrap_or_else(|| self.path.clone());
        let raw_url = format!("{}{}", self.client.base_url, self.path);

        let record = RequestRecord::start(
            name.clone(),
            self.method.to_string(),
            raw_url.as_str(),
            self.client.vu,
        );
        let started = Instant::now();

        let prepared = Url::parse(&raw_url)
            .map_err(|e| format!("invalid url [{raw_url}]: {e}"))
            .and_then(|mut url| {
                if !self.query.is_empty() {
                    url.query_pairs_mut().extend_pairs(&self.query);
                }
                let body = self
                    .body
                    .transpose()
                    .map_err(|e| format!("body is not valid JSON: {e}"))?;
                Ok((url, body))
            });
        let (url, body) = match prepared {
            Ok(prepared) => prepared,
            Err(reason) => {
                self.client
                    .reporter
                    .add_http_outcome(record.finish_with_error());
                return Err(RequestError::new(name, reason));
            }
        };

        let result = self
            .client
            .transport
            .send(HttpRequest {
                method: self.method,
                url,
                headers: self.headers,
                body,
            })
            .await;

        match result {
            Ok(response) => {
                self.client
                    .reporter
                    .add_http_outcome(record.finish_with_status(response.status));
                Ok(HttpResponse::new(
                    response.status,
                    response.body,
                    started.elapsed(),
                ))
            }
            Err(e) => {
                self.client
                    .reporter
                    .add_http_outcome(record.finish_with_error());
                Err(RequestError::new(name, format!("{e:#}")))
            }
        }
    }

    /// Send the request the way a load script sees it: a request that got no response comes back
    /// with status 0 and an empty body, so checks on it fail and the script carries on.
    ///
    /// The outcome is recorded exactly as with [RequestBuilder::send].
    pub async fn fetch(self) -> HttpResponse {
        let started = Instant::now();
        match self.send().await {
            Ok(response) => response,
            Err(e) => {
                log::debug!("{e}");
                HttpResponse::new(NO_RESPONSE_STATUS, Bytes::new(), started.elapsed())
            }
        }
    }
}

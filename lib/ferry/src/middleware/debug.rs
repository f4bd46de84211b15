//! Request and response dumps.
//!
//! Dumps are emitted as `tracing` events on the [`DEBUG_TARGET`] target, so
//! they can be routed or silenced independently of the rest of the logs:
//!
//! ```text
//! RUST_LOG=ferry::debug=info
//! ```

use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::HeaderMap;
use tower::{Layer, Service};
use tracing::{info, warn};

use crate::{Error, Request, Response, Result};

/// Tracing target of the dumps.
pub const DEBUG_TARGET: &str = "ferry::debug";

/// Layer that dumps each request before it is sent and each response or
/// error after it returns.
///
/// Dumping never changes the outcome of the call.
#[derive(Debug, Clone, Copy)]
pub struct DebugLayer {
    include_body: bool,
}

impl DebugLayer {
    /// Create a debug layer; `include_body` controls whether the request
    /// body is part of the dump.
    #[must_use]
    pub const fn new(include_body: bool) -> Self {
        Self { include_body }
    }
}

impl<S> Layer<S> for DebugLayer {
    type Service = DebugDump<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DebugDump {
            inner,
            include_body: self.include_body,
        }
    }
}

/// Service that dumps requests and responses.
#[derive(Debug, Clone)]
pub struct DebugDump<S> {
    inner: S,
    include_body: bool,
}

impl<S> Service<Request> for DebugDump<S>
where
    S: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        info!(
            target: DEBUG_TARGET,
            "HTTP Request:\n{}",
            dump_request(&request, self.include_body)
        );

        let future = self.inner.call(request);
        Box::pin(async move {
            let result = future.await;
            match &result {
                Ok(response) => {
                    info!(target: DEBUG_TARGET, "HTTP Response:\n{}", dump_response(response));
                }
                Err(err) => warn!(target: DEBUG_TARGET, error = %err, "HTTP Response: none"),
            }
            result
        })
    }
}

/// Renders a request in wire format.
pub(crate) fn dump_request(request: &Request, include_body: bool) -> String {
    let url = request.url();
    let mut target = url.path().to_string();
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }

    let mut out = format!("{} {target} HTTP/1.1\n", request.method());
    if let Some(host) = url.host_str() {
        match url.port() {
            Some(port) => {
                let _ = writeln!(out, "Host: {host}:{port}");
            }
            None => {
                let _ = writeln!(out, "Host: {host}");
            }
        }
    }
    write_headers(&mut out, request.headers());

    if include_body && let Some(body) = request.body() {
        out.push('\n');
        write_body(&mut out, body);
    }
    out
}

/// Renders a response in wire format.
pub(crate) fn dump_response(response: &Response) -> String {
    let mut out = format!("HTTP/1.1 {}\n", response.status_line());
    write_headers(&mut out, response.headers());
    if !response.body().is_empty() {
        out.push('\n');
        write_body(&mut out, response.body());
    }
    out
}

fn write_headers(out: &mut String, headers: &HeaderMap) {
    for (name, value) in headers {
        let value = value.to_str().unwrap_or("<opaque>");
        let _ = writeln!(out, "{name}: {value}");
    }
}

fn write_body(out: &mut String, body: &[u8]) {
    match std::str::from_utf8(body) {
        Ok(text) => out.push_str(text),
        Err(_) => {
            let _ = write!(out, "<{} bytes of binary data>", body.len());
        }
    }
}

//! Per-attempt summary logging.
//!
//! Each pass through the chain gets an `http_request` span carrying the
//! method and URL, a line when the request leaves and a line with the
//! outcome. Retries therefore show up as repeated spans.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{Error, Request, Response, Result};

/// Layer adding [`Logging`] around a service.
///
/// ```ignore
/// use ferry::{Middleware, middleware::LoggingLayer, opt};
///
/// let verbose = Middleware::from_layer(LoggingLayer::verbose());
/// client.get(url, &[opt::middleware(verbose)]).await?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLayer {
    verbose: bool,
}

impl LoggingLayer {
    /// Status, size and timing only.
    #[must_use]
    pub const fn new() -> Self {
        Self { verbose: false }
    }

    /// Also logs request headers and context values, and response headers,
    /// at debug level.
    #[must_use]
    pub const fn verbose() -> Self {
        Self { verbose: true }
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = Logging<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logging {
            inner,
            verbose: self.verbose,
        }
    }
}

/// Service produced by [`LoggingLayer`].
#[derive(Debug, Clone)]
pub struct Logging<S> {
    inner: S,
    verbose: bool,
}

impl<S> Service<Request> for Logging<S>
where
    S: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let span = info_span!(
            "http_request",
            method = %request.method(),
            url = %request.url(),
        );
        let verbose = self.verbose;
        let mut inner = self.inner.clone();

        Box::pin(
            async move {
                let sent_bytes = request.body().map_or(0, bytes::Bytes::len);
                if verbose {
                    debug!(
                        sent_bytes,
                        headers = ?request.headers(),
                        context = ?request.context(),
                        "sending request"
                    );
                } else {
                    info!(sent_bytes, "sending request");
                }

                let start = Instant::now();
                let result = inner.call(request).await;
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

                match &result {
                    Ok(response) => {
                        let status = response.status();
                        let received_bytes = response.body().len();
                        if response.is_client_error() || response.is_server_error() {
                            warn!(status, received_bytes, elapsed_ms, "request completed");
                        } else {
                            info!(status, received_bytes, elapsed_ms, "request completed");
                        }
                        if verbose {
                            debug!(headers = ?response.headers(), "response headers");
                        }
                    }
                    Err(err) => warn!(error = %err, elapsed_ms, "request failed"),
                }

                result
            }
            .instrument(span),
        )
    }
}

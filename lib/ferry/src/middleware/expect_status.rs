//! Status assertion middleware.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tower::{Layer, Service};

use crate::{Error, Request, Response, Result};

/// Layer that turns any response whose status differs from the expected one
/// into [`Error::UnexpectedStatus`], carrying the status line and body.
///
/// Combined with `opt::retry_times`, this retries until the server answers
/// with the expected status.
#[derive(Debug, Clone, Copy)]
pub struct ExpectStatusLayer {
    status: u16,
}

impl ExpectStatusLayer {
    /// Create a layer expecting `status`.
    #[must_use]
    pub const fn new(status: u16) -> Self {
        Self { status }
    }
}

impl<S> Layer<S> for ExpectStatusLayer {
    type Service = ExpectStatus<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ExpectStatus {
            inner,
            status: self.status,
        }
    }
}

/// Service that checks the response status.
#[derive(Debug, Clone)]
pub struct ExpectStatus<S> {
    inner: S,
    status: u16,
}

impl<S> Service<Request> for ExpectStatus<S>
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
        let expected = self.status;
        let future = self.inner.call(request);
        Box::pin(async move {
            let response = future.await?;
            if response.status() == expected {
                return Ok(response);
            }
            Err(Error::UnexpectedStatus {
                status: response.status(),
                status_line: response.status_line(),
                body: response.text().to_string(),
            })
        })
    }
}

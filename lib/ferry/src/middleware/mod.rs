//! Middleware around request execution.
//!
//! An [`Executor`] turns a [`Request`] into a [`Response`]. A [`Middleware`]
//! wraps one executor into another. Chains are composed onion-style: the
//! first middleware registered is the outermost, so it sees the request
//! first and the response last.
//!
//! Any Tower [`Layer`] whose service speaks ferry types can be turned into a
//! middleware with [`Middleware::from_layer`]; one-off middleware can be
//! written as an async closure with [`Middleware::from_fn`].
//!
//! # Example
//!
//! ```ignore
//! use ferry::{Middleware, opt};
//! use tower::ServiceExt;
//!
//! let trace = Middleware::from_fn(|mut request, next| async move {
//!     request.set_header("X-Trace", "1")?;
//!     next.oneshot(request).await
//! });
//!
//! client.get(url, &[opt::middleware(trace)]).await?;
//! ```

mod debug;
mod expect_status;
mod logging;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tower::util::BoxCloneService;
use tower::{Layer, Service};

use crate::{Error, Request, Response, Result};

pub use debug::{DEBUG_TARGET, DebugDump, DebugLayer};
pub use expect_status::{ExpectStatus, ExpectStatusLayer};
pub use logging::{Logging, LoggingLayer};

/// A type-erased request executor.
pub type Executor = BoxCloneService<Request, Response, Error>;

/// Wraps an [`Executor`] into another one.
#[derive(Clone)]
pub struct Middleware {
    wrap: Arc<dyn Fn(Executor) -> Executor + Send + Sync>,
}

impl Middleware {
    /// Creates a middleware from a wrapping function.
    pub fn new(wrap: impl Fn(Executor) -> Executor + Send + Sync + 'static) -> Self {
        Self {
            wrap: Arc::new(wrap),
        }
    }

    /// Creates a middleware from a Tower layer.
    pub fn from_layer<L>(layer: L) -> Self
    where
        L: Layer<Executor> + Send + Sync + 'static,
        L::Service: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        Self::new(move |next| BoxCloneService::new(layer.layer(next)))
    }

    /// Creates a middleware from an async function receiving the request and
    /// the next executor.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Executor) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Response>> + Send + 'static,
    {
        Self::new(move |next| {
            let f = f.clone();
            BoxCloneService::new(tower::service_fn(move |request| f(request, next.clone())))
        })
    }

    /// Dumps requests and responses; see [`DebugLayer`].
    #[must_use]
    pub fn debug(include_body: bool) -> Self {
        Self::from_layer(DebugLayer::new(include_body))
    }

    /// Fails responses whose status differs from `status`; see [`ExpectStatusLayer`].
    #[must_use]
    pub fn expect_status(status: u16) -> Self {
        Self::from_layer(ExpectStatusLayer::new(status))
    }

    /// Summary logging of each attempt; see [`LoggingLayer`].
    #[must_use]
    pub fn logging() -> Self {
        Self::from_layer(LoggingLayer::new())
    }

    /// Wraps `next`.
    #[must_use]
    pub fn apply(&self, next: Executor) -> Executor {
        (self.wrap)(next)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware").finish_non_exhaustive()
    }
}

/// Composes `middlewares` around `terminal`, first one outermost.
///
/// An empty list yields `terminal` unchanged.
#[must_use]
pub fn compose(middlewares: &[Middleware], terminal: Executor) -> Executor {
    middlewares
        .iter()
        .rev()
        .fold(terminal, |next, middleware| middleware.apply(next))
}

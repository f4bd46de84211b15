//! Per-call settings and the options that fill them.
//!
//! An [`Opt`] is a closure applied to a fresh [`Options`] value. Client-level
//! options run first, call-level options after them, so for single-valued
//! settings the last writer wins.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ferry_core::{Body, Cookie};

use crate::middleware::Middleware;

/// Accumulated settings for one call.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Headers in the order they were configured; later values for a name win.
    pub headers: Vec<(String, String)>,
    /// Request payload.
    pub body: Option<Body>,
    /// Query parameters; when non-empty they replace the URL's query.
    pub query: Vec<(String, String)>,
    /// Form fields; when present they replace the body.
    pub form: Option<Vec<(String, String)>>,
    /// Cookies appended to the request.
    pub cookies: Vec<Cookie>,
    /// Extra attempts after the first failure.
    pub retry_times: u32,
    /// Deadline for the whole call; zero means unbounded.
    pub timeout: Duration,
    /// Middleware, outermost first.
    pub middlewares: Vec<Middleware>,
    /// Whether to dump requests and responses.
    pub debug: bool,
    /// Values added to the request context.
    pub context_values: Vec<(String, String)>,
}

impl Options {
    /// Applies client-level options, then call-level options, to a default value.
    #[must_use]
    pub fn from_opts<'a>(
        client: impl IntoIterator<Item = &'a Opt>,
        call: impl IntoIterator<Item = &'a Opt>,
    ) -> Self {
        let mut options = Self::default();
        for opt in client.into_iter().chain(call) {
            opt.apply(&mut options);
        }
        options
    }
}

/// A deferred mutation of [`Options`].
///
/// Applying an option never fails; invalid values surface when the request
/// is built.
#[derive(Clone)]
pub struct Opt(Arc<dyn Fn(&mut Options) + Send + Sync>);

impl Opt {
    /// Wraps a closure.
    pub fn new(apply: impl Fn(&mut Options) + Send + Sync + 'static) -> Self {
        Self(Arc::new(apply))
    }

    /// Applies this option.
    pub fn apply(&self, options: &mut Options) {
        (self.0)(options);
    }
}

impl fmt::Debug for Opt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opt").finish_non_exhaustive()
    }
}

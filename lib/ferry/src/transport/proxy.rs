//! Proxy selection.

use std::fmt;
use std::sync::Arc;

use http::Uri;

use crate::{Error, Result};

type ProxyFn = Arc<dyn Fn(&Uri) -> Option<Uri> + Send + Sync>;

/// Chooses the proxy, if any, used to reach a destination.
///
/// Plain `http` destinations are requested through the proxy in absolute
/// form; `https` destinations are tunnelled with `CONNECT`.
#[derive(Clone)]
pub enum Proxy {
    /// Every destination goes through this proxy.
    All(Uri),
    /// The function picks a proxy per destination; `None` connects directly.
    Custom(ProxyFn),
}

impl Proxy {
    /// Parses a fixed proxy URL such as `http://127.0.0.1:3128`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidProxy`] unless the URL is an `http` URL with a host.
    pub fn url(url: &str) -> Result<Self> {
        let uri: Uri = url
            .parse()
            .map_err(|e| Error::InvalidProxy(format!("{url}: {e}")))?;
        if uri.scheme_str() != Some("http") {
            return Err(Error::InvalidProxy(format!(
                "{url}: only http proxies are supported"
            )));
        }
        if uri.host().is_none_or(str::is_empty) {
            return Err(Error::InvalidProxy(format!("{url}: missing host")));
        }
        Ok(Self::All(uri))
    }

    /// Picks the proxy per destination.
    pub fn custom(select: impl Fn(&Uri) -> Option<Uri> + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(select))
    }

    /// The proxy to use for `destination`.
    #[must_use]
    pub fn resolve(&self, destination: &Uri) -> Option<Uri> {
        match self {
            Self::All(proxy) => Some(proxy.clone()),
            Self::Custom(select) => select(destination),
        }
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All(uri) => f.debug_tuple("All").field(uri).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

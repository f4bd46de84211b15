//! Redirect handling for the hyper transport.
//!
//! Follows 301, 302, 303, 307 and 308 responses with a `Location` header,
//! resolving relative locations against the current URL.

use std::fmt;
use std::sync::Arc;

use http::header;
use url::Url;

use crate::config::DEFAULT_MAX_REDIRECTS;
use crate::{Error, Method, Request, Response, Result};

type CheckFn = Arc<dyn Fn(&Request, &[Request]) -> Result<()> + Send + Sync>;

/// Decides whether a redirect is followed.
#[derive(Clone)]
pub enum RedirectPolicy {
    /// Follow up to this many redirects, then fail with [`Error::TooManyRedirects`].
    Limited(usize),
    /// Never follow; the redirect response is returned as-is.
    None,
    /// Ask a function. It receives the next request and the requests already
    /// sent, oldest first; an error aborts the call.
    Custom(CheckFn),
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::Limited(DEFAULT_MAX_REDIRECTS)
    }
}

impl fmt::Debug for RedirectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limited(max) => f.debug_tuple("Limited").field(max).finish(),
            Self::None => f.write_str("None"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl RedirectPolicy {
    /// Follow up to `max` redirects.
    #[must_use]
    pub const fn limited(max: usize) -> Self {
        Self::Limited(max)
    }

    /// Never follow redirects.
    #[must_use]
    pub const fn none() -> Self {
        Self::None
    }

    /// Decide with a function; see [`RedirectPolicy::Custom`].
    pub fn custom(
        check: impl Fn(&Request, &[Request]) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self::Custom(Arc::new(check))
    }

    /// Builds the request following `response`, or `None` when the response
    /// is final. `via` holds the requests sent so far; its last element
    /// produced `response`.
    pub(crate) fn next_request(
        &self,
        response: &Response,
        via: &[Request],
    ) -> Result<Option<Request>> {
        let status = response.status();
        if !is_redirect(status) || matches!(self, Self::None) {
            return Ok(None);
        }
        let Some(current) = via.last() else {
            return Ok(None);
        };

        let followed = via.len().saturating_sub(1);
        if let Self::Limited(max) = self
            && followed >= *max
        {
            return Err(Error::TooManyRedirects {
                count: followed,
                max: *max,
            });
        }

        let location = response
            .header(header::LOCATION.as_str())
            .ok_or_else(|| {
                Error::InvalidRedirect("redirect response missing Location header".into())
            })?;
        let next_url = resolve_redirect_url(current.url(), location)?;
        let (method, keep_body) = redirect_method(status, current.method());

        let cross_host = next_url.host_str() != current.url().host_str();
        let mut next = current.clone().redirected(method, next_url, keep_body);
        if cross_host {
            next.headers_mut().remove(header::AUTHORIZATION);
            next.headers_mut().remove(header::COOKIE);
        }

        if let Self::Custom(check) = self {
            check(&next, via)?;
        }
        Ok(Some(next))
    }
}

/// Check if a status code is a redirect.
fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

/// Determine the method for the redirected request, and whether it keeps its body.
///
/// - 301, 302, 303: GET without body (HEAD stays HEAD)
/// - 307, 308: original method and body
fn redirect_method(status: u16, original: &Method) -> (Method, bool) {
    match status {
        307 | 308 => (original.clone(), true),
        _ if *original == Method::HEAD => (Method::HEAD, false),
        _ => (Method::GET, false),
    }
}

/// Resolve a redirect Location URL relative to the original request URL.
fn resolve_redirect_url(base_url: &Url, location: &str) -> Result<Url> {
    if let Ok(url) = Url::parse(location) {
        return Ok(url);
    }
    base_url.join(location).map_err(Error::InvalidUrl)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue};

    use super::*;

    fn redirect(status: u16, location: &'static str) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(header::LOCATION, HeaderValue::from_static(location));
        Response::new(status, headers, Bytes::new())
    }

    fn post(url: &str) -> Request {
        Request::builder(Method::POST, url.parse().expect("url"))
            .header("Authorization", "Bearer token")
            .header("Content-Type", "text/plain")
            .body("payload")
            .build()
            .expect("request")
    }

    #[test]
    fn is_redirect_true() {
        for status in [301, 302, 303, 307, 308] {
            assert!(is_redirect(status));
        }
    }

    #[test]
    fn is_redirect_false() {
        assert!(!is_redirect(200));
        assert!(!is_redirect(300)); // 300 Multiple Choices is not auto-followed
        assert!(!is_redirect(304)); // 304 Not Modified is not a redirect
    }

    #[test]
    fn see_other_switches_to_get_without_body() {
        let via = [post("https://example.com/form")];

        let next = RedirectPolicy::default()
            .next_request(&redirect(303, "/done"), &via)
            .expect("policy")
            .expect("followed");

        assert_eq!(next.method(), Method::GET);
        assert_eq!(next.url().as_str(), "https://example.com/done");
        assert!(next.body().is_none());
        assert!(next.header("content-type").is_none());
        assert_eq!(next.header("authorization"), Some("Bearer token"));
    }

    #[test]
    fn temporary_redirect_keeps_method_and_body() {
        let via = [post("https://example.com/form")];

        let next = RedirectPolicy::default()
            .next_request(&redirect(307, "https://example.com/v2/form"), &via)
            .expect("policy")
            .expect("followed");

        assert_eq!(next.method(), Method::POST);
        assert_eq!(next.body().map(Bytes::len), Some(7));
    }

    #[test]
    fn cross_host_redirect_drops_credentials() {
        let via = [post("https://example.com/form")];

        let next = RedirectPolicy::default()
            .next_request(&redirect(308, "https://other.org/form"), &via)
            .expect("policy")
            .expect("followed");

        assert!(next.header("authorization").is_none());
    }

    #[test]
    fn head_stays_head() {
        assert_eq!(redirect_method(302, &Method::HEAD), (Method::HEAD, false));
        assert_eq!(redirect_method(301, &Method::PUT), (Method::GET, false));
    }

    #[test]
    fn limit_is_enforced() {
        let via = [
            post("https://example.com/1"),
            post("https://example.com/2"),
            post("https://example.com/3"),
        ];

        let err = RedirectPolicy::limited(2)
            .next_request(&redirect(302, "/4"), &via)
            .expect_err("too many");

        assert!(matches!(err, Error::TooManyRedirects { count: 2, max: 2 }));
    }

    #[test]
    fn none_policy_returns_redirect() {
        let via = [post("https://example.com/")];
        let next = RedirectPolicy::none()
            .next_request(&redirect(302, "/elsewhere"), &via)
            .expect("policy");
        assert!(next.is_none());
    }

    #[test]
    fn custom_policy_can_refuse() {
        let policy = RedirectPolicy::custom(|next, _via| {
            if next.url().scheme() == "http" {
                return Err(Error::RedirectRefused("downgrade to http".into()));
            }
            Ok(())
        });
        let via = [post("https://example.com/")];

        let err = policy
            .next_request(&redirect(302, "http://example.com/"), &via)
            .expect_err("refused");

        assert!(matches!(err, Error::RedirectRefused(_)));
    }

    #[test]
    fn missing_location_is_invalid() {
        let via = [post("https://example.com/")];
        let response = Response::new(302, HeaderMap::new(), Bytes::new());

        let err = RedirectPolicy::default()
            .next_request(&response, &via)
            .expect_err("invalid");

        assert!(matches!(err, Error::InvalidRedirect(_)));
    }

    #[test]
    fn resolve_relative_url_without_leading_slash() {
        let base = Url::parse("https://example.com/old/path").expect("base url");
        let result = resolve_redirect_url(&base, "sibling").expect("resolve");
        assert_eq!(result.as_str(), "https://example.com/old/sibling");
    }
}

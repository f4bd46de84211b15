//! HTTP request building.
//!
//! Use [`Request::builder`] to construct requests with headers, query parameters, and bodies.
//!
//! # Example
//!
//! ```
//! use ferry_core::{Method, Request};
//!
//! let request = Request::builder(Method::GET, "https://api.example.com".parse().unwrap())
//!     .header("Accept", "application/json")
//!     .query("page", "1")
//!     .build()
//!     .expect("valid request");
//! assert_eq!(request.header("accept"), Some("application/json"));
//! ```

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::{Context, Cookie, Error, Method, Result};

/// An HTTP request with method, URL, headers, optional body and execution context.
///
/// A `None` body is the explicit empty-body marker: the transport sends no
/// payload and the declared content length is zero. Cloning a request is
/// cheap and yields an independent copy of the body, which is how retries and
/// redirects replay it.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
    context: Context,
}

impl Request {
    /// Creates a request without headers or body.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            context: Context::default(),
        }
    }

    /// Creates a request from a URL string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] when `url` cannot be parsed.
    pub fn parse(method: Method, url: &str) -> Result<Self> {
        Ok(Self::new(method, Url::parse(url)?))
    }

    /// Creates a new [`RequestBuilder`].
    #[must_use]
    pub fn builder(method: Method, url: Url) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Mutable access to the URL.
    pub fn url_mut(&mut self) -> &mut Url {
        &mut self.url
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// First header value by name, if it is visible ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Sets a header, replacing every existing value for that name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] when the name or value is not valid HTTP.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Appends a cookie to the `Cookie` header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] when the cookie is not a valid header value.
    pub fn add_cookie(&mut self, cookie: &Cookie) -> Result<()> {
        let pair = cookie.to_string();
        let value = match self.header(header::COOKIE.as_str()) {
            Some(existing) if !existing.is_empty() => format!("{existing}; {pair}"),
            _ => pair,
        };
        let value = HeaderValue::try_from(value)
            .map_err(|e| Error::invalid_header(format!("cookie {}: {e}", cookie.name())))?;
        self.headers.insert(header::COOKIE, value);
        Ok(())
    }

    /// Request body; `None` means no payload.
    #[must_use]
    pub const fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Replaces the body. An empty payload is stored as the empty-body marker.
    pub fn set_body(&mut self, body: Bytes) {
        self.body = if body.is_empty() { None } else { Some(body) };
    }

    /// Removes the body.
    pub fn clear_body(&mut self) {
        self.body = None;
    }

    /// Declared content length.
    #[must_use]
    pub fn content_length(&self) -> u64 {
        self.body.as_ref().map_or(0, |body| body.len() as u64)
    }

    /// Execution context.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Mutable access to the execution context.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Returns this request with another context.
    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Returns this request with another method and URL, keeping headers and context.
    ///
    /// The body is kept unless `keep_body` is `false`.
    #[must_use]
    pub fn redirected(mut self, method: Method, url: Url, keep_body: bool) -> Self {
        self.method = method;
        self.url = url;
        if !keep_body {
            self.body = None;
            self.headers.remove(header::CONTENT_TYPE);
            self.headers.remove(header::CONTENT_LENGTH);
        }
        self
    }

    /// Consume into (method, url, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (Method, Url, HeaderMap, Option<Bytes>) {
        (self.method, self.url, self.headers, self.body)
    }
}

/// Builder for constructing [`Request`] instances.
///
/// Header errors are deferred to [`build`](Self::build).
#[derive(Debug)]
pub struct RequestBuilder {
    request: Request,
    error: Option<Error>,
}

impl RequestBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            request: Request::new(method, url),
            error: None,
        }
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_none()
            && let Err(err) = self.request.set_header(name, value)
        {
            self.error = Some(err);
        }
        self
    }

    /// Appends a query parameter to the URL.
    #[must_use]
    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.request.url.query_pairs_mut().append_pair(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.set_body(body.into());
        self
    }

    /// Sets the execution context.
    #[must_use]
    pub fn context(mut self, context: Context) -> Self {
        self.request.context = context;
        self
    }

    /// Builds the [`Request`].
    ///
    /// # Errors
    ///
    /// Returns the first header error recorded while building.
    pub fn build(self) -> Result<Request> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.request),
        }
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::try_from(name)
        .map_err(|e| Error::invalid_header(format!("{name}: {e}")))?;
    let header_value =
        HeaderValue::try_from(value).map_err(|e| Error::invalid_header(format!("{name}: {e}")))?;
    Ok((header_name, header_value))
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("valid URL")
    }

    #[test]
    fn request_builder_basic() {
        let request = Request::builder(Method::GET, url("https://api.example.com/users"))
            .header("Accept", "application/json")
            .build()
            .expect("request");

        check!(request.method() == Method::GET);
        check!(request.url().as_str() == "https://api.example.com/users");
        check!(request.header("accept") == Some("application/json"));
        check!(request.body().is_none());
        check!(request.content_length() == 0);
    }

    #[test]
    fn request_builder_with_query() {
        let request = Request::builder(Method::GET, url("https://api.example.com/users"))
            .query("page", "1")
            .query("limit", "10")
            .build()
            .expect("request");

        check!(request.url().as_str() == "https://api.example.com/users?page=1&limit=10");
    }

    #[test]
    fn request_builder_rejects_bad_header() {
        let result = Request::builder(Method::GET, url("https://api.example.com"))
            .header("bad header", "value")
            .build();
        let_assert!(Err(Error::InvalidHeader(message)) = result);
        check!(message.contains("bad header"));
    }

    #[test]
    fn empty_body_is_stored_as_marker() {
        let mut request = Request::new(Method::POST, url("https://api.example.com"));
        request.set_body(Bytes::new());
        check!(request.body().is_none());

        request.set_body(Bytes::from_static(b"abc"));
        check!(request.content_length() == 3);
    }

    #[test]
    fn set_header_overwrites() {
        let mut request = Request::new(Method::GET, url("https://api.example.com"));
        request.headers_mut().append("x-id", HeaderValue::from_static("1"));
        request.headers_mut().append("x-id", HeaderValue::from_static("2"));

        request.set_header("X-Id", "3").expect("header");

        let values: Vec<_> = request.headers().get_all("x-id").iter().collect();
        check!(values == vec![HeaderValue::from_static("3")]);
    }

    #[test]
    fn cookies_are_joined() {
        let mut request = Request::new(Method::GET, url("https://api.example.com"));
        request.add_cookie(&Cookie::new("a", "1")).expect("cookie");
        request.add_cookie(&Cookie::new("b", "2")).expect("cookie");

        check!(request.header("cookie") == Some("a=1; b=2"));
    }

    #[test]
    fn redirected_drops_body_on_request() {
        let request = Request::builder(Method::POST, url("https://example.com/a"))
            .header("Content-Type", "text/plain")
            .body("payload")
            .build()
            .expect("request");

        let next = request
            .clone()
            .redirected(Method::GET, url("https://example.com/b"), false);
        check!(next.body().is_none());
        check!(next.header("content-type").is_none());

        let same = request.redirected(Method::POST, url("https://example.com/c"), true);
        check!(same.body().map(Bytes::len) == Some(7));
    }

    #[test]
    fn parse_rejects_invalid_url() {
        let_assert!(Err(Error::InvalidUrl(_)) = Request::parse(Method::GET, "not a url"));
    }
}

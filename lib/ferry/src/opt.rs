//! Option constructors.
//!
//! ```ignore
//! use ferry::opt;
//!
//! let response = client
//!     .get(url, &[opt::header("Accept", "text/plain"), opt::retry_times(2)])
//!     .await?;
//! ```

use std::time::Duration;

use ferry_core::{Body, Cookie, basic_auth_token, header};

use crate::middleware::Middleware;
use crate::options::Opt;

fn owned_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Vec<(String, String)>
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// Sets a header. A later value for the same name replaces this one.
pub fn header(name: impl Into<String>, value: impl Into<String>) -> Opt {
    let pair = (name.into(), value.into());
    Opt::new(move |options| options.headers.push(pair.clone()))
}

/// Sets the request payload.
///
/// Raw payloads are sent as-is and replayed on every attempt.
pub fn body(body: impl Into<Body>) -> Opt {
    let body = body.into();
    Opt::new(move |options| options.body = Some(body.clone()))
}

/// Sets a structured payload, serialized to JSON when the request is built.
///
/// The `Content-Type` header is forced to `application/json`.
pub fn json<T>(value: T) -> Opt
where
    T: serde::Serialize + Send + Sync + 'static,
{
    body(Body::json(value))
}

/// Adds a query parameter.
pub fn query(name: impl Into<String>, value: impl Into<String>) -> Opt {
    let pair = (name.into(), value.into());
    Opt::new(move |options| options.query.push(pair.clone()))
}

/// Adds several query parameters.
pub fn query_values<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Opt
where
    K: Into<String>,
    V: Into<String>,
{
    let pairs = owned_pairs(pairs);
    Opt::new(move |options| options.query.extend(pairs.iter().cloned()))
}

/// Adds a form field. Any form replaces the body and forces the
/// `application/x-www-form-urlencoded` content type.
pub fn form(name: impl Into<String>, value: impl Into<String>) -> Opt {
    let pair = (name.into(), value.into());
    Opt::new(move |options| {
        options
            .form
            .get_or_insert_with(Vec::new)
            .push(pair.clone());
    })
}

/// Adds several form fields. An empty set still yields an empty form body.
pub fn form_values<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Opt
where
    K: Into<String>,
    V: Into<String>,
{
    let pairs = owned_pairs(pairs);
    Opt::new(move |options| {
        options
            .form
            .get_or_insert_with(Vec::new)
            .extend(pairs.iter().cloned());
    })
}

/// Adds a cookie; the value is query-escaped.
pub fn cookie(name: impl Into<String>, value: impl AsRef<str>) -> Opt {
    let cookie = Cookie::escaped(name, value.as_ref());
    Opt::new(move |options| options.cookies.push(cookie.clone()))
}

/// Retries a failed call up to `times` more times.
pub fn retry_times(times: u32) -> Opt {
    Opt::new(move |options| options.retry_times = times)
}

/// Bounds the whole call, retries included. Zero disables the bound.
///
/// The transport is unbounded by default; a timeout set with
/// [`Client::set_timeout`](crate::Client::set_timeout) still caps each attempt.
pub fn timeout(timeout: Duration) -> Opt {
    Opt::new(move |options| options.timeout = timeout)
}

/// Appends a middleware; earlier middleware wraps later ones.
pub fn middleware(middleware: Middleware) -> Opt {
    Opt::new(move |options| options.middlewares.push(middleware.clone()))
}

/// Dumps requests and responses to the `ferry::debug` tracing target.
pub fn debug(enabled: bool) -> Opt {
    Opt::new(move |options| options.debug = enabled)
}

/// Sets `Authorization: Basic ...`.
pub fn basic_auth(username: &str, password: &str) -> Opt {
    header(
        header::AUTHORIZATION.as_str(),
        format!("Basic {}", basic_auth_token(username, password)),
    )
}

/// Sets `Authorization: Bearer ...`.
pub fn bearer_auth(token: impl AsRef<str>) -> Opt {
    header(
        header::AUTHORIZATION.as_str(),
        format!("Bearer {}", token.as_ref()),
    )
}

/// Adds a value to the request context, visible to middleware.
pub fn context_value(key: impl Into<String>, value: impl Into<String>) -> Opt {
    let pair = (key.into(), value.into());
    Opt::new(move |options| options.context_values.push(pair.clone()))
}

//! The round tripper at the end of every middleware chain.
//!
//! [`HyperTransport`] is the built-in one: a pooled hyper-util client with
//! rustls, proxy and dial hooks, redirect following and an optional cookie
//! jar. Its knobs can be changed after construction; each change rebuilds
//! the connection pool.

mod connector;
mod cookie_jar;
mod proxy;
mod redirect;

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use tower_service::Service;
use tracing::debug;

use crate::{ClientConfig, Error, Request, Response, Result};

pub use connector::{AsyncStream, BoxedStream, Conn, Connector, DialContext, DialFuture};
pub use cookie_jar::CookieJar;
pub use proxy::Proxy;
pub use redirect::RedirectPolicy;

use connector::{DialSettings, boxed_dial};

/// Future type for Tower Service implementations.
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'static>>;

/// Built-in round tripper backed by hyper-util.
#[derive(Clone)]
pub struct HyperTransport {
    inner: Client<Connector, Full<Bytes>>,
    config: ClientConfig,
    dial: DialSettings,
    redirect: RedirectPolicy,
    jar: Option<Arc<dyn CookieJar>>,
}

impl fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperTransport")
            .field("config", &self.config)
            .field("dial", &self.dial)
            .field("redirect", &self.redirect)
            .field("cookie_jar", &self.jar.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl HyperTransport {
    /// Creates a transport from a configuration.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let dial = DialSettings {
            connect_timeout: config.connect_timeout,
            ..DialSettings::default()
        };
        let redirect = RedirectPolicy::limited(config.max_redirects);
        let inner = build_client(&config, &dial);
        Self {
            inner,
            config,
            dial,
            redirect,
            jar: None,
        }
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn rebuild(&mut self) {
        self.inner = build_client(&self.config, &self.dial);
    }

    /// Routes connections through `proxy`.
    pub fn set_proxy(&mut self, proxy: Proxy) {
        self.dial.proxy = Some(proxy);
        self.rebuild();
    }

    /// Bounds each round trip, redirects included. Zero disables the bound.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
    }

    /// Replaces the redirect policy.
    pub fn set_redirect_policy(&mut self, policy: RedirectPolicy) {
        self.redirect = policy;
    }

    /// Installs a cookie jar.
    pub fn set_cookie_jar(&mut self, jar: Arc<dyn CookieJar>) {
        self.jar = Some(jar);
    }

    /// Opens raw connections with `dial`, given `host:port`.
    pub fn set_dial<F, Fut, S>(&mut self, dial: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<S>> + Send + 'static,
        S: AsyncStream + 'static,
    {
        self.dial.dial = Some(boxed_dial(dial));
        self.rebuild();
    }

    /// Opens raw connections with `dial`, given a [`DialContext`].
    ///
    /// Takes precedence over [`set_dial`](Self::set_dial).
    pub fn set_dial_context<F, Fut, S>(&mut self, dial: F)
    where
        F: Fn(DialContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<S>> + Send + 'static,
        S: AsyncStream + 'static,
    {
        self.dial.dial_context = Some(boxed_dial(dial));
        self.rebuild();
    }

    /// Opens `https` connections that are not proxied with `dial`, which
    /// must return a stream with TLS already established.
    pub fn set_dial_tls<F, Fut, S>(&mut self, dial: F)
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<S>> + Send + 'static,
        S: AsyncStream + 'static,
    {
        self.dial.dial_tls = Some(boxed_dial(dial));
        self.rebuild();
    }

    /// Build a hyper request from a ferry request.
    fn build_hyper_request(request: &Request) -> Result<http::Request<Full<Bytes>>> {
        let body = request.body().cloned().map_or_else(Full::default, Full::new);
        let mut http_request = http::Request::builder()
            .method(request.method().clone())
            .uri(request.url().as_str())
            .body(body)
            .map_err(|e| Error::invalid_request(e.to_string()))?;
        *http_request.headers_mut() = request.headers().clone();
        Ok(http_request)
    }

    /// One round trip, body drained.
    async fn send(&self, request: &Request) -> Result<Response> {
        let hyper_request = Self::build_hyper_request(request)?;

        let response = self
            .inner
            .request(hyper_request)
            .await
            .map_err(Self::map_hyper_error)?;

        let status = response.status().as_u16();
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| Error::connection(e.to_string()))?
            .to_bytes();

        Ok(Response::new(status, parts.headers, body))
    }

    /// Round trips until a final response, consulting the jar on every hop.
    async fn follow(&self, request: Request) -> Result<Response> {
        let mut via: Vec<Request> = Vec::new();
        let mut current = request;

        loop {
            let mut outgoing = current.clone();
            if let Some(jar) = &self.jar {
                for cookie in jar.cookies(current.url()) {
                    outgoing.add_cookie(&cookie)?;
                }
            }

            let response = self.send(&outgoing).await?;

            if let Some(jar) = &self.jar {
                let cookies = response.cookies();
                if !cookies.is_empty() {
                    jar.set_cookies(current.url(), &cookies);
                }
            }

            via.push(current);
            match self.redirect.next_request(&response, &via)? {
                Some(next) => {
                    debug!(
                        status = response.status(),
                        location = %next.url(),
                        "following redirect"
                    );
                    current = next;
                }
                None => return Ok(response),
            }
        }
    }

    async fn execute(self, request: Request) -> Result<Response> {
        if self.config.timeout.is_zero() {
            return self.follow(request).await;
        }
        tokio::time::timeout(self.config.timeout, self.follow(request))
            .await
            .map_err(|_| Error::Timeout)?
    }

    #[allow(clippy::needless_pass_by_value)]
    fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
        let msg = match std::error::Error::source(&err) {
            Some(source) => format!("{err}: {source}"),
            None => err.to_string(),
        };

        if err.is_connect() {
            return Error::connection(msg);
        }

        let lower = msg.to_ascii_lowercase();
        if lower.contains("ssl") || lower.contains("tls") || lower.contains("certificate") {
            return Error::tls(msg);
        }

        Error::connection(msg)
    }
}

fn build_client(config: &ClientConfig, dial: &DialSettings) -> Client<Connector, Full<Bytes>> {
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_idle_per_host)
        .retry_canceled_requests(config.retry_canceled_requests)
        .build(Connector::new(dial.clone()))
}

impl Service<Request> for HyperTransport {
    type Response = Response;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let transport = self.clone();
        Box::pin(transport.execute(request))
    }
}

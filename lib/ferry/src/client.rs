//! The client and its request pipeline.
//!
//! [`Client::execute`] runs every call through the same steps:
//!
//! 1. resolve options: client-level first, then call-level,
//! 2. attach context values and the call deadline,
//! 3. apply headers, then the body (a form replaces it), then the query and cookies,
//! 4. compose the middleware chain around the transport, debug dump innermost,
//! 5. run the chain, retrying the whole chain on any error.
//!
//! Steps 3 to 5 run under the call deadline.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use ferry_core::{Body, ContentType, encode_pairs, header};
use tower::ServiceExt;
use tower::util::BoxCloneService;
use tower_service::Service;
use tracing::{debug, warn};

use crate::config::{ClientConfig, ClientConfigBuilder};
use crate::middleware::{Executor, Middleware, compose};
use crate::options::{Opt, Options};
use crate::transport::{
    AsyncStream, CookieJar, DialContext, HyperTransport, Proxy, RedirectPolicy,
};
use crate::{Error, Method, Request, Response, Result};

/// Thread-safe wrapper for a custom round tripper.
///
/// [`Executor`] is `Send` but not `Sync`; the mutex lets a client holding
/// one be shared across tasks.
#[derive(Clone)]
struct SharedExecutor {
    inner: Arc<Mutex<Executor>>,
}

impl SharedExecutor {
    fn new(executor: Executor) -> Self {
        Self {
            inner: Arc::new(Mutex::new(executor)),
        }
    }

    fn get(&self) -> Executor {
        // Lock, clone the service, and release the lock immediately
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// The round tripper a client sends requests through.
#[derive(Clone)]
enum Transport {
    Hyper(HyperTransport),
    Custom(SharedExecutor),
}

impl Transport {
    fn executor(&self) -> Executor {
        match self {
            Self::Hyper(transport) => BoxCloneService::new(transport.clone()),
            Self::Custom(executor) => executor.get(),
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hyper(transport) => transport.fmt(f),
            Self::Custom(_) => f.write_str("CustomRoundTripper"),
        }
    }
}

/// HTTP client with client-level options and a configurable transport.
///
/// Cloning is cheap; clones share the connection pool but not later
/// configuration changes.
///
/// # Example
///
/// ```ignore
/// use ferry::{Client, Middleware, opt};
/// use std::time::Duration;
///
/// let client = Client::builder()
///     .option(opt::header("User-Agent", "ferry"))
///     .option(opt::timeout(Duration::from_secs(5)))
///     .build();
///
/// let response = client
///     .get(
///         "https://example.com/health",
///         &[opt::retry_times(2), opt::middleware(Middleware::expect_status(200))],
///     )
///     .await?;
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    transport: Transport,
    options: Vec<Opt>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Create a new client with default configuration and no options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom transport configuration.
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            transport: Transport::Hyper(HyperTransport::new(config)),
            options: Vec::new(),
        }
    }

    /// Create a new client builder.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Options applied to every call, before call-level options.
    #[must_use]
    pub fn options(&self) -> &[Opt] {
        &self.options
    }

    /// Adds a client-level option.
    pub fn add_option(&mut self, opt: Opt) {
        self.options.push(opt);
    }

    // ========================================================================
    // Request Pipeline
    // ========================================================================

    /// Sends `request` through the pipeline.
    ///
    /// # Errors
    ///
    /// Returns build errors (invalid header, serialization) without any
    /// attempt, [`Error::Timeout`] once the call deadline passes, and
    /// otherwise the error of the last attempt.
    pub async fn execute(&self, request: Request, opts: &[Opt]) -> Result<Response> {
        let options = Options::from_opts(&self.options, opts);

        let mut context = request.context().clone();
        for (key, value) in &options.context_values {
            context.insert(key.clone(), value.clone());
        }
        let context = context.with_timeout(options.timeout);
        let deadline = context.deadline();
        let request = request.with_context(context);

        let run = self.run(request, options);
        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.into(), run)
                .await
                .map_err(|_| Error::Timeout)?,
            None => run.await,
        }
    }

    async fn run(&self, mut request: Request, mut options: Options) -> Result<Response> {
        prepare(&mut request, &options)?;

        if options.debug {
            options.middlewares.push(Middleware::debug(true));
        }
        let chain = compose(&options.middlewares, self.transport.executor());

        let attempts = options.retry_times.saturating_add(1);
        let mut attempt = 1;
        loop {
            match chain.clone().oneshot(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(err) if attempt < attempts => {
                    debug!(attempt, attempts, error = %err, "attempt failed, retrying");
                    attempt += 1;
                }
                Err(err) => {
                    if attempts > 1 {
                        warn!(attempts, error = %err, "all attempts failed");
                    }
                    return Err(err);
                }
            }
        }
    }

    // ========================================================================
    // Verb Helpers
    // ========================================================================

    /// `GET url`.
    pub async fn get(&self, url: &str, opts: &[Opt]) -> Result<Response> {
        self.execute(Request::parse(Method::GET, url)?, opts).await
    }

    /// `HEAD url`.
    pub async fn head(&self, url: &str, opts: &[Opt]) -> Result<Response> {
        self.execute(Request::parse(Method::HEAD, url)?, opts).await
    }

    /// `POST url` with a raw body and content type.
    pub async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: impl Into<Bytes>,
        opts: &[Opt],
    ) -> Result<Response> {
        let request = with_body(Method::POST, url, content_type, body.into())?;
        self.execute(request, opts).await
    }

    /// `POST url` with form fields, URL-encoded.
    pub async fn post_form<K, V>(
        &self,
        url: &str,
        form: impl IntoIterator<Item = (K, V)>,
        opts: &[Opt],
    ) -> Result<Response>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let pairs: Vec<(String, String)> = form
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        let encoded = encode_pairs(&pairs)?;
        self.post(url, ContentType::FormUrlEncoded.as_str(), encoded, opts)
            .await
    }

    /// `PUT url` with a raw body and content type.
    pub async fn put(
        &self,
        url: &str,
        content_type: &str,
        body: impl Into<Bytes>,
        opts: &[Opt],
    ) -> Result<Response> {
        let request = with_body(Method::PUT, url, content_type, body.into())?;
        self.execute(request, opts).await
    }

    /// `PATCH url` with a raw body and content type.
    pub async fn patch(
        &self,
        url: &str,
        content_type: &str,
        body: impl Into<Bytes>,
        opts: &[Opt],
    ) -> Result<Response> {
        let request = with_body(Method::PATCH, url, content_type, body.into())?;
        self.execute(request, opts).await
    }

    /// `DELETE url`.
    pub async fn delete(&self, url: &str, opts: &[Opt]) -> Result<Response> {
        self.execute(Request::parse(Method::DELETE, url)?, opts)
            .await
    }

    // ========================================================================
    // Transport Mutators
    // ========================================================================

    fn hyper_transport(&mut self, knob: &str) -> Result<&mut HyperTransport> {
        match &mut self.transport {
            Transport::Hyper(transport) => Ok(transport),
            Transport::Custom(_) => Err(Error::unsupported_transport(knob)),
        }
    }

    /// Replaces the round tripper. Later transport knobs then fail with
    /// [`Error::UnsupportedTransport`].
    pub fn set_round_tripper<S>(&mut self, round_tripper: S)
    where
        S: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        S::Future: Send + 'static,
    {
        self.transport =
            Transport::Custom(SharedExecutor::new(BoxCloneService::new(round_tripper)));
    }

    /// Replaces the redirect policy.
    pub fn set_redirect_policy(&mut self, policy: RedirectPolicy) -> Result<()> {
        self.hyper_transport("redirect policy")?
            .set_redirect_policy(policy);
        Ok(())
    }

    /// Installs a cookie jar.
    pub fn set_cookie_jar(&mut self, jar: Arc<dyn CookieJar>) -> Result<()> {
        self.hyper_transport("cookie jar")?.set_cookie_jar(jar);
        Ok(())
    }

    /// Routes connections through `proxy`.
    pub fn set_proxy(&mut self, proxy: Proxy) -> Result<()> {
        self.hyper_transport("proxy")?.set_proxy(proxy);
        Ok(())
    }

    /// Routes every connection through the proxy at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidProxy`] when `url` is not an `http` URL.
    pub fn set_proxy_url(&mut self, url: &str) -> Result<()> {
        let transport = self.hyper_transport("proxy")?;
        transport.set_proxy(Proxy::url(url)?);
        Ok(())
    }

    /// Bounds each round trip on the transport. Zero disables the bound.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.hyper_transport("timeout")?.set_timeout(timeout);
        Ok(())
    }

    /// Opens raw connections with `dial`, given `host:port`.
    pub fn set_dial<F, Fut, S>(&mut self, dial: F) -> Result<()>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<S>> + Send + 'static,
        S: AsyncStream + 'static,
    {
        self.hyper_transport("dial")?.set_dial(dial);
        Ok(())
    }

    /// Opens raw connections with `dial`, given a [`DialContext`].
    pub fn set_dial_context<F, Fut, S>(&mut self, dial: F) -> Result<()>
    where
        F: Fn(DialContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<S>> + Send + 'static,
        S: AsyncStream + 'static,
    {
        self.hyper_transport("dial context")?.set_dial_context(dial);
        Ok(())
    }

    /// Opens non-proxied `https` connections with `dial`, TLS included.
    pub fn set_dial_tls<F, Fut, S>(&mut self, dial: F) -> Result<()>
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<S>> + Send + 'static,
        S: AsyncStream + 'static,
    {
        self.hyper_transport("dial tls")?.set_dial_tls(dial);
        Ok(())
    }
}

fn with_body(method: Method, url: &str, content_type: &str, body: Bytes) -> Result<Request> {
    let mut request = Request::parse(method, url)?;
    request.set_header(header::CONTENT_TYPE.as_str(), content_type)?;
    request.set_body(body);
    Ok(request)
}

/// Applies headers, body, query and cookies to `request`.
fn prepare(request: &mut Request, options: &Options) -> Result<()> {
    for (name, value) in &options.headers {
        request.set_header(name, value)?;
    }

    let body = match &options.form {
        Some(form) => {
            request.set_header(
                header::CONTENT_TYPE.as_str(),
                ContentType::FormUrlEncoded.as_str(),
            )?;
            Some(Body::from(encode_pairs(form)?))
        }
        None => options.body.clone(),
    };
    if let Some(body) = body {
        let (bytes, content_type) = body.materialize()?;
        if let Some(content_type) = content_type {
            request.set_header(header::CONTENT_TYPE.as_str(), content_type.as_str())?;
        }
        request.set_body(bytes);
    }

    if !options.query.is_empty() {
        let encoded = encode_pairs(&options.query)?;
        request.url_mut().set_query(Some(&encoded));
    }

    for cookie in &options.cookies {
        request.add_cookie(cookie)?;
    }
    Ok(())
}

/// Builder for [`Client`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfigBuilder,
    options: Vec<Opt>,
}

impl ClientBuilder {
    /// Set the round-trip timeout of the transport.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.timeout(timeout);
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.connect_timeout(timeout);
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.config = self.config.pool_idle_per_host(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.pool_idle_timeout(timeout);
        self
    }

    /// Set the redirect limit.
    #[must_use]
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config = self.config.max_redirects(max);
        self
    }

    /// Add a client-level option.
    #[must_use]
    pub fn option(mut self, opt: Opt) -> Self {
        self.options.push(opt);
        self
    }

    /// Add several client-level options.
    #[must_use]
    pub fn options(mut self, opts: impl IntoIterator<Item = Opt>) -> Self {
        self.options.extend(opts);
        self
    }

    /// Build the client.
    #[must_use]
    pub fn build(self) -> Client {
        let mut client = Client::with_config(self.config.build());
        client.options = self.options;
        client
    }
}

// ============================================================================
// Default Client
// ============================================================================

static DEFAULT_CLIENT: LazyLock<Client> = LazyLock::new(Client::new);

/// The shared client behind the free functions.
#[must_use]
pub fn default_client() -> &'static Client {
    &DEFAULT_CLIENT
}

/// [`Client::execute`] on the default client.
pub async fn execute(request: Request, opts: &[Opt]) -> Result<Response> {
    default_client().execute(request, opts).await
}

/// [`Client::get`] on the default client.
pub async fn get(url: &str, opts: &[Opt]) -> Result<Response> {
    default_client().get(url, opts).await
}

/// [`Client::head`] on the default client.
pub async fn head(url: &str, opts: &[Opt]) -> Result<Response> {
    default_client().head(url, opts).await
}

/// [`Client::post`] on the default client.
pub async fn post(
    url: &str,
    content_type: &str,
    body: impl Into<Bytes>,
    opts: &[Opt],
) -> Result<Response> {
    default_client().post(url, content_type, body, opts).await
}

/// [`Client::post_form`] on the default client.
pub async fn post_form<K, V>(
    url: &str,
    form: impl IntoIterator<Item = (K, V)>,
    opts: &[Opt],
) -> Result<Response>
where
    K: Into<String>,
    V: Into<String>,
{
    default_client().post_form(url, form, opts).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert2::{check, let_assert};
    use http::HeaderMap;

    use super::*;
    use crate::opt;

    /// Round tripper recording every request it sees.
    #[derive(Clone, Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<Request>>>,
        status: u16,
    }

    impl Recorder {
        fn with_status(status: u16) -> Self {
            Self {
                status,
                ..Self::default()
            }
        }

        fn client(&self) -> Client {
            let mut client = Client::new();
            let recorder = self.clone();
            client.set_round_tripper(tower::service_fn(move |request: Request| {
                let recorder = recorder.clone();
                async move {
                    recorder.seen.lock().expect("lock").push(request);
                    Ok::<_, Error>(Response::new(
                        recorder.status,
                        HeaderMap::new(),
                        Bytes::from_static(b"recorded"),
                    ))
                }
            }));
            client
        }

        fn last(&self) -> Request {
            self.seen
                .lock()
                .expect("lock")
                .last()
                .cloned()
                .expect("a request")
        }

        fn count(&self) -> usize {
            self.seen.lock().expect("lock").len()
        }
    }

    #[tokio::test]
    async fn later_header_value_wins() {
        let recorder = Recorder::with_status(200);
        let mut client = recorder.client();
        client.add_option(opt::header("X-Env", "client"));

        client
            .get("http://localhost/", &[opt::header("X-Env", "call")])
            .await
            .expect("response");

        check!(recorder.last().header("x-env") == Some("call"));
    }

    #[tokio::test]
    async fn json_body_forces_content_type() {
        let recorder = Recorder::with_status(200);
        let client = recorder.client();

        client
            .post(
                "http://localhost/items",
                "text/plain",
                "ignored",
                &[opt::json(serde_json::json!({"name": "ferry"}))],
            )
            .await
            .expect("response");

        let request = recorder.last();
        check!(request.header("content-type") == Some("application/json"));
        check!(request.body() == Some(&Bytes::from_static(br#"{"name":"ferry"}"#)));
    }

    #[tokio::test]
    async fn form_replaces_body() {
        let recorder = Recorder::with_status(200);
        let client = recorder.client();

        client
            .get(
                "http://localhost/",
                &[
                    opt::body("raw"),
                    opt::form("b", "2"),
                    opt::form("a", "x y"),
                ],
            )
            .await
            .expect("response");

        let request = recorder.last();
        check!(request.header("content-type") == Some("application/x-www-form-urlencoded"));
        check!(request.body() == Some(&Bytes::from_static(b"a=x+y&b=2")));
    }

    #[tokio::test]
    async fn empty_body_becomes_no_body() {
        let recorder = Recorder::with_status(200);
        let client = recorder.client();

        client
            .get("http://localhost/", &[opt::body(Bytes::new())])
            .await
            .expect("response");

        let request = recorder.last();
        check!(request.body().is_none());
        check!(request.content_length() == 0);
    }

    #[tokio::test]
    async fn configured_query_replaces_url_query() {
        let recorder = Recorder::with_status(200);
        let client = recorder.client();

        client
            .get(
                "http://localhost/search?z=last",
                &[opt::query("q", "rust lang"), opt::query_values([("a", "1")])],
            )
            .await
            .expect("response");

        check!(recorder.last().url().query() == Some("a=1&q=rust+lang"));
    }

    #[tokio::test]
    async fn url_query_kept_without_query_options() {
        let recorder = Recorder::with_status(200);
        let client = recorder.client();

        client
            .get("http://localhost/search?z=last", &[])
            .await
            .expect("response");

        check!(recorder.last().url().query() == Some("z=last"));
    }

    #[tokio::test]
    async fn cookies_are_escaped_and_joined() {
        let recorder = Recorder::with_status(200);
        let client = recorder.client();

        client
            .get(
                "http://localhost/",
                &[opt::cookie("a", "1"), opt::cookie("b", "x y")],
            )
            .await
            .expect("response");

        check!(recorder.last().header("cookie") == Some("a=1; b=x+y"));
    }

    #[tokio::test]
    async fn context_values_reach_middleware() {
        let recorder = Recorder::with_status(200);
        let client = recorder.client();
        let seen = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let capture = Middleware::from_fn(move |request: Request, next: Executor| {
            let captured = captured.clone();
            async move {
                *captured.lock().expect("lock") =
                    request.context().value("trace").map(str::to_string);
                next.oneshot(request).await
            }
        });

        client
            .get(
                "http://localhost/",
                &[
                    opt::context_value("trace", "first"),
                    opt::context_value("trace", "second"),
                    opt::middleware(capture),
                ],
            )
            .await
            .expect("response");

        check!(seen.lock().expect("lock").as_deref() == Some("second"));
    }

    #[tokio::test]
    async fn retries_run_the_whole_chain() {
        let recorder = Recorder::with_status(503);
        let client = recorder.client();
        let entered = Arc::new(AtomicUsize::new(0));
        let counter = entered.clone();
        let count = Middleware::from_fn(move |request: Request, next: Executor| {
            counter.fetch_add(1, Ordering::SeqCst);
            next.oneshot(request)
        });

        let result = client
            .get(
                "http://localhost/",
                &[
                    opt::retry_times(3),
                    opt::middleware(count),
                    opt::middleware(Middleware::expect_status(200)),
                ],
            )
            .await;

        let_assert!(Err(err) = result);
        check!(err.status() == Some(503));
        check!(entered.load(Ordering::SeqCst) == 4);
        check!(recorder.count() == 4);
    }

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let recorder = Recorder::with_status(500);
        let client = recorder.client();

        let result = client
            .get(
                "http://localhost/",
                &[
                    opt::retry_times(0),
                    opt::middleware(Middleware::expect_status(200)),
                ],
            )
            .await;

        let_assert!(Err(err) = result);
        check!(err.status() == Some(500));
        check!(recorder.count() == 1);
    }

    #[tokio::test]
    async fn raw_body_is_replayed_on_every_attempt() {
        let recorder = Recorder::with_status(502);
        let client = recorder.client();

        let result = client
            .post(
                "http://localhost/upload",
                "text/plain",
                "payload",
                &[
                    opt::retry_times(2),
                    opt::middleware(Middleware::expect_status(200)),
                ],
            )
            .await;

        let_assert!(Err(_) = result);
        let bodies: Vec<Option<Bytes>> = recorder
            .seen
            .lock()
            .expect("lock")
            .iter()
            .map(|request| request.body().cloned())
            .collect();
        check!(bodies == vec![Some(Bytes::from_static(b"payload")); 3]);
    }

    #[tokio::test]
    async fn success_stops_retrying() {
        let recorder = Recorder::with_status(200);
        let client = recorder.client();

        client
            .get("http://localhost/", &[opt::retry_times(5)])
            .await
            .expect("response");

        check!(recorder.count() == 1);
    }

    #[tokio::test]
    async fn build_errors_are_not_retried() {
        let recorder = Recorder::with_status(200);
        let client = recorder.client();

        let result = client
            .get(
                "http://localhost/",
                &[opt::retry_times(3), opt::header("bad header", "x")],
            )
            .await;

        let_assert!(Err(Error::InvalidHeader(_)) = result);
        check!(recorder.count() == 0);
    }

    #[tokio::test]
    async fn timeout_bounds_the_whole_call() {
        let mut client = Client::new();
        client.set_round_tripper(tower::service_fn(|_request: Request| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, Error>(Response::new(200, HeaderMap::new(), Bytes::new()))
        }));

        let result = client
            .get(
                "http://localhost/",
                &[opt::timeout(Duration::from_millis(50)), opt::retry_times(10)],
            )
            .await;

        let_assert!(Err(err) = result);
        check!(err.is_timeout());
    }

    #[tokio::test]
    async fn debug_dump_sees_final_request() {
        let recorder = Recorder::with_status(200);
        let client = recorder.client();

        let response = client
            .get(
                "http://localhost/",
                &[opt::debug(true), opt::header("X-Debug", "1")],
            )
            .await
            .expect("response");

        check!(response.text() == "recorded");
        check!(recorder.last().header("x-debug") == Some("1"));
    }

    #[test]
    fn knobs_fail_on_custom_round_tripper() {
        let mut client = Recorder::default().client();

        let_assert!(Err(Error::UnsupportedTransport(knob)) = client.set_proxy_url("http://proxy:3128"));
        check!(knob == "proxy");
        check!(client.set_timeout(Duration::from_secs(1)).is_err());
        check!(client.set_redirect_policy(RedirectPolicy::none()).is_err());
    }

    #[test]
    fn knobs_apply_to_hyper_transport() {
        let mut client = Client::new();

        check!(client.set_timeout(Duration::from_secs(1)).is_ok());
        check!(client.set_redirect_policy(RedirectPolicy::limited(3)).is_ok());
        check!(client.set_proxy_url("http://127.0.0.1:3128").is_ok());
        let_assert!(Err(Error::InvalidProxy(_)) = client.set_proxy_url("ftp://proxy"));
    }

    #[test]
    fn builder_collects_options() {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .option(opt::retry_times(2))
            .options([opt::debug(true)])
            .build();

        check!(client.options().len() == 2);
    }
}

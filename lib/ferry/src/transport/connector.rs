//! Connection establishment.
//!
//! [`Connector`] is the hyper connector used by [`HyperTransport`]. It layers,
//! from the socket up:
//!
//! 1. a dial step: a user hook, or a TCP connect bounded by the connect timeout,
//!    towards either the destination or its proxy,
//! 2. a `CONNECT` tunnel when an `https` destination goes through a proxy,
//! 3. TLS with rustls and the Mozilla root certificates for `https`, unless a
//!    TLS dial hook supplies an already secured stream.
//!
//! [`HyperTransport`]: super::HyperTransport

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use http::Uri;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tower_service::Service;
use tracing::debug;

use super::proxy::Proxy;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A bidirectional byte stream returned by dial hooks.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Boxed [`AsyncStream`].
pub type BoxedStream = Box<dyn AsyncStream>;

/// Future returned by dial hooks.
pub type DialFuture = BoxFuture<'static, io::Result<BoxedStream>>;

pub(crate) type DialFn = Arc<dyn Fn(String) -> DialFuture + Send + Sync>;
pub(crate) type DialContextFn = Arc<dyn Fn(DialContext) -> DialFuture + Send + Sync>;

/// What a context-aware dial hook is asked to connect to.
///
/// The dial future is dropped once `deadline` passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialContext {
    /// Host name or IP literal, without brackets.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// When the connect attempt is abandoned, if bounded.
    pub deadline: Option<Instant>,
}

impl DialContext {
    /// `host:port`, bracketing IPv6 literals.
    #[must_use]
    pub fn addr(&self) -> String {
        join_host_port(&self.host, self.port)
    }
}

/// Boxes a user dial function into the shape the connector stores.
pub(crate) fn boxed_dial<A, F, Fut, S>(dial: F) -> Arc<dyn Fn(A) -> DialFuture + Send + Sync>
where
    A: 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = io::Result<S>> + Send + 'static,
    S: AsyncStream + 'static,
{
    Arc::new(move |target| {
        let connecting = dial(target);
        Box::pin(async move { connecting.await.map(|stream| Box::new(stream) as BoxedStream) })
    })
}

/// Knobs shared by the connector layers.
#[derive(Clone, Default)]
pub(crate) struct DialSettings {
    pub(crate) proxy: Option<Proxy>,
    pub(crate) dial: Option<DialFn>,
    pub(crate) dial_context: Option<DialContextFn>,
    pub(crate) dial_tls: Option<DialFn>,
    pub(crate) connect_timeout: Duration,
}

impl fmt::Debug for DialSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialSettings")
            .field("proxy", &self.proxy)
            .field("dial", &self.dial.is_some())
            .field("dial_context", &self.dial_context.is_some())
            .field("dial_tls", &self.dial_tls.is_some())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl DialSettings {
    fn proxy_for(&self, destination: &Uri) -> Option<Uri> {
        self.proxy
            .as_ref()
            .and_then(|proxy| proxy.resolve(destination))
    }

    /// Opens a raw stream to `host:port`, preferring the context-aware hook.
    async fn dial(&self, host: String, port: u16) -> io::Result<BoxedStream> {
        let deadline =
            (!self.connect_timeout.is_zero()).then(|| Instant::now() + self.connect_timeout);

        let connecting: DialFuture = if let Some(dial) = &self.dial_context {
            dial(DialContext {
                host,
                port,
                deadline,
            })
        } else if let Some(dial) = &self.dial {
            dial(join_host_port(&host, port))
        } else {
            Box::pin(async move {
                let stream = TcpStream::connect((host.as_str(), port)).await?;
                stream.set_nodelay(true)?;
                Ok::<_, io::Error>(Box::new(stream) as BoxedStream)
            })
        };

        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.into(), connecting)
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))?,
            None => connecting.await,
        }
    }
}

/// Connects to the destination or its proxy and tunnels when needed.
#[derive(Clone, Debug)]
pub(crate) struct DialConnector {
    settings: Arc<DialSettings>,
}

impl Service<Uri> for DialConnector {
    type Response = PlainConn;
    type Error = io::Error;
    type Future = BoxFuture<'static, io::Result<PlainConn>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, destination: Uri) -> Self::Future {
        let settings = self.settings.clone();
        Box::pin(async move {
            let proxy = settings.proxy_for(&destination);
            let (host, port) = host_port(proxy.as_ref().unwrap_or(&destination))?;
            debug!(%destination, proxied = proxy.is_some(), "dialing {host}:{port}");
            let stream = settings.dial(host, port).await?;

            match proxy {
                Some(_) if is_https(&destination) => {
                    let (host, port) = host_port(&destination)?;
                    let stream = tunnel(stream, &host, port).await?;
                    Ok::<_, io::Error>(PlainConn::new(stream, false))
                }
                Some(_) => Ok(PlainConn::new(stream, true)),
                None => Ok(PlainConn::new(stream, false)),
            }
        })
    }
}

/// Hyper connector: dial, optional tunnel, then TLS for `https`.
#[derive(Clone)]
pub struct Connector {
    https: HttpsConnector<DialConnector>,
    settings: Arc<DialSettings>,
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Connector {
    pub(crate) fn new(settings: DialSettings) -> Self {
        let settings = Arc::new(settings);

        let root_store: rustls::RootCertStore =
            webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let https = HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(DialConnector {
                settings: settings.clone(),
            });

        Self { https, settings }
    }
}

impl Service<Uri> for Connector {
    type Response = Conn;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Conn, BoxError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), BoxError>> {
        self.https.poll_ready(cx)
    }

    fn call(&mut self, destination: Uri) -> Self::Future {
        if is_https(&destination)
            && self.settings.proxy_for(&destination).is_none()
            && let Some(dial_tls) = self.settings.dial_tls.clone()
        {
            return Box::pin(async move {
                let (host, port) = host_port(&destination)?;
                let stream = dial_tls(join_host_port(&host, port)).await?;
                Ok::<_, BoxError>(Conn::new(PlainConn::new(stream, false)))
            });
        }

        let connecting = self.https.call(destination);
        Box::pin(async move { Ok::<_, BoxError>(Conn::new(connecting.await?)) })
    }
}

/// A dialed stream, before TLS.
pub(crate) struct PlainConn {
    io: TokioIo<BoxedStream>,
    proxied: bool,
}

impl PlainConn {
    fn new(stream: BoxedStream, proxied: bool) -> Self {
        Self {
            io: TokioIo::new(stream),
            proxied,
        }
    }
}

impl Connection for PlainConn {
    fn connected(&self) -> Connected {
        Connected::new().proxy(self.proxied)
    }
}

impl Read for PlainConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Read::poll_read(Pin::new(&mut self.io), cx, buf)
    }
}

impl Write for PlainConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Write::poll_write(Pin::new(&mut self.io), cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Write::poll_flush(Pin::new(&mut self.io), cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Write::poll_shutdown(Pin::new(&mut self.io), cx)
    }

    fn is_write_vectored(&self) -> bool {
        Write::is_write_vectored(&self.io)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Write::poll_write_vectored(Pin::new(&mut self.io), cx, bufs)
    }
}

trait Io: Read + Write + Connection + Send + Unpin {}

impl<T: Read + Write + Connection + Send + Unpin> Io for T {}

/// A connection handed to hyper: plain, TLS from rustls, or TLS from a dial hook.
pub struct Conn {
    inner: Box<dyn Io>,
}

impl Conn {
    fn new(io: impl Io + 'static) -> Self {
        Self {
            inner: Box::new(io),
        }
    }
}

impl Connection for Conn {
    fn connected(&self) -> Connected {
        self.inner.connected()
    }
}

impl Read for Conn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.inner).poll_read(cx, buf)
    }
}

impl Write for Conn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut *self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.inner).poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut *self.inner).poll_write_vectored(cx, bufs)
    }
}

/// Upper bound on a proxy's answer to `CONNECT`.
const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

/// Asks an HTTP proxy to open a tunnel to `host:port`.
async fn tunnel(mut stream: BoxedStream, host: &str, port: u16) -> io::Result<BoxedStream> {
    let authority = join_host_port(host, port);
    let request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::with_capacity(256);
    while !response.windows(4).any(|window| window == b"\r\n\r\n") {
        if response.len() > MAX_CONNECT_RESPONSE {
            return Err(io::Error::other("proxy CONNECT response too large"));
        }
        if stream.read_buf(&mut response).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "proxy closed the connection during CONNECT",
            ));
        }
    }

    let status_line = String::from_utf8_lossy(&response);
    let status_line = status_line.lines().next().unwrap_or_default();
    let accepted = status_line
        .split_whitespace()
        .nth(1)
        .is_some_and(|code| code == "200");
    if !accepted {
        return Err(io::Error::other(format!(
            "proxy refused CONNECT to {authority}: {status_line}"
        )));
    }
    Ok(stream)
}

fn is_https(uri: &Uri) -> bool {
    uri.scheme_str() == Some("https")
}

/// Host (brackets stripped) and port of a URI, defaulting the port by scheme.
fn host_port(uri: &Uri) -> io::Result<(String, u16)> {
    let host = uri
        .host()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("no host in {uri}")))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = uri
        .port_u16()
        .unwrap_or(if is_https(uri) { 443 } else { 80 });
    Ok((host.to_string(), port))
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

//! Error types for ferry.
//!
//! Errors fall into three groups that the request pipeline treats differently:
//!
//! - **build-time** errors (bad URL, bad header, unserializable body) are raised
//!   before any attempt is made and are never retried,
//! - **request-time** errors (transport failures, unexpected status) are raised
//!   by an attempt and are eligible for retry,
//! - **configuration** errors (proxy, unsupported transport knob) are raised by
//!   client-level mutators and never reach the pipeline.

use derive_more::{Display, Error, From};

/// Main error type for ferry operations.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),

    /// The base request could not be constructed.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// A header name or value is not valid HTTP.
    #[display("invalid header: {_0}")]
    #[from(skip)]
    InvalidHeader(#[error(not(source))] String),

    /// JSON serialization error for a structured body.
    #[display("JSON serialization error: {_0}")]
    #[from]
    Serialization(serde_json::Error),

    /// Form or query string serialization error.
    #[display("form serialization error: {_0}")]
    #[from]
    FormSerialization(serde_urlencoded::ser::Error),

    /// JSON deserialization error with path context.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// JSON path to the error (e.g., "user.address.city").
        path: String,
        /// Error message.
        message: String,
    },

    /// Network/connection errors.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// Request timeout, either a single round trip or the whole call deadline.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    /// Too many redirects.
    #[display("too many redirects ({count} exceeded max of {max})")]
    #[from(skip)]
    TooManyRedirects {
        /// Number of redirects followed.
        count: usize,
        /// Maximum allowed redirects.
        max: usize,
    },

    /// Invalid redirect response.
    #[display("invalid redirect: {_0}")]
    #[from(skip)]
    InvalidRedirect(#[error(not(source))] String),

    /// A custom redirect policy refused to follow a redirect.
    #[display("redirect refused: {_0}")]
    #[from(skip)]
    RedirectRefused(#[error(not(source))] String),

    /// The response status did not match the expected one.
    #[display("unexpected status: {status_line}\n    body: {body}")]
    #[from(skip)]
    UnexpectedStatus {
        /// Numeric status code of the discarded response.
        status: u16,
        /// Status line of the discarded response (e.g. `404 Not Found`).
        status_line: String,
        /// Body of the discarded response, decoded lossily as UTF-8.
        body: String,
    },

    /// The proxy configuration could not be applied.
    #[display("invalid proxy: {_0}")]
    #[from(skip)]
    InvalidProxy(#[error(not(source))] String),

    /// The installed round tripper does not expose the requested knob.
    #[display("unsupported transport: cannot set {_0} on a custom round tripper")]
    #[from(skip)]
    UnsupportedTransport(#[error(not(source))] String),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an invalid header error.
    #[must_use]
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader(message.into())
    }

    /// Create an unsupported transport error naming the rejected knob.
    #[must_use]
    pub fn unsupported_transport(knob: impl Into<String>) -> Self {
        Self::UnsupportedTransport(knob.into())
    }

    /// Create a JSON deserialization error with path context.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` if this error was produced by a status expectation.
    #[must_use]
    pub const fn is_unexpected_status(&self) -> bool {
        matches!(self, Self::UnexpectedStatus { .. })
    }

    /// Returns `true` if another attempt could succeed.
    ///
    /// Build, serialization and configuration errors are deterministic and
    /// are never worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidUrl(_)
                | Self::InvalidRequest(_)
                | Self::InvalidHeader(_)
                | Self::Serialization(_)
                | Self::FormSerialization(_)
                | Self::JsonDeserialization { .. }
                | Self::InvalidProxy(_)
                | Self::UnsupportedTransport(_)
        )
    }

    /// Returns the HTTP status code carried by the error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

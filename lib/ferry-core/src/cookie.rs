//! Cookies sent with requests and received in `Set-Cookie` headers.

use std::fmt;
use std::time::SystemTime;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters left untouched when escaping a cookie value: the RFC 3986
/// unreserved set. Spaces are handled separately and become `+`.
const COOKIE_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// An HTTP cookie.
///
/// Request cookies only use [`name`](Self::name) and [`value`](Self::value);
/// the attributes are filled when parsing a `Set-Cookie` response header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    path: Option<String>,
    domain: Option<String>,
    max_age: Option<i64>,
    expires: Option<SystemTime>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
}

/// `SameSite` attribute of a received cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// `SameSite=Strict`
    Strict,
    /// `SameSite=Lax`
    Lax,
    /// `SameSite=None`
    None,
}

impl Cookie {
    /// Creates a cookie with the value used verbatim.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    /// Creates a cookie whose value is escaped like a query component.
    ///
    /// ```
    /// use ferry_core::Cookie;
    ///
    /// let cookie = Cookie::escaped("greeting", "hello world; bye");
    /// assert_eq!(cookie.value(), "hello+world%3B+bye");
    /// ```
    #[must_use]
    pub fn escaped(name: impl Into<String>, value: &str) -> Self {
        Self::new(name, escape_value(value))
    }

    /// Parses a `Set-Cookie` header value.
    ///
    /// Returns `None` when the leading `name=value` pair is missing or the
    /// name is empty. Unknown attributes are ignored.
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        let parsed = cookie::Cookie::parse(header).ok()?;

        Some(Self {
            name: parsed.name().to_string(),
            value: parsed.value_trimmed().to_string(),
            path: parsed.path().map(str::to_string),
            domain: parsed.domain().map(str::to_string),
            max_age: parsed.max_age().map(|age| age.whole_seconds()),
            expires: parsed.expires_datetime().map(SystemTime::from),
            secure: parsed.secure().unwrap_or(false),
            http_only: parsed.http_only().unwrap_or(false),
            same_site: parsed.same_site().map(|same_site| match same_site {
                cookie::SameSite::Strict => SameSite::Strict,
                cookie::SameSite::Lax => SameSite::Lax,
                cookie::SameSite::None => SameSite::None,
            }),
        })
    }

    /// Cookie name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cookie value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// `Path` attribute.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// `Domain` attribute, without leading dot.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// `Max-Age` attribute in seconds.
    #[must_use]
    pub const fn max_age(&self) -> Option<i64> {
        self.max_age
    }

    /// `Expires` attribute.
    #[must_use]
    pub const fn expires(&self) -> Option<SystemTime> {
        self.expires
    }

    /// `SameSite` attribute.
    #[must_use]
    pub const fn same_site(&self) -> Option<SameSite> {
        self.same_site
    }

    /// `Secure` attribute.
    #[must_use]
    pub const fn secure(&self) -> bool {
        self.secure
    }

    /// `HttpOnly` attribute.
    #[must_use]
    pub const fn http_only(&self) -> bool {
        self.http_only
    }
}

/// Renders the `name=value` pair used in a `Cookie` request header.
impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

fn escape_value(value: &str) -> String {
    value
        .split(' ')
        .map(|part| utf8_percent_encode(part, COOKIE_VALUE).to_string())
        .collect::<Vec<_>>()
        .join("+")
}

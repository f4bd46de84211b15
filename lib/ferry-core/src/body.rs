//! Request bodies and serialization helpers.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use base64::Engine;
use bytes::Bytes;

use crate::Result;

/// Content type for request bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// JSON content type (`application/json`).
    Json,
    /// Form URL-encoded content type (`application/x-www-form-urlencoded`).
    FormUrlEncoded,
    /// Plain text content type (`text/plain`).
    PlainText,
    /// Binary content type (`application/octet-stream`).
    OctetStream,
}

impl ContentType {
    /// Get the MIME type string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::FormUrlEncoded => "application/x-www-form-urlencoded",
            Self::PlainText => "text/plain",
            Self::OctetStream => "application/octet-stream",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type SerializeFn = Arc<dyn Fn() -> serde_json::Result<Vec<u8>> + Send + Sync>;

/// A request body payload, before it is turned into bytes.
///
/// Raw payloads are captured as [`Bytes`]: every attempt and every redirect
/// hop gets its own cheap clone, so nothing is ever drained twice.
/// Structured payloads keep the value and are serialized to JSON exactly once
/// per call by [`Body::materialize`].
#[derive(Clone)]
pub enum Body {
    /// Pre-encoded bytes, sent as-is.
    Raw(Bytes),
    /// A value serialized to JSON when the request is built.
    Json(SerializeFn),
}

impl Body {
    /// Wraps a serializable value; serialization is deferred to
    /// [`materialize`](Self::materialize).
    pub fn json<T>(value: T) -> Self
    where
        T: serde::Serialize + Send + Sync + 'static,
    {
        Self::Json(Arc::new(move || serde_json::to_vec(&value)))
    }

    /// Drains a reader into a raw body snapshot.
    ///
    /// # Errors
    ///
    /// Returns the I/O error raised by the reader.
    pub fn from_reader(mut reader: impl Read) -> std::io::Result<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(Self::Raw(Bytes::from(buf)))
    }

    /// Resolves the payload into bytes, plus the content type it imposes.
    ///
    /// Only JSON payloads impose a content type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`](crate::Error::Serialization) when the
    /// structured value cannot be encoded.
    pub fn materialize(&self) -> Result<(Bytes, Option<ContentType>)> {
        match self {
            Self::Raw(bytes) => Ok((bytes.clone(), None)),
            Self::Json(serialize) => {
                let data = serialize()?;
                Ok((Bytes::from(data), Some(ContentType::Json)))
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(bytes) => f.debug_tuple("Raw").field(&bytes.len()).finish(),
            Self::Json(_) => f.write_str("Json(..)"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Raw(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Raw(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Self::Raw(Bytes::from_static(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Raw(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::Raw(Bytes::from_static(text.as_bytes()))
    }
}

/// Serialize a value to JSON bytes.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
///
/// ```
/// use ferry_core::to_json;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct User { name: String }
///
/// let user = User { name: "Alice".to_string() };
/// let bytes = to_json(&user).expect("serialize");
/// assert_eq!(bytes.as_ref(), br#"{"name":"Alice"}"#);
/// ```
pub fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(Into::into)
}

/// Serialize a value to JSON bytes, empty on failure.
#[must_use]
pub fn marshal<T: serde::Serialize + ?Sized>(value: &T) -> Bytes {
    to_json(value).unwrap_or_default()
}

/// Serialize a value to JSON text, empty on failure.
#[must_use]
pub fn marshal_string<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Deserialize JSON bytes to a value with path-aware error messages.
///
/// # Errors
///
/// Returns an error if JSON deserialization fails, with the error message
/// including the path to the problematic field (e.g., "user.address.city").
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
        crate::Error::json_deserialization(e.path().to_string(), e.inner().to_string())
    })
}

/// Encode key/value pairs as `application/x-www-form-urlencoded`.
///
/// Pairs are sorted by key; values sharing a key keep their insertion order.
///
/// # Errors
///
/// Returns an error if form serialization fails.
///
/// ```
/// use ferry_core::encode_pairs;
///
/// let pairs = vec![
///     ("b".to_string(), "2".to_string()),
///     ("a".to_string(), "x y".to_string()),
///     ("b".to_string(), "1".to_string()),
/// ];
/// assert_eq!(encode_pairs(&pairs).expect("encode"), "a=x+y&b=2&b=1");
/// ```
pub fn encode_pairs(pairs: &[(String, String)]) -> Result<String> {
    let mut sorted: Vec<&(String, String)> = pairs.iter().collect();
    sorted.sort_by(|(a, _), (b, _)| a.cmp(b));
    serde_urlencoded::to_string(sorted).map_err(Into::into)
}

/// Base64 token for HTTP basic authentication: `base64("user:pass")`.
///
/// ```
/// assert_eq!(ferry_core::basic_auth_token("user", "pass"), "dXNlcjpwYXNz");
/// ```
#[must_use]
pub fn basic_auth_token(username: &str, password: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"))
}

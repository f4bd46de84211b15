//! Cookie storage hook consulted by the hyper transport.

use ferry_core::Cookie;
use url::Url;

/// Stores cookies received in responses and supplies them to later requests.
///
/// The transport calls [`cookies`](Self::cookies) before every round trip,
/// redirect hops included, and [`set_cookies`](Self::set_cookies) with the
/// parsed `Set-Cookie` headers after it. Domain, path and expiry rules are
/// the jar's business.
///
/// ```ignore
/// struct SingleSession(Mutex<Option<Cookie>>);
///
/// impl CookieJar for SingleSession {
///     fn set_cookies(&self, _url: &Url, cookies: &[Cookie]) {
///         if let Some(session) = cookies.iter().find(|c| c.name() == "session") {
///             *self.0.lock().unwrap() = Some(session.clone());
///         }
///     }
///
///     fn cookies(&self, _url: &Url) -> Vec<Cookie> {
///         self.0.lock().unwrap().iter().cloned().collect()
///     }
/// }
///
/// client.set_cookie_jar(Arc::new(SingleSession(Mutex::default())))?;
/// ```
pub trait CookieJar: Send + Sync {
    /// Records cookies received from `url`.
    fn set_cookies(&self, url: &Url, cookies: &[Cookie]);

    /// Cookies to send to `url`.
    fn cookies(&self, url: &Url) -> Vec<Cookie>;
}

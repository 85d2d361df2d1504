//! A hook which keeps cookies between calls.

use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use tracing::{trace, warn};

use super::hooks::RequestHooks;
use crate::envelope::RequestEnvelope;

/// Sends cookies with every request and remembers the ones the server sets.
///
/// Cookies set with [`CookieKeeper::set`] are always sent. Cookies from the most
/// recent response carrying `Set-Cookie` headers are sent back only when
/// `auto_add_cookies` is enabled. Attributes such as `Path` or `Expires` are
/// ignored.
#[derive(Debug, Clone, Default)]
pub struct CookieKeeper {
    request_cookies: Vec<(String, String)>,
    response_cookies: Vec<(String, String)>,
    auto_add_cookies: bool,
}

impl CookieKeeper {
    /// A keeper which sends request cookies only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether response cookies are sent back. Off by default.
    pub fn with_auto_add_cookies(mut self, enabled: bool) -> Self {
        self.auto_add_cookies = enabled;
        self
    }

    /// Send `name=value` with every request.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        upsert(&mut self.request_cookies, name.into(), value.into());
    }

    /// Stop sending the request cookie `name`.
    pub fn remove(&mut self, name: &str) {
        self.request_cookies.retain(|(n, _)| n != name);
    }

    /// Cookies received in the last response which set any.
    pub fn response_cookies(&self) -> impl Iterator<Item = (&str, &str)> {
        self.response_cookies
            .iter()
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// The value of a received cookie.
    pub fn response_cookie(&self, name: &str) -> Option<&str> {
        self.response_cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn header(&self) -> Option<String> {
        let mut cookies: Vec<String> = self
            .request_cookies
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect();

        if self.auto_add_cookies {
            cookies.extend(
                self.response_cookies
                    .iter()
                    .filter(|(n, _)| !self.request_cookies.iter().any(|(r, _)| r == n))
                    .map(|(n, v)| format!("{n}={v}")),
            );
        }

        (!cookies.is_empty()).then(|| cookies.join("; "))
    }
}

impl RequestHooks for CookieKeeper {
    fn prepare_request(&mut self, _envelope: &mut RequestEnvelope, headers: &mut HeaderMap) {
        let Some(cookie) = self.header() else {
            return;
        };
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                headers.insert(COOKIE, value);
            }
            Err(error) => warn!(%error, "cookie header is not a valid header value"),
        }
    }

    fn handle_response(&mut self, response: &http::response::Parts) {
        let mut received = Vec::new();
        for value in response.headers.get_all(SET_COOKIE) {
            match value.to_str().ok().and_then(parse_set_cookie) {
                Some((name, value)) => upsert(&mut received, name, value),
                None => trace!(?value, "ignoring unparseable set-cookie header"),
            }
        }

        if !received.is_empty() {
            self.response_cookies = received;
        }
    }
}

fn upsert(cookies: &mut Vec<(String, String)>, name: String, value: String) {
    match cookies.iter_mut().find(|(n, _)| *n == name) {
        Some(entry) => entry.1 = value,
        None => cookies.push((name, value)),
    }
}

fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_owned(), value.trim().to_owned()))
}

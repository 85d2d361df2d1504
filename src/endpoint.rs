//! JSON-RPC endpoint addresses.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use http::uri::Authority;
use http::{HeaderValue, Uri};
use percent_encoding::percent_decode_str;

use crate::error::ConfigError;

/// Whether an endpoint is reached in the clear or over TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// `http`
    Plain,
    /// `https`
    Secure,
}

impl Scheme {
    /// The port used when the endpoint does not name one.
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Plain => 80,
            Scheme::Secure => 443,
        }
    }

    /// The URI scheme string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Plain => "http",
            Scheme::Secure => "https",
        }
    }

    /// Whether connections use TLS.
    pub fn is_secure(&self) -> bool {
        matches!(self, Scheme::Secure)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Username and password embedded in the endpoint URI.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    /// The decoded user name.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The value of a `Basic` authorization header for these credentials.
    pub fn authorization(&self) -> Result<HeaderValue, ConfigError> {
        let token = STANDARD.encode(format!("{}:{}", self.user, self.password));
        let mut value = HeaderValue::from_str(&format!("Basic {token}"))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A parsed JSON-RPC endpoint.
///
/// The authority never carries user information; credentials are split off
/// and kept separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: Scheme,
    authority: Authority,
    path: String,
    credentials: Option<Credentials>,
}

impl Endpoint {
    /// Parse an `http` or `https` URI.
    pub fn parse(uri: &str) -> Result<Self, ConfigError> {
        let parsed: Uri = uri.parse()?;

        let scheme = match parsed.scheme_str() {
            Some("http") => Scheme::Plain,
            Some("https") => Scheme::Secure,
            _ => return Err(ConfigError::UnsupportedScheme(uri.to_owned())),
        };

        let raw = parsed
            .authority()
            .ok_or_else(|| ConfigError::MissingHost(uri.to_owned()))?
            .as_str();

        let (userinfo, hostport) = match raw.rsplit_once('@') {
            Some((userinfo, hostport)) => (Some(userinfo), hostport),
            None => (None, raw),
        };

        if hostport.is_empty() {
            return Err(ConfigError::MissingHost(uri.to_owned()));
        }
        let authority = Authority::from_str(hostport)?;
        if authority.host().is_empty() {
            return Err(ConfigError::MissingHost(uri.to_owned()));
        }

        let credentials = userinfo.and_then(|userinfo| {
            let (user, password) = userinfo.split_once(':')?;
            let user = percent_decode(user);
            let password = percent_decode(password);
            (!user.is_empty() && !password.is_empty()).then_some(Credentials { user, password })
        });

        let path = parsed
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| !pq.is_empty())
            .unwrap_or("/")
            .to_owned();

        Ok(Self {
            scheme,
            authority,
            path,
            credentials,
        })
    }

    /// Plain or secure.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Host and optional port, as sent in the `Host` header.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Host name without port or IPv6 brackets.
    pub fn hostname(&self) -> &str {
        hostname(&self.authority)
    }

    /// The explicit port, or the scheme default.
    pub fn port(&self) -> u16 {
        self.authority
            .port_u16()
            .unwrap_or_else(|| self.scheme.default_port())
    }

    /// Request target, including any query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Credentials from the URI, when both user and password were given.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}

impl FromStr for Endpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.path)
    }
}

pub(crate) fn hostname(authority: &Authority) -> &str {
    authority
        .host()
        .trim_start_matches('[')
        .trim_end_matches(']')
}

fn percent_decode(input: &str) -> String {
    percent_decode_str(input).decode_utf8_lossy().into_owned()
}

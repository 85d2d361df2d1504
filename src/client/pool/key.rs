use std::fmt;

use http::uri::Authority;

use crate::endpoint::{Endpoint, Scheme};

/// Pool key which identifies a connection by scheme and authority.
///
/// The scheme is part of the key so that plain and secure connections to the
/// same host never share an entry.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct PoolKey(Scheme, Authority);

impl PoolKey {
    /// Create a key for `authority` reached over `scheme`.
    pub fn new(scheme: Scheme, authority: Authority) -> Self {
        Self(scheme, authority)
    }

    /// Plain or secure.
    pub fn scheme(&self) -> Scheme {
        self.0
    }

    /// Host and optional port.
    pub fn authority(&self) -> &Authority {
        &self.1
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.0, self.1)
    }
}

impl From<(Scheme, Authority)> for PoolKey {
    fn from(value: (Scheme, Authority)) -> Self {
        Self(value.0, value.1)
    }
}

impl From<&Endpoint> for PoolKey {
    fn from(endpoint: &Endpoint) -> Self {
        Self(endpoint.scheme(), endpoint.authority().clone())
    }
}

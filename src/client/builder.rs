use std::time::Duration;

use camino::Utf8PathBuf;
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderName, HeaderValue};

use super::conn::{Connector, SecureConnector, TcpConfig};
use super::hooks::RequestHooks;
use super::pool::{ConnectionPool, PoolKey};
use super::transport::Transport;
use super::ServerProxy;
use crate::endpoint::{Endpoint, Scheme};
use crate::error::{ConfigError, Error};
use crate::tls::TlsConfig;

/// A builder for a [`ServerProxy`].
///
/// Nothing is read or validated until [`Builder::build`], which parses the URI and
/// loads any certificate files.
#[derive(Debug)]
pub struct Builder {
    uri: String,
    tls: TlsConfig,
    tcp: TcpConfig,
    headers: HeaderMap,
    pool: bool,
    user_agent: Option<String>,
    hooks: Vec<Box<dyn RequestHooks>>,
}

impl Builder {
    /// Start building a client for `uri`.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            tls: TlsConfig::default(),
            tcp: TcpConfig::default(),
            headers: HeaderMap::new(),
            pool: false,
            user_agent: None,
            hooks: Vec::new(),
        }
    }

    /// Present the certificate chain in `path` to the server.
    pub fn with_client_cert(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.tls.client_cert = Some(path.into());
        self
    }

    /// Use the private key in `path` for the client certificate.
    pub fn with_client_key(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.tls.client_key = Some(path.into());
        self
    }

    /// Verify the server against the CA certificates in `path`.
    pub fn with_ca_certs(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.tls.ca_certs = Some(path.into());
        self
    }

    /// Toggle the hostname check done after the handshake.
    pub fn with_verify_hostname(mut self, verify: bool) -> Self {
        self.tls.verify_hostname = verify;
        self
    }

    /// TLS configuration.
    pub fn tls(&mut self) -> &mut TlsConfig {
        &mut self.tls
    }

    /// Socket configuration.
    pub fn tcp(&mut self) -> &mut TcpConfig {
        &mut self.tcp
    }

    /// Send a static header with every request.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Send all of `headers` with every request.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Bound connecting, each exchange and each body read by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.tcp.timeout = Some(timeout);
        self
    }

    /// Keep connections open and reuse them between calls.
    pub fn with_pool(mut self) -> Self {
        self.pool = true;
        self
    }

    /// Open a fresh connection for every call.
    pub fn without_pool(mut self) -> Self {
        self.pool = false;
        self
    }

    /// Set the `User-Agent` header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Register a hook. Hooks run in registration order.
    pub fn with_hook(mut self, hook: impl RequestHooks + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ServerProxy, Error> {
        let endpoint = Endpoint::parse(&self.uri)?;

        let connector = match endpoint.scheme() {
            Scheme::Plain => Connector::plain(self.tcp),
            Scheme::Secure => {
                let tls = SecureConnector::new(&self.tls, self.tcp.clone())?;
                Connector::secure(tls, self.tcp)
            }
        };

        let mut transport = Transport::new(connector);
        if let Some(user_agent) = self.user_agent {
            let value = HeaderValue::from_str(&user_agent).map_err(ConfigError::from)?;
            transport = transport.with_user_agent(value);
        }

        let mut headers = self.headers;
        if let Some(credentials) = endpoint.credentials() {
            headers.insert(AUTHORIZATION, credentials.authorization()?);
        }

        tracing::debug!(%endpoint, pooled = self.pool, "built client");
        Ok(ServerProxy {
            key: PoolKey::from(&endpoint),
            endpoint,
            transport,
            pool: self.pool.then(ConnectionPool::new),
            headers,
            next_id: 1,
            hooks: self.hooks,
        })
    }
}

//! One HTTP exchange with a JSON-RPC server.
//!
//! The transport obtains a connection (fresh, or from the caller's pool), adds the
//! headers every request needs, posts the body and checks the status. Connection
//! level failures evict the pooled connection; HTTP status failures do not, since
//! the connection itself is still usable.

use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use http_body_util::{BodyExt as _, Full};
use hyper::body::Incoming;
use tracing::{debug, trace};

use super::conn::{tcp, Connector, HttpConnection};
use super::pool::{ConnectionPool, PoolKey};
use crate::error::{ConfigError, ConnectionError, Error, ProtocolError};

/// `User-Agent` sent when none is configured.
pub const DEFAULT_USER_AGENT: &str = concat!("rpcwire/", env!("CARGO_PKG_VERSION"));

/// Performs HTTP exchanges over fresh or pooled connections.
#[derive(Debug, Clone)]
pub struct Transport {
    connector: Connector,
    user_agent: HeaderValue,
}

impl Transport {
    /// Create a transport using `connector` for new connections.
    pub fn new(connector: Connector) -> Self {
        Self {
            connector,
            user_agent: HeaderValue::from_static(DEFAULT_USER_AGENT),
        }
    }

    /// Replace the `User-Agent` header value.
    pub fn with_user_agent(mut self, user_agent: HeaderValue) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// The connector used for new connections.
    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    /// POST `body` to `path` on the host named by `key`.
    ///
    /// With a pool, the connection for `key` is reused (or created and kept); without
    /// one, a fresh connection is used for this exchange only. The returned response
    /// always has status 200.
    #[tracing::instrument(name = "request", skip_all, fields(key = %key, path = %path))]
    pub async fn request(
        &self,
        mut pool: Option<&mut ConnectionPool>,
        key: &PoolKey,
        path: &str,
        body: Option<Bytes>,
        headers: HeaderMap,
    ) -> Result<http::Response<Incoming>, Error> {
        let headers = self.prepare_headers(headers, key, body.as_ref(), pool.is_some());

        let mut request = http::Request::new(Full::new(body.unwrap_or_default()));
        *request.method_mut() = Method::POST;
        *request.uri_mut() = path.parse().map_err(ConfigError::from)?;
        *request.headers_mut() = headers.clone();

        let response = match pool.as_deref_mut() {
            Some(pool) => {
                let result = match pool.acquire(key, || self.connector.connect(key)).await {
                    Ok(conn) => self.send(conn, request, key).await,
                    Err(error) => Err(error),
                };
                if let Err(error) = &result {
                    debug!(%error, "request failed");
                    pool.evict(key);
                }
                result?
            }
            None => {
                let mut conn = self.connector.connect(key).await?;
                self.send(&mut conn, request, key).await?
            }
        };

        if response.status() != StatusCode::OK {
            return Err(self
                .protocol_error(pool, response, key, path, headers)
                .await
                .into());
        }

        trace!("response accepted");
        Ok(response)
    }

    /// Read the whole response body.
    ///
    /// A failure means the connection is no longer usable, so the pooled connection
    /// for `key` is evicted.
    pub async fn read_body(
        &self,
        pool: Option<&mut ConnectionPool>,
        key: &PoolKey,
        body: Incoming,
    ) -> Result<Bytes, Error> {
        let host = key.authority().as_str();
        let result = tcp::with_timeout(host, self.connector.tcp().timeout, async {
            body.collect()
                .await
                .map(|collected| collected.to_bytes())
                .map_err(ConnectionError::http(host))
        })
        .await;

        if let (Err(error), Some(pool)) = (&result, pool) {
            debug!(%error, "reading response body failed");
            pool.evict(key);
        }
        result.map_err(Error::from)
    }

    async fn send(
        &self,
        conn: &mut HttpConnection,
        request: http::Request<Full<Bytes>>,
        key: &PoolKey,
    ) -> Result<http::Response<Incoming>, ConnectionError> {
        tcp::with_timeout(
            key.authority().as_str(),
            self.connector.tcp().timeout,
            conn.send(request),
        )
        .await
    }

    fn prepare_headers(
        &self,
        mut headers: HeaderMap,
        key: &PoolKey,
        body: Option<&Bytes>,
        pooled: bool,
    ) -> HeaderMap {
        headers.insert(USER_AGENT, self.user_agent.clone());
        if let Ok(host) = HeaderValue::from_str(key.authority().as_str()) {
            headers.insert(HOST, host);
        }
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        headers.insert(
            CONTENT_LENGTH,
            HeaderValue::from(body.map_or(0, |body| body.len())),
        );
        if pooled {
            headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        }
        headers
    }

    /// Build the error for a non-200 response.
    ///
    /// The body is drained under the timeout so the connection can carry the next
    /// request. When draining fails, the pooled connection is evicted instead.
    async fn protocol_error(
        &self,
        pool: Option<&mut ConnectionPool>,
        response: http::Response<Incoming>,
        key: &PoolKey,
        path: &str,
        headers: HeaderMap,
    ) -> ProtocolError {
        let status = response.status();
        let reason = response
            .extensions()
            .get::<hyper::ext::ReasonPhrase>()
            .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
            .or_else(|| status.canonical_reason().map(String::from))
            .unwrap_or_default();

        let host = key.authority().as_str();
        let drained = tcp::with_timeout(host, self.connector.tcp().timeout, async {
            response
                .into_body()
                .collect()
                .await
                .map(drop)
                .map_err(ConnectionError::http(host))
        })
        .await;

        if let Err(error) = drained {
            debug!(%error, "unable to drain error response");
            if let Some(pool) = pool {
                pool.evict(key);
            }
        }

        ProtocolError {
            url: format!("{}{}", key.authority(), path),
            status,
            reason,
            headers,
        }
    }
}

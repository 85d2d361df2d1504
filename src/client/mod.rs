//! JSON-RPC client.
//!
//! [`ServerProxy`] is the entry point: it numbers requests, runs hooks, hands the
//! encoded envelope to the [`Transport`] and decodes the response.
//!
//! ```no_run
//! # async fn example() -> Result<(), rpcwire::Error> {
//! use serde_json::json;
//!
//! let mut proxy = rpcwire::ServerProxy::builder("https://rpc.example.com/api")
//!     .with_ca_certs("/etc/ssl/rpc-ca.pem")
//!     .with_pool()
//!     .build()?;
//!
//! let name = proxy.call("examples.getStateName", vec![json!(41)]).await?;
//! # let _ = name;
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use http::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

mod builder;
pub mod conn;
mod cookies;
mod hooks;
pub mod pool;
pub mod transport;

pub use self::builder::Builder;
pub use self::cookies::CookieKeeper;
pub use self::hooks::RequestHooks;
pub use self::pool::{ConnectionPool, PoolKey};
pub use self::transport::Transport;
use crate::endpoint::Endpoint;
use crate::envelope::{self, Params, RequestEnvelope};
use crate::error::{Error, ResponseFormatError};

/// A client for one JSON-RPC endpoint.
///
/// Calls take `&mut self`: the id counter, the hooks and the connection pool all
/// belong to a single caller. Use one proxy per task when calling concurrently.
#[derive(Debug)]
pub struct ServerProxy {
    endpoint: Endpoint,
    key: PoolKey,
    transport: Transport,
    pool: Option<ConnectionPool>,
    headers: HeaderMap,
    next_id: u64,
    hooks: Vec<Box<dyn RequestHooks>>,
}

impl ServerProxy {
    /// Start building a client for `uri`.
    pub fn builder(uri: impl Into<String>) -> Builder {
        Builder::new(uri)
    }

    /// A client for `uri` with default settings.
    pub fn new(uri: impl Into<String>) -> Result<Self, Error> {
        Builder::new(uri).build()
    }

    /// Call `method` and return its result.
    ///
    /// A `null` response body yields [`Value::Null`].
    #[tracing::instrument(name = "call", skip(self, params), fields(endpoint = %self.endpoint))]
    pub async fn call(&mut self, method: &str, params: impl Into<Params>) -> Result<Value, Error> {
        let response = self.send(method, params.into()).await?;
        let body = self
            .transport
            .read_body(self.pool.as_mut(), &self.key, response.into_body())
            .await?;
        envelope::decode_response(method, &body)
    }

    /// Call `method` and deserialize its result.
    pub async fn call_as<T: DeserializeOwned>(
        &mut self,
        method: &str,
        params: impl Into<Params>,
    ) -> Result<T, Error> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value)
            .map_err(|error| ResponseFormatError::Json(error).into())
    }

    /// Call `method` with positional or named arguments, but not both.
    pub async fn call_args(
        &mut self,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, Error> {
        let params = Params::new(args, kwargs)?;
        self.call(method, params).await
    }

    /// Call `method` and return the HTTP response without decoding it.
    ///
    /// The response always has status 200; other statuses are reported as
    /// [`Error::Protocol`].
    #[tracing::instrument(name = "call", skip(self, params), fields(endpoint = %self.endpoint))]
    pub async fn call_raw(
        &mut self,
        method: &str,
        params: impl Into<Params>,
    ) -> Result<http::Response<Bytes>, Error> {
        let response = self.send(method, params.into()).await?;
        let (parts, incoming) = response.into_parts();
        let body = self
            .transport
            .read_body(self.pool.as_mut(), &self.key, incoming)
            .await?;
        Ok(http::Response::from_parts(parts, body))
    }

    async fn send(
        &mut self,
        method: &str,
        params: Params,
    ) -> Result<http::Response<hyper::body::Incoming>, Error> {
        let id = self.next_id;
        self.next_id += 1;

        let mut envelope = RequestEnvelope::new(id, method, params);
        let mut headers = self.headers.clone();
        for hook in &mut self.hooks {
            hook.prepare_request(&mut envelope, &mut headers);
        }
        let body = envelope.to_bytes()?;

        debug!(id = envelope.id, method = %envelope.method, "sending request");
        let response = self
            .transport
            .request(
                self.pool.as_mut(),
                &self.key,
                self.endpoint.path(),
                Some(body),
                headers,
            )
            .await?;

        let (parts, body) = response.into_parts();
        for hook in &mut self.hooks {
            hook.handle_response(&parts);
        }
        Ok(http::Response::from_parts(parts, body))
    }

    /// The id the next request will carry.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// The endpoint this client calls.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Headers sent with every request, before hooks run.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the static headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The transport used for exchanges.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// The connection pool, when pooling is enabled.
    pub fn pool(&self) -> Option<&ConnectionPool> {
        self.pool.as_ref()
    }

    /// Take the pool out of the client, disabling pooling.
    pub fn take_pool(&mut self) -> Option<ConnectionPool> {
        self.pool.take()
    }

    /// Install `pool` (or disable pooling with `None`), returning the previous pool.
    pub fn set_pool(&mut self, pool: Option<ConnectionPool>) -> Option<ConnectionPool> {
        std::mem::replace(&mut self.pool, pool)
    }
}

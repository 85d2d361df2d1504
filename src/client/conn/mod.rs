//! Connections to JSON-RPC servers.
//!
//! A [`Connector`] turns a [`PoolKey`] into a live [`HttpConnection`]: it opens a
//! TCP stream, adds TLS for secure endpoints and runs the HTTP/1.1 handshake. The
//! connection driver runs on its own task for as long as the connection lives.

use std::io;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tracing::trace;

pub mod stream;
pub mod tcp;
pub mod tls;

pub use self::stream::RpcStream;
pub use self::tcp::TcpConfig;
pub use self::tls::SecureConnector;
use crate::client::pool::{PoolKey, PoolableConnection};
use crate::endpoint::{hostname, Scheme};
use crate::error::ConnectionError;

/// Opens new HTTP/1.1 connections.
#[derive(Debug, Clone)]
pub struct Connector {
    tcp: TcpConfig,
    tls: Option<SecureConnector>,
    http1: http1::Builder,
}

impl Connector {
    /// A connector for plain endpoints only.
    pub fn plain(tcp: TcpConfig) -> Self {
        Self {
            tcp,
            tls: None,
            http1: http1::Builder::new(),
        }
    }

    /// A connector which uses `tls` for secure endpoints.
    pub fn secure(tls: SecureConnector, tcp: TcpConfig) -> Self {
        Self {
            tcp,
            tls: Some(tls),
            http1: http1::Builder::new(),
        }
    }

    /// Socket options.
    pub fn tcp(&self) -> &TcpConfig {
        &self.tcp
    }

    /// The TLS connector, when secure endpoints are supported.
    pub fn tls(&self) -> Option<&SecureConnector> {
        self.tls.as_ref()
    }

    /// The HTTP/1.1 handshake configuration.
    pub fn http1(&mut self) -> &mut http1::Builder {
        &mut self.http1
    }

    /// Open a stream to the host named by `key`, without the HTTP handshake.
    pub async fn connect_stream(&self, key: &PoolKey) -> Result<RpcStream, ConnectionError> {
        let authority = key.authority();
        match (key.scheme(), &self.tls) {
            (Scheme::Plain, _) => {
                let port = authority
                    .port_u16()
                    .unwrap_or_else(|| Scheme::Plain.default_port());
                tcp::connect(hostname(authority), port, &self.tcp)
                    .await
                    .map(RpcStream::from)
            }
            (Scheme::Secure, Some(tls)) => tls.connect(authority).await,
            (Scheme::Secure, None) => Err(ConnectionError::Handshake {
                host: authority.to_string(),
                source: io::Error::new(
                    io::ErrorKind::Unsupported,
                    "connector has no TLS configuration",
                ),
            }),
        }
    }

    /// Open a connection and complete the HTTP/1.1 handshake.
    #[tracing::instrument(name = "connect", skip(self), fields(key = %key))]
    pub async fn connect(&self, key: &PoolKey) -> Result<HttpConnection, ConnectionError> {
        let stream = self.connect_stream(key).await?;
        let host = key.authority().to_string();

        trace!("handshake h1");
        let (sender, conn) = tcp::with_timeout(&host, self.tcp.timeout, async {
            self.http1
                .handshake::<_, Full<Bytes>>(TokioIo::new(stream))
                .await
                .map_err(ConnectionError::http(host.as_str()))
        })
        .await?;

        tokio::spawn(async {
            if let Err(err) = conn.await {
                if err.is_user() {
                    tracing::error!(%err, "h1 connection driver error");
                } else {
                    tracing::debug!(%err, "h1 connection driver error");
                }
            }
        });
        trace!("handshake complete");

        Ok(HttpConnection { sender, host })
    }
}

/// A live HTTP/1.1 connection.
#[derive(Debug)]
pub struct HttpConnection {
    sender: http1::SendRequest<Full<Bytes>>,
    host: String,
}

impl HttpConnection {
    /// Send one request and wait for the response head.
    pub async fn send(
        &mut self,
        request: http::Request<Full<Bytes>>,
    ) -> Result<http::Response<Incoming>, ConnectionError> {
        self.sender
            .ready()
            .await
            .map_err(ConnectionError::http(self.host.as_str()))?;
        self.sender
            .send_request(request)
            .await
            .map_err(ConnectionError::http(self.host.as_str()))
    }

    /// The host this connection was opened to.
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl PoolableConnection for HttpConnection {
    fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

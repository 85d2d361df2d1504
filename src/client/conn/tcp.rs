//! TCP connections to JSON-RPC endpoints.

use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;
use tracing::{trace, warn};

use crate::error::ConnectionError;

/// Socket options applied to every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// Bound on connecting, the TLS handshake and each HTTP exchange.
    pub timeout: Option<Duration>,

    /// Idle time before TCP keep-alive probes are sent.
    pub keep_alive: Option<Duration>,

    /// Whether to disable Nagle's algorithm.
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            keep_alive: Some(Duration::from_secs(90)),
            nodelay: true,
        }
    }
}

/// Run `future`, failing with a [`ConnectionError::Timeout`] once `timeout` elapses.
pub(crate) async fn with_timeout<F, T>(
    host: &str,
    timeout: Option<Duration>,
    future: F,
) -> Result<T, ConnectionError>
where
    F: std::future::Future<Output = Result<T, ConnectionError>>,
{
    match timeout {
        Some(duration) => tokio::time::timeout(duration, future)
            .await
            .map_err(|_| ConnectionError::timeout(host, duration))?,
        None => future.await,
    }
}

/// Open a TCP connection to `host:port`, resolving the name if needed.
#[tracing::instrument(skip(config), level = "debug")]
pub(crate) async fn connect(
    host: &str,
    port: u16,
    config: &TcpConfig,
) -> Result<TcpStream, ConnectionError> {
    let authority = format!("{host}:{port}");

    let stream = with_timeout(&authority, config.timeout, async {
        TcpStream::connect((host, port))
            .await
            .map_err(ConnectionError::io(authority.as_str()))
    })
    .await?;

    if config.nodelay {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("tcp set_nodelay error: {}", e);
        }
    }

    if let Some(dur) = config.keep_alive {
        let conf = TcpKeepalive::new().with_time(dur);
        if let Err(e) = SockRef::from(&stream).set_tcp_keepalive(&conf) {
            warn!("tcp set_keepalive error: {}", e);
        }
    }

    trace!(peer = ?stream.peer_addr().ok(), "tcp connected");
    Ok(stream)
}

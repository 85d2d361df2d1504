//! Loopback JSON-RPC servers for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use http_body_util::{BodyExt as _, Full};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A request as seen by the server.
#[derive(Debug, Clone)]
pub struct Recorded {
    /// Index of the connection, in accept order.
    pub connection: usize,
    /// Index of the request on its connection.
    pub sequence: usize,
    pub headers: HeaderMap,
    pub body: Value,
}

/// What the server does with a request.
#[derive(Debug, Clone)]
pub struct Reply {
    status: StatusCode,
    body: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    drop_connection: bool,
}

impl Reply {
    pub fn json(body: Value) -> Self {
        Self::raw(200, &body.to_string())
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_owned(),
            headers: Vec::new(),
            drop_connection: false,
        }
    }

    /// Close the connection without answering.
    pub fn drop_connection() -> Self {
        Self {
            drop_connection: true,
            ..Self::raw(200, "")
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((
            HeaderName::from_static(name),
            HeaderValue::from_str(value).unwrap(),
        ));
        self
    }
}

/// Answers `{"result": <id>}` to every request.
pub fn echo_id(request: &Recorded) -> Reply {
    Reply::json(serde_json::json!({"result": request.body["id"], "error": null}))
}

/// Answers with the request params as the result.
pub fn echo_params(request: &Recorded) -> Reply {
    Reply::json(serde_json::json!({"result": request.body["params"], "error": null}))
}

type Handler = Arc<dyn Fn(&Recorded) -> Reply + Send + Sync>;

#[derive(Debug, Default)]
pub struct State {
    accepted: AtomicUsize,
    requests: Mutex<Vec<Recorded>>,
    client_certificates: AtomicUsize,
}

impl State {
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Recorded {
        self.requests.lock().last().cloned().unwrap()
    }

    /// Number of TLS connections on which the client presented a certificate.
    pub fn client_certificates(&self) -> usize {
        self.client_certificates.load(Ordering::SeqCst)
    }
}

/// Serve plain HTTP/1.1 on a loopback port.
pub async fn serve<F>(handler: F) -> (SocketAddr, Arc<State>)
where
    F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(State::default());
    let handler: Handler = Arc::new(handler);

    let server_state = state.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let connection = server_state.accepted.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(serve_connection(
                stream,
                connection,
                server_state.clone(),
                handler.clone(),
            ));
        }
    });

    (addr, state)
}

/// Serve HTTP/1.1 over TLS on a loopback port.
pub async fn serve_tls<F>(
    config: Arc<rustls::ServerConfig>,
    handler: F,
) -> (SocketAddr, Arc<State>)
where
    F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(State::default());
    let handler: Handler = Arc::new(handler);
    let acceptor = tokio_rustls::TlsAcceptor::from(config);

    let server_state = state.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let connection = server_state.accepted.fetch_add(1, Ordering::SeqCst);
            let acceptor = acceptor.clone();
            let state = server_state.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                let stream = match acceptor.accept(stream).await {
                    Ok(stream) => stream,
                    Err(error) => {
                        tracing::debug!(%error, "server tls handshake failed");
                        return;
                    }
                };
                if stream.get_ref().1.peer_certificates().is_some() {
                    state.client_certificates.fetch_add(1, Ordering::SeqCst);
                }
                serve_connection(stream, connection, state, handler).await;
            });
        }
    });

    (addr, state)
}

async fn serve_connection<S>(stream: S, connection: usize, state: Arc<State>, handler: Handler)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let sequence = Arc::new(AtomicUsize::new(0));
    let service = hyper::service::service_fn(move |request: http::Request<Incoming>| {
        let recorded = (connection, sequence.fetch_add(1, Ordering::SeqCst));
        respond(request, recorded, state.clone(), handler.clone())
    });

    if let Err(error) = hyper::server::conn::http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        tracing::debug!(%error, "server connection closed");
    }
}

async fn respond(
    request: http::Request<Incoming>,
    (connection, sequence): (usize, usize),
    state: Arc<State>,
    handler: Handler,
) -> Result<http::Response<Full<Bytes>>, BoxError> {
    let (parts, body) = request.into_parts();
    let bytes = body.collect().await?.to_bytes();
    let recorded = Recorded {
        connection,
        sequence,
        headers: parts.headers,
        body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
    };
    let reply = handler(&recorded);
    state.requests.lock().push(recorded);

    if reply.drop_connection {
        return Err("dropping connection".into());
    }

    let mut response = http::Response::new(Full::new(Bytes::from(reply.body)));
    *response.status_mut() = reply.status;
    for (name, value) in reply.headers {
        response.headers_mut().append(name, value);
    }
    Ok(response)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

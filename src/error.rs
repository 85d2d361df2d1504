//! Error taxonomy for JSON-RPC calls.
//!
//! Errors fall in two families. *Local* errors ([`ConfigError`], [`ConnectionError`],
//! [`ProtocolError`], [`ResponseFormatError`]) mean something went wrong talking to the
//! server. A [`Fault`] means the exchange worked, and the remote application reported
//! a failure of its own.

use std::io;
use std::time::Duration;

use camino::Utf8PathBuf;
use http::{HeaderMap, StatusCode};
use thiserror::Error;

use crate::tls::PeerCertificate;

/// A boxed, thread-safe error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Client error type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The client could not be constructed from the given parameters.
    #[error("configuration: {0}")]
    Configuration(#[from] ConfigError),

    /// Socket, TLS or HTTP framing failure.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The server answered with a non-200 status.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The response body was not a JSON-RPC response.
    #[error(transparent)]
    ResponseFormat(#[from] ResponseFormatError),

    /// The remote application reported an error.
    #[error(transparent)]
    Fault(#[from] Fault),

    /// Positional and named parameters were mixed in one call.
    #[error("invalid params: {0}")]
    InvalidParams(&'static str),

    /// The request envelope could not be serialized.
    #[error("unable to encode request: {0}")]
    Encode(#[source] serde_json::Error),
}

impl Error {
    /// Whether this error was reported by the remote peer.
    pub fn is_fault(&self) -> bool {
        matches!(self, Error::Fault(_))
    }

    /// The remote fault, if this error is one.
    pub fn as_fault(&self) -> Option<&Fault> {
        match self {
            Error::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    /// Whether this error happened at the connection level.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

/// Invalid construction parameters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Only `http` and `https` endpoints are supported.
    #[error("unsupported JSON-RPC uri: {0}")]
    UnsupportedScheme(String),

    /// The endpoint could not be parsed.
    #[error("invalid uri: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    /// The endpoint has no host.
    #[error("missing host in uri: {0}")]
    MissingHost(String),

    /// A certificate or key file could not be loaded.
    #[error("unable to load {path}: {source}")]
    Pem {
        /// The offending file.
        path: Utf8PathBuf,
        /// The underlying PEM error.
        #[source]
        source: rustls::pki_types::pem::Error,
    },

    /// A certificate file contained no certificates.
    #[error("no certificates found in {0}")]
    NoCertificates(Utf8PathBuf),

    /// A client key was configured without a client certificate.
    #[error("client key configured without a client certificate")]
    MissingClientCertificate,

    /// A header value derived from the endpoint was not valid.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// rustls rejected the TLS configuration.
    #[error("tls: {0}")]
    Tls(#[from] rustls::Error),

    /// The certificate verifier could not be built from the CA bundle.
    #[error("certificate verifier: {0}")]
    Verifier(#[source] BoxError),
}

/// Failure at the socket, TLS or HTTP framing level.
///
/// Connection errors are never retried; a pooled connection which produced one is
/// evicted from its pool.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectionError {
    /// The TCP connection could not be established or broke.
    #[error("error connecting to host {host}: {source}")]
    Io {
        /// The target host.
        host: String,
        /// The socket error.
        #[source]
        source: io::Error,
    },

    /// The TLS handshake failed.
    #[error("tls handshake with {host} failed: {source}")]
    Handshake {
        /// The target host.
        host: String,
        /// The handshake error.
        #[source]
        source: io::Error,
    },

    /// The handshake succeeded, but the certificate does not match the host.
    #[error(transparent)]
    InvalidCertificate(#[from] InvalidCertificateError),

    /// HTTP framing failed on an established connection.
    #[error("http exchange with {host} failed: {source}")]
    Http {
        /// The target host.
        host: String,
        /// The hyper error.
        #[source]
        source: hyper::Error,
    },

    /// The configured socket timeout elapsed.
    #[error("timed out after {}ms waiting for {host}", .timeout.as_millis())]
    Timeout {
        /// The target host.
        host: String,
        /// The configured timeout.
        timeout: Duration,
    },
}

impl ConnectionError {
    pub(crate) fn io(host: impl Into<String>) -> impl FnOnce(io::Error) -> Self {
        let host = host.into();
        move |source| ConnectionError::Io { host, source }
    }

    pub(crate) fn http(host: impl Into<String>) -> impl FnOnce(hyper::Error) -> Self {
        let host = host.into();
        move |source| ConnectionError::Http { host, source }
    }

    pub(crate) fn timeout(host: impl Into<String>, timeout: Duration) -> Self {
        ConnectionError::Timeout {
            host: host.into(),
            timeout,
        }
    }
}

/// The peer certificate does not match the host we dialed.
#[derive(Debug, Error)]
#[error("host {host} returned an invalid certificate ({reason}): {certificate}")]
pub struct InvalidCertificateError {
    /// The hostname the connection was made to, without port.
    pub host: String,
    /// The certificate the host presented.
    pub certificate: PeerCertificate,
    /// Why the certificate was rejected.
    pub reason: String,
}

/// The server answered with a non-200 HTTP status.
#[derive(Debug, Error)]
#[error("protocol error for {url}: {} {reason}", .status.as_u16())]
pub struct ProtocolError {
    /// Host and path of the request.
    pub url: String,
    /// The status code returned.
    pub status: StatusCode,
    /// The reason phrase returned.
    pub reason: String,
    /// The headers that were sent with the request.
    pub headers: HeaderMap,
}

/// The response is not a JSON-RPC 1.0 response.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResponseFormatError {
    /// The body could not be parsed as JSON.
    #[error("unable to parse response data as JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON is not shaped like a JSON-RPC response.
    #[error("malformed JSON-RPC response to {method}: {preview}")]
    Malformed {
        /// The method that was called.
        method: String,
        /// A bounded rendering of the offending payload.
        preview: String,
    },
}

/// An error reported by the remote application.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fault {code}: {message}")]
pub struct Fault {
    /// The remote error code.
    pub code: i64,
    /// The remote error message.
    pub message: String,
}

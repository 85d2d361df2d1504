//! The byte stream underneath an HTTP connection.
//!
//! hyper reads and writes it through [`TokioIo`][hyper_util::rt::TokioIo].

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

/// A TCP stream, optionally wrapped in TLS.
#[derive(Debug)]
#[pin_project(project = RpcStreamProj)]
pub enum RpcStream {
    /// Unencrypted TCP.
    Plain(#[pin] TcpStream),
    /// TLS over TCP, after a completed handshake.
    Tls(#[pin] Box<TlsStream<TcpStream>>),
}

impl RpcStream {
    /// Whether the stream is encrypted.
    pub fn is_secure(&self) -> bool {
        matches!(self, RpcStream::Tls(_))
    }

    /// Negotiated ALPN protocol, if any.
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        match self {
            RpcStream::Plain(_) => None,
            RpcStream::Tls(stream) => stream.get_ref().1.alpn_protocol(),
        }
    }
}

impl From<TcpStream> for RpcStream {
    fn from(stream: TcpStream) -> Self {
        RpcStream::Plain(stream)
    }
}

impl From<TlsStream<TcpStream>> for RpcStream {
    fn from(stream: TlsStream<TcpStream>) -> Self {
        RpcStream::Tls(Box::new(stream))
    }
}

impl AsyncRead for RpcStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            RpcStreamProj::Plain(stream) => stream.poll_read(cx, buf),
            RpcStreamProj::Tls(stream) => stream.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for RpcStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            RpcStreamProj::Plain(stream) => stream.poll_write(cx, buf),
            RpcStreamProj::Tls(stream) => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            RpcStreamProj::Plain(stream) => stream.poll_flush(cx),
            RpcStreamProj::Tls(stream) => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            RpcStreamProj::Plain(stream) => stream.poll_shutdown(cx),
            RpcStreamProj::Tls(stream) => stream.poll_shutdown(cx),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            RpcStreamProj::Plain(stream) => stream.poll_write_vectored(cx, bufs),
            RpcStreamProj::Tls(stream) => stream.poll_write_vectored(cx, bufs),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            RpcStream::Plain(stream) => stream.is_write_vectored(),
            RpcStream::Tls(stream) => stream.is_write_vectored(),
        }
    }
}

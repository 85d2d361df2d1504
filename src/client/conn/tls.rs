//! TLS connections with the certificate hostname policy applied.

use std::io;
use std::sync::Arc;

use http::uri::Authority;
use rustls::pki_types::ServerName;
use tokio::io::AsyncWriteExt as _;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, trace};

use super::stream::RpcStream;
use super::tcp::{self, TcpConfig};
use crate::endpoint::{hostname, Scheme};
use crate::error::{ConfigError, ConnectionError, InvalidCertificateError};
use crate::tls::{is_valid, PeerCertificate, TlsConfig};

/// Opens TCP connections and runs the TLS handshake over them.
///
/// When a CA bundle is configured, the certificate chain is checked during the
/// handshake and, unless disabled, the leaf certificate is then matched against
/// the host name. A mismatching connection is closed before it is handed out.
#[derive(Debug, Clone)]
pub struct SecureConnector {
    config: Arc<rustls::ClientConfig>,
    check_hostname: bool,
    tcp: TcpConfig,
}

impl SecureConnector {
    /// Build a connector, loading the certificate material named by `tls`.
    pub fn new(tls: &TlsConfig, tcp: TcpConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            config: tls.build()?,
            check_hostname: tls.verification_enabled(),
            tcp,
        })
    }

    /// The rustls configuration used for handshakes.
    pub fn config(&self) -> &Arc<rustls::ClientConfig> {
        &self.config
    }

    /// Whether the hostname policy is applied after the handshake.
    pub fn checks_hostname(&self) -> bool {
        self.check_hostname
    }

    /// Connect to `authority` (port 443 unless given) and complete the handshake.
    #[tracing::instrument(name = "tls-connect", skip(self), fields(host = %authority))]
    pub async fn connect(&self, authority: &Authority) -> Result<RpcStream, ConnectionError> {
        let host = hostname(authority);
        let port = authority
            .port_u16()
            .unwrap_or_else(|| Scheme::Secure.default_port());

        let tcp = tcp::connect(host, port, &self.tcp).await?;

        let server_name = ServerName::try_from(host.to_owned()).map_err(|error| {
            ConnectionError::Handshake {
                host: authority.to_string(),
                source: io::Error::new(io::ErrorKind::InvalidInput, error),
            }
        })?;

        trace!("tls handshake");
        let connector = TlsConnector::from(self.config.clone());
        let mut stream = tcp::with_timeout(authority.as_str(), self.tcp.timeout, async {
            connector
                .connect(server_name, tcp)
                .await
                .map_err(|source| ConnectionError::Handshake {
                    host: authority.to_string(),
                    source,
                })
        })
        .await?;
        trace!(alpn = ?stream.get_ref().1.alpn_protocol(), "tls handshake complete");

        if self.check_hostname {
            if let Err(error) = check_peer(&stream, host) {
                debug!(%error, "closing connection");
                let _ = stream.shutdown().await;
                return Err(error.into());
            }
        }

        Ok(stream.into())
    }
}

fn check_peer(
    stream: &TlsStream<tokio::net::TcpStream>,
    host: &str,
) -> Result<(), InvalidCertificateError> {
    let Some(leaf) = stream
        .get_ref()
        .1
        .peer_certificates()
        .and_then(|certs| certs.first())
    else {
        // Nothing presented, nothing to match.
        return Ok(());
    };

    let certificate =
        PeerCertificate::from_der(leaf).map_err(|error| InvalidCertificateError {
            host: host.to_owned(),
            certificate: PeerCertificate::default(),
            reason: format!("unreadable certificate: {error}"),
        })?;

    if is_valid(&certificate, host) {
        Ok(())
    } else {
        Err(InvalidCertificateError {
            host: host.to_owned(),
            certificate,
            reason: "hostname mismatch".into(),
        })
    }
}

//! TLS configuration for secure JSON-RPC endpoints.
//!
//! [`TlsConfig`] names the PEM files used for a connection and turns them into a
//! [`rustls::ClientConfig`]. Chain verification happens during the handshake, the
//! hostname policy in [`is_valid`] is applied right after it.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject as _;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::RootCertStore;

use crate::error::ConfigError;

mod hostname;
mod verifier;

pub use self::hostname::{is_valid, PeerCertificate, SubjectAltName};

/// Certificate material for a secure endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// PEM private key for client authentication.
    ///
    /// When unset and a client certificate is set, the key is read from the
    /// certificate file.
    pub client_key: Option<Utf8PathBuf>,

    /// PEM certificate chain presented to the server.
    pub client_cert: Option<Utf8PathBuf>,

    /// PEM bundle of trusted CA certificates.
    ///
    /// Without a bundle, the server certificate is not verified at all.
    pub ca_certs: Option<Utf8PathBuf>,

    /// Apply the hostname policy when a CA bundle is configured.
    pub verify_hostname: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            client_key: None,
            client_cert: None,
            ca_certs: None,
            verify_hostname: true,
        }
    }
}

impl TlsConfig {
    /// Whether the peer certificate name will be checked after the handshake.
    pub fn verification_enabled(&self) -> bool {
        self.ca_certs.is_some() && self.verify_hostname
    }

    /// Build the rustls configuration, reading every configured file.
    pub fn build(&self) -> Result<Arc<rustls::ClientConfig>, ConfigError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(self.verifier(provider)?);

        let mut config = match (&self.client_cert, &self.client_key) {
            (Some(cert), key) => {
                let chain = load_certs(cert)?;
                let key = load_key(key.as_deref().unwrap_or(cert))?;
                builder.with_client_auth_cert(chain, key)?
            }
            (None, Some(_)) => return Err(ConfigError::MissingClientCertificate),
            (None, None) => builder.with_no_client_auth(),
        };

        config.alpn_protocols.push(b"http/1.1".to_vec());
        Ok(Arc::new(config))
    }

    fn verifier(
        &self,
        provider: Arc<CryptoProvider>,
    ) -> Result<Arc<dyn rustls::client::danger::ServerCertVerifier>, ConfigError> {
        match &self.ca_certs {
            Some(path) => {
                let mut roots = RootCertStore::empty();
                for cert in load_certs(path)? {
                    roots.add(cert)?;
                }
                Ok(Arc::new(verifier::ChainVerifier::new(roots, provider)?))
            }
            None => {
                tracing::warn!("no CA bundle configured, server certificates are not verified");
                Ok(Arc::new(verifier::UnverifiedPeer::new(provider)))
            }
        }
    }
}

fn load_certs(path: &Utf8Path) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let pem_error = |source| ConfigError::Pem {
        path: path.to_owned(),
        source,
    };

    let certs = CertificateDer::pem_file_iter(path)
        .map_err(pem_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(pem_error)?;

    if certs.is_empty() {
        return Err(ConfigError::NoCertificates(path.to_owned()));
    }
    Ok(certs)
}

fn load_key(path: &Utf8Path) -> Result<PrivateKeyDer<'static>, ConfigError> {
    PrivateKeyDer::from_pem_file(path).map_err(|source| ConfigError::Pem {
        path: path.to_owned(),
        source,
    })
}

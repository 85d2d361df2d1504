//! Hostname policy for peer certificates.
//!
//! The policy prefers the DNS entries of the Subject Alternative Name extension. Only
//! certificates without any SAN entries fall back to the Common Names of the Subject,
//! which many legacy servers still rely on.

use std::fmt;
use std::net::IpAddr;

use x509_parser::error::X509Error;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::{FromDer, X509Certificate};

/// A single Subject Alternative Name entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectAltName {
    /// A `dNSName` entry, possibly containing wildcards.
    Dns(String),
    /// An `iPAddress` entry.
    IpAddress(IpAddr),
    /// Any other kind of name (email, URI, directory name, ...).
    Other,
}

/// The parts of an X.509 certificate that matter for hostname checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerCertificate {
    /// Entries of the Subject Alternative Name extension.
    pub subject_alt_names: Vec<SubjectAltName>,
    /// Common Name attributes of the Subject.
    pub common_names: Vec<String>,
}

impl PeerCertificate {
    /// Decode a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self, x509_parser::nom::Err<X509Error>> {
        let (_, cert) = X509Certificate::from_der(der)?;

        let common_names = cert
            .subject()
            .iter_common_name()
            .filter_map(|cn| cn.as_str().ok())
            .map(String::from)
            .collect();

        let subject_alt_names = match cert.subject_alternative_name() {
            Ok(Some(san)) => san
                .value
                .general_names
                .iter()
                .map(|name| match name {
                    GeneralName::DNSName(dns) => SubjectAltName::Dns((*dns).to_owned()),
                    GeneralName::IPAddress(bytes) => ip_from_bytes(bytes)
                        .map(SubjectAltName::IpAddress)
                        .unwrap_or(SubjectAltName::Other),
                    _ => SubjectAltName::Other,
                })
                .collect(),
            Ok(None) => Vec::new(),
            Err(error) => {
                tracing::debug!(%error, "unreadable subjectAltName extension");
                vec![SubjectAltName::Other]
            }
        };

        Ok(Self {
            subject_alt_names,
            common_names,
        })
    }

    /// The host patterns this certificate is valid for.
    ///
    /// DNS entries of the SAN extension when it has any entries, the subject
    /// Common Names otherwise.
    pub fn host_patterns(&self) -> Vec<&str> {
        if self.subject_alt_names.is_empty() {
            self.common_names.iter().map(String::as_str).collect()
        } else {
            self.subject_alt_names
                .iter()
                .filter_map(|name| match name {
                    SubjectAltName::Dns(dns) => Some(dns.as_str()),
                    _ => None,
                })
                .collect()
        }
    }
}

impl fmt::Display for PeerCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subject CN={:?}", self.common_names)?;
        let dns: Vec<&str> = self
            .subject_alt_names
            .iter()
            .filter_map(|name| match name {
                SubjectAltName::Dns(dns) => Some(dns.as_str()),
                _ => None,
            })
            .collect();
        if !self.subject_alt_names.is_empty() {
            write!(f, ", subjectAltName DNS={:?}", dns)?;
        }
        Ok(())
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}

/// Check whether `hostname` is covered by one of the certificate's host patterns.
pub fn is_valid(cert: &PeerCertificate, hostname: &str) -> bool {
    cert.host_patterns()
        .into_iter()
        .any(|pattern| matches_pattern(pattern, hostname))
}

/// Anchored, case-insensitive match of a hostname glob.
///
/// Dots are literal and `*` matches any run of non-dot characters, so a pattern
/// and a matching host always have the same number of labels.
pub(crate) fn matches_pattern(pattern: &str, hostname: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let hostname = hostname.to_ascii_lowercase();

    let mut labels = pattern.split('.');
    let mut host = hostname.split('.');
    loop {
        match (labels.next(), host.next()) {
            (Some(label), Some(part)) => {
                if !matches_label(label.as_bytes(), part.as_bytes()) {
                    return false;
                }
            }
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Glob match within one label, linear in the label length.
///
/// On a mismatch, only the most recent `*` is retried, one byte further along.
fn matches_label(pattern: &[u8], label: &[u8]) -> bool {
    let (mut p, mut l) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while l < label.len() {
        match pattern.get(p) {
            Some(b'*') => {
                star = Some((p, l));
                p += 1;
            }
            Some(c) if *c == label[l] => {
                p += 1;
                l += 1;
            }
            _ => match star {
                Some((star_p, star_l)) => {
                    p = star_p + 1;
                    l = star_l + 1;
                    star = Some((star_p, star_l + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == b'*')
}

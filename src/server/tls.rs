//! Server TLS identity.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use rustls_pemfile::{certs, private_key};
use tokio_rustls::rustls::crypto::ring::default_provider;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig as RustlsConfig;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info};

use super::error::{TlsError, TlsResult};

/// An already loaded certificate chain and private key.
///
/// The listener only consumes this; loading, rotating and renewing
/// certificates is the caller's business.
pub struct TlsIdentity {
    certificates: Vec<CertificateDer<'static>>,
    private_key: PrivateKeyDer<'static>,
}

impl std::fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsIdentity")
            .field("certificates_count", &self.certificates.len())
            .finish_non_exhaustive()
    }
}

impl Clone for TlsIdentity {
    fn clone(&self) -> Self {
        Self {
            certificates: self.certificates.clone(),
            private_key: self.private_key.clone_key(),
        }
    }
}

impl TlsIdentity {
    /// Wrap an in-memory chain (leaf first) and key.
    ///
    /// # Errors
    ///
    /// Returns [`TlsError::CertificateLoadError`] if the chain is empty.
    pub fn new(
        certificates: Vec<CertificateDer<'static>>,
        private_key: PrivateKeyDer<'static>,
    ) -> TlsResult<Self> {
        if certificates.is_empty() {
            return Err(TlsError::CertificateLoadError {
                path: "<memory>".to_string(),
                message: "No certificates provided".to_string(),
            });
        }
        Ok(Self {
            certificates,
            private_key,
        })
    }

    /// Load PEM encoded certificate chain and key files.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be read or holds no usable item.
    pub fn from_pem_files(cert_path: &Path, key_path: &Path) -> TlsResult<Self> {
        info!(cert_path = %cert_path.display(), "Loading TLS identity");

        let cert_label = cert_path.display().to_string();
        let file = File::open(cert_path).map_err(|e| TlsError::CertificateLoadError {
            path: cert_label.clone(),
            message: e.to_string(),
        })?;
        let certificates = load_certificates(&mut BufReader::new(file), &cert_label)?;

        let key_label = key_path.display().to_string();
        let file = File::open(key_path).map_err(|e| TlsError::PrivateKeyLoadError {
            path: key_label.clone(),
            message: e.to_string(),
        })?;
        let private_key = load_private_key(&mut BufReader::new(file), &key_label)?;

        debug!(cert_count = certificates.len(), "TLS identity loaded");
        Self::new(certificates, private_key)
    }

    /// Parse PEM encoded certificate chain and key from memory.
    ///
    /// # Errors
    ///
    /// Returns an error if either input holds no usable item.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> TlsResult<Self> {
        let certificates = load_certificates(&mut &cert_pem[..], "<memory>")?;
        let private_key = load_private_key(&mut &key_pem[..], "<memory>")?;
        Self::new(certificates, private_key)
    }

    /// Certificate chain, leaf first.
    #[must_use]
    pub fn certificates(&self) -> &[CertificateDer<'static>] {
        &self.certificates
    }

    /// Build a TLS acceptor using the ring crypto provider.
    ///
    /// # Errors
    ///
    /// Returns [`TlsError::InvalidIdentity`] if rustls rejects the key or chain.
    pub fn acceptor(&self) -> TlsResult<TlsAcceptor> {
        let config = RustlsConfig::builder_with_provider(Arc::new(default_provider()))
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(self.certificates.clone(), self.private_key.clone_key())?;

        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

fn load_certificates(reader: &mut dyn BufRead, path: &str) -> TlsResult<Vec<CertificateDer<'static>>> {
    let certificates = certs(reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::CertificateLoadError {
            path: path.to_string(),
            message: e.to_string(),
        })?;

    if certificates.is_empty() {
        return Err(TlsError::CertificateLoadError {
            path: path.to_string(),
            message: "No certificates found in file".to_string(),
        });
    }
    Ok(certificates)
}

fn load_private_key(reader: &mut dyn BufRead, path: &str) -> TlsResult<PrivateKeyDer<'static>> {
    private_key(reader)
        .map_err(|e| TlsError::PrivateKeyLoadError {
            path: path.to_string(),
            message: e.to_string(),
        })?
        .ok_or_else(|| TlsError::PrivateKeyLoadError {
            path: path.to_string(),
            message: "No private key found in file".to_string(),
        })
}

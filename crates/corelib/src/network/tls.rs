//! TLS configuration for conode connections, on top of Rustls.
//!
//! - [`TlsClientConfig`] - trust pool (and optional client certificate) used
//!   to dial conodes
//! - [`TlsServerConfig`] - certificate and key a conode presents, and the
//!   CA client certificates must chain to when mutual TLS is required
//!
//! There is no implicit trust: the client only accepts servers whose chain
//! ends in the trust pool it was given. Certificates and keys come either
//! inline or from files, selected explicitly by [`PemSource`]. Server files
//! are read on first use and cached; they are not re-read per connection.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use serde::Deserialize;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::debug;

use crate::error::TransportError;

/// Where PEM material comes from.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "PemSourceRepr")]
pub enum PemSource {
    /// PEM content held in memory.
    Inline(Vec<u8>),
    /// Path of a PEM file.
    File(PathBuf),
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum PemSourceRepr {
    Inline(String),
    File(PathBuf),
}

impl From<PemSourceRepr> for PemSource {
    fn from(repr: PemSourceRepr) -> Self {
        match repr {
            PemSourceRepr::Inline(pem) => PemSource::Inline(pem.into_bytes()),
            PemSourceRepr::File(path) => PemSource::File(path),
        }
    }
}

impl std::fmt::Debug for PemSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PemSource::Inline(bytes) => write!(f, "Inline({} bytes)", bytes.len()),
            PemSource::File(path) => write!(f, "File({})", path.display()),
        }
    }
}

impl PemSource {
    /// Read the PEM bytes.
    pub fn read(&self) -> Result<Vec<u8>, TransportError> {
        match self {
            PemSource::Inline(bytes) => Ok(bytes.clone()),
            PemSource::File(path) => std::fs::read(path).map_err(|e| {
                TransportError::Certificate(format!("reading {}: {}", path.display(), e))
            }),
        }
    }
}

fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TransportError::Certificate(format!("parsing certificates: {e}")))?;
    if certs.is_empty() {
        return Err(TransportError::Certificate("no certificate found in PEM".into()));
    }
    Ok(certs)
}

fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, TransportError> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| TransportError::Certificate(format!("parsing private key: {e}")))?
        .ok_or_else(|| TransportError::Certificate("no private key found in PEM".into()))
}

/// Build a trust pool from PEM encoded CA certificates.
pub fn root_store(ca: &PemSource) -> Result<RootCertStore, TransportError> {
    let mut roots = RootCertStore::empty();
    for cert in parse_certs(&ca.read()?)? {
        roots
            .add(cert)
            .map_err(|e| TransportError::Certificate(format!("adding CA certificate: {e}")))?;
    }
    Ok(roots)
}

/// TLS configuration for clients.
#[derive(Clone)]
pub struct TlsClientConfig {
    config: Arc<ClientConfig>,
}

impl std::fmt::Debug for TlsClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsClientConfig").finish_non_exhaustive()
    }
}

impl TlsClientConfig {
    /// Trust exactly the given roots.
    ///
    /// # Errors
    ///
    /// An empty pool is rejected, since it could never verify a server.
    pub fn new(roots: RootCertStore) -> Result<Self, TransportError> {
        if roots.is_empty() {
            return Err(TransportError::Certificate("empty trust pool".into()));
        }
        let config = ClientConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()
            .map_err(|e| TransportError::Tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Trust the CA certificates found in `ca`.
    pub fn from_ca(ca: &PemSource) -> Result<Self, TransportError> {
        Self::new(root_store(ca)?)
    }

    /// Trust `roots` and present a client certificate for mutual TLS.
    pub fn with_client_cert(
        roots: RootCertStore,
        certificate: &PemSource,
        private_key: &PemSource,
    ) -> Result<Self, TransportError> {
        if roots.is_empty() {
            return Err(TransportError::Certificate("empty trust pool".into()));
        }
        let chain = parse_certs(&certificate.read()?)?;
        let key = parse_private_key(&private_key.read()?)?;
        let config = ClientConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()
            .map_err(|e| TransportError::Tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_client_auth_cert(chain, key)
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn connector(&self) -> TlsConnector {
        TlsConnector::from(Arc::clone(&self.config))
    }
}

/// Server name to verify for `host`.
pub fn server_name(host: &str) -> Result<ServerName<'static>, TransportError> {
    ServerName::try_from(host)
        .map(|name| name.to_owned())
        .map_err(|e| TransportError::InvalidAddress(format!("{host}: {e}")))
}

/// TLS configuration for a conode.
///
/// The Rustls config is built the first time it is needed and kept for the
/// lifetime of the value.
pub struct TlsServerConfig {
    certificate: PemSource,
    private_key: PemSource,
    client_ca: Option<PemSource>,
    loaded: Mutex<Option<Arc<ServerConfig>>>,
}

impl std::fmt::Debug for TlsServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsServerConfig")
            .field("certificate", &self.certificate)
            .field("client_ca", &self.client_ca)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

impl TlsServerConfig {
    pub fn new(certificate: PemSource, private_key: PemSource) -> Self {
        Self {
            certificate,
            private_key,
            client_ca: None,
            loaded: Mutex::new(None),
        }
    }

    /// Refuse clients that do not present a certificate issued by `ca`.
    pub fn require_client_cert(mut self, ca: PemSource) -> Self {
        self.client_ca = Some(ca);
        self
    }

    /// True once the certificate and key have been read.
    pub fn is_loaded(&self) -> bool {
        self.loaded.lock().is_some()
    }

    /// Rustls config, loading the PEM material on first call.
    pub fn load(&self) -> Result<Arc<ServerConfig>, TransportError> {
        let mut loaded = self.loaded.lock();
        if let Some(config) = loaded.as_ref() {
            return Ok(Arc::clone(config));
        }

        let chain = parse_certs(&self.certificate.read()?)?;
        let key = parse_private_key(&self.private_key.read()?)?;
        let builder = ServerConfig::builder_with_provider(crypto_provider())
            .with_safe_default_protocol_versions()
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        let builder = match &self.client_ca {
            Some(ca) => {
                let verifier =
                    WebPkiClientVerifier::builder_with_provider(Arc::new(root_store(ca)?), crypto_provider())
                        .build()
                        .map_err(|e| TransportError::Certificate(format!("client verifier: {e}")))?;
                builder.with_client_cert_verifier(verifier)
            }
            None => builder.with_no_client_auth(),
        };
        let config = builder
            .with_single_cert(chain, key)
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        debug!(
            source = ?self.certificate,
            client_auth = self.client_ca.is_some(),
            "loaded server certificate"
        );

        let config = Arc::new(config);
        *loaded = Some(Arc::clone(&config));
        Ok(config)
    }

    pub fn acceptor(&self) -> Result<TlsAcceptor, TransportError> {
        Ok(TlsAcceptor::from(self.load()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_trust_pool_rejected() {
        let err = TlsClientConfig::new(RootCertStore::empty()).unwrap_err();
        assert!(matches!(err, TransportError::Certificate(_)));
    }

    #[test]
    fn test_garbage_pem_rejected() {
        let err = root_store(&PemSource::Inline(b"not a certificate".to_vec())).unwrap_err();
        assert!(matches!(err, TransportError::Certificate(_)));
    }

    #[test]
    fn test_missing_file() {
        let source = PemSource::File(PathBuf::from("/nonexistent/conode/cert.pem"));
        assert!(matches!(source.read(), Err(TransportError::Certificate(_))));
    }

    #[test]
    fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca.pem");
        std::fs::write(&path, b"not a certificate").unwrap();

        let source = PemSource::File(path);
        assert_eq!(source.read().unwrap(), b"not a certificate");
        assert!(matches!(root_store(&source), Err(TransportError::Certificate(_))));
    }

    #[test]
    fn test_server_name() {
        assert!(server_name("127.0.0.1").is_ok());
        assert!(server_name("localhost").is_ok());
        assert!(server_name("not a host!").is_err());
    }

    #[test]
    fn test_server_config_lazy() {
        let config = TlsServerConfig::new(
            PemSource::Inline(b"bad".to_vec()),
            PemSource::Inline(b"bad".to_vec()),
        );
        assert!(!config.is_loaded());
        assert!(config.load().is_err());
        assert!(!config.is_loaded());
    }
}

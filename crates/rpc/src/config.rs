//! Client and server configuration.
//!
//! Both sides deserialize from JSON with every field optional:
//!
//! ```json
//! {
//!   "bind_address": "0.0.0.0:7770",
//!   "tls": {
//!     "certificate": { "file": "/etc/conode/cert.pem" },
//!     "private_key": { "file": "/etc/conode/key.pem" },
//!     "client_ca": { "file": "/etc/conode/clients.pem" }
//!   }
//! }
//! ```

use std::path::Path;

use serde::Deserialize;

use corelib::network::DEFAULT_MAX_FRAME_LENGTH;
use corelib::{PemSource, TlsServerConfig};

use crate::error::{Result, RpcError};

/// How a [`Client`](crate::Client) talks to conodes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Keep one connection per destination open between calls.
    pub keep_alive: bool,
    /// Largest frame body accepted, in bytes.
    pub max_frame_length: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            keep_alive: false,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

impl ClientConfig {
    pub fn keep_alive() -> Self {
        Self {
            keep_alive: true,
            ..Self::default()
        }
    }
}

/// Certificate and key a conode serves TLS with.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerTlsSettings {
    pub certificate: PemSource,
    pub private_key: PemSource,
    /// When set, clients must present a certificate issued by this CA.
    #[serde(default)]
    pub client_ca: Option<PemSource>,
}

impl ServerTlsSettings {
    pub fn to_tls_config(&self) -> TlsServerConfig {
        let config = TlsServerConfig::new(self.certificate.clone(), self.private_key.clone());
        match &self.client_ca {
            Some(ca) => config.require_client_cert(ca.clone()),
            None => config,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on. Port 0 picks a free port.
    pub bind_address: String,
    pub max_frame_length: usize,
    /// Plain TCP when absent.
    pub tls: Option<ServerTlsSettings>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            tls: None,
        }
    }
}

impl ServerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RpcError::Config(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| RpcError::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn with_tls(mut self, certificate: PemSource, private_key: PemSource) -> Self {
        self.tls = Some(ServerTlsSettings {
            certificate,
            private_key,
            client_ca: None,
        });
        self
    }

    /// Require client certificates issued by `ca`. Has no effect without
    /// [`with_tls`](Self::with_tls).
    pub fn require_client_cert(mut self, ca: PemSource) -> Self {
        if let Some(tls) = self.tls.as_mut() {
            tls.client_ca = Some(ca);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_json() {
        let config = ServerConfig::from_json_str("{}").unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:0");
        assert_eq!(config.max_frame_length, DEFAULT_MAX_FRAME_LENGTH);
        assert!(config.tls.is_none());

        let client: ClientConfig = serde_json::from_str(r#"{"keep_alive": true}"#).unwrap();
        assert_eq!(client, ClientConfig::keep_alive());
    }

    #[test]
    fn test_pem_sources() {
        let config = ServerConfig::from_json_str(
            r#"{
                "bind_address": "127.0.0.1:7770",
                "tls": {
                    "certificate": { "inline": "-----BEGIN CERTIFICATE-----" },
                    "private_key": { "file": "/etc/conode/key.pem" }
                }
            }"#,
        )
        .unwrap();

        let tls = config.tls.unwrap();
        assert_eq!(
            tls.certificate,
            PemSource::Inline(b"-----BEGIN CERTIFICATE-----".to_vec())
        );
        assert_eq!(tls.private_key, PemSource::File("/etc/conode/key.pem".into()));
        assert!(tls.client_ca.is_none());
    }

    #[test]
    fn test_client_ca() {
        let config = ServerConfig::from_json_str(
            r#"{"tls": {
                "certificate": { "file": "cert.pem" },
                "private_key": { "file": "key.pem" },
                "client_ca": { "file": "clients.pem" }
            }}"#,
        )
        .unwrap();
        assert_eq!(
            config.tls.unwrap().client_ca,
            Some(PemSource::File("clients.pem".into()))
        );

        // Without TLS there is nothing to require a certificate on.
        let plain = ServerConfig::default().require_client_cert(PemSource::File("clients.pem".into()));
        assert!(plain.tls.is_none());
    }

    #[test]
    fn test_bad_json_is_config_error() {
        let err = ServerConfig::from_json_str(r#"{"tls": {"certificate": 3}}"#).unwrap_err();
        assert!(matches!(err, RpcError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_frame_length": 1024}}"#).unwrap();

        let config = ServerConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_frame_length, 1024);

        let missing = ServerConfig::from_json_file("/nonexistent/conode.json").unwrap_err();
        assert!(matches!(missing, RpcError::Config(_)));
    }
}

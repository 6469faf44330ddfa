//! Error types for the core library.
//!
//! Transport failures and protocol failures are separate types: a node that
//! cannot be reached is not the same as a node that answered "no such path".

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Failures of the connection itself: reaching the node, the TLS handshake,
/// or the byte stream underneath.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The TCP connection could not be established.
    #[error("connection to {address} failed: {source}")]
    ConnectFailed {
        address: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// TLS handshake or configuration failure.
    #[error("tls error: {0}")]
    Tls(String),

    /// Certificate or key material could not be loaded.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// IO error on an established connection.
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),

    /// The peer closed the connection before answering.
    #[error("connection closed")]
    ConnectionClosed,

    /// The identity's address cannot be used to connect.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A frame was refused before anything was written, so the connection
    /// is still usable.
    #[error("frame of {len} bytes exceeds max frame length {max}")]
    FrameTooLarge { len: usize, max: usize },
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

/// Payload encoding failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CodecError {
    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),
}

/// What went wrong on the remote side while routing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolErrorKind {
    /// No service of that name is running on the conode.
    UnknownService,
    /// The service has no handler for the path.
    UnknownPath,
    /// Unary request for a streaming path or the other way around.
    WrongKind,
    /// The request payload did not decode.
    Malformed,
    /// The handler returned an error.
    Handler,
    /// A frame arrived that the protocol does not allow at this point.
    UnexpectedFrame,
}

impl fmt::Display for ProtocolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtocolErrorKind::UnknownService => "unknown service",
            ProtocolErrorKind::UnknownPath => "unknown path",
            ProtocolErrorKind::WrongKind => "wrong request kind",
            ProtocolErrorKind::Malformed => "malformed request",
            ProtocolErrorKind::Handler => "handler error",
            ProtocolErrorKind::UnexpectedFrame => "unexpected frame",
        };
        f.write_str(s)
    }
}

/// Protocol-level failure. Travels over the wire in an error frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ProtocolError {
    pub kind: ProtocolErrorKind,
    pub message: String,
}

impl ProtocolError {
    pub fn new(kind: ProtocolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_service(name: &str) -> Self {
        Self::new(ProtocolErrorKind::UnknownService, name)
    }

    pub fn unknown_path(path: &str) -> Self {
        Self::new(ProtocolErrorKind::UnknownPath, path)
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self::new(ProtocolErrorKind::Handler, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::unknown_path("Ping");
        assert_eq!(err.to_string(), "unknown path: Ping");
    }

    #[test]
    fn test_io_conversion() {
        let err: TransportError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(err, TransportError::Io(_)));
    }
}

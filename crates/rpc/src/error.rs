//! Error types for the RPC layer.

use corelib::{CodecError, ProtocolError, TransportError};

/// Result type alias for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    /// The node could not be reached or the connection broke.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The node answered, but refused or failed the request.
    #[error("remote error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Fewer nodes are left to ask than the quorum needs.
    #[error("quorum unreachable: {available} nodes available, {required} required")]
    QuorumUnreachable { available: usize, required: usize },

    /// Every node of a parallel call was asked and none gave a usable answer.
    #[error("no usable response from {tried} nodes: {last}")]
    ParallelExhausted { tried: usize, last: String },

    /// Read on a stream that has already ended.
    #[error("stream closed")]
    StreamClosed,

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error("config error: {0}")]
    Config(String),
}

impl RpcError {
    pub fn is_transport(&self) -> bool {
        matches!(self, RpcError::Transport(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, RpcError::Protocol(_))
    }
}

/// Service and handler registration failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("path already registered: {0}")]
    DuplicatePath(String),

    #[error("service already registered: {0}")]
    DuplicateService(String),

    #[error("no such service: {0}")]
    UnknownService(String),

    /// A service factory refused to build its service.
    #[error("starting service {service}: {message}")]
    Factory { service: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        let transport: RpcError = TransportError::ConnectionClosed.into();
        assert!(transport.is_transport());
        assert!(!transport.is_protocol());

        let protocol: RpcError = ProtocolError::unknown_path("Nope").into();
        assert!(protocol.is_protocol());
        assert!(!protocol.is_transport());
        assert_eq!(protocol.to_string(), "remote error: unknown path: Nope");
    }

    #[test]
    fn test_exhausted_keeps_last_error() {
        let err = RpcError::ParallelExhausted {
            tried: 3,
            last: "bad signature".into(),
        };
        assert!(err.to_string().contains("bad signature"));
    }
}

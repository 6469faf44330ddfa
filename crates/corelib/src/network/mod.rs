//! Networking shared across the workspace.
//!
//! Defines the framed connection every RPC runs over, the frames exchanged on
//! it, and the TLS configuration for both ends.

pub mod connection;
pub mod tls;
pub mod wire;

pub use connection::{AsyncStream, BoxedStream, Connection, DEFAULT_MAX_FRAME_LENGTH};
pub use tls::{PemSource, TlsClientConfig, TlsServerConfig};
pub use wire::{Frame, RequestKind};

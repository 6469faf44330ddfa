//! Core library for the conode RPC substrate.
//!
//! This crate provides the abstractions every other crate builds on:
//! - Server identities and rosters
//! - The message codec
//! - Framed connections, wire frames and TLS configuration
//! - The transport / protocol error taxonomy

pub mod codec;
pub mod error;
pub mod identity;
pub mod network;
pub mod roster;

pub use codec::Message;
pub use error::{CodecError, ProtocolError, ProtocolErrorKind, Result, TransportError};
pub use identity::{IdentityId, PublicKey, ServerIdentity};
pub use network::{Connection, Frame, PemSource, RequestKind, TlsClientConfig, TlsServerConfig};
pub use roster::Roster;

//! Server identities.
//!
//! A conode is addressed by a `ServerIdentity`: its public key plus the
//! network address it listens on. Identities are compared by key only, so two
//! identities with the same key and different addresses are the same node.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Compact identifier derived from a public key.
///
/// Newtype over `u128` so comparisons and hashing are very fast. It is the
/// first 16 bytes of the BLAKE3 digest of the key, which is plenty to keep
/// the ids of a roster apart.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct IdentityId(pub u128);

impl IdentityId {
    /// Derive the id of a public key.
    pub fn from_key(key: &PublicKey) -> Self {
        let digest = blake3::hash(key.as_bytes());
        let mut head = [0u8; 16];
        head.copy_from_slice(&digest.as_bytes()[..16]);
        IdentityId(u128::from_be_bytes(head))
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Opaque public key of a conode.
///
/// Key generation and signature checks belong to the identity layer; this
/// crate only needs the bytes for equality.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        PublicKey(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// Public key and address of a conode.
///
/// Keep this struct small and cheap to clone; connections and counters live
/// in the client that talks to it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerIdentity {
    pub public_key: PublicKey,
    /// `host:port` the conode listens on.
    pub address: String,
    /// Human-readable label, only used in logs.
    #[serde(default)]
    pub description: Option<String>,
}

impl ServerIdentity {
    /// Construct a new identity.
    pub fn new(public_key: PublicKey, address: impl Into<String>) -> Self {
        Self {
            public_key,
            address: address.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Compact id of this identity's key.
    pub fn id(&self) -> IdentityId {
        IdentityId::from_key(&self.public_key)
    }

    /// Host part of the address, used as the TLS server name.
    ///
    /// Bracketed IPv6 hosts (`[::1]:7000`) are returned without brackets.
    pub fn host(&self) -> &str {
        let host = match self.address.rfind(':') {
            Some(idx) => &self.address[..idx],
            None => &self.address,
        };
        host.trim_start_matches('[').trim_end_matches(']')
    }
}

impl PartialEq for ServerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key
    }
}

impl Eq for ServerIdentity {}

impl Hash for ServerIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.public_key.hash(state);
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "{} ({})", desc, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

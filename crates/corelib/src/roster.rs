//! Rosters: ordered lists of conodes.
//!
//! The roster is the candidate list handed to parallel dispatch. Its order is
//! meaningful: the quorum planner rotates it from a start index.

use serde::{Deserialize, Serialize};

use crate::identity::{IdentityId, ServerIdentity};

/// Ordered sequence of server identities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    list: Vec<ServerIdentity>,
}

impl Roster {
    pub fn new(list: Vec<ServerIdentity>) -> Self {
        Self { list }
    }

    pub fn list(&self) -> &[ServerIdentity] {
        &self.list
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Find a member by its compact id, returning its index and identity.
    pub fn search(&self, id: IdentityId) -> Option<(usize, &ServerIdentity)> {
        self.list.iter().enumerate().find(|(_, si)| si.id() == id)
    }

    pub fn contains(&self, identity: &ServerIdentity) -> bool {
        self.list.contains(identity)
    }
}

impl From<Vec<ServerIdentity>> for Roster {
    fn from(list: Vec<ServerIdentity>) -> Self {
        Self::new(list)
    }
}

impl AsRef<[ServerIdentity]> for Roster {
    fn as_ref(&self) -> &[ServerIdentity] {
        &self.list
    }
}

//! Options of a parallel call.

use std::collections::HashSet;

use corelib::ServerIdentity;

/// Knobs for one parallel call.
///
/// The zero value is the default: majority quorum, no exclusions, start at
/// the first node, shuffle, keep going on errors. Passing `None` where an
/// `Option<&ParallelOptions>` is expected is the same as passing
/// `ParallelOptions::default()`.
///
/// # Example
///
/// ```rust
/// use quorum::ParallelOptions;
///
/// let opts = ParallelOptions::new().ask_nodes(2).dont_shuffle(true);
/// assert_eq!(opts.ask_nodes, 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelOptions {
    /// Index in the roster the node list starts from (wraps around).
    pub start_node: usize,
    /// Nodes to contact at once. 0 means a majority of the roster.
    pub ask_nodes: usize,
    /// Nodes never to contact.
    pub ignore_nodes: HashSet<ServerIdentity>,
    /// Keep the (rotated) roster order instead of shuffling it.
    pub dont_shuffle: bool,
    /// Give up before dispatch when too few nodes are left for the quorum.
    pub quit_error: bool,
}

impl ParallelOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_node(mut self, index: usize) -> Self {
        self.start_node = index;
        self
    }

    pub fn ask_nodes(mut self, count: usize) -> Self {
        self.ask_nodes = count;
        self
    }

    pub fn ignore_node(mut self, node: ServerIdentity) -> Self {
        self.ignore_nodes.insert(node);
        self
    }

    pub fn ignore_nodes(mut self, nodes: impl IntoIterator<Item = ServerIdentity>) -> Self {
        self.ignore_nodes.extend(nodes);
        self
    }

    pub fn dont_shuffle(mut self, dont_shuffle: bool) -> Self {
        self.dont_shuffle = dont_shuffle;
        self
    }

    pub fn quit_error(mut self, quit_error: bool) -> Self {
        self.quit_error = quit_error;
        self
    }

    /// Nominal quorum for a roster of `roster_len` nodes.
    ///
    /// Uses the full roster length; exclusions do not lower it.
    pub fn quorum_count(&self, roster_len: usize) -> usize {
        if self.ask_nodes > 0 {
            self.ask_nodes
        } else {
            roster_len / 2 + 1
        }
    }
}
